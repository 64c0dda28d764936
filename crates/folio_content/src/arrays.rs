//! Array field resolution.
//!
//! An array field's rows live in a side table named `<owner-table>_<field>`.
//! At the root the rows key back to the item through the owner-kind column
//! (`collection_id`/`global_id`); from the second nesting level down the key
//! switches to the generic `parent_id` referencing the immediate enclosing
//! row, not the root item. Each row re-enters the full resolver composition
//! with its own `item_fields` map, so arrays nest arbitrarily.

use crate::context::{OwnerContext, ResolveContext};
use crate::error::Result;
use crate::{ContentEngine, JsonObject};
use folio_db::{Filter, OrderDir, SelectQuery, SqlValue};
use folio_schema::FieldMap;
use serde_json::Value as JsonValue;
use tracing::debug;

/// Side-table bookkeeping columns that never belong in a resolved block.
const BLOCK_COLUMNS: [&str; 6] = [
    "collection_id",
    "global_id",
    "parent_id",
    "block_id",
    "owner_kind",
    "sort",
];

impl ContentEngine {
    /// Resolve one array field of `item` into its ordered block rows.
    ///
    /// A missing side table is an empty field, never an error.
    pub(crate) async fn resolve_array_field(
        &self,
        item: &JsonObject,
        field: &str,
        item_fields: &FieldMap,
        owner: &OwnerContext,
        ctx: &ResolveContext,
    ) -> Result<Vec<JsonValue>> {
        let Some(owner_id) = item.get("id").filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };
        let Some(side) = self.locator.side_table(&owner.table, field).await? else {
            return Ok(Vec::new());
        };

        let owner_column = owner.kind.side_owner_column();
        if !side.has_column(owner_column) {
            debug!(table = %side.name, column = owner_column, "side table lacks owner column");
            return Ok(Vec::new());
        }

        let mut query = SelectQuery::table(&side.name).filter(Filter::Eq(
            owner_column.to_string(),
            SqlValue::from_json(owner_id),
        ));
        if side.has_column("owner_kind") {
            query = query.filter(Filter::EqOrUnset(
                "owner_kind".to_string(),
                SqlValue::from(owner.kind.as_str()),
            ));
        }
        if side.has_column("sort") {
            query = query.order_by("sort", OrderDir::Asc);
        }

        let rows = self.db.select(&query).await?;

        let block_owner = owner.block(&side.name);
        let block_ctx = ctx.descend();
        let blocks = crate::fanout::resolve_ordered(rows, self.config.fan_out_limit, |row| {
            let block_owner = block_owner.clone();
            let block_ctx = block_ctx.clone();
            async move {
                let mut block = strip_block_columns(row.into_json());
                self.resolve_item(&mut block, item_fields, &block_owner, &block_ctx)
                    .await;
                JsonValue::Object(block)
            }
        })
        .await;

        Ok(blocks)
    }
}

fn strip_block_columns(mut block: JsonObject) -> JsonObject {
    for column in BLOCK_COLUMNS {
        block.remove(column);
    }
    block
}
