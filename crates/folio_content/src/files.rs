//! File field resolution.
//!
//! A file field stores references into the file store, either inline on the
//! item row or in a side table named `<owner-table>_<field>`. Resolution
//! promotes those references to [`crate::FileRef`] records. Whether the
//! result is a single value or a list comes only from the field definition,
//! never from what the data happens to look like.

use crate::context::OwnerContext;
use crate::error::Result;
use crate::{ContentEngine, JsonObject};
use folio_db::{Filter, OrderDir, SelectQuery, SqlValue};
use serde_json::Value as JsonValue;
use tracing::debug;

impl ContentEngine {
    /// Resolve one file field of `item`.
    ///
    /// Inline identifier(s) on the item short-cut the side-table lookup; a
    /// value that is already a record (or list of records) passes through
    /// untouched, which is what makes resolution idempotent. With `expand`
    /// unset, identifiers are normalized but not promoted.
    pub(crate) async fn resolve_file_field(
        &self,
        item: &JsonObject,
        field: &str,
        multiple: bool,
        owner: &OwnerContext,
        expand: bool,
    ) -> Result<JsonValue> {
        let ids = match item.get(field) {
            Some(value @ JsonValue::Object(_)) => return Ok(value.clone()),
            Some(value @ JsonValue::Array(elems))
                if elems.first().map_or(false, JsonValue::is_object) =>
            {
                return Ok(value.clone());
            }
            Some(JsonValue::Array(elems)) => {
                elems.iter().filter(|e| !e.is_null()).cloned().collect()
            }
            Some(value) if !value.is_null() => vec![value.clone()],
            _ => self.file_ids_from_side_table(item, field, owner).await?,
        };

        if ids.is_empty() {
            return Ok(empty_file_value(multiple));
        }

        if !expand {
            return Ok(if multiple {
                JsonValue::Array(ids)
            } else {
                ids.into_iter().next().unwrap_or(JsonValue::Null)
            });
        }

        let files = self.files.files(&ids).await;
        let mut records = Vec::with_capacity(files.len());
        for file in files {
            records.push(serde_json::to_value(file)?);
        }

        // A dangling id drops out of a list but nulls a single value.
        Ok(if multiple {
            JsonValue::Array(records)
        } else {
            records.into_iter().next().unwrap_or(JsonValue::Null)
        })
    }

    async fn file_ids_from_side_table(
        &self,
        item: &JsonObject,
        field: &str,
        owner: &OwnerContext,
    ) -> Result<Vec<JsonValue>> {
        let Some(owner_id) = item.get("id").filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };
        let Some(side) = self.locator.side_table(&owner.table, field).await? else {
            return Ok(Vec::new());
        };

        let owner_column = owner.kind.side_owner_column();
        if !side.has_column(owner_column) || !side.has_column("file_id") {
            debug!(table = %side.name, "side table lacks owner or file_id column");
            return Ok(Vec::new());
        }

        let mut query = SelectQuery::table(&side.name).filter(Filter::Eq(
            owner_column.to_string(),
            SqlValue::from_json(owner_id),
        ));
        if side.has_column("owner_kind") {
            // Rows written before the discriminant existed carry null/''.
            query = query.filter(Filter::EqOrUnset(
                "owner_kind".to_string(),
                SqlValue::from(owner.kind.as_str()),
            ));
        }
        if side.has_column("sort") {
            query = query.order_by("sort", OrderDir::Asc);
        }

        let rows = self.db.select(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut columns = row.into_json();
                columns.remove("file_id").filter(|v| !v.is_null())
            })
            .collect())
    }
}

fn empty_file_value(multiple: bool) -> JsonValue {
    if multiple {
        JsonValue::Array(Vec::new())
    } else {
        JsonValue::Null
    }
}
