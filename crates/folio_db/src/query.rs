//! Dynamic SELECT building for runtime-named tables.
//!
//! Every identifier that lands in an SQL string goes through the allow-list
//! in [`crate::guard`]; every value is a bound parameter. The builder only
//! produces read queries - this facade has no write surface.

use crate::error::Result;
use crate::guard::{quote_ident, safe_ident};
use crate::row::SqlValue;

/// Sort direction for an ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    #[default]
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A single WHERE condition.
#[derive(Debug, Clone)]
pub enum Filter {
    /// `column = ?` (rewritten to `IS NULL` for a null value)
    Eq(String, SqlValue),
    /// `column != ?` (rewritten to `IS NOT NULL` for a null value)
    Ne(String, SqlValue),
    /// `column IN (?, ...)`; an empty list matches nothing
    In(String, Vec<SqlValue>),
    /// `column IS NULL`
    IsNull(String),
    /// `(column = ? OR column IS NULL OR column = '')`
    ///
    /// Tolerance for legacy rows that predate the owner-kind discriminant.
    EqOrUnset(String, SqlValue),
}

impl Filter {
    fn render(&self, sql: &mut String, params: &mut Vec<SqlValue>) -> Result<()> {
        match self {
            Filter::Eq(column, value) => {
                let column = quote_ident(safe_ident(column)?);
                if value.is_null() {
                    sql.push_str(&format!("{} IS NULL", column));
                } else {
                    sql.push_str(&format!("{} = ?", column));
                    params.push(value.clone());
                }
            }
            Filter::Ne(column, value) => {
                let column = quote_ident(safe_ident(column)?);
                if value.is_null() {
                    sql.push_str(&format!("{} IS NOT NULL", column));
                } else {
                    sql.push_str(&format!("{} != ?", column));
                    params.push(value.clone());
                }
            }
            Filter::In(column, values) => {
                if values.is_empty() {
                    sql.push_str("1 = 0");
                } else {
                    let column = quote_ident(safe_ident(column)?);
                    let placeholders = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!("{} IN ({})", column, placeholders));
                    params.extend(values.iter().cloned());
                }
            }
            Filter::IsNull(column) => {
                let column = quote_ident(safe_ident(column)?);
                sql.push_str(&format!("{} IS NULL", column));
            }
            Filter::EqOrUnset(column, value) => {
                let column = quote_ident(safe_ident(column)?);
                sql.push_str(&format!(
                    "({col} = ? OR {col} IS NULL OR {col} = '')",
                    col = column
                ));
                params.push(value.clone());
            }
        }
        Ok(())
    }
}

/// A SELECT over one runtime-named table.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: String,
    filters: Vec<Filter>,
    order_by: Option<(String, OrderDir)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl SelectQuery {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, dir: OrderDir) -> Self {
        self.order_by = Some((column.into(), dir));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build the page query.
    pub(crate) fn build(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = format!("SELECT * FROM {}", quote_ident(safe_ident(&self.table)?));
        let mut params = Vec::new();

        self.render_where(&mut sql, &mut params)?;

        if let Some((column, dir)) = &self.order_by {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_ident(safe_ident(column)?),
                dir.as_sql()
            ));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite requires a LIMIT clause before OFFSET; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        Ok((sql, params))
    }

    /// Build the matching COUNT query. Ordering and pagination are ignored so
    /// `total` reflects the whole filtered set.
    pub(crate) fn build_count(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(safe_ident(&self.table)?)
        );
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params)?;
        Ok((sql, params))
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<SqlValue>) -> Result<()> {
        for (index, filter) in self.filters.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            filter.render(sql, params)?;
        }
        Ok(())
    }
}

/// A junction-to-target join, queried from the owning item's side.
///
/// Produces `SELECT t.* FROM junction j JOIN target t ON j.target_id = t.id
/// WHERE j.<owner_column> = ?`, optionally ordered by the junction's sort
/// column. The inner join drops dangling junction rows by construction.
#[derive(Debug, Clone)]
pub struct JoinQuery {
    junction: String,
    target: String,
    owner_column: String,
    owner_id: SqlValue,
    order_by_sort: bool,
}

impl JoinQuery {
    pub fn new(
        junction: impl Into<String>,
        target: impl Into<String>,
        owner_column: impl Into<String>,
        owner_id: SqlValue,
    ) -> Self {
        Self {
            junction: junction.into(),
            target: target.into(),
            owner_column: owner_column.into(),
            owner_id,
            order_by_sort: false,
        }
    }

    /// Order results by the junction's `sort` column.
    pub fn order_by_sort(mut self) -> Self {
        self.order_by_sort = true;
        self
    }

    pub(crate) fn build(&self) -> Result<(String, Vec<SqlValue>)> {
        let junction = quote_ident(safe_ident(&self.junction)?);
        let target = quote_ident(safe_ident(&self.target)?);
        let owner = quote_ident(safe_ident(&self.owner_column)?);

        let mut sql = format!(
            "SELECT t.* FROM {junction} AS j JOIN {target} AS t ON j.\"target_id\" = t.\"id\" WHERE j.{owner} = ?",
        );
        if self.order_by_sort {
            sql.push_str(" ORDER BY j.\"sort\" ASC");
        }

        Ok((sql, vec![self.owner_id.clone()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_with_filters_and_order() {
        let (sql, params) = SelectQuery::table("collection_posts")
            .filter(Filter::Eq("status".into(), SqlValue::from("published")))
            .filter(Filter::Eq("parent_id".into(), SqlValue::from(4_i64)))
            .order_by("created_at", OrderDir::Desc)
            .limit(10)
            .offset(20)
            .build()
            .unwrap();

        assert_eq!(
            sql,
            "SELECT * FROM \"collection_posts\" WHERE \"status\" = ? AND \"parent_id\" = ? \
             ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_eq_null_becomes_is_null() {
        let (sql, params) = SelectQuery::table("collection_posts")
            .filter(Filter::Eq("parent_id".into(), SqlValue::Null))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"collection_posts\" WHERE \"parent_id\" IS NULL"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let (sql, params) = SelectQuery::table("collection_posts")
            .filter(Filter::In("id".into(), Vec::new()))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"collection_posts\" WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_eq_or_unset_renders_legacy_tolerance() {
        let (sql, params) = SelectQuery::table("collection_posts_image")
            .filter(Filter::EqOrUnset(
                "owner_kind".into(),
                SqlValue::from("collection"),
            ))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"collection_posts_image\" WHERE (\"owner_kind\" = ? \
             OR \"owner_kind\" IS NULL OR \"owner_kind\" = '')"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_offset_without_limit_is_unbounded() {
        let (sql, _) = SelectQuery::table("collection_posts")
            .offset(5)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"collection_posts\" LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_count_ignores_pagination() {
        let (sql, params) = SelectQuery::table("collection_posts")
            .filter(Filter::Eq("status".into(), SqlValue::from("published")))
            .order_by("created_at", OrderDir::Asc)
            .limit(10)
            .offset(20)
            .build_count()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM \"collection_posts\" WHERE \"status\" = ?"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_join_query_shape() {
        let (sql, params) = JoinQuery::new(
            "junction_posts_tags",
            "collection_tags",
            "collection_id",
            SqlValue::from(9_i64),
        )
        .order_by_sort()
        .build()
        .unwrap();
        assert_eq!(
            sql,
            "SELECT t.* FROM \"junction_posts_tags\" AS j JOIN \"collection_tags\" AS t \
             ON j.\"target_id\" = t.\"id\" WHERE j.\"collection_id\" = ? ORDER BY j.\"sort\" ASC"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_bad_identifiers_are_rejected() {
        assert!(SelectQuery::table("bad table").build().is_err());
        assert!(SelectQuery::table("posts")
            .filter(Filter::Eq("bad column".into(), SqlValue::Null))
            .build()
            .is_err());
    }
}
