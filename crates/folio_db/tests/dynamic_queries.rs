//! Facade tests against real SQLite databases, in-memory and file-backed.

use folio_db::{ContentDb, DbError, Filter, JoinQuery, OrderDir, SelectQuery, SqlValue};
use serde_json::json;

async fn exec(db: &ContentDb, sql: &str) {
    sqlx::query(sql).execute(db.pool()).await.unwrap();
}

async fn posts_db() -> ContentDb {
    let db = ContentDb::in_memory().await.unwrap();
    exec(
        &db,
        "CREATE TABLE collection_posts (id INTEGER PRIMARY KEY, slug TEXT, status TEXT, \
         parent_id INTEGER, score REAL)",
    )
    .await;
    exec(
        &db,
        "INSERT INTO collection_posts (id, slug, status, parent_id, score) VALUES \
         (1, 'alpha', 'published', NULL, 1.5), \
         (2, 'beta', 'draft', NULL, 3.0), \
         (3, 'gamma', 'published', 1, 2.25), \
         (4, 'delta', 'published', 1, 0.5)",
    )
    .await;
    db
}

#[tokio::test]
async fn test_filters_compose_conjunctively() {
    let db = posts_db().await;

    let rows = db
        .select(
            &SelectQuery::table("collection_posts")
                .filter(Filter::Eq("status".into(), SqlValue::from("published")))
                .filter(Filter::In(
                    "id".into(),
                    vec![SqlValue::from(1), SqlValue::from(2), SqlValue::from(3)],
                ))
                .order_by("id", OrderDir::Desc),
        )
        .await
        .unwrap();

    let slugs: Vec<String> = rows
        .iter()
        .map(|r| r.get_by_name::<String>("slug").unwrap())
        .collect();
    assert_eq!(slugs, vec!["gamma", "alpha"]);
}

#[tokio::test]
async fn test_null_aware_filters() {
    let db = posts_db().await;

    let roots = db
        .select(&SelectQuery::table("collection_posts").filter(Filter::IsNull("parent_id".into())))
        .await
        .unwrap();
    assert_eq!(roots.len(), 2);

    // Eq with a null value rewrites to IS NULL instead of binding.
    let eq_null = db
        .select(
            &SelectQuery::table("collection_posts")
                .filter(Filter::Eq("parent_id".into(), SqlValue::Null)),
        )
        .await
        .unwrap();
    assert_eq!(eq_null.len(), 2);

    let children = db
        .select(
            &SelectQuery::table("collection_posts")
                .filter(Filter::Ne("parent_id".into(), SqlValue::Null)),
        )
        .await
        .unwrap();
    assert_eq!(children.len(), 2);
}

#[tokio::test]
async fn test_empty_in_matches_no_rows() {
    let db = posts_db().await;

    let rows = db
        .select(&SelectQuery::table("collection_posts").filter(Filter::In("id".into(), vec![])))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let total = db
        .count(&SelectQuery::table("collection_posts").filter(Filter::In("id".into(), vec![])))
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_count_sees_past_pagination() {
    let db = posts_db().await;

    let query = SelectQuery::table("collection_posts")
        .order_by("id", OrderDir::Asc)
        .limit(2)
        .offset(1);

    let rows = db.select(&query).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_by_name::<i64>("id").unwrap(), 2);

    let total = db.count(&query).await.unwrap();
    assert_eq!(total, 4);
}

#[tokio::test]
async fn test_eq_or_unset_tolerates_legacy_rows() {
    let db = ContentDb::in_memory().await.unwrap();
    exec(
        &db,
        "CREATE TABLE collection_posts_gallery (id INTEGER PRIMARY KEY, owner_kind TEXT)",
    )
    .await;
    exec(
        &db,
        "INSERT INTO collection_posts_gallery (id, owner_kind) VALUES \
         (1, 'collection'), (2, NULL), (3, ''), (4, 'global')",
    )
    .await;

    let rows = db
        .select(
            &SelectQuery::table("collection_posts_gallery")
                .filter(Filter::EqOrUnset(
                    "owner_kind".into(),
                    SqlValue::from("collection"),
                ))
                .order_by("id", OrderDir::Asc),
        )
        .await
        .unwrap();

    let ids: Vec<i64> = rows
        .iter()
        .map(|r| r.get_by_name::<i64>("id").unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_junction_join_ordered_and_inner() {
    let db = ContentDb::in_memory().await.unwrap();
    exec(
        &db,
        "CREATE TABLE junction_posts_tags (id INTEGER PRIMARY KEY, collection_id INTEGER, \
         target_id INTEGER, sort INTEGER)",
    )
    .await;
    exec(
        &db,
        "CREATE TABLE collection_tags (id INTEGER PRIMARY KEY, name TEXT)",
    )
    .await;
    exec(
        &db,
        "INSERT INTO collection_tags (id, name) VALUES (10, 'rust'), (11, 'sql')",
    )
    .await;
    // Out-of-order sorts plus one dangling target.
    exec(
        &db,
        "INSERT INTO junction_posts_tags (collection_id, target_id, sort) VALUES \
         (1, 11, 1), (1, 10, 0), (1, 99, 2), (2, 10, 0)",
    )
    .await;

    let join = JoinQuery::new(
        "junction_posts_tags",
        "collection_tags",
        "collection_id",
        SqlValue::from(1),
    )
    .order_by_sort();

    let rows = db.select_joined(&join).await.unwrap();
    let names: Vec<String> = rows
        .iter()
        .map(|r| r.get_by_name::<String>("name").unwrap())
        .collect();
    assert_eq!(names, vec!["rust", "sql"]);
}

#[tokio::test]
async fn test_probes() {
    let db = posts_db().await;

    assert!(db.table_exists("collection_posts").await.unwrap());
    assert!(!db.table_exists("collection_pages").await.unwrap());

    let columns = db.table_columns("collection_posts").await.unwrap();
    assert!(columns.contains(&"slug".to_string()));
    assert!(columns.contains(&"parent_id".to_string()));

    let none = db.table_columns("collection_pages").await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_bad_identifier_never_reaches_sql() {
    let db = posts_db().await;

    let result = db
        .select(&SelectQuery::table("collection_posts; DROP TABLE collection_posts"))
        .await;
    assert!(matches!(result, Err(DbError::BadIdentifier(_))));

    // The probe interface treats the same input as a plain missing table.
    assert!(db.table_exists("collection_posts").await.unwrap());
}

#[tokio::test]
async fn test_row_values_survive_json_conversion() {
    let db = posts_db().await;

    let row = db
        .select_one(
            &SelectQuery::table("collection_posts")
                .filter(Filter::Eq("id".into(), SqlValue::from(3))),
        )
        .await
        .unwrap()
        .unwrap();

    let obj = row.into_json();
    assert_eq!(obj["id"], json!(3));
    assert_eq!(obj["slug"], json!("gamma"));
    assert_eq!(obj["parent_id"], json!(1));
    assert_eq!(obj["score"], json!(2.25));
}

#[tokio::test]
async fn test_file_backed_open_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("content.sqlite3");

    {
        let db = ContentDb::open(&path).await.unwrap();
        assert!(path.exists());
        exec(&db, "CREATE TABLE collection_posts (id INTEGER PRIMARY KEY, slug TEXT)").await;
        exec(&db, "INSERT INTO collection_posts (id, slug) VALUES (1, 'kept')").await;
        db.close().await;
    }

    let db = ContentDb::open_existing(&path).await.unwrap();
    let row = db
        .select_one(&SelectQuery::table("collection_posts"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_by_name::<String>("slug").unwrap(), "kept");

    let missing = ContentDb::open_existing(dir.path().join("absent.sqlite3")).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));
}
