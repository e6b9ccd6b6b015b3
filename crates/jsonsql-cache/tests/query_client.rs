//! Direct query path tests.

mod common;

use common::*;
use jsonsql_cache::prelude::*;
use serde_json::json;

fn client(remote: Arc<FakeRemote>, auto_order_by: bool) -> QueryClient {
    let registry = Arc::new(SchemaRegistry::new());
    registry.register(movies_schema(10));
    let settings = CacheSettings {
        auto_order_by,
        ..CacheSettings::in_memory()
    };
    QueryClient::new(remote, registry, &settings)
}

#[tokio::test]
async fn test_select_star_is_projected_through_schema() {
    let remote = FakeRemote::new();
    remote.add_table("movies", MOVIE_COLUMNS, movie_rows(1..=3));
    let client = client(Arc::clone(&remote), true);

    let output = client.query("SELECT * FROM movies LIMIT 2").await.unwrap();
    assert_eq!(
        output.request.params,
        json!({"from": "movies", "data": ["*"], "order_by": ["id"], "limit": 2})
    );
    assert_eq!(output.rows.len(), 2);
    assert_eq!(output.rows[0].len(), 5);

    let records = output.records.unwrap();
    assert_eq!(records[1].names().collect::<Vec<_>>(), vec!["id", "title", "url"]);
    assert_eq!(records[1].get("id"), Some(&FieldValue::Integer(2)));
}

#[tokio::test]
async fn test_named_columns_map_by_name() {
    let remote = FakeRemote::new();
    remote.add_table("movies", MOVIE_COLUMNS, movie_rows(1..=3));
    let client = client(Arc::clone(&remote), false);

    let output = client
        .query("SELECT movies.id, title FROM movies WHERE id >= 2")
        .await
        .unwrap();
    assert!(output.request.params.get("order_by").is_none());
    assert_eq!(
        output.rows,
        vec![vec![json!(2), json!("Movie 2")], vec![json!(3), json!("Movie 3")]]
    );
    let records = output.records.unwrap();
    assert_eq!(records[0].names().collect::<Vec<_>>(), vec!["id", "title"]);
    assert_eq!(records[1].get("id"), Some(&FieldValue::Integer(3)));

    let raw = client
        .execute_sql("SELECT * FROM movies WHERE id = 3")
        .await
        .unwrap();
    assert_eq!(raw, movie_rows(3..=3));
}

#[tokio::test]
async fn test_transpile_errors_surface() {
    let client = client(FakeRemote::new(), true);
    assert!(matches!(
        client.query("SELECT FROM").await,
        Err(SyncError::Transpile(_))
    ));
    assert!(matches!(
        client.query("SELECT * FROM ghost").await,
        Err(SyncError::Connection(_))
    ));
}
