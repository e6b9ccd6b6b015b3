//! Sync engine integration tests against a scripted remote.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::*;
use jsonsql_cache::prelude::*;
use jsonsql_core::schema::TableMetadata;
use parking_lot::Mutex;
use serde_json::{json, Value};

fn checkpoint_log() -> (Arc<Mutex<Vec<i64>>>, ProgressCallback) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
        if let Some(id) = progress.current_id() {
            sink.lock().push(id);
        }
    });
    (log, callback)
}

#[tokio::test]
async fn test_id_range_dump() {
    let (remote, engine) = movies_setup().await;

    let progress = engine.dump(DumpConfig::new("movies"), None).await.unwrap();
    assert_eq!(progress.state, SyncState::Completed);
    assert_eq!(progress.strategy, SyncStrategy::IdRange);
    assert_eq!(progress.dumped_rows, 25);
    assert_eq!(progress.stored_rows, 25);
    assert_eq!(progress.chunks, 3);
    assert_eq!(progress.current_id(), Some(25));
    assert!(!progress.resumed);

    let requests = remote.requests();
    assert_eq!(
        requests[0].params,
        json!({"from": "movies", "data": ["*"], "order_by": ["id"], "limit": 10})
    );
    assert_eq!(requests[1].params["where"], json!({"gt": ["id", 10]}));
    assert_eq!(requests[2].params["where"], json!({"gt": ["id", 20]}));

    let store = engine.store();
    assert_eq!(local_ids(store, "movies").await, (1..=25).collect::<Vec<_>>());
    let metadata = store.sync_metadata("movies").await.unwrap().unwrap();
    assert_eq!(metadata.status, SyncState::Completed);
    assert_eq!(metadata.synced_rows, 25);
    assert_eq!((metadata.min_id, metadata.max_id), (Some(1), Some(25)));
    assert_eq!(engine.get_stats("movies").unwrap().state, SyncState::Completed);
}

#[tokio::test]
async fn test_resume_after_failure_never_regresses() {
    let (remote, engine) = movies_setup().await;
    let (log, callback) = checkpoint_log();

    remote.fail_after(2);
    let err = engine
        .dump(DumpConfig::new("movies"), Some(Arc::clone(&callback)))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Connection(_)));

    let failed = engine.get_stats("movies").unwrap();
    assert_eq!(failed.state, SyncState::Failed);
    assert!(failed.error.is_some());
    let store = engine.store();
    assert_eq!(local_ids(store, "movies").await, (1..=20).collect::<Vec<_>>());
    let metadata = store.sync_metadata("movies").await.unwrap().unwrap();
    assert_eq!(metadata.checkpoint, Some(Checkpoint::IdRange { last_id: 20 }));
    assert_eq!(metadata.status, SyncState::Failed);

    remote.heal();
    let progress = engine
        .dump(DumpConfig::new("movies"), Some(callback))
        .await
        .unwrap();
    assert!(progress.resumed);
    assert_eq!(progress.dumped_rows, 5);
    assert_eq!(progress.stored_rows, 25);
    assert_eq!(
        remote.requests().last().unwrap().params["where"],
        json!({"gt": ["id", 20]})
    );

    let seen = log.lock().clone();
    assert_eq!(seen, vec![10, 20, 25]);
    assert_eq!(local_ids(store, "movies").await, (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_offset_dump_resumes_from_offset() {
    let remote = FakeRemote::new();
    remote.add_table("movies", MOVIE_COLUMNS, movie_rows(1..=25));
    let schema = movies_schema(10)
        .with_sync_config(SyncConfig {
            chunk_size: 10,
            order_by: String::from("url"),
            ..SyncConfig::default()
        })
        .unwrap();
    let registry = Arc::new(SchemaRegistry::new());
    registry.register(schema);
    let engine = engine_with(
        Arc::clone(&remote),
        memory_store().await,
        registry,
        CacheSettings::in_memory(),
    );

    remote.fail_after(1);
    assert!(engine.dump(DumpConfig::new("movies"), None).await.is_err());
    remote.heal();

    let progress = engine.dump(DumpConfig::new("movies"), None).await.unwrap();
    assert_eq!(progress.strategy, SyncStrategy::Offset);
    assert!(progress.resumed);
    assert_eq!(progress.total_rows, Some(25));
    assert_eq!(progress.current_offset(), Some(25));
    assert_eq!(progress.percent(), Some(100.0));

    let offsets: Vec<Value> = remote
        .requests()
        .iter()
        .filter(|r| r.params["data"] == json!(["*"]))
        .map(|r| r.params.get("offset").cloned().unwrap_or(Value::Null))
        .collect();
    assert_eq!(offsets, vec![Value::Null, json!(10), json!(10), json!(20)]);
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 25);
}

/// `movies` with the remote's `rating` column added.
fn movies_with_rating() -> TableSchema {
    TableSchema::new(
        "movies",
        movies_schema(10)
            .fields()
            .cloned()
            .chain([FieldDefinition::new(3, "rating", FieldType::String)]),
    )
    .unwrap()
    .with_sync_config(movies_schema(10).sync_config)
    .unwrap()
}

#[tokio::test]
async fn test_schema_change_blocks_resume() {
    let (remote, engine) = movies_setup().await;
    remote.fail_after(1);
    assert!(engine.dump(DumpConfig::new("movies"), None).await.is_err());
    remote.heal();

    engine.registry().register(movies_with_rating());

    let err = engine.dump(DumpConfig::new("movies"), None).await.unwrap_err();
    assert!(matches!(err, SyncError::SchemaVersion { ref table, .. } if table == "movies"));
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 10);

    let progress = engine
        .dump(DumpConfig::new("movies").fresh(), None)
        .await
        .unwrap();
    assert!(!progress.resumed);
    assert_eq!(progress.stored_rows, 25);
    let records = engine
        .store()
        .execute_query("movies", "SELECT * FROM movies WHERE id = 1", &[])
        .await
        .unwrap();
    assert_eq!(
        records[0].get("rating"),
        Some(&FieldValue::String("extra1".into()))
    );
}

#[tokio::test]
async fn test_registering_changed_layout_keeps_interrupted_table() {
    let (remote, engine) = movies_setup().await;
    remote.fail_after(1);
    assert!(engine.dump(DumpConfig::new("movies"), None).await.is_err());
    remote.heal();

    let store = engine.store();
    let err = store.register_table(&movies_with_rating()).await.unwrap_err();
    assert!(matches!(err, SyncError::SchemaVersion { ref table, .. } if table == "movies"));
    assert!(matches!(
        store.attach_table(&movies_with_rating()).await,
        Err(SyncError::SchemaVersion { .. })
    ));
    assert_eq!(store.row_count("movies").await.unwrap(), 10);
    let metadata = store.sync_metadata("movies").await.unwrap().unwrap();
    assert!(metadata.is_interrupted());

    let progress = engine.dump(DumpConfig::new("movies"), None).await.unwrap();
    assert!(progress.resumed);
    assert_eq!(progress.stored_rows, 25);

    // Once the sync completed, the new layout replaces the table.
    assert!(store.register_table(&movies_with_rating()).await.unwrap());
    assert_eq!(store.row_count("movies").await.unwrap(), 0);
}

#[tokio::test]
async fn test_pause_and_resume_at_chunk_boundary() {
    let (_remote, engine) = movies_setup().await;
    let pauser = Arc::clone(&engine);
    let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
        if progress.chunks == 1 {
            assert!(pauser.pause("movies"));
        }
    });

    let runner = Arc::clone(&engine);
    let handle =
        tokio::spawn(async move { runner.dump(DumpConfig::new("movies"), Some(callback)).await });

    assert!(
        wait_until(|| {
            engine
                .get_stats("movies")
                .is_some_and(|p| p.state == SyncState::Paused)
        })
        .await
    );
    let paused = engine.get_stats("movies").unwrap();
    assert!(paused.paused);
    assert_eq!(paused.chunks, 1);
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 10);
    assert!(!engine.pause("movies"));
    assert!(engine.is_active("movies"));

    assert!(engine.resume("movies"));
    let progress = handle.await.unwrap().unwrap();
    assert_eq!(progress.state, SyncState::Completed);
    assert_eq!(progress.stored_rows, 25);
    assert!(!engine.pause("movies"));
    assert!(!engine.resume("movies"));
}

#[tokio::test]
async fn test_stop_keeps_checkpoint() {
    let (_remote, engine) = movies_setup().await;
    let stopper = Arc::clone(&engine);
    let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
        if progress.chunks == 1 {
            stopper.stop("movies");
        }
    });

    let err = engine
        .dump(DumpConfig::new("movies"), Some(callback))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled(_)));
    assert_eq!(engine.get_stats("movies").unwrap().state, SyncState::Failed);
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 10);

    let progress = engine.dump(DumpConfig::new("movies"), None).await.unwrap();
    assert!(progress.resumed);
    assert_eq!(progress.stored_rows, 25);
}

#[tokio::test]
async fn test_second_dump_of_active_table_is_rejected() {
    let (_remote, engine) = movies_setup().await;
    let pauser = Arc::clone(&engine);
    let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
        if progress.chunks == 1 {
            pauser.pause("movies");
        }
    });
    let runner = Arc::clone(&engine);
    let handle =
        tokio::spawn(async move { runner.dump(DumpConfig::new("movies"), Some(callback)).await });
    assert!(wait_until(|| engine.get_stats("movies").is_some_and(|p| p.paused)).await);

    let err = engine.dump(DumpConfig::new("movies"), None).await.unwrap_err();
    assert!(matches!(err, SyncError::SyncInProgress(_)));

    assert!(engine.stop("movies"));
    assert!(matches!(
        handle.await.unwrap(),
        Err(SyncError::Cancelled(_))
    ));
    assert!(!engine.is_active("movies"));
}

#[tokio::test]
async fn test_callback_panic_does_not_abort_sync() {
    let (_remote, engine) = movies_setup().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let callback: ProgressCallback = Arc::new(move |_: &SyncProgress| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("observer failure");
    });

    let progress = engine
        .dump(DumpConfig::new("movies"), Some(callback))
        .await
        .unwrap();
    assert_eq!(progress.state, SyncState::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dump_many_isolates_failures() {
    let remote = FakeRemote::new();
    remote.add_table("movies", MOVIE_COLUMNS, movie_rows(1..=25));
    remote.add_table("series", MOVIE_COLUMNS, movie_rows(100..=104));
    remote.set_delay(std::time::Duration::from_millis(5));

    let registry = Arc::new(SchemaRegistry::new());
    registry.register(movies_schema(10));
    for name in ["series", "actors"] {
        let schema = TableSchema::new(name, movies_schema(10).fields().cloned())
            .unwrap()
            .with_sync_config(movies_schema(10).sync_config)
            .unwrap();
        registry.register(schema);
    }
    let engine = engine_with(
        Arc::clone(&remote),
        memory_store().await,
        registry,
        CacheSettings::in_memory(),
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |progress: &SyncProgress| {
        sink.lock().push(progress.table_name.clone());
    });

    let configs = ["movies", "actors", "ghost", "series"]
        .into_iter()
        .map(DumpConfig::new)
        .collect();
    let results = engine.dump_many(configs, Some(2), Some(callback)).await;

    let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["movies", "actors", "ghost", "series"]);
    assert_eq!(results[0].1.as_ref().unwrap().stored_rows, 25);
    assert!(matches!(results[1].1, Err(SyncError::Connection(_))));
    assert!(matches!(results[2].1, Err(SyncError::TableNotFound(_))));
    assert_eq!(results[3].1.as_ref().unwrap().stored_rows, 5);
    assert!(remote.max_in_flight() <= 2);

    let seen = seen.lock().clone();
    assert_eq!(seen.iter().filter(|t| *t == "movies").count(), 3);
    assert_eq!(seen.iter().filter(|t| *t == "series").count(), 1);
    assert_eq!(engine.get_stats("actors").unwrap().state, SyncState::Failed);

    let stats = engine.store().get_stats().await.unwrap();
    assert_eq!(stats.successful_syncs, 2);
    assert_eq!(stats.failed_syncs, 1);
    assert_eq!(stats.total_rows_synced, 30);
}

#[tokio::test]
async fn test_dump_many_timeout_cancels_table() {
    let (remote, engine) = movies_setup().await;
    remote.set_delay(std::time::Duration::from_millis(1500));
    let engine = engine_with(
        Arc::clone(&remote),
        Arc::clone(engine.store()),
        Arc::clone(engine.registry()),
        CacheSettings {
            sync_run_timeout_secs: Some(1),
            ..CacheSettings::in_memory()
        },
    );

    let results = engine
        .dump_many(vec![DumpConfig::new("movies")], None, None)
        .await;
    assert!(matches!(results[0].1, Err(SyncError::Cancelled(_))));
    let progress = engine.get_stats("movies").unwrap();
    assert_eq!(progress.state, SyncState::Failed);
    assert!(!engine.is_active("movies"));

    let metadata = engine.store().sync_metadata("movies").await.unwrap().unwrap();
    assert_eq!(metadata.status, SyncState::Failed);
    assert!(metadata.last_error.unwrap().contains("cancelled"));
    let stats = engine.store().get_stats().await.unwrap();
    assert_eq!(stats.failed_syncs, 1);
    assert_eq!(stats.successful_syncs, 0);
}

#[tokio::test]
async fn test_full_strategy_replaces_contents() {
    let (remote, engine) = movies_setup().await;
    let full = DumpConfig::new("movies").with_strategy(SyncStrategy::Full);

    let progress = engine.dump(full.clone(), None).await.unwrap();
    assert_eq!(progress.chunks, 1);
    assert_eq!(progress.stored_rows, 25);
    assert!(remote.requests()[0].params.get("limit").is_none());

    remote.add_table("movies", MOVIE_COLUMNS, movie_rows(3..=5));
    let progress = engine.dump(full, None).await.unwrap();
    assert_eq!(progress.stored_rows, 3);
    assert_eq!(local_ids(engine.store(), "movies").await, vec![3, 4, 5]);
}

#[tokio::test]
async fn test_chunked_rerun_is_partial_until_complete_full_is_atomic() {
    let (remote, engine) = movies_setup().await;
    engine.dump(DumpConfig::new("movies"), None).await.unwrap();

    remote.fail_after(1);
    assert!(engine.dump(DumpConfig::new("movies"), None).await.is_err());
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 10);

    remote.heal();
    let full = DumpConfig::new("movies").with_strategy(SyncStrategy::Full);
    engine.dump(full.clone(), None).await.unwrap();
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 25);

    remote.fail_after(0);
    assert!(engine.dump(full, None).await.is_err());
    assert_eq!(engine.store().row_count("movies").await.unwrap(), 25);
}

#[tokio::test]
async fn test_filter_and_limit() {
    let (remote, engine) = movies_setup().await;
    let config = DumpConfig::new("movies").with_sync_config(SyncConfig {
        chunk_size: 4,
        limit: Some(6),
        where_clause: Some(String::from("id > 5")),
        ..SyncConfig::default()
    });

    let progress = engine.dump(config, None).await.unwrap();
    assert_eq!(progress.stored_rows, 6);
    assert_eq!(local_ids(engine.store(), "movies").await, (6..=11).collect::<Vec<_>>());

    let requests = remote.requests();
    assert_eq!(requests[0].params["where"], json!({"gt": ["id", 5]}));
    assert_eq!(requests[0].params["limit"], json!(4));
    assert_eq!(
        requests[1].params["where"],
        json!({"and": [{"gt": ["id", 5]}, {"gt": ["id", 9]}]})
    );
    assert_eq!(requests[1].params["limit"], json!(2));
}

#[tokio::test]
async fn test_incremental_sync_continues_from_last_value() {
    let remote = FakeRemote::new();
    let events = |ids: std::ops::RangeInclusive<i64>| -> Vec<Vec<Value>> {
        ids.map(|id| vec![json!(id), json!("click"), json!(id * 10)])
            .collect()
    };
    remote.add_table("events", &["id", "kind", "seq"], events(1..=10));

    let schema = TableSchema::new(
        "events",
        [
            FieldDefinition::new(0, "id", FieldType::Integer),
            FieldDefinition::new(2, "seq", FieldType::Integer),
        ],
    )
    .unwrap()
    .with_sync_config(SyncConfig {
        chunk_size: 4,
        incremental_mode: true,
        incremental_field: Some(String::from("seq")),
        ..SyncConfig::default()
    })
    .unwrap();
    let registry = Arc::new(SchemaRegistry::new());
    registry.register(schema);
    let engine = engine_with(
        Arc::clone(&remote),
        memory_store().await,
        registry,
        CacheSettings::in_memory(),
    );

    let first = engine.dump(DumpConfig::new("events"), None).await.unwrap();
    assert_eq!(first.strategy, SyncStrategy::Incremental);
    assert_eq!(first.chunks, 3);
    assert_eq!(first.checkpoint, Some(Checkpoint::Incremental { value: json!(100) }));

    remote.push_rows("events", events(11..=13));
    let second = engine.dump(DumpConfig::new("events"), None).await.unwrap();
    assert!(second.resumed);
    assert_eq!(second.dumped_rows, 3);
    assert_eq!(second.stored_rows, 13);
    assert_eq!(second.checkpoint, Some(Checkpoint::Incremental { value: json!(130) }));
    assert_eq!(
        remote.requests().last().unwrap().params["where"],
        json!({"gt": ["seq", 100]})
    );
}

#[tokio::test]
async fn test_ensure_fresh_honors_ttl() {
    let (remote, engine) = movies_setup().await;
    let config = DumpConfig::new("movies").with_sync_config(SyncConfig {
        chunk_size: 10,
        ttl: 3600,
        ..SyncConfig::default()
    });

    assert!(engine.ensure_fresh(config.clone()).await.unwrap().is_some());
    let fetched = remote.chunk_requests();
    assert!(engine.ensure_fresh(config).await.unwrap().is_none());
    assert_eq!(remote.chunk_requests(), fetched);
    assert!(engine.store().is_fresh("movies", 0).await.unwrap());
}

#[tokio::test]
async fn test_refresh_metadata() {
    let (_remote, engine) = movies_setup().await;
    let metadata = engine.refresh_metadata("movies").await.unwrap();
    assert_eq!(
        metadata,
        TableMetadata {
            row_count: Some(25),
            min_id: Some(1),
            max_id: Some(25),
        }
    );
    assert_eq!(engine.registry().get("movies").unwrap().metadata, Some(metadata));
    assert!(matches!(
        engine.refresh_metadata("ghost").await,
        Err(SyncError::TableNotFound(_))
    ));
}

#[tokio::test]
async fn test_disabled_table_is_rejected() {
    let (_remote, engine) = movies_setup().await;
    let config = DumpConfig::new("movies").with_sync_config(SyncConfig {
        disabled: true,
        ..SyncConfig::default()
    });
    assert!(matches!(
        engine.dump(config, None).await,
        Err(SyncError::Configuration(_))
    ));
    assert!(engine.get_stats("movies").is_none());
}
