/// Ingestion pipeline tests
///
/// Batches, change types, duplicate keys, conflict retries and the async entry point.
/// Run with: cargo test --test ingest_tests


use aspectdb::model::{AspectsBatch, ChangeItem, ChangeType, SystemAspect};
use aspectdb::telemetry::{BATCH_WITH_DUPLICATE, TRANSACTION_RETRY};
use aspectdb::{EntityServiceConfig, StoreError};
use serde_json::json;
use service_utils::{RecordingProducer, harness, harness_with, run_metadata, stamp, urn};

const USER: &str = "urn:li:corpuser:ingest";
const OTHER: &str = "urn:li:corpuser:other";
const DATASET: &str = "urn:li:dataset:(urn:li:dataPlatform:hive,db.users,PROD)";

fn status(removed: bool) -> serde_json::Value {
    json!({"removed": removed})
}

#[tokio::test]
async fn test_duplicate_keys_are_metered_once_and_applied_in_order() {
    let h = harness();
    let batch = AspectsBatch::new(vec![
        ChangeItem::upsert(urn(USER), "status", status(false), stamp(1_000)),
        ChangeItem::upsert(urn(OTHER), "status", status(false), stamp(1_000)),
        ChangeItem::upsert(urn(USER), "status", status(true), stamp(1_000)),
        ChangeItem::upsert(urn(USER), "status", status(false), stamp(1_000)),
    ]);

    let results = h.service.ingest_aspects(batch, true).await.unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(h.counter(BATCH_WITH_DUPLICATE), 1);
    assert!(!results[0].is_update);
    assert!(results[2].is_update);

    let history = h.dao.history(USER, "status").await;
    assert_eq!(history.len(), 3);
    let latest = SystemAspect::from_row(history.last().unwrap()).unwrap();
    assert_eq!(latest.record, status(false));
    assert_eq!(latest.system_metadata_version(), Some(3));
}

#[tokio::test]
async fn test_conflicts_below_the_limit_are_retried() {
    let h = harness();
    h.dao.inject_commit_conflicts(2);

    let results = h
        .service
        .ingest_aspects(
            AspectsBatch::new(vec![ChangeItem::upsert(
                urn(USER),
                "status",
                status(false),
                stamp(1_000),
            )]),
            true,
        )
        .await
        .unwrap();

    assert!(results[0].sql_committed);
    assert_eq!(h.counter(TRANSACTION_RETRY), 2);
    assert_eq!(h.dao.history(USER, "status").await.len(), 1);
    assert_eq!(h.dao.active_transactions().await, 0);
}

#[tokio::test]
async fn test_exhausted_retries_write_nothing() {
    let h = harness();
    h.dao.inject_commit_conflicts(3);

    let err = h
        .service
        .ingest_aspects(
            AspectsBatch::new(vec![
                ChangeItem::upsert(urn(USER), "status", status(false), stamp(1_000)),
                ChangeItem::upsert(urn(OTHER), "status", status(false), stamp(1_000)),
            ]),
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(h.dao.row_count().await, 0);
    assert_eq!(h.producer.calls(), 0);
    assert_eq!(h.dao.active_transactions().await, 0);
}

#[tokio::test]
async fn test_patch_merges_into_stored_content() {
    let h = harness();
    let info = json!({"email": "a@corp.io", "active": true, "title": "analyst"});
    h.service
        .ingest_aspects(
            AspectsBatch::new(vec![ChangeItem::upsert(urn(USER), "corpUserInfo", info, stamp(1_000))]),
            true,
        )
        .await
        .unwrap();

    let patch = json!({"active": false, "title": null, "team": "data"});
    let results = h
        .service
        .ingest_aspects(
            AspectsBatch::new(vec![ChangeItem::patch(urn(USER), "corpUserInfo", patch, stamp(2_000))]),
            true,
        )
        .await
        .unwrap();

    let expected = json!({"email": "a@corp.io", "active": false, "team": "data"});
    assert_eq!(results[0].update.as_ref().unwrap().new_value, Some(expected.clone()));
    let stored = SystemAspect::from_row(&h.dao.latest(USER, "corpUserInfo").await.unwrap()).unwrap();
    assert_eq!(stored.record, expected);
    assert_eq!(h.producer.events()[1].change_type, ChangeType::Patch);
}

#[tokio::test]
async fn test_delete_restores_previous_row_and_announces_it() {
    let h = harness();
    for removed in [false, true] {
        h.service
            .ingest_aspects(
                AspectsBatch::new(vec![ChangeItem::upsert(
                    urn(USER),
                    "status",
                    status(removed),
                    stamp(1_000),
                )]),
                true,
            )
            .await
            .unwrap();
    }

    let delete = || {
        AspectsBatch::new(vec![ChangeItem::delete(urn(USER), "status", stamp(3_000))])
    };

    h.service.ingest_aspects(delete(), true).await.unwrap();
    let restored = SystemAspect::from_row(&h.dao.latest(USER, "status").await.unwrap()).unwrap();
    assert_eq!(restored.record, status(false));
    let event = h.producer.events().pop().unwrap();
    assert_eq!(event.change_type, ChangeType::Upsert);
    assert_eq!(event.aspect, Some(status(false)));
    assert_eq!(event.previous_aspect_value, Some(status(true)));

    h.service.ingest_aspects(delete(), true).await.unwrap();
    assert!(h.dao.latest(USER, "status").await.is_none());
    let event = h.producer.events().pop().unwrap();
    assert_eq!(event.change_type, ChangeType::Delete);
    assert_eq!(event.aspect, None);
    assert_eq!(event.previous_aspect_value, Some(status(false)));

    let calls = h.producer.calls();
    let results = h.service.ingest_aspects(delete(), true).await.unwrap();
    assert!(results[0].update.as_ref().unwrap().no_op);
    assert_eq!(h.producer.calls(), calls);
}

#[tokio::test]
async fn test_create_requires_absent_aspect() {
    let h = harness();
    let create = |aspect: &str, change_type: ChangeType| {
        AspectsBatch::new(vec![
            ChangeItem::upsert(urn(USER), aspect, json!({"username": "ingest"}), stamp(1_000))
                .with_change_type(change_type),
        ])
    };

    h.service
        .ingest_aspects(create("corpUserKey", ChangeType::CreateEntity), true)
        .await
        .unwrap();

    let err = h
        .service
        .ingest_aspects(create("corpUserKey", ChangeType::Create), true)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PreconditionFailed(_)));

    // Entity already exists through its key aspect.
    let err = h
        .service
        .ingest_aspects(
            AspectsBatch::new(vec![
                ChangeItem::upsert(urn(USER), "corpUserInfo", json!({"email": "x"}), stamp(1_000))
                    .with_change_type(ChangeType::CreateEntity),
            ]),
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PreconditionFailed(_)));
    assert!(h.dao.latest(USER, "corpUserInfo").await.is_none());
}

#[tokio::test]
async fn test_unknown_aspects_are_rejected() {
    let h = harness();
    let err = h
        .service
        .ingest_proposal_sync(AspectsBatch::new(vec![ChangeItem::upsert(
            urn(USER),
            "notAnAspect",
            json!({}),
            stamp(1_000),
        )]))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::UnknownAspect { .. }));
    assert_eq!(h.dao.row_count().await, 0);
}

#[tokio::test]
async fn test_mixed_batch_keeps_submission_order() {
    let h = harness();
    let batch = AspectsBatch::new(vec![
        ChangeItem::upsert(urn(DATASET), "status", status(false), stamp(1_000)),
        ChangeItem::upsert(urn(DATASET), "datasetProfile", json!({"rowCount": 42}), stamp(1_000)),
        ChangeItem::upsert(urn(DATASET), "ownership", json!({"owners": []}), stamp(1_000)),
    ]);

    let results = h.service.ingest_proposal_sync(batch).await.unwrap();

    let aspects = results.iter().map(|r| r.aspect_name.as_str()).collect::<Vec<_>>();
    assert_eq!(aspects, vec!["status", "datasetProfile", "ownership"]);
    assert!(results[0].sql_committed && results[0].published_mcl);
    assert!(!results[1].sql_committed && results[1].update.is_none());
    assert!(results[1].published_mcl);
    assert!(results[2].sql_committed);
    assert!(h.dao.latest(DATASET, "datasetProfile").await.is_none());
    assert_eq!(h.producer.calls(), 3);
}

#[tokio::test]
async fn test_async_entry_point_returns_a_handle() {
    let h = harness();
    let handle = h.service.ingest_proposal_async(AspectsBatch::new(vec![
        ChangeItem::upsert(urn(USER), "status", status(false), stamp(1_000))
            .with_system_metadata(run_metadata("run-async", 1_000)),
    ]));

    let results = handle.join().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].sql_committed);

    let stored = SystemAspect::from_row(&h.dao.latest(USER, "status").await.unwrap()).unwrap();
    assert_eq!(stored.system_metadata.run_id.as_deref(), Some("run-async"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_get_monotonic_versions() {
    let h = harness_with(
        EntityServiceConfig::default()
            .max_transaction_attempts(100)
            .retry_backoff_ms(1, 4),
        RecordingProducer::new(),
    );

    let writers = (0..8)
        .map(|n| {
            let service = h.service.clone();
            tokio::spawn(async move {
                service
                    .ingest_aspects(
                        AspectsBatch::new(vec![ChangeItem::upsert(
                            urn(USER),
                            "corpUserInfo",
                            json!({"email": format!("user{}@corp.io", n)}),
                            stamp(1_000 + n),
                        )]),
                        false,
                    )
                    .await
            })
        })
        .collect::<Vec<_>>();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let versions = h
        .dao
        .history(USER, "corpUserInfo")
        .await
        .iter()
        .map(|row| SystemAspect::from_row(row).unwrap().system_metadata_version().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(versions, (1..=8).collect::<Vec<i64>>());
}
