/// Change-log emission tests
///
/// Which mutations produce exactly one change-log event and which are
/// suppressed as no-op refreshes.
/// Run with: cargo test --test emission_tests


use aspectdb::EntityServiceConfig;
use aspectdb::model::{AspectsBatch, ChangeItem, ChangeType, SystemMetadata};
use aspectdb::registry::AspectSpec;
use aspectdb::telemetry::{CHANGE_LOG_EMITTED, CHANGE_LOG_PUBLISH_FAILED, CHANGE_LOG_SUPPRESSED};
use serde_json::{Value, json};
use service_utils::{Harness, RecordingProducer, harness, harness_with, run_metadata, stamp, urn};

const DATASET: &str = "urn:li:dataset:(urn:li:dataPlatform:hive,db.orders,PROD)";

async fn write(h: &Harness, aspect: &str, record: Value, run_id: &str, time: i64) {
    h.service
        .ingest_aspects(
            AspectsBatch::new(vec![
                ChangeItem::upsert(urn(DATASET), aspect, record, stamp(time))
                    .with_system_metadata(run_metadata(run_id, time)),
            ]),
            true,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_no_op_refresh_is_suppressed() {
    let h = harness();
    write(&h, "status", json!({"removed": false}), "run-1", 1_000).await;
    write(&h, "status", json!({"removed": false}), "run-2", 2_000).await;

    assert_eq!(h.producer.calls(), 1);
    assert_eq!(h.counter(CHANGE_LOG_EMITTED), 1);
    assert_eq!(h.counter(CHANGE_LOG_SUPPRESSED), 1);
}

#[tokio::test]
async fn test_always_emit_override_forces_emission() {
    let h = harness_with(
        EntityServiceConfig::default().always_emit_change_log(true),
        RecordingProducer::new(),
    );
    write(&h, "status", json!({"removed": false}), "run-1", 1_000).await;
    write(&h, "status", json!({"removed": false}), "run-2", 2_000).await;

    assert_eq!(h.producer.calls(), 2);
    assert_eq!(h.counter(CHANGE_LOG_SUPPRESSED), 0);
}

#[tokio::test]
async fn test_lineage_aspects_always_emit() {
    let h = harness();
    let lineage = json!({"upstreams": [{"dataset": "urn:li:dataset:(urn:li:dataPlatform:hive,db.raw,PROD)"}]});
    write(&h, "upstreamLineage", lineage.clone(), "run-1", 1_000).await;
    write(&h, "upstreamLineage", lineage, "run-2", 2_000).await;

    assert_eq!(h.producer.calls(), 2);
    let events = h.producer.events();
    assert!(events[1].system_metadata.is_no_op());
    assert_eq!(events[1].aspect, events[1].previous_aspect_value);
}

#[tokio::test]
async fn test_changed_content_emits_exactly_once() {
    let h = harness();
    write(&h, "status", json!({"removed": false}), "run-1", 1_000).await;
    write(&h, "status", json!({"removed": true}), "run-2", 2_000).await;

    let events = h.producer.events();
    assert_eq!(events.len(), 2);
    let update = &events[1];
    assert_eq!(update.change_type, ChangeType::Upsert);
    assert_eq!(update.entity_type, "dataset");
    assert_eq!(update.aspect, Some(json!({"removed": true})));
    assert_eq!(update.previous_aspect_value, Some(json!({"removed": false})));
    assert_eq!(
        update.previous_system_metadata.as_ref().and_then(|m| m.run_id.as_deref()),
        Some("run-1")
    );
}

#[tokio::test]
async fn test_conditional_emission_returns_joinable_handle() {
    let h = harness();
    let spec = AspectSpec::new("status");
    let same = json!({"removed": false});
    let mut no_op = SystemMetadata::create_default();
    no_op.set_no_op(true);

    let suppressed = h.service.conditionally_produce_change_log(
        Some(&same),
        None,
        Some(&same),
        &no_op,
        ChangeType::Upsert,
        &urn(DATASET),
        &stamp(1_000),
        &spec,
    );
    assert!(suppressed.is_none());
    assert_eq!(h.producer.calls(), 0);

    let emitted = h.service.conditionally_produce_change_log(
        None,
        None,
        Some(&same),
        &SystemMetadata::create_default(),
        ChangeType::Upsert,
        &urn(DATASET),
        &stamp(1_000),
        &spec,
    );
    // The producer is called before the handle is returned.
    assert_eq!(h.producer.calls(), 1);
    emitted.unwrap().join().await.unwrap();
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_the_write() {
    let h = harness_with(
        EntityServiceConfig::default(),
        RecordingProducer::failing_for(|_| true),
    );
    let results = h
        .service
        .ingest_aspects(
            AspectsBatch::new(vec![ChangeItem::upsert(
                urn(DATASET),
                "status",
                json!({"removed": false}),
                stamp(1_000),
            )]),
            true,
        )
        .await
        .unwrap();

    assert!(results[0].sql_committed);
    assert!(!results[0].published_mcl);
    assert!(h.dao.latest(DATASET, "status").await.is_some());
    assert_eq!(h.counter(CHANGE_LOG_PUBLISH_FAILED), 1);
}

#[test]
fn test_emission_outside_a_runtime_reports_instead_of_panicking() {
    let h = harness();
    let handle = h
        .service
        .conditionally_produce_change_log(
            None,
            None,
            Some(&json!({"removed": false})),
            &SystemMetadata::create_default(),
            ChangeType::Upsert,
            &urn(DATASET),
            &stamp(1_000),
            &AspectSpec::new("status"),
        )
        .unwrap();

    assert_eq!(h.producer.calls(), 1);
    assert!(handle.is_finished());
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    assert!(runtime.block_on(handle.join()).is_err());
}
