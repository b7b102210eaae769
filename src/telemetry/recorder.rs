//! Forwards store metrics to the process-wide `metrics` recorder.

use super::{
    BATCH_WITH_DUPLICATE, CHANGE_LOG_EMITTED, CHANGE_LOG_PUBLISH_FAILED, CHANGE_LOG_SUPPRESSED,
    DELETE_NONEXISTING, ENTITY_SERVICE_SCOPE, INGEST_LATENCY_MS, MetricUtils, MetricsSink,
    RESTORE_PARTITION_FAILED, RESTORE_PARTITIONS_COMPLETED, RESTORE_ROW_FAILED,
    RESTORE_SEND_MESSAGE_MS, ROLLBACK_CONDITION_MISMATCH, TRANSACTION_RETRY,
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Sink backed by the `metrics` facade macros.
///
/// Without an installed recorder the macros are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn increment_counter(&self, name: &str, value: u64) {
        counter!(name.to_string()).increment(value);
    }

    fn record_histogram(&self, name: &str, value: f64) {
        histogram!(name.to_string()).record(value);
    }

    fn set_gauge(&self, name: &str, value: f64) {
        gauge!(name.to_string()).set(value);
    }
}

/// Registers descriptions of the entity service metrics.
///
/// Call once at startup after installing the metrics recorder.
pub fn register_metrics() {
    let describe = |metric: &str, help: &'static str| {
        describe_counter!(MetricUtils::name(&[ENTITY_SERVICE_SCOPE, metric]), help);
    };

    describe(BATCH_WITH_DUPLICATE, "Ingest calls whose batch repeated an (urn, aspect) key");
    describe(DELETE_NONEXISTING, "Rollback deletes of rows that were already gone");
    describe(TRANSACTION_RETRY, "Transaction attempts retried after a write conflict");
    describe(RESTORE_ROW_FAILED, "Historical rows skipped during restore");
    describe(RESTORE_PARTITION_FAILED, "Restore partitions that produced no result");
    describe(CHANGE_LOG_SUPPRESSED, "No-op mutations that emitted no change log");
    describe(CHANGE_LOG_EMITTED, "Change-log events handed to the producer");
    describe(CHANGE_LOG_PUBLISH_FAILED, "Change-log publishes that failed");
    describe(ROLLBACK_CONDITION_MISMATCH, "Rollback deletes skipped by a condition mismatch");

    describe_histogram!(
        MetricUtils::name(&[ENTITY_SERVICE_SCOPE, INGEST_LATENCY_MS]),
        "Time spent in the ingest transaction, retries included"
    );
    describe_histogram!(
        MetricUtils::name(&[ENTITY_SERVICE_SCOPE, RESTORE_SEND_MESSAGE_MS]),
        "Time spent publishing one restore partition"
    );
    describe_gauge!(
        MetricUtils::name(&[ENTITY_SERVICE_SCOPE, RESTORE_PARTITIONS_COMPLETED]),
        "Partitions replayed by the running restore"
    );
}
