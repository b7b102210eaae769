// ============================================================================
// Telemetry
// ============================================================================
//
// Fire-and-forget counters, histograms and gauges. The store talks to a
// `MetricUtils` facade; when no sink is installed every call is a no-op.
//
// ============================================================================

pub mod memory;
pub mod recorder;

pub use memory::InMemoryMetrics;
pub use recorder::{RecorderSink, register_metrics};

use crate::core::StoreError;
use std::sync::Arc;
use std::time::Duration;

/// Scope prefix of every metric the entity service records.
pub const ENTITY_SERVICE_SCOPE: &str = "EntityService";

pub const BATCH_WITH_DUPLICATE: &str = "batch_with_duplicate";
pub const DELETE_NONEXISTING: &str = "delete_nonexisting";
pub const TRANSACTION_RETRY: &str = "transaction_retry";
pub const RESTORE_ROW_FAILED: &str = "restore_row_failed";
pub const RESTORE_PARTITION_FAILED: &str = "restore_partition_failed";
pub const CHANGE_LOG_SUPPRESSED: &str = "change_log_suppressed";
pub const CHANGE_LOG_EMITTED: &str = "change_log_emitted";
pub const CHANGE_LOG_PUBLISH_FAILED: &str = "change_log_publish_failed";
pub const ROLLBACK_CONDITION_MISMATCH: &str = "rollback_condition_mismatch";

pub const INGEST_LATENCY_MS: &str = "ingest_latency_ms";
pub const RESTORE_SEND_MESSAGE_MS: &str = "restore_send_message_ms";
pub const RESTORE_PARTITIONS_COMPLETED: &str = "restore_partitions_completed";

/// Destination of recorded metrics.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str, value: u64);
    fn record_histogram(&self, name: &str, value: f64);
    fn set_gauge(&self, name: &str, value: f64);
}

#[derive(Clone, Default)]
pub struct MetricUtils {
    sink: Option<Arc<dyn MetricsSink>>,
}

impl std::fmt::Debug for MetricUtils {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricUtils")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl MetricUtils {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Joins metric name parts with `.`.
    pub fn name(parts: &[&str]) -> String {
        parts.join(".")
    }

    pub fn increment(&self, scope: &str, metric: &str, value: u64) {
        if let Some(sink) = &self.sink {
            sink.increment_counter(&Self::name(&[scope, metric]), value);
        }
    }

    /// Increments `metric` and its per-error-kind sibling, e.g.
    /// `EntityService.transaction_retry_Write_Conflict`.
    pub fn exception_increment(&self, scope: &str, metric: &str, err: &StoreError) {
        if let Some(sink) = &self.sink {
            let base = Self::name(&[scope, metric]);
            sink.increment_counter(&base, 1);
            sink.increment_counter(&format!("{}_{}", base, snake_kind(err.kind())), 1);
        }
    }

    pub fn histogram(&self, scope: &str, metric: &str, value: f64) {
        if let Some(sink) = &self.sink {
            sink.record_histogram(&Self::name(&[scope, metric]), value);
        }
    }

    pub fn set_gauge(&self, scope: &str, metric: &str, value: f64) {
        if let Some(sink) = &self.sink {
            sink.set_gauge(&Self::name(&[scope, metric]), value);
        }
    }

    /// Records a duration in milliseconds.
    pub fn time(&self, scope: &str, metric: &str, elapsed: Duration) {
        self.histogram(scope, metric, elapsed.as_secs_f64() * 1000.0);
    }
}

/// `WriteConflict` -> `Write_Conflict`.
fn snake_kind(kind: &str) -> String {
    let mut out = String::with_capacity(kind.len() + 4);
    for (idx, ch) in kind.chars().enumerate() {
        if idx > 0 && ch.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_utils_never_fault() {
        let metrics = MetricUtils::disabled();
        metrics.increment(ENTITY_SERVICE_SCOPE, DELETE_NONEXISTING, 1);
        metrics.exception_increment(
            ENTITY_SERVICE_SCOPE,
            TRANSACTION_RETRY,
            &StoreError::WriteConflict("x".into()),
        );
        metrics.time(ENTITY_SERVICE_SCOPE, "ingest", Duration::from_millis(3));
        assert!(!metrics.is_enabled());
    }

    #[test]
    fn exception_counters_carry_the_error_kind() {
        let sink = Arc::new(InMemoryMetrics::new());
        let metrics = MetricUtils::new(sink.clone());

        metrics.exception_increment(
            ENTITY_SERVICE_SCOPE,
            TRANSACTION_RETRY,
            &StoreError::WriteConflict("x".into()),
        );

        assert_eq!(sink.counter("EntityService.transaction_retry"), 1);
        assert_eq!(sink.counter("EntityService.transaction_retry_Write_Conflict"), 1);
    }

    #[test]
    fn names_join_with_dots() {
        assert_eq!(MetricUtils::name(&["EntityService", "ingest"]), "EntityService.ingest");
        assert_eq!(snake_kind("RetriesExhausted"), "Retries_Exhausted");
    }
}
