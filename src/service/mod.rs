// ============================================================================
// Entity Service
// ============================================================================
//
// The aspect upsert-and-emission engine. Wires the storage, event producer,
// registry and metrics collaborators together:
//
//   caller -> ingest (upsert <-> storage) -> emission -> event producer
//
// restore replays stored history through emission; rollback removes rows
// written by one ingestion run.
//
// ============================================================================

pub mod emission;
pub mod ingest;
pub mod patch;
pub mod restore;
pub mod rollback;
pub mod timeseries;
pub mod upsert;
pub mod usage;

pub use emission::should_emit;
pub use ingest::IngestHandle;
pub use patch::merge_patch;
pub use upsert::{UpsertKind, UpsertOutcome, apply_upsert, next_aspect_version};
pub use usage::{UsageEventType, map_aspect_to_usage_event};

use crate::config::EntityServiceConfig;
use crate::core::{Result, Urn};
use crate::event::EventProducer;
use crate::registry::{AspectSpec, EntityRegistry};
use crate::storage::{
    AspectDao, AspectTransaction, TransactionResult, run_in_transaction_with_retry,
};
use crate::telemetry::MetricUtils;
use std::future::Future;
use std::sync::Arc;

/// Entry point for every write, replay and rollback of aspects.
///
/// Cheap to clone; clones share the same collaborators.
#[derive(Clone)]
pub struct EntityService {
    dao: Arc<dyn AspectDao>,
    producer: Arc<dyn EventProducer>,
    registry: Arc<dyn EntityRegistry>,
    metrics: MetricUtils,
    config: EntityServiceConfig,
}

impl EntityService {
    pub fn new(
        dao: Arc<dyn AspectDao>,
        producer: Arc<dyn EventProducer>,
        registry: Arc<dyn EntityRegistry>,
        config: EntityServiceConfig,
    ) -> Self {
        Self {
            dao,
            producer,
            registry,
            metrics: MetricUtils::disabled(),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricUtils) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &EntityServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        &self.registry
    }

    pub fn dao(&self) -> &Arc<dyn AspectDao> {
        &self.dao
    }

    pub fn metrics(&self) -> &MetricUtils {
        &self.metrics
    }

    pub(crate) fn aspect_spec(&self, urn: &Urn, aspect_name: &str) -> Result<AspectSpec> {
        self.registry
            .aspect_spec(urn.entity_type(), aspect_name)
            .cloned()
    }

    pub(crate) async fn transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnMut(AspectTransaction) -> Fut,
        Fut: Future<Output = Result<TransactionResult<T>>>,
    {
        run_in_transaction_with_retry(&self.dao, &self.config.retry_policy(), &self.metrics, body)
            .await
    }
}
