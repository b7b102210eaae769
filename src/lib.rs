// ============================================================================
// AspectDB Library
// ============================================================================
//
// Versioned aspect store: optimistic upserts with semantic versions, change
// log emission, index restore from stored history and run rollback.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod event;
pub mod model;
pub mod registry;
pub mod service;
pub mod storage;
pub mod telemetry;

// Re-export main types for convenience
pub use config::EntityServiceConfig;
pub use core::{Result, StoreError, Urn};
pub use event::{ChangeLogHandle, ChannelEventProducer, EventProducer};
pub use model::{
    AspectRow, AspectsBatch, AuditStamp, ChangeItem, ChangeLogEvent, ChangeType, IngestResult,
    RestoreIndicesArgs, RestoreIndicesResult, RollbackResult, RollbackRunResult, SystemAspect,
    SystemMetadata, UpdateAspectResult,
};
pub use registry::{AspectSpec, EntityRegistry, EntitySpec, StaticEntityRegistry};
pub use service::{EntityService, IngestHandle};
pub use storage::{AspectDao, InMemoryAspectDao};
pub use telemetry::{InMemoryMetrics, MetricUtils, MetricsSink};
