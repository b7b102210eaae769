// ============================================================================
// Version & Metadata Model
// ============================================================================
//
// Types shared by every part of the store: persisted rows and their
// deserialized form, the system metadata envelope, change proposals,
// change-log events and the records returned by restore and rollback.
//
// ============================================================================

pub mod aspect;
pub mod change_log;
pub mod ingest_result;
pub mod proposal;
pub mod restore;
pub mod rollback;
pub mod system_metadata;

pub use aspect::{AspectRow, SystemAspect};
pub use change_log::ChangeLogEvent;
pub use ingest_result::{IngestResult, UpdateAspectResult};
pub use proposal::{AspectsBatch, AuditStamp, ChangeItem, ChangeType, SYSTEM_ACTOR};
pub use restore::{RestoreIndicesArgs, RestoreIndicesResult};
pub use rollback::{RollbackResult, RollbackRunResult};
pub use system_metadata::{DEFAULT_RUN_ID, SystemMetadata};
