use super::{AuditStamp, ChangeType, SystemAspect, SystemMetadata};
use crate::core::Urn;
use serde_json::Value;

/// Per-item outcome of the ingestion transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAspectResult {
    pub urn: Urn,
    pub aspect_name: String,
    pub change_type: ChangeType,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub old_system_metadata: Option<SystemMetadata>,
    pub new_system_metadata: Option<SystemMetadata>,
    pub audit_stamp: AuditStamp,
    /// Row version holding `new_value`; `None` when the key was deleted.
    pub row_version: Option<i64>,
    /// Semantic version the write settled on.
    pub accepted_version: Option<i64>,
    /// Full state that was superseded, kept for audit and rollback.
    pub previous: Option<SystemAspect>,
    /// Content was unchanged; only system metadata was refreshed.
    pub no_op: bool,
}

/// What happened to one proposal of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestResult {
    pub urn: Urn,
    pub aspect_name: String,
    pub change_type: ChangeType,
    /// Storage outcome; `None` for timeseries appends.
    pub update: Option<UpdateAspectResult>,
    pub sql_committed: bool,
    /// A change-log event was emitted and its publish completed.
    pub published_mcl: bool,
    /// The emission decision ran for this item.
    pub processed_mcl: bool,
    /// A stored aspect existed before this write.
    pub is_update: bool,
}
