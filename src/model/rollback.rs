use super::{ChangeType, SystemMetadata};
use crate::core::Urn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What removing one aspect row did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub urn: Urn,
    pub entity_type: String,
    pub aspect_name: String,
    pub old_value: Option<Value>,
    /// Content that is latest again after the rollback, if a prior row existed.
    pub new_value: Option<Value>,
    pub old_system_metadata: Option<SystemMetadata>,
    pub new_system_metadata: Option<SystemMetadata>,
    /// `DELETE` when nothing remains for the key, `UPSERT` when a prior row was restored.
    pub change_type: ChangeType,
    /// `true` when the entity's key aspect was removed.
    pub key_affected: bool,
    /// Other rows of the entity removed together with its key aspect.
    pub additional_rows_affected: usize,
}

/// Summary of undoing one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRunResult {
    pub rows_rolled_back: Vec<RollbackResult>,
    /// Rows that were already gone or no longer belonged to the run.
    pub rows_skipped: usize,
    pub rows_deleted_from_entity_deletion: usize,
}
