use super::{AuditStamp, ChangeType, SystemMetadata};
use crate::core::Urn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Emitted record of an accepted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEvent {
    pub event_id: Uuid,
    pub entity_urn: Urn,
    pub entity_type: String,
    pub aspect_name: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_aspect_value: Option<Value>,
    pub system_metadata: SystemMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_system_metadata: Option<SystemMetadata>,
    pub created: AuditStamp,
}

impl ChangeLogEvent {
    pub fn new(
        entity_urn: Urn,
        aspect_name: impl Into<String>,
        change_type: ChangeType,
        system_metadata: SystemMetadata,
        created: AuditStamp,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            entity_type: entity_urn.entity_type().to_string(),
            entity_urn,
            aspect_name: aspect_name.into(),
            change_type,
            aspect: None,
            previous_aspect_value: None,
            system_metadata,
            previous_system_metadata: None,
            created,
        }
    }

    pub fn with_aspect(mut self, aspect: Option<Value>) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn with_previous(
        mut self,
        previous_aspect_value: Option<Value>,
        previous_system_metadata: Option<SystemMetadata>,
    ) -> Self {
        self.previous_aspect_value = previous_aspect_value;
        self.previous_system_metadata = previous_system_metadata;
        self
    }
}
