use crate::model::ChangeType;
use crate::registry::constants::*;
use std::fmt;

/// Product-analytics classification of an emitted change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageEventType {
    CreateAccessTokenEvent,
    RevokeAccessTokenEvent,
    CreateIngestionSourceEvent,
    UpdateIngestionSourceEvent,
    CreatePolicyEvent,
    UpdatePolicyEvent,
    DeletePolicyEvent,
    CreateUserEvent,
    UpdateUserEvent,
    UpdateAspectEvent,
    DeleteEntityEvent,
    EntityEvent,
}

impl UsageEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAccessTokenEvent => "CreateAccessTokenEvent",
            Self::RevokeAccessTokenEvent => "RevokeAccessTokenEvent",
            Self::CreateIngestionSourceEvent => "CreateIngestionSourceEvent",
            Self::UpdateIngestionSourceEvent => "UpdateIngestionSourceEvent",
            Self::CreatePolicyEvent => "CreatePolicyEvent",
            Self::UpdatePolicyEvent => "UpdatePolicyEvent",
            Self::DeletePolicyEvent => "DeletePolicyEvent",
            Self::CreateUserEvent => "CreateUserEvent",
            Self::UpdateUserEvent => "UpdateUserEvent",
            Self::UpdateAspectEvent => "UpdateAspectEvent",
            Self::DeleteEntityEvent => "DeleteEntityEvent",
            Self::EntityEvent => "EntityEvent",
        }
    }
}

impl fmt::Display for UsageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn map_aspect_to_usage_event(aspect_name: &str, change_type: ChangeType) -> UsageEventType {
    match change_type {
        ChangeType::Create
        | ChangeType::CreateEntity
        | ChangeType::Upsert
        | ChangeType::Update
        | ChangeType::Patch => match aspect_name {
            ACCESS_TOKEN_KEY_ASPECT_NAME => UsageEventType::CreateAccessTokenEvent,
            INGESTION_SOURCE_KEY_ASPECT_NAME => UsageEventType::CreateIngestionSourceEvent,
            INGESTION_INFO_ASPECT_NAME => UsageEventType::UpdateIngestionSourceEvent,
            DATAHUB_POLICY_KEY_ASPECT_NAME => UsageEventType::CreatePolicyEvent,
            DATAHUB_POLICY_INFO_ASPECT_NAME => UsageEventType::UpdatePolicyEvent,
            CORP_USER_KEY_ASPECT_NAME => UsageEventType::CreateUserEvent,
            CORP_USER_INFO_ASPECT_NAME | GROUP_MEMBERSHIP_ASPECT_NAME => {
                UsageEventType::UpdateUserEvent
            }
            _ => UsageEventType::UpdateAspectEvent,
        },
        ChangeType::Delete => match aspect_name {
            ACCESS_TOKEN_KEY_ASPECT_NAME => UsageEventType::RevokeAccessTokenEvent,
            DATAHUB_POLICY_KEY_ASPECT_NAME => UsageEventType::DeletePolicyEvent,
            _ => UsageEventType::DeleteEntityEvent,
        },
        ChangeType::Restate => UsageEventType::EntityEvent,
    }
}
