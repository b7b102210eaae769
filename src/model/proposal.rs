use super::SystemMetadata;
use crate::core::{Result, StoreError, Urn};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Actor recorded on writes performed by the store itself (restore, rollback).
pub const SYSTEM_ACTOR: &str = "urn:li:corpuser:__datahub_system";

/// Kind of mutation a proposal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Upsert,
    Update,
    Create,
    CreateEntity,
    Delete,
    Patch,
    Restate,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Upsert => "UPSERT",
            Self::Update => "UPDATE",
            Self::Create => "CREATE",
            Self::CreateEntity => "CREATE_ENTITY",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Restate => "RESTATE",
        };
        write!(f, "{label}")
    }
}

/// Who made a change and when (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStamp {
    pub time: i64,
    pub actor: Urn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonator: Option<Urn>,
}

impl AuditStamp {
    pub fn new(actor: Urn, time: i64) -> Self {
        Self {
            time,
            actor,
            impersonator: None,
        }
    }

    pub fn now(actor: Urn) -> Self {
        Self::new(actor, Utc::now().timestamp_millis())
    }

    pub fn system() -> Result<Self> {
        Ok(Self::now(Urn::parse(SYSTEM_ACTOR)?))
    }

    pub fn with_impersonator(mut self, impersonator: Urn) -> Self {
        self.impersonator = Some(impersonator);
        self
    }
}

/// One proposed change to a single (urn, aspect) key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeItem {
    pub urn: Urn,
    pub aspect_name: String,
    pub change_type: ChangeType,
    /// Proposed content; the merge patch for `PATCH`, `None` for `DELETE`.
    pub record: Option<Value>,
    pub system_metadata: SystemMetadata,
    pub audit_stamp: AuditStamp,
    /// Semantic version the caller proposes; filled by the pipeline when absent.
    pub next_aspect_version: Option<i64>,
}

impl ChangeItem {
    pub fn new(
        urn: Urn,
        aspect_name: impl Into<String>,
        change_type: ChangeType,
        record: Option<Value>,
        audit_stamp: AuditStamp,
    ) -> Self {
        Self {
            urn,
            aspect_name: aspect_name.into(),
            change_type,
            record,
            system_metadata: SystemMetadata::create_default(),
            audit_stamp,
            next_aspect_version: None,
        }
    }

    pub fn upsert(urn: Urn, aspect_name: impl Into<String>, record: Value, audit_stamp: AuditStamp) -> Self {
        Self::new(urn, aspect_name, ChangeType::Upsert, Some(record), audit_stamp)
    }

    pub fn patch(urn: Urn, aspect_name: impl Into<String>, patch: Value, audit_stamp: AuditStamp) -> Self {
        Self::new(urn, aspect_name, ChangeType::Patch, Some(patch), audit_stamp)
    }

    pub fn delete(urn: Urn, aspect_name: impl Into<String>, audit_stamp: AuditStamp) -> Self {
        Self::new(urn, aspect_name, ChangeType::Delete, None, audit_stamp)
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = change_type;
        self
    }

    pub fn with_system_metadata(mut self, system_metadata: SystemMetadata) -> Self {
        self.system_metadata = system_metadata;
        self
    }

    pub fn with_next_aspect_version(mut self, version: i64) -> Self {
        self.next_aspect_version = Some(version);
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (self.urn.as_str(), self.aspect_name.as_str())
    }

    pub fn entity_type(&self) -> &str {
        self.urn.entity_type()
    }

    /// Content the upsert path writes; only `DELETE` may omit it.
    pub fn require_record(&self) -> Result<&Value> {
        self.record.as_ref().ok_or_else(|| {
            StoreError::ParseError(format!(
                "{} proposal for {}/{} carries no aspect",
                self.change_type, self.urn, self.aspect_name
            ))
        })
    }
}

/// Ordered list of proposals submitted together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AspectsBatch {
    items: Vec<ChangeItem>,
}

impl AspectsBatch {
    pub fn new(items: Vec<ChangeItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ChangeItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ChangeItem> {
        self.items
    }

    pub fn push(&mut self, item: ChangeItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` when some (urn, aspect) key occurs more than once.
    pub fn contains_duplicate_aspects(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.items.len());
        self.items.iter().any(|item| !seen.insert(item.key()))
    }
}

impl From<Vec<ChangeItem>> for AspectsBatch {
    fn from(items: Vec<ChangeItem>) -> Self {
        Self::new(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp() -> AuditStamp {
        AuditStamp::new(Urn::parse("urn:li:corpuser:tester").unwrap(), 1_700_000_000_000)
    }

    #[test]
    fn detects_duplicate_keys() {
        let urn = Urn::parse("urn:li:corpuser:dup").unwrap();
        let other = Urn::parse("urn:li:corpuser:other").unwrap();

        let unique = AspectsBatch::new(vec![
            ChangeItem::upsert(urn.clone(), "status", json!({"removed": false}), stamp()),
            ChangeItem::upsert(other, "status", json!({"removed": false}), stamp()),
            ChangeItem::upsert(urn.clone(), "corpUserInfo", json!({}), stamp()),
        ]);
        assert!(!unique.contains_duplicate_aspects());

        let mut duplicated = unique.clone();
        duplicated.push(ChangeItem::upsert(urn, "status", json!({"removed": true}), stamp()));
        assert!(duplicated.contains_duplicate_aspects());
    }

    #[test]
    fn change_type_uses_wire_names() {
        assert_eq!(serde_json::to_value(ChangeType::CreateEntity).unwrap(), json!("CREATE_ENTITY"));
        assert_eq!(ChangeType::Restate.to_string(), "RESTATE");
    }

    #[test]
    fn delete_has_no_record() {
        let item = ChangeItem::delete(Urn::parse("urn:li:corpuser:x").unwrap(), "status", stamp());
        assert!(item.require_record().is_err());
    }
}
