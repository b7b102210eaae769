// ============================================================================
// Upsert Engine
// ============================================================================
//
// Pure merge of a proposal onto the latest stored aspect. Three outcomes:
//
// - Insert: nothing stored; the proposed version is accepted as-is and the
//   row starts at version 0.
// - NoOp:   content equal to the stored content; the version does not advance,
//   only the system metadata is refreshed in place.
// - Update: content changed; the proposed version is accepted and the new
//   content is written at the next row version.
//
// The proposal is only read. All computed versioning lives in the outcome.
//
// ============================================================================

use crate::core::Result;
use crate::model::{ChangeItem, DEFAULT_RUN_ID, SystemAspect};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKind {
    Insert,
    NoOp,
    Update,
}

/// New persisted state computed for one proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// State to persist.
    pub aspect: SystemAspect,
    /// Semantic version the write settled on.
    pub accepted_version: i64,
    /// Full state that was stored before, if any.
    pub previous: Option<SystemAspect>,
    pub kind: UpsertKind,
}

impl UpsertOutcome {
    pub fn is_no_op(&self) -> bool {
        self.kind == UpsertKind::NoOp
    }
}

/// Version the pipeline proposes when the caller states none.
///
/// Stored semantic version + 1; row version + 1 when the stored version is
/// missing or unparsable; 1 when nothing is stored.
pub fn next_aspect_version(latest: Option<&SystemAspect>) -> i64 {
    match latest {
        None => 1,
        Some(aspect) => aspect
            .system_metadata_version()
            .unwrap_or(aspect.row_version)
            .saturating_add(1),
    }
}

pub fn apply_upsert(item: &ChangeItem, latest: Option<&SystemAspect>) -> Result<UpsertOutcome> {
    let record = item.require_record()?;
    let proposed_version = item
        .next_aspect_version
        .unwrap_or_else(|| next_aspect_version(latest));

    let Some(latest) = latest else {
        let mut system_metadata = item.system_metadata.clone();
        system_metadata.version = Some(proposed_version.to_string());
        system_metadata.last_run_id = Some(DEFAULT_RUN_ID.to_string());
        system_metadata.set_no_op(false);

        return Ok(UpsertOutcome {
            aspect: SystemAspect {
                urn: item.urn.clone(),
                aspect_name: item.aspect_name.clone(),
                row_version: 0,
                record: record.clone(),
                system_metadata,
                created_on: stamp_time(item),
                created_by: item.audit_stamp.actor.to_string(),
                created_for: item.audit_stamp.impersonator.as_ref().map(|urn| urn.to_string()),
            },
            accepted_version: proposed_version,
            previous: None,
            kind: UpsertKind::Insert,
        });
    };

    let mut system_metadata = item.system_metadata.clone();
    system_metadata.last_run_id = Some(latest.system_metadata.run_id_or_default().to_string());

    if latest.record == *record {
        // Legacy rows without a usable version fall back to the proposal.
        let accepted_version = latest.system_metadata_version().unwrap_or(proposed_version);
        system_metadata.version = Some(accepted_version.to_string());
        system_metadata.set_no_op(true);

        return Ok(UpsertOutcome {
            aspect: SystemAspect {
                system_metadata,
                ..latest.clone()
            },
            accepted_version,
            previous: Some(latest.clone()),
            kind: UpsertKind::NoOp,
        });
    }

    system_metadata.version = Some(proposed_version.to_string());
    system_metadata.set_no_op(false);

    Ok(UpsertOutcome {
        aspect: SystemAspect {
            urn: item.urn.clone(),
            aspect_name: item.aspect_name.clone(),
            row_version: latest.row_version + 1,
            record: record.clone(),
            system_metadata,
            created_on: stamp_time(item),
            created_by: item.audit_stamp.actor.to_string(),
            created_for: item.audit_stamp.impersonator.as_ref().map(|urn| urn.to_string()),
        },
        accepted_version: proposed_version,
        previous: Some(latest.clone()),
        kind: UpsertKind::Update,
    })
}

fn stamp_time(item: &ChangeItem) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(item.audit_stamp.time).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Urn;
    use crate::model::{AuditStamp, SystemMetadata};
    use serde_json::json;

    fn stored(record: serde_json::Value, metadata: SystemMetadata, row_version: i64) -> SystemAspect {
        SystemAspect {
            urn: Urn::parse("urn:li:corpuser:test").unwrap(),
            aspect_name: "corpUserInfo".into(),
            row_version,
            record,
            system_metadata: metadata,
            created_on: Utc::now(),
            created_by: "urn:li:corpuser:creator".into(),
            created_for: None,
        }
    }

    fn item(record: serde_json::Value) -> ChangeItem {
        ChangeItem::upsert(
            Urn::parse("urn:li:corpuser:test").unwrap(),
            "corpUserInfo",
            record,
            AuditStamp::new(Urn::parse("urn:li:corpuser:tester").unwrap(), 1_700_000_000_000),
        )
        .with_system_metadata(SystemMetadata::new().with_run_id("run-2"))
    }

    #[test]
    fn next_version_prefers_semantic_version() {
        let versioned = stored(json!({}), SystemMetadata::new().with_version(4), 9);
        let legacy = stored(json!({}), SystemMetadata::new(), 2);
        assert_eq!(next_aspect_version(None), 1);
        assert_eq!(next_aspect_version(Some(&versioned)), 5);
        assert_eq!(next_aspect_version(Some(&legacy)), 3);
    }

    #[test]
    fn missing_version_is_filled_by_the_engine() {
        let latest = stored(json!({"a": 1}), SystemMetadata::new().with_version(3), 0);
        let outcome = apply_upsert(&item(json!({"a": 2})), Some(&latest)).unwrap();
        assert_eq!(outcome.accepted_version, 4);
        assert_eq!(outcome.aspect.row_version, 1);
        assert_eq!(outcome.kind, UpsertKind::Update);
    }

    #[test]
    fn no_op_keeps_stored_provenance() {
        let latest = stored(
            json!({"a": 1}),
            SystemMetadata::new().with_run_id("run-1").with_version(1),
            0,
        );
        let outcome = apply_upsert(&item(json!({"a": 1})).with_next_aspect_version(2), Some(&latest))
            .unwrap();

        assert!(outcome.is_no_op());
        assert!(outcome.aspect.system_metadata.is_no_op());
        assert_eq!(outcome.aspect.created_by, "urn:li:corpuser:creator");
        assert_eq!(outcome.aspect.created_on, latest.created_on);
    }

    #[test]
    fn delete_items_cannot_be_upserted() {
        let delete = ChangeItem::delete(
            Urn::parse("urn:li:corpuser:test").unwrap(),
            "corpUserInfo",
            AuditStamp::new(Urn::parse("urn:li:corpuser:tester").unwrap(), 0),
        );
        assert!(apply_upsert(&delete, None).is_err());
    }
}
