use super::EntityService;
use super::ingest::write_upsert;
use crate::core::{Result, StoreError, Urn};
use crate::model::{
    AspectRow, AuditStamp, ChangeItem, ChangeLogEvent, ChangeType, RollbackResult,
    RollbackRunResult, SystemAspect, SystemMetadata,
};
use crate::registry::AspectSpec;
use crate::registry::constants::STATUS_ASPECT_NAME;
use crate::storage::{AspectTransaction, TransactionResult};
use crate::telemetry::{DELETE_NONEXISTING, ENTITY_SERVICE_SCOPE, ROLLBACK_CONDITION_MISMATCH};
use log::{debug, info, warn};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{Instrument, info_span};

enum RollbackAttempt {
    NotFound,
    ConditionMismatch,
    Done(RollbackResult),
}

fn conditions_match(metadata: &SystemMetadata, conditions: &BTreeMap<String, String>) -> bool {
    conditions
        .iter()
        .all(|(field, expected)| metadata.field(field).as_deref() == Some(expected.as_str()))
}

impl EntityService {
    /// Removes the latest row of `(urn, aspect_name)` without emitting a change log.
    ///
    /// Returns `None` when the row is already gone or its system metadata does
    /// not satisfy `conditions`.
    pub async fn delete_aspect_without_mcl(
        &self,
        urn: &Urn,
        aspect_name: &str,
        conditions: &BTreeMap<String, String>,
        soft_remove_allowed: bool,
    ) -> Result<Option<RollbackResult>> {
        let is_key_aspect = self
            .registry
            .entity_spec(urn.entity_type())
            .is_some_and(|entity| entity.is_key_aspect(aspect_name));
        let span = info_span!(
            "entity_service.delete_aspect_without_mcl",
            urn = %urn,
            aspect = aspect_name,
            soft_remove_allowed
        );

        let attempt = self
            .transaction(|tx| async move {
                let latest = match tx.get_latest(urn, aspect_name).await {
                    Ok(Some(latest)) => latest,
                    Ok(None) | Err(StoreError::EntityNotFound(_)) => {
                        return Ok(TransactionResult::Abort(RollbackAttempt::NotFound));
                    }
                    Err(err) => return Err(err),
                };

                if !conditions_match(&latest.system_metadata, conditions) {
                    return Ok(TransactionResult::Abort(RollbackAttempt::ConditionMismatch));
                }

                let result = if !is_key_aspect {
                    match remove_latest(&tx, latest).await {
                        Err(StoreError::EntityNotFound(_)) => {
                            return Ok(TransactionResult::Abort(RollbackAttempt::NotFound));
                        }
                        removed => removed?,
                    }
                } else if soft_remove_allowed {
                    soft_remove(&tx, latest).await?
                } else {
                    purge_entity(&tx, latest).await?
                };
                Ok(TransactionResult::Commit(RollbackAttempt::Done(result)))
            })
            .instrument(span)
            .await?;

        match attempt {
            RollbackAttempt::Done(result) => Ok(Some(result)),
            RollbackAttempt::NotFound => {
                self.metrics
                    .increment(ENTITY_SERVICE_SCOPE, DELETE_NONEXISTING, 1);
                debug!("{}/{} already removed, nothing to roll back", urn, aspect_name);
                Ok(None)
            }
            RollbackAttempt::ConditionMismatch => {
                self.metrics
                    .increment(ENTITY_SERVICE_SCOPE, ROLLBACK_CONDITION_MISMATCH, 1);
                debug!("{}/{} no longer matches rollback conditions", urn, aspect_name);
                Ok(None)
            }
        }
    }

    /// Undoes every row written by `run_id`, then announces what changed.
    ///
    /// Rows overwritten by a later run, or already removed, are skipped. Every
    /// row must name a parsable urn and a registered aspect; otherwise the call
    /// fails before anything is removed.
    pub async fn rollback_run(
        &self,
        rows: &[AspectRow],
        run_id: &str,
        soft_remove_allowed: bool,
    ) -> Result<RollbackRunResult> {
        let conditions = BTreeMap::from([("runId".to_string(), run_id.to_string())]);
        let mut summary = RollbackRunResult::default();

        let targets = rows
            .iter()
            .map(|row| {
                let urn = Urn::parse(row.urn.as_str())?;
                self.aspect_spec(&urn, &row.aspect)?;
                Ok(urn)
            })
            .collect::<Result<Vec<_>>>()?;

        for (row, urn) in rows.iter().zip(&targets) {
            match self
                .delete_aspect_without_mcl(urn, &row.aspect, &conditions, soft_remove_allowed)
                .await?
            {
                Some(result) => {
                    summary.rows_deleted_from_entity_deletion += result.additional_rows_affected;
                    summary.rows_rolled_back.push(result);
                }
                None => summary.rows_skipped += 1,
            }
        }

        let stamp = AuditStamp::system()?;
        let mut in_flight = Vec::with_capacity(summary.rows_rolled_back.len());
        for rolled_back in &summary.rows_rolled_back {
            // Soft removal reports `status`, which not every entity registers.
            let spec = self
                .aspect_spec(&rolled_back.urn, &rolled_back.aspect_name)
                .unwrap_or_else(|err| {
                    warn!("rollback change log for {} uses a bare spec: {}", rolled_back.urn, err);
                    AspectSpec::new(rolled_back.aspect_name.clone())
                });
            let metadata = rolled_back
                .new_system_metadata
                .clone()
                .or_else(|| rolled_back.old_system_metadata.clone())
                .unwrap_or_else(SystemMetadata::create_default);
            let change_log = ChangeLogEvent::new(
                rolled_back.urn.clone(),
                rolled_back.aspect_name.clone(),
                rolled_back.change_type,
                metadata,
                stamp.clone(),
            )
            .with_aspect(rolled_back.new_value.clone())
            .with_previous(
                rolled_back.old_value.clone(),
                rolled_back.old_system_metadata.clone(),
            );
            in_flight.push(self.produce_change_log(&rolled_back.urn, &spec, change_log));
        }
        for handle in in_flight {
            if let Err(err) = handle.join().await {
                warn!("rollback change log for run {} not published: {}", run_id, err);
            }
        }

        info!(
            "rolled back {} row(s) of run {}, skipped {}",
            summary.rows_rolled_back.len(),
            run_id,
            summary.rows_skipped
        );
        Ok(summary)
    }
}

fn rollback_result(latest: &SystemAspect, change_type: ChangeType) -> RollbackResult {
    RollbackResult {
        urn: latest.urn.clone(),
        entity_type: latest.urn.entity_type().to_string(),
        aspect_name: latest.aspect_name.clone(),
        old_value: Some(latest.record.clone()),
        new_value: None,
        old_system_metadata: Some(latest.system_metadata.clone()),
        new_system_metadata: None,
        change_type,
        key_affected: false,
        additional_rows_affected: 0,
    }
}

async fn remove_latest(tx: &AspectTransaction, latest: SystemAspect) -> Result<RollbackResult> {
    tx.delete_version(&latest.urn, &latest.aspect_name, latest.row_version)
        .await?;

    let mut result = rollback_result(&latest, ChangeType::Delete);
    if let Some(restored) = tx.get_latest(&latest.urn, &latest.aspect_name).await? {
        result.change_type = ChangeType::Upsert;
        result.new_value = Some(restored.record);
        result.new_system_metadata = Some(restored.system_metadata);
    }
    Ok(result)
}

/// Marks the entity removed instead of dropping its key aspect.
async fn soft_remove(tx: &AspectTransaction, latest: SystemAspect) -> Result<RollbackResult> {
    let removed = json!({"removed": true});
    let item = ChangeItem::upsert(
        latest.urn.clone(),
        STATUS_ASPECT_NAME,
        removed.clone(),
        AuditStamp::system()?,
    );
    let update = write_upsert(tx, &item, removed).await?;

    Ok(RollbackResult {
        urn: latest.urn.clone(),
        entity_type: latest.urn.entity_type().to_string(),
        aspect_name: STATUS_ASPECT_NAME.to_string(),
        old_value: update.old_value,
        new_value: update.new_value,
        old_system_metadata: update.old_system_metadata,
        new_system_metadata: update.new_system_metadata,
        change_type: ChangeType::Upsert,
        key_affected: false,
        additional_rows_affected: 0,
    })
}

/// Drops every row of every aspect of the entity.
async fn purge_entity(tx: &AspectTransaction, key: SystemAspect) -> Result<RollbackResult> {
    let mut removed_rows = 0usize;
    for row in tx.list_latest(&key.urn).await? {
        while let Some(current) = tx.get_latest_row(&key.urn, &row.aspect).await? {
            tx.delete_version(&key.urn, &current.aspect, current.version)
                .await?;
            removed_rows += 1;
        }
    }

    let mut result = rollback_result(&key, ChangeType::Delete);
    result.key_affected = true;
    result.additional_rows_affected = removed_rows.saturating_sub(1);
    Ok(result)
}
