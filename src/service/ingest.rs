// ============================================================================
// Ingestion Pipeline
// ============================================================================
//
// A batch is split into timeseries appends and versioned writes. Versioned
// items run through one retryable transaction, in submission order, each
// seeing the writes of the items before it. Change logs are emitted after
// commit, one decision per written item.
//
// ============================================================================

use super::EntityService;
use super::patch::merge_patch;
use super::upsert::apply_upsert;
use crate::core::{Result, StoreError};
use crate::event::ChangeLogHandle;
use crate::model::{
    AspectsBatch, ChangeItem, ChangeLogEvent, ChangeType, IngestResult, UpdateAspectResult,
};
use crate::registry::{AspectSpec, EntityRegistry};
use crate::storage::{AspectTransaction, TransactionResult};
use crate::telemetry::{BATCH_WITH_DUPLICATE, ENTITY_SERVICE_SCOPE, INGEST_LATENCY_MS};
use log::warn;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

/// Results of a batch ingested in the background.
#[derive(Debug)]
pub struct IngestHandle {
    join_handle: JoinHandle<Result<Vec<IngestResult>>>,
}

impl IngestHandle {
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    pub async fn join(self) -> Result<Vec<IngestResult>> {
        self.join_handle
            .await
            .map_err(|err| StoreError::ExecutionError(format!("ingest task join: {}", err)))?
    }
}

impl EntityService {
    /// Ingests a mixed batch, routing timeseries aspects to the append path.
    ///
    /// With `async_mode` the call returns once storage committed, without
    /// waiting for change-log transport confirmation. Results follow
    /// submission order.
    pub async fn ingest_proposal(
        &self,
        batch: AspectsBatch,
        async_mode: bool,
    ) -> Result<Vec<IngestResult>> {
        let span = info_span!(
            "entity_service.ingest_proposal",
            batch_size = batch.len(),
            async_mode
        );
        self.route_proposal(batch, async_mode)
            .instrument(span)
            .await
    }

    async fn route_proposal(
        &self,
        batch: AspectsBatch,
        async_mode: bool,
    ) -> Result<Vec<IngestResult>> {
        let mut timeseries = Vec::new();
        let mut versioned = Vec::new();
        for (index, item) in batch.into_items().into_iter().enumerate() {
            if self.aspect_spec(&item.urn, &item.aspect_name)?.is_timeseries() {
                timeseries.push((index, item));
            } else {
                versioned.push((index, item));
            }
        }

        let (timeseries_order, timeseries_items): (Vec<_>, Vec<_>) =
            timeseries.into_iter().unzip();
        let (versioned_order, versioned_items): (Vec<_>, Vec<_>) =
            versioned.into_iter().unzip();

        let mut ordered = Vec::with_capacity(timeseries_order.len() + versioned_order.len());
        if !timeseries_items.is_empty() {
            let results = self
                .ingest_timeseries_proposal(AspectsBatch::new(timeseries_items), async_mode)
                .await?;
            ordered.extend(timeseries_order.into_iter().zip(results));
        }
        if !versioned_items.is_empty() {
            let results = self
                .ingest_versioned(versioned_items, true, !async_mode)
                .await?;
            ordered.extend(versioned_order.into_iter().zip(results));
        }

        ordered.sort_by_key(|(index, _)| *index);
        Ok(ordered.into_iter().map(|(_, result)| result).collect())
    }

    pub async fn ingest_proposal_sync(&self, batch: AspectsBatch) -> Result<Vec<IngestResult>> {
        self.ingest_proposal(batch, false).await
    }

    /// Processes the batch on a background task.
    pub fn ingest_proposal_async(&self, batch: AspectsBatch) -> IngestHandle {
        let service = self.clone();
        IngestHandle {
            join_handle: tokio::spawn(async move { service.ingest_proposal(batch, false).await }),
        }
    }

    /// Transactional write of versioned aspects.
    ///
    /// Publishes are joined before returning; `published_mcl` reports which
    /// completed.
    pub async fn ingest_aspects(
        &self,
        batch: AspectsBatch,
        emit_mcl: bool,
    ) -> Result<Vec<IngestResult>> {
        let span = info_span!("entity_service.ingest_aspects", batch_size = batch.len(), emit_mcl);
        self.ingest_versioned(batch.into_items(), emit_mcl, true)
            .instrument(span)
            .await
    }

    async fn ingest_versioned(
        &self,
        items: Vec<ChangeItem>,
        emit_mcl: bool,
        wait_for_publish: bool,
    ) -> Result<Vec<IngestResult>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let batch = AspectsBatch::new(items);
        if batch.contains_duplicate_aspects() {
            self.metrics
                .increment(ENTITY_SERVICE_SCOPE, BATCH_WITH_DUPLICATE, 1);
            warn!(
                "batch of {} items repeats an (urn, aspect) key, applying in submission order",
                batch.len()
            );
        }

        let specs = batch
            .items()
            .iter()
            .map(|item| {
                let spec = self.aspect_spec(&item.urn, &item.aspect_name)?;
                if spec.is_timeseries() {
                    return Err(StoreError::UnsupportedOperation(format!(
                        "timeseries aspect {} cannot be written as a versioned aspect",
                        item.aspect_name
                    )));
                }
                Ok(spec)
            })
            .collect::<Result<Vec<_>>>()?;

        let started = Instant::now();
        let items = Arc::new(batch.into_items());
        let registry = Arc::clone(&self.registry);
        let updates = self
            .transaction(|tx| {
                let items = Arc::clone(&items);
                let registry = Arc::clone(&registry);
                async move {
                    let mut updates = Vec::with_capacity(items.len());
                    for item in items.iter() {
                        updates.push(apply_change(&tx, registry.as_ref(), item).await?);
                    }
                    Ok(TransactionResult::Commit(updates))
                }
            })
            .await?;
        self.metrics
            .time(ENTITY_SERVICE_SCOPE, INGEST_LATENCY_MS, started.elapsed());
        event!(Level::DEBUG, items = updates.len(), "ingest transaction committed");

        let mut results = Vec::with_capacity(updates.len());
        let mut in_flight = Vec::new();
        for (index, ((item, update), spec)) in items.iter().zip(updates).zip(&specs).enumerate() {
            if emit_mcl {
                if let Some(handle) = self.emit_for_update(item, &update, spec) {
                    in_flight.push((index, handle));
                }
            }
            results.push(IngestResult {
                urn: item.urn.clone(),
                aspect_name: item.aspect_name.clone(),
                change_type: item.change_type,
                is_update: update.old_value.is_some(),
                update: Some(update),
                sql_committed: true,
                published_mcl: false,
                processed_mcl: emit_mcl,
            });
        }

        if wait_for_publish {
            for (index, handle) in in_flight {
                match handle.join().await {
                    Ok(()) => {
                        if let Some(result) = results.get_mut(index) {
                            result.published_mcl = true;
                        }
                    }
                    Err(err) => warn!("change log for batch item {} not published: {}", index, err),
                }
            }
        }

        Ok(results)
    }

    fn emit_for_update(
        &self,
        item: &ChangeItem,
        update: &UpdateAspectResult,
        spec: &AspectSpec,
    ) -> Option<ChangeLogHandle> {
        if item.change_type != ChangeType::Delete {
            return self.conditionally_produce_change_log(
                update.old_value.as_ref(),
                update.old_system_metadata.as_ref(),
                update.new_value.as_ref(),
                update.new_system_metadata.as_ref()?,
                item.change_type,
                &item.urn,
                &item.audit_stamp,
                spec,
            );
        }

        // Nothing was stored, nothing to announce.
        let removed = update.old_value.clone()?;
        let change_type = if update.new_value.is_some() {
            ChangeType::Upsert
        } else {
            ChangeType::Delete
        };
        let change_log = ChangeLogEvent::new(
            item.urn.clone(),
            item.aspect_name.clone(),
            change_type,
            update
                .new_system_metadata
                .clone()
                .unwrap_or_else(|| item.system_metadata.clone()),
            item.audit_stamp.clone(),
        )
        .with_aspect(update.new_value.clone())
        .with_previous(Some(removed), update.old_system_metadata.clone());

        Some(self.produce_change_log(&item.urn, spec, change_log))
    }
}

async fn apply_change(
    tx: &AspectTransaction,
    registry: &dyn EntityRegistry,
    item: &ChangeItem,
) -> Result<UpdateAspectResult> {
    match item.change_type {
        ChangeType::Upsert | ChangeType::Update | ChangeType::Restate => {
            write_upsert(tx, item, item.require_record()?.clone()).await
        }
        ChangeType::Create => {
            if tx.get_latest_row(&item.urn, &item.aspect_name).await?.is_some() {
                return Err(StoreError::PreconditionFailed(format!(
                    "aspect {} of {} already exists",
                    item.aspect_name, item.urn
                )));
            }
            write_upsert(tx, item, item.require_record()?.clone()).await
        }
        ChangeType::CreateEntity => {
            let key_aspect = registry
                .entity_spec(item.entity_type())
                .map(|entity| entity.key_aspect.as_str())
                .unwrap_or(item.aspect_name.as_str());
            if tx.get_latest_row(&item.urn, key_aspect).await?.is_some() {
                return Err(StoreError::PreconditionFailed(format!(
                    "entity {} already exists",
                    item.urn
                )));
            }
            write_upsert(tx, item, item.require_record()?.clone()).await
        }
        ChangeType::Patch => {
            let base = tx
                .get_latest(&item.urn, &item.aspect_name)
                .await?
                .map(|latest| latest.record)
                .unwrap_or_else(|| json!({}));
            let patched = merge_patch(&base, item.require_record()?);
            write_upsert(tx, item, patched).await
        }
        ChangeType::Delete => delete_latest(tx, item).await,
    }
}

/// Runs the upsert engine against the latest row and persists its outcome.
pub(crate) async fn write_upsert(
    tx: &AspectTransaction,
    item: &ChangeItem,
    record: Value,
) -> Result<UpdateAspectResult> {
    let latest = tx.get_latest(&item.urn, &item.aspect_name).await?;

    let mut proposal = item.clone();
    proposal.record = Some(record);
    let outcome = apply_upsert(&proposal, latest.as_ref())?;
    tx.save(&outcome.aspect).await?;

    Ok(UpdateAspectResult {
        urn: item.urn.clone(),
        aspect_name: item.aspect_name.clone(),
        change_type: item.change_type,
        old_value: latest.as_ref().map(|aspect| aspect.record.clone()),
        new_value: Some(outcome.aspect.record.clone()),
        old_system_metadata: latest.map(|aspect| aspect.system_metadata),
        new_system_metadata: Some(outcome.aspect.system_metadata.clone()),
        audit_stamp: item.audit_stamp.clone(),
        row_version: Some(outcome.aspect.row_version),
        accepted_version: Some(outcome.accepted_version),
        no_op: outcome.is_no_op(),
        previous: outcome.previous,
    })
}

/// Removes the latest row; the row version before it, if any, becomes latest.
async fn delete_latest(tx: &AspectTransaction, item: &ChangeItem) -> Result<UpdateAspectResult> {
    let mut result = UpdateAspectResult {
        urn: item.urn.clone(),
        aspect_name: item.aspect_name.clone(),
        change_type: ChangeType::Delete,
        old_value: None,
        new_value: None,
        old_system_metadata: None,
        new_system_metadata: None,
        audit_stamp: item.audit_stamp.clone(),
        row_version: None,
        accepted_version: None,
        previous: None,
        no_op: true,
    };

    let Some(latest) = tx.get_latest(&item.urn, &item.aspect_name).await? else {
        return Ok(result);
    };

    tx.delete_version(&item.urn, &item.aspect_name, latest.row_version)
        .await?;
    let restored = tx.get_latest(&item.urn, &item.aspect_name).await?;

    result.old_value = Some(latest.record.clone());
    result.old_system_metadata = Some(latest.system_metadata.clone());
    result.previous = Some(latest);
    result.no_op = false;
    if let Some(restored) = restored {
        result.accepted_version = restored.system_metadata_version();
        result.row_version = Some(restored.row_version);
        result.new_value = Some(restored.record);
        result.new_system_metadata = Some(restored.system_metadata);
    }
    Ok(result)
}
