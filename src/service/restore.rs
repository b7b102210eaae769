// ============================================================================
// Restore / Replay
// ============================================================================
//
// Streams stored rows in fixed-size partitions and re-emits each as a
// RESTATE change log so downstream indices can be rebuilt. A bad row is
// skipped and counted; a partition that produced nothing but failures is
// reported through progress and metrics and dropped from the results.
//
// ============================================================================

use super::EntityService;
use crate::core::{Result, StoreError, Urn};
use crate::model::{
    AspectRow, AspectsBatch, AuditStamp, ChangeItem, ChangeLogEvent, ChangeType,
    RestoreIndicesArgs, RestoreIndicesResult, SystemAspect,
};
use crate::storage::TransactionResult;
use crate::telemetry::{
    ENTITY_SERVICE_SCOPE, RESTORE_PARTITION_FAILED, RESTORE_PARTITIONS_COMPLETED,
    RESTORE_ROW_FAILED, RESTORE_SEND_MESSAGE_MS,
};
use futures::StreamExt;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, info_span};

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl EntityService {
    /// Replays stored aspects selected by `args` as change logs.
    ///
    /// Returns one result per partition that migrated something. `progress`
    /// receives a human-readable line per partition.
    pub async fn restore_indices<P>(
        &self,
        args: &RestoreIndicesArgs,
        mut progress: P,
    ) -> Result<Vec<RestoreIndicesResult>>
    where
        P: FnMut(&str) + Send,
    {
        let batch_size = match args.batch_size {
            0 => self.config.restore_default_batch_size,
            size => size,
        };
        let span = info_span!(
            "entity_service.restore_indices",
            batch_size,
            start = args.start,
            create_default_aspects = args.create_default_aspects
        );

        self.replay_partitions(args, batch_size, &mut progress)
            .instrument(span)
            .await
    }

    async fn replay_partitions<P>(
        &self,
        args: &RestoreIndicesArgs,
        batch_size: usize,
        progress: &mut P,
    ) -> Result<Vec<RestoreIndicesResult>>
    where
        P: FnMut(&str) + Send,
    {
        let started = Instant::now();
        let mut partitions = self
            .dao
            .stream_aspect_batches(args)
            .await?
            .partition(batch_size);

        let mut results = Vec::new();
        let mut partition_index = 0usize;
        loop {
            let fetch_started = Instant::now();
            let Some(rows) = partitions.next().await else {
                break;
            };
            let time_get_rows_ms = elapsed_ms(fetch_started);

            if partition_index > 0 && args.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(args.batch_delay_ms)).await;
            }

            match self
                .restore_partition(&rows, args.create_default_aspects)
                .await
            {
                Ok(mut result) => {
                    result.time_get_rows_ms = time_get_rows_ms;
                    progress(&format!(
                        "partition {}: migrated {} row(s), ignored {}, created {} default aspect(s), sent in {} ms",
                        partition_index,
                        result.rows_migrated,
                        result.ignored,
                        result.default_aspects_created,
                        result.send_message_ms
                    ));
                    results.push(result);
                    self.metrics.set_gauge(
                        ENTITY_SERVICE_SCOPE,
                        RESTORE_PARTITIONS_COMPLETED,
                        results.len() as f64,
                    );
                }
                Err(err) => {
                    self.metrics.exception_increment(
                        ENTITY_SERVICE_SCOPE,
                        RESTORE_PARTITION_FAILED,
                        &err,
                    );
                    warn!("restore partition {} failed: {}", partition_index, err);
                    progress(&format!("partition {} failed: {}", partition_index, err));
                }
            }
            partition_index += 1;
        }

        info!(
            "restored {} partition(s) of {} in {} ms",
            results.len(),
            partition_index,
            elapsed_ms(started)
        );
        Ok(results)
    }

    async fn restore_partition(
        &self,
        rows: &[AspectRow],
        create_default_aspects: bool,
    ) -> Result<RestoreIndicesResult> {
        let mut result = RestoreIndicesResult::default();
        let mut row_failures = 0usize;
        let mut urns = Vec::new();
        let mut seen = HashSet::new();
        let mut in_flight = Vec::with_capacity(rows.len());
        let send_started = Instant::now();

        for row in rows {
            result.last_urn = Some(row.urn.clone());
            result.last_aspect = Some(row.aspect.clone());

            let replayed = Urn::parse(row.urn.as_str()).and_then(|urn| {
                let spec = match self.aspect_spec(&urn, &row.aspect) {
                    Ok(spec) => spec,
                    Err(StoreError::UnknownAspect { .. }) => return Ok(None),
                    Err(err) => return Err(err),
                };
                Ok(Some((SystemAspect::from_row(row)?, spec)))
            });

            let (aspect, spec) = match replayed {
                Ok(Some(found)) => found,
                Ok(None) => {
                    debug!("skipping unregistered aspect {}/{}", row.urn, row.aspect);
                    result.ignored += 1;
                    continue;
                }
                Err(err) => {
                    self.metrics
                        .exception_increment(ENTITY_SERVICE_SCOPE, RESTORE_ROW_FAILED, &err);
                    warn!(
                        "skipping unreadable row {}/{} v{}: {}",
                        row.urn, row.aspect, row.version, err
                    );
                    row_failures += 1;
                    result.ignored += 1;
                    result.failure = Some(err.to_string());
                    continue;
                }
            };

            let change_log = ChangeLogEvent::new(
                aspect.urn.clone(),
                aspect.aspect_name.clone(),
                ChangeType::Restate,
                aspect.system_metadata.clone(),
                restate_stamp(&aspect)?,
            )
            .with_aspect(Some(aspect.record.clone()));
            in_flight.push(self.produce_change_log(&aspect.urn, &spec, change_log));

            if seen.insert(aspect.urn.clone()) {
                urns.push(aspect.urn);
            }
            result.rows_migrated += 1;
        }

        for handle in in_flight {
            handle.join().await?;
        }
        result.send_message_ms = elapsed_ms(send_started);
        self.metrics.time(
            ENTITY_SERVICE_SCOPE,
            RESTORE_SEND_MESSAGE_MS,
            send_started.elapsed(),
        );

        if result.rows_migrated == 0 && row_failures > 0 {
            return Err(StoreError::ExecutionError(format!(
                "no row of the partition could be replayed: {}",
                result.failure.as_deref().unwrap_or("unknown failure")
            )));
        }

        if create_default_aspects {
            let mut defaults = Vec::new();
            for urn in &urns {
                defaults.extend(self.missing_default_aspects(urn).await?);
            }
            if !defaults.is_empty() {
                result.default_aspects_created = defaults.len();
                self.ingest_proposal_sync(AspectsBatch::new(defaults)).await?;
            }
        }

        Ok(result)
    }

    /// Key and default aspects the entity should carry but has never stored.
    async fn missing_default_aspects(&self, urn: &Urn) -> Result<Vec<ChangeItem>> {
        let Some(entity) = self.registry.entity_spec(urn.entity_type()) else {
            return Ok(Vec::new());
        };

        let mut candidates: Vec<(String, Value)> =
            vec![(entity.key_aspect.clone(), entity.key_aspect_value(urn)?)];
        candidates.extend(
            entity
                .default_aspects
                .iter()
                .map(|default| (default.aspect_name.clone(), default.value.clone())),
        );
        let candidates = Arc::new(candidates);

        let missing = self
            .transaction(|tx| {
                let candidates = Arc::clone(&candidates);
                let urn = urn.clone();
                async move {
                    let mut missing = Vec::new();
                    for (aspect_name, value) in candidates.iter() {
                        if tx.get_latest_row(&urn, aspect_name).await?.is_none() {
                            missing.push((aspect_name.clone(), value.clone()));
                        }
                    }
                    Ok(TransactionResult::Abort(missing))
                }
            })
            .await?;

        let stamp = AuditStamp::system()?;
        Ok(missing
            .into_iter()
            .map(|(aspect_name, value)| {
                ChangeItem::upsert(urn.clone(), aspect_name, value, stamp.clone())
            })
            .collect())
    }
}

/// Attributes a replayed row to its original writer when that is a valid urn.
fn restate_stamp(aspect: &SystemAspect) -> Result<AuditStamp> {
    match Urn::parse(aspect.created_by.as_str()) {
        Ok(actor) => Ok(AuditStamp::new(actor, aspect.created_on.timestamp_millis())),
        Err(_) => Ok(AuditStamp {
            time: aspect.created_on.timestamp_millis(),
            ..AuditStamp::system()?
        }),
    }
}
