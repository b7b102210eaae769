use super::EntityService;
use crate::core::{Result, StoreError};
use crate::model::{AspectsBatch, ChangeLogEvent, ChangeType, IngestResult};
use log::warn;
use tracing::{Instrument, info_span};

impl EntityService {
    /// Appends timeseries aspects by publishing them straight to the change log.
    ///
    /// Only `UPSERT` is accepted; any other change type fails the whole batch
    /// before anything is published. Timeseries aspects are never versioned
    /// or stored.
    pub async fn ingest_timeseries_proposal(
        &self,
        batch: AspectsBatch,
        async_mode: bool,
    ) -> Result<Vec<IngestResult>> {
        if let Some(item) = batch
            .items()
            .iter()
            .find(|item| item.change_type != ChangeType::Upsert)
        {
            return Err(StoreError::UnsupportedOperation(format!(
                "change type {} is not supported for timeseries aspect {}, only UPSERT is",
                item.change_type, item.aspect_name
            )));
        }

        let specs = batch
            .items()
            .iter()
            .map(|item| {
                let spec = self.aspect_spec(&item.urn, &item.aspect_name)?;
                if !spec.is_timeseries() {
                    return Err(StoreError::UnsupportedOperation(format!(
                        "aspect {} is not a timeseries aspect",
                        item.aspect_name
                    )));
                }
                item.require_record()?;
                Ok(spec)
            })
            .collect::<Result<Vec<_>>>()?;

        let span = info_span!(
            "entity_service.ingest_timeseries",
            batch_size = batch.len(),
            async_mode
        );
        async move {
            let mut results = Vec::with_capacity(specs.len());
            let mut in_flight = Vec::with_capacity(specs.len());
            for (item, spec) in batch.into_items().into_iter().zip(&specs) {
                let change_log = ChangeLogEvent::new(
                    item.urn.clone(),
                    item.aspect_name.clone(),
                    ChangeType::Upsert,
                    item.system_metadata.clone(),
                    item.audit_stamp.clone(),
                )
                .with_aspect(item.record.clone());
                in_flight.push(self.produce_change_log(&item.urn, spec, change_log));

                results.push(IngestResult {
                    urn: item.urn,
                    aspect_name: item.aspect_name,
                    change_type: ChangeType::Upsert,
                    update: None,
                    sql_committed: false,
                    published_mcl: false,
                    processed_mcl: true,
                    is_update: false,
                });
            }

            if !async_mode {
                for (result, handle) in results.iter_mut().zip(in_flight) {
                    match handle.join().await {
                        Ok(()) => result.published_mcl = true,
                        Err(err) => warn!(
                            "timeseries aspect {} of {} not published: {}",
                            result.aspect_name, result.urn, err
                        ),
                    }
                }
            }

            Ok(results)
        }
        .instrument(span)
        .await
    }
}
