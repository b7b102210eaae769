use super::EntityService;
use super::usage::map_aspect_to_usage_event;
use crate::core::Urn;
use crate::event::ChangeLogHandle;
use crate::model::{AuditStamp, ChangeLogEvent, ChangeType, SystemMetadata};
use crate::registry::AspectSpec;
use crate::telemetry::{
    CHANGE_LOG_EMITTED, CHANGE_LOG_PUBLISH_FAILED, CHANGE_LOG_SUPPRESSED, ENTITY_SERVICE_SCOPE,
};
use log::warn;
use serde_json::Value;
use tracing::{Instrument, Level, event, info_span};

/// Decides whether a mutation is observable enough to emit a change log.
///
/// Suppressed only for a no-op refresh of equal content on an aspect without
/// lineage relationships while the always-emit override is off.
pub fn should_emit(
    always_emit: bool,
    aspect_spec: &AspectSpec,
    old: Option<&Value>,
    new: Option<&Value>,
    new_metadata: &SystemMetadata,
) -> bool {
    let suppress = new_metadata.is_no_op()
        && old == new
        && !aspect_spec.has_lineage_relationship()
        && !always_emit;
    !suppress
}

impl EntityService {
    /// Emits a change log for the mutation unless `should_emit` suppresses it.
    ///
    /// Publishing is spawned on the current Tokio runtime. Called outside one,
    /// the returned handle resolves to a `PublishError`.
    #[allow(clippy::too_many_arguments)]
    pub fn conditionally_produce_change_log(
        &self,
        old: Option<&Value>,
        old_metadata: Option<&SystemMetadata>,
        new: Option<&Value>,
        new_metadata: &SystemMetadata,
        change_type: ChangeType,
        urn: &Urn,
        audit_stamp: &AuditStamp,
        aspect_spec: &AspectSpec,
    ) -> Option<ChangeLogHandle> {
        if !should_emit(
            self.config.always_emit_change_log,
            aspect_spec,
            old,
            new,
            new_metadata,
        ) {
            self.metrics
                .increment(ENTITY_SERVICE_SCOPE, CHANGE_LOG_SUPPRESSED, 1);
            event!(Level::DEBUG, urn = %urn, aspect = %aspect_spec.name, "change log suppressed for no-op");
            return None;
        }

        let change_log = ChangeLogEvent::new(
            urn.clone(),
            aspect_spec.name.clone(),
            change_type,
            new_metadata.clone(),
            audit_stamp.clone(),
        )
        .with_aspect(new.cloned())
        .with_previous(old.cloned(), old_metadata.cloned());

        Some(self.produce_change_log(urn, aspect_spec, change_log))
    }

    /// Hands `change_log` to the producer and spawns its publish.
    ///
    /// The producer is invoked before this returns; only transport
    /// confirmation is left to the handle, which needs a Tokio runtime to
    /// make progress (see `ChangeLogHandle::spawn`).
    pub fn produce_change_log(
        &self,
        urn: &Urn,
        aspect_spec: &AspectSpec,
        change_log: ChangeLogEvent,
    ) -> ChangeLogHandle {
        let usage_event = map_aspect_to_usage_event(&change_log.aspect_name, change_log.change_type);
        let span = info_span!(
            "entity_service.change_log",
            urn = %urn,
            aspect = %change_log.aspect_name,
            change_type = %change_log.change_type,
            usage_event = %usage_event
        );
        let event_id = change_log.event_id;

        self.metrics
            .increment(ENTITY_SERVICE_SCOPE, CHANGE_LOG_EMITTED, 1);
        let publish = self.producer.produce_change_log(urn, aspect_spec, change_log);
        let metrics = self.metrics.clone();

        ChangeLogHandle::spawn(
            async move {
                let result = publish.await;
                match &result {
                    Ok(()) => event!(Level::DEBUG, %event_id, "change log published"),
                    Err(err) => {
                        metrics.exception_increment(
                            ENTITY_SERVICE_SCOPE,
                            CHANGE_LOG_PUBLISH_FAILED,
                            err,
                        );
                        warn!("change log {} publish failed: {}", event_id, err);
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}
