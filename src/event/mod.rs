// ============================================================================
// Change-Log Events
// ============================================================================
//
// Event producer collaborator. Publishing is asynchronous: the store spawns
// the publish future and hands back a handle the caller may join.
//
// ============================================================================

pub mod channel;
pub mod handle;

pub use channel::ChannelEventProducer;
pub use handle::ChangeLogHandle;

use crate::core::{Result, Urn};
use crate::model::ChangeLogEvent;
use crate::registry::AspectSpec;
use futures::future::BoxFuture;

/// Transport of change-log events to downstream consumers.
pub trait EventProducer: Send + Sync {
    /// Starts publishing `event`; the returned future completes on transport confirmation.
    fn produce_change_log(
        &self,
        urn: &Urn,
        aspect_spec: &AspectSpec,
        event: ChangeLogEvent,
    ) -> BoxFuture<'static, Result<()>>;
}
