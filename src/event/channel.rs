use super::EventProducer;
use crate::core::{Result, StoreError, Urn};
use crate::model::ChangeLogEvent;
use crate::registry::AspectSpec;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

/// Producer that hands events to an in-process bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventProducer {
    sender: mpsc::Sender<ChangeLogEvent>,
}

impl ChannelEventProducer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChangeLogEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl EventProducer for ChannelEventProducer {
    fn produce_change_log(
        &self,
        _urn: &Urn,
        _aspect_spec: &AspectSpec,
        event: ChangeLogEvent,
    ) -> BoxFuture<'static, Result<()>> {
        let sender = self.sender.clone();
        async move {
            sender.send(event).await.map_err(|err| {
                StoreError::PublishError(format!(
                    "change log channel closed, dropped event {}",
                    err.0.event_id
                ))
            })
        }
        .boxed()
    }
}
