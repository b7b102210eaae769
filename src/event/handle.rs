use crate::core::{Result, StoreError};
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug)]
enum Publish {
    Spawned(JoinHandle<Result<()>>),
    Rejected(StoreError),
}

/// An in-flight change-log publish.
///
/// Dropping the handle detaches the publish; it still runs to completion.
#[derive(Debug)]
pub struct ChangeLogHandle {
    publish: Publish,
}

impl ChangeLogHandle {
    /// Spawns `publish` on the current Tokio runtime.
    ///
    /// Outside a runtime nothing is spawned and the handle resolves to a
    /// `PublishError`.
    pub fn spawn<F>(publish: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let publish = match Handle::try_current() {
            Ok(runtime) => Publish::Spawned(runtime.spawn(publish)),
            Err(err) => Publish::Rejected(StoreError::PublishError(format!(
                "change log publish needs a tokio runtime: {}",
                err
            ))),
        };
        Self { publish }
    }

    pub fn is_finished(&self) -> bool {
        match &self.publish {
            Publish::Spawned(join_handle) => join_handle.is_finished(),
            Publish::Rejected(_) => true,
        }
    }

    /// Waits for transport confirmation.
    pub async fn join(self) -> Result<()> {
        match self.publish {
            Publish::Spawned(join_handle) => join_handle.await.map_err(|err| {
                StoreError::PublishError(format!("change log publish join: {}", err))
            })?,
            Publish::Rejected(err) => Err(err),
        }
    }
}
