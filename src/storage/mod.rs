// ============================================================================
// Aspect Storage
// ============================================================================
//
// Storage collaborator of the entity service: row reads and writes scoped to
// a transaction, optimistic-lock conflict reporting, and paged streaming of
// the latest row per key for index restore.
//
// ============================================================================

pub mod memory;
pub mod pattern;
pub mod stream;
pub mod transaction;

pub use memory::InMemoryAspectDao;
pub use stream::PartitionedStream;
pub use transaction::{
    AspectTransaction, RetryPolicy, TransactionId, TransactionResult, run_in_transaction_with_retry,
};

use crate::core::Result;
use crate::model::{AspectRow, RestoreIndicesArgs};
use async_trait::async_trait;

/// Row store for versioned aspects.
///
/// Every key `(urn, aspect)` holds an ordered history of row versions; the
/// highest version is the latest. Writes become visible at `commit`, which
/// fails with `StoreError::WriteConflict` when another transaction committed
/// a change to a written key after this transaction first touched it.
#[async_trait]
pub trait AspectDao: Send + Sync {
    async fn begin(&self) -> Result<TransactionId>;

    async fn commit(&self, tx: TransactionId) -> Result<()>;

    async fn rollback(&self, tx: TransactionId) -> Result<()>;

    async fn get_latest_aspect(
        &self,
        tx: TransactionId,
        urn: &str,
        aspect: &str,
    ) -> Result<Option<AspectRow>>;

    async fn get_aspect(
        &self,
        tx: TransactionId,
        urn: &str,
        aspect: &str,
        version: i64,
    ) -> Result<Option<AspectRow>>;

    /// Inserts the row at `row.version`, replacing a row already stored there.
    async fn save_aspect(&self, tx: TransactionId, row: AspectRow) -> Result<()>;

    /// Removes one row version; `StoreError::EntityNotFound` when it is absent.
    async fn delete_aspect(
        &self,
        tx: TransactionId,
        urn: &str,
        aspect: &str,
        version: i64,
    ) -> Result<AspectRow>;

    /// Latest row of every aspect stored for `urn`, ordered by aspect name.
    async fn list_latest_aspects(&self, tx: TransactionId, urn: &str) -> Result<Vec<AspectRow>>;

    /// Latest committed row per key, ordered by `(urn, aspect)`, filtered and
    /// windowed by `args`.
    async fn stream_aspect_batches(
        &self,
        args: &RestoreIndicesArgs,
    ) -> Result<PartitionedStream<AspectRow>>;
}
