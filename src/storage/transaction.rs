// ============================================================================
// Transactions
// ============================================================================
//
// A transaction body is a closure over an `AspectTransaction` handle. All
// storage calls made through the handle share one transaction; the retry
// wrapper re-runs the whole body when commit reports a write conflict.
//
// ============================================================================

use super::AspectDao;
use crate::core::{Result, StoreError, Urn, classify_conflict};
use crate::model::{AspectRow, SystemAspect};
use crate::telemetry::{ENTITY_SERVICE_SCOPE, MetricUtils, TRANSACTION_RETRY};
use log::warn;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Outcome of a transaction body: keep its writes, or discard them.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResult<T> {
    Commit(T),
    Abort(T),
}

/// Handle passed to a transaction body.
#[derive(Clone)]
pub struct AspectTransaction {
    dao: Arc<dyn AspectDao>,
    id: TransactionId,
    attempt: u32,
}

impl AspectTransaction {
    pub fn new(dao: Arc<dyn AspectDao>, id: TransactionId, attempt: u32) -> Self {
        Self { dao, id, attempt }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// 1-based attempt number of the enclosing retry loop.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub async fn get_latest_row(&self, urn: &Urn, aspect: &str) -> Result<Option<AspectRow>> {
        self.dao.get_latest_aspect(self.id, urn.as_str(), aspect).await
    }

    pub async fn get_latest(&self, urn: &Urn, aspect: &str) -> Result<Option<SystemAspect>> {
        self.get_latest_row(urn, aspect)
            .await?
            .map(|row| SystemAspect::from_row(&row))
            .transpose()
    }

    pub async fn get_version(
        &self,
        urn: &Urn,
        aspect: &str,
        version: i64,
    ) -> Result<Option<SystemAspect>> {
        self.dao
            .get_aspect(self.id, urn.as_str(), aspect, version)
            .await?
            .map(|row| SystemAspect::from_row(&row))
            .transpose()
    }

    pub async fn save(&self, aspect: &SystemAspect) -> Result<()> {
        self.dao.save_aspect(self.id, aspect.to_row()?).await
    }

    pub async fn delete_version(&self, urn: &Urn, aspect: &str, version: i64) -> Result<AspectRow> {
        self.dao
            .delete_aspect(self.id, urn.as_str(), aspect, version)
            .await
    }

    pub async fn list_latest(&self, urn: &Urn) -> Result<Vec<AspectRow>> {
        self.dao.list_latest_aspects(self.id, urn.as_str()).await
    }
}

/// Attempt budget and exponential backoff of the retry wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 5,
            max_backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Computes exponential retry backoff in milliseconds.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.base_backoff_ms.max(1);
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        backoff
    }
}

/// Executes `body` inside a transaction, re-running it on write conflicts.
///
/// Non-conflict errors abort immediately. Running out of attempts surfaces
/// `StoreError::RetriesExhausted`; nothing of the failed attempts is visible.
pub async fn run_in_transaction_with_retry<F, Fut, T>(
    dao: &Arc<dyn AspectDao>,
    policy: &RetryPolicy,
    metrics: &MetricUtils,
    mut body: F,
) -> Result<T>
where
    F: FnMut(AspectTransaction) -> Fut,
    Fut: Future<Output = Result<TransactionResult<T>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        let tx_id = dao.begin().await?;
        let outcome = match body(AspectTransaction::new(dao.clone(), tx_id, attempt)).await {
            Ok(TransactionResult::Commit(value)) => dao.commit(tx_id).await.map(|_| value),
            Ok(TransactionResult::Abort(value)) => {
                dao.rollback(tx_id).await?;
                return Ok(value);
            }
            Err(err) => {
                if let Err(rollback_err) = dao.rollback(tx_id).await {
                    warn!("rollback of {} failed: {}", tx_id, rollback_err);
                }
                Err(err)
            }
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(kind) = classify_conflict(&err) else {
            return Err(err);
        };

        if attempt >= max_attempts {
            return Err(StoreError::RetriesExhausted {
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        metrics.exception_increment(ENTITY_SERVICE_SCOPE, TRANSACTION_RETRY, &err);
        let backoff_ms = policy.backoff_ms(attempt);
        warn!(
            "EntityService.transaction retry on {} conflict (attempt {} of {}): {} (backoff={}ms)",
            kind, attempt, max_attempts, err, backoff_ms
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        attempt += 1;
    }
}
