use super::{AspectDao, PartitionedStream, TransactionId, pattern::compile_like};
use crate::core::{Result, StoreError};
use crate::model::{AspectRow, RestoreIndicesArgs};
use async_trait::async_trait;
use im::OrdMap;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{Mutex, RwLock};

type AspectKey = (String, String);
type History = OrdMap<i64, AspectRow>;

#[derive(Debug, Default)]
struct CommittedState {
    table: OrdMap<AspectKey, History>,
    /// Commit sequence that last changed each key.
    stamps: HashMap<AspectKey, u64>,
    commit_seq: u64,
}

impl CommittedState {
    fn stamp(&self, key: &AspectKey) -> u64 {
        self.stamps.get(key).copied().unwrap_or(0)
    }

    fn apply(&mut self, key: AspectKey, rows: History) {
        self.commit_seq += 1;
        if rows.is_empty() {
            self.table.remove(&key);
        } else {
            self.table.insert(key.clone(), rows);
        }
        self.stamps.insert(key, self.commit_seq);
    }
}

#[derive(Debug)]
struct TouchedKey {
    observed_stamp: u64,
    rows: History,
    dirty: bool,
}

/// Private copy-on-touch view of the keys a transaction has read or written.
#[derive(Debug, Default)]
struct PendingTransaction {
    touched: HashMap<AspectKey, TouchedKey>,
}

impl PendingTransaction {
    fn touch(&mut self, key: AspectKey, committed: &CommittedState) -> &mut TouchedKey {
        match self.touched.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let observed_stamp = committed.stamp(entry.key());
                let rows = committed.table.get(entry.key()).cloned().unwrap_or_default();
                entry.insert(TouchedKey {
                    observed_stamp,
                    rows,
                    dirty: false,
                })
            }
        }
    }
}

/// Aspect store kept in process memory with optimistic locking.
///
/// Histories are persistent `im` maps, so a transaction's private copy of a
/// key costs a pointer clone until it writes.
#[derive(Debug, Default)]
pub struct InMemoryAspectDao {
    committed: RwLock<CommittedState>,
    pending: Mutex<HashMap<TransactionId, PendingTransaction>>,
    injected_conflicts: AtomicU32,
}

fn key(urn: &str, aspect: &str) -> AspectKey {
    (urn.to_string(), aspect.to_string())
}

fn transaction_not_found(tx: TransactionId) -> StoreError {
    StoreError::ExecutionError(format!("Transaction {} not found", tx))
}

impl InMemoryAspectDao {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row straight into committed state, bypassing transactions.
    ///
    /// Lets callers seed history, including rows that no longer deserialize.
    pub async fn insert_raw_row(&self, row: AspectRow) {
        let mut committed = self.committed.write().await;
        let key = key(&row.urn, &row.aspect);
        let mut rows = committed.table.get(&key).cloned().unwrap_or_default();
        rows.insert(row.version, row);
        committed.apply(key, rows);
    }

    /// Makes the next `count` writing commits fail with a write-write conflict.
    pub fn inject_commit_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Committed latest row of a key.
    pub async fn latest(&self, urn: &str, aspect: &str) -> Option<AspectRow> {
        let committed = self.committed.read().await;
        committed
            .table
            .get(&key(urn, aspect))
            .and_then(|rows| rows.get_max())
            .map(|(_, row)| row.clone())
    }

    /// Committed history of a key, oldest row version first.
    pub async fn history(&self, urn: &str, aspect: &str) -> Vec<AspectRow> {
        let committed = self.committed.read().await;
        committed
            .table
            .get(&key(urn, aspect))
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed rows across all keys.
    pub async fn row_count(&self) -> usize {
        let committed = self.committed.read().await;
        committed.table.values().map(|rows| rows.len()).sum()
    }

    pub async fn active_transactions(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn with_key<R>(
        &self,
        tx: TransactionId,
        key: AspectKey,
        f: impl FnOnce(&mut TouchedKey) -> R,
    ) -> Result<R> {
        let mut pending = self.pending.lock().await;
        let txn = pending.get_mut(&tx).ok_or_else(|| transaction_not_found(tx))?;
        let committed = self.committed.read().await;
        Ok(f(txn.touch(key, &committed)))
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AspectDao for InMemoryAspectDao {
    async fn begin(&self) -> Result<TransactionId> {
        let tx = TransactionId::new();
        self.pending.lock().await.insert(tx, PendingTransaction::default());
        Ok(tx)
    }

    async fn commit(&self, tx: TransactionId) -> Result<()> {
        let txn = self
            .pending
            .lock()
            .await
            .remove(&tx)
            .ok_or_else(|| transaction_not_found(tx))?;

        let writes = txn
            .touched
            .into_iter()
            .filter(|(_, touched)| touched.dirty)
            .collect::<Vec<_>>();
        if writes.is_empty() {
            return Ok(());
        }

        if self.take_injected_conflict() {
            return Err(StoreError::WriteConflict(format!(
                "Write-write conflict detected for {}",
                tx
            )));
        }

        let mut committed = self.committed.write().await;
        if let Some((key, _)) = writes
            .iter()
            .find(|(key, touched)| committed.stamp(key) != touched.observed_stamp)
        {
            return Err(StoreError::WriteConflict(format!(
                "optimistic lock conflict on {}/{}: changed after {} read it",
                key.0, key.1, tx
            )));
        }

        for (key, touched) in writes {
            committed.apply(key, touched.rows);
        }
        Ok(())
    }

    async fn rollback(&self, tx: TransactionId) -> Result<()> {
        self.pending.lock().await.remove(&tx);
        Ok(())
    }

    async fn get_latest_aspect(
        &self,
        tx: TransactionId,
        urn: &str,
        aspect: &str,
    ) -> Result<Option<AspectRow>> {
        self.with_key(tx, key(urn, aspect), |touched| {
            touched.rows.get_max().map(|(_, row)| row.clone())
        })
        .await
    }

    async fn get_aspect(
        &self,
        tx: TransactionId,
        urn: &str,
        aspect: &str,
        version: i64,
    ) -> Result<Option<AspectRow>> {
        self.with_key(tx, key(urn, aspect), |touched| touched.rows.get(&version).cloned())
            .await
    }

    async fn save_aspect(&self, tx: TransactionId, row: AspectRow) -> Result<()> {
        self.with_key(tx, key(&row.urn, &row.aspect), |touched| {
            touched.rows.insert(row.version, row);
            touched.dirty = true;
        })
        .await
    }

    async fn delete_aspect(
        &self,
        tx: TransactionId,
        urn: &str,
        aspect: &str,
        version: i64,
    ) -> Result<AspectRow> {
        self.with_key(tx, key(urn, aspect), |touched| {
            let removed = touched.rows.remove(&version);
            if removed.is_some() {
                touched.dirty = true;
            }
            removed
        })
        .await?
        .ok_or_else(|| {
            StoreError::EntityNotFound(format!("{}/{} row version {}", urn, aspect, version))
        })
    }

    async fn list_latest_aspects(&self, tx: TransactionId, urn: &str) -> Result<Vec<AspectRow>> {
        let mut pending = self.pending.lock().await;
        let txn = pending.get_mut(&tx).ok_or_else(|| transaction_not_found(tx))?;
        let committed = self.committed.read().await;

        let mut keys = committed
            .table
            .keys()
            .filter(|(key_urn, _)| key_urn == urn)
            .cloned()
            .collect::<BTreeSet<_>>();
        keys.extend(txn.touched.keys().filter(|(key_urn, _)| key_urn == urn).cloned());

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                txn.touch(key, &committed)
                    .rows
                    .get_max()
                    .map(|(_, row)| row.clone())
            })
            .collect())
    }

    async fn stream_aspect_batches(
        &self,
        args: &RestoreIndicesArgs,
    ) -> Result<PartitionedStream<AspectRow>> {
        let urn_like = args.urn_like.as_deref().map(compile_like).transpose()?;
        let snapshot = self.committed.read().await.table.clone();

        let rows = snapshot
            .iter()
            .filter(|((urn, aspect), _)| {
                (args.aspect_names.is_empty() || args.aspect_names.contains(aspect))
                    && args.urn.as_ref().is_none_or(|target| target == urn)
                    && urn_like.as_ref().is_none_or(|regex| regex.is_match(urn))
            })
            .filter_map(|(_, rows)| rows.get_max().map(|(_, row)| row.clone()))
            .skip(args.start)
            .take(args.limit)
            .collect::<Vec<_>>();

        Ok(PartitionedStream::from_vec(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;

    fn row(urn: &str, aspect: &str, version: i64, metadata: &str) -> AspectRow {
        AspectRow {
            urn: urn.into(),
            aspect: aspect.into(),
            version,
            metadata: metadata.into(),
            created_on: Utc::now(),
            created_by: "urn:li:corpuser:tester".into(),
            created_for: None,
            system_metadata: None,
        }
    }

    #[tokio::test]
    async fn writes_are_private_until_commit() {
        let dao = InMemoryAspectDao::new();
        let tx = dao.begin().await.unwrap();
        dao.save_aspect(tx, row("urn:li:corpuser:a", "status", 0, "{}"))
            .await
            .unwrap();

        assert!(dao.latest("urn:li:corpuser:a", "status").await.is_none());
        assert!(
            dao.get_latest_aspect(tx, "urn:li:corpuser:a", "status")
                .await
                .unwrap()
                .is_some()
        );

        dao.commit(tx).await.unwrap();
        assert_eq!(dao.latest("urn:li:corpuser:a", "status").await.unwrap().version, 0);
        assert_eq!(dao.active_transactions().await, 0);
    }

    #[tokio::test]
    async fn concurrent_writers_conflict() {
        let dao = InMemoryAspectDao::new();
        let first = dao.begin().await.unwrap();
        let second = dao.begin().await.unwrap();

        for tx in [first, second] {
            assert!(
                dao.get_latest_aspect(tx, "urn:li:corpuser:a", "status")
                    .await
                    .unwrap()
                    .is_none()
            );
            dao.save_aspect(tx, row("urn:li:corpuser:a", "status", 0, "{}"))
                .await
                .unwrap();
        }

        dao.commit(first).await.unwrap();
        let err = dao.commit(second).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(dao.row_count().await, 1);
    }

    #[tokio::test]
    async fn injected_conflicts_only_hit_writers() {
        let dao = InMemoryAspectDao::new();
        dao.inject_commit_conflicts(1);

        let reader = dao.begin().await.unwrap();
        dao.get_latest_aspect(reader, "urn:li:corpuser:a", "status")
            .await
            .unwrap();
        dao.commit(reader).await.unwrap();

        let writer = dao.begin().await.unwrap();
        dao.save_aspect(writer, row("urn:li:corpuser:a", "status", 0, "{}"))
            .await
            .unwrap();
        assert!(matches!(dao.commit(writer).await, Err(StoreError::WriteConflict(_))));
    }

    #[tokio::test]
    async fn deleting_latest_exposes_previous() {
        let dao = InMemoryAspectDao::new();
        dao.insert_raw_row(row("urn:li:corpuser:a", "status", 0, r#"{"removed":false}"#))
            .await;
        dao.insert_raw_row(row("urn:li:corpuser:a", "status", 1, r#"{"removed":true}"#))
            .await;

        let tx = dao.begin().await.unwrap();
        dao.delete_aspect(tx, "urn:li:corpuser:a", "status", 1).await.unwrap();
        let latest = dao
            .get_latest_aspect(tx, "urn:li:corpuser:a", "status")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 0);

        let missing = dao.delete_aspect(tx, "urn:li:corpuser:a", "status", 7).await;
        assert!(matches!(missing, Err(StoreError::EntityNotFound(_))));
        dao.commit(tx).await.unwrap();

        assert_eq!(dao.history("urn:li:corpuser:a", "status").await.len(), 1);
    }

    #[tokio::test]
    async fn streams_latest_rows_in_key_order() {
        let dao = InMemoryAspectDao::new();
        dao.insert_raw_row(row("urn:li:corpuser:b", "status", 0, "{}")).await;
        dao.insert_raw_row(row("urn:li:corpuser:a", "status", 0, "{}")).await;
        dao.insert_raw_row(row("urn:li:corpuser:a", "status", 1, "{}")).await;
        dao.insert_raw_row(row("urn:li:corpuser:a", "corpUserInfo", 0, "{}")).await;

        let args = RestoreIndicesArgs::new();
        let rows = dao
            .stream_aspect_batches(&args)
            .await
            .unwrap()
            .into_inner()
            .collect::<Vec<_>>()
            .await;
        let keys = rows
            .iter()
            .map(|r| (r.urn.as_str(), r.aspect.as_str(), r.version))
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                ("urn:li:corpuser:a", "corpUserInfo", 0),
                ("urn:li:corpuser:a", "status", 1),
                ("urn:li:corpuser:b", "status", 0),
            ]
        );

        let filtered = dao
            .stream_aspect_batches(&RestoreIndicesArgs::new().urn_like("%:b").start(0).limit(5))
            .await
            .unwrap()
            .into_inner()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(filtered.len(), 1);

        let windowed = dao
            .stream_aspect_batches(&RestoreIndicesArgs::new().start(1).limit(1))
            .await
            .unwrap()
            .into_inner()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(windowed[0].aspect, "status");
        assert_eq!(windowed.len(), 1);
    }

    #[tokio::test]
    async fn list_latest_includes_uncommitted_inserts() {
        let dao = InMemoryAspectDao::new();
        dao.insert_raw_row(row("urn:li:corpuser:a", "status", 0, "{}")).await;
        dao.insert_raw_row(row("urn:li:corpuser:ab", "status", 0, "{}")).await;

        let tx = dao.begin().await.unwrap();
        dao.save_aspect(tx, row("urn:li:corpuser:a", "corpUserKey", 0, "{}"))
            .await
            .unwrap();
        let aspects = dao
            .list_latest_aspects(tx, "urn:li:corpuser:a")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.aspect)
            .collect::<Vec<_>>();
        assert_eq!(aspects, vec!["corpUserKey".to_string(), "status".to_string()]);
    }
}
