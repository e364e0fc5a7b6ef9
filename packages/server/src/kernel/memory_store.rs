//! In-process `DocumentStore` used by tests and local development.
//!
//! A single mutex guards documents and counters together, which makes every
//! `commit` batch trivially atomic. The lock is never held across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::store::{
    Document, DocumentStore, StoreError, StoreResult, Write, WriteOp, WriteOutcome,
};

#[derive(Default)]
struct State {
    documents: BTreeMap<String, Document>,
    counters: HashMap<String, i64>,
    last_version: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails with `StoreError::Unavailable` until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored documents (all prefixes).
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.documents.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        Ok(self.lock()?.documents.get(key).cloned())
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Document)>> {
        let state = self.lock()?;
        Ok(state
            .documents
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect())
    }

    async fn atomic_increment(&self, counter: &str) -> StoreResult<i64> {
        let mut state = self.lock()?;
        let value = state.counters.entry(counter.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<WriteOutcome> {
        let mut state = self.lock()?;

        for write in &writes {
            let current = state.documents.get(&write.key).map(|doc| doc.version);
            if !write.precondition.holds(current) {
                return Ok(WriteOutcome::PreconditionFailed {
                    key: write.key.clone(),
                });
            }
        }

        for write in writes {
            match write.op {
                WriteOp::Put(value) => {
                    state.last_version += 1;
                    let version = state.last_version;
                    state.documents.insert(write.key, Document { value, version });
                }
                WriteOp::Delete => {
                    state.documents.remove(&write.key);
                }
            }
        }

        Ok(WriteOutcome::Committed)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::store::Precondition;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        let outcome = store
            .put("issue:1", json!({"title": "hello"}), Precondition::None)
            .await
            .unwrap();
        assert!(outcome.is_committed());

        let doc = store.get("issue:1").await.unwrap().unwrap();
        assert_eq!(doc.value, json!({"title": "hello"}));
    }

    #[tokio::test]
    async fn test_does_not_exist_rejects_second_insert() {
        let store = MemoryStore::new();
        store
            .put("upvote:a", json!(1), Precondition::DoesNotExist)
            .await
            .unwrap();
        let outcome = store
            .put("upvote:a", json!(2), Precondition::DoesNotExist)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WriteOutcome::PreconditionFailed {
                key: "upvote:a".into()
            }
        );
        assert_eq!(store.get("upvote:a").await.unwrap().unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_versions_never_reused_after_delete() {
        let store = MemoryStore::new();
        store.put("k", json!(1), Precondition::None).await.unwrap();
        let first = store.get("k").await.unwrap().unwrap().version;

        store.delete("k", Precondition::None).await.unwrap();
        store.put("k", json!(2), Precondition::None).await.unwrap();
        let second = store.get("k").await.unwrap().unwrap().version;

        assert!(second > first);
        let stale = store
            .put("k", json!(3), Precondition::MatchesVersion(first))
            .await
            .unwrap();
        assert!(!stale.is_committed());
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.put("b", json!("existing"), Precondition::None).await.unwrap();

        let outcome = store
            .commit(vec![
                Write::put("a", json!("new"), Precondition::DoesNotExist),
                Write::put("b", json!("clobber"), Precondition::DoesNotExist),
            ])
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::PreconditionFailed { key: "b".into() });
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(
            store.get("b").await.unwrap().unwrap().value,
            json!("existing")
        );
    }

    #[tokio::test]
    async fn test_scan_is_prefix_bounded_and_ordered() {
        let store = MemoryStore::new();
        for key in ["follow:x:b", "follow:x:a", "follow:y:a", "issue:x"] {
            store.put(key, json!(key), Precondition::None).await.unwrap();
        }

        let keys: Vec<String> = store
            .scan("follow:x:")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["follow:x:a", "follow:x:b"]);
    }

    #[tokio::test]
    async fn test_atomic_increment_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.atomic_increment("seq").await.unwrap()
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=32).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.get("anything").await.unwrap_err();
        assert!(err.is_transient());

        store.set_offline(false);
        assert!(store.get("anything").await.unwrap().is_none());
    }
}
