// TestDependencies - mock implementations for testing
//
// Provides canned collaborators that can be injected into the engine in tests.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::memory_store::MemoryStore;
use super::store::{Document, DocumentStore, StoreError, StoreResult, Write, WriteOutcome};
use super::traits::{BaseDuplicateScorer, ScoredCandidate};

// =============================================================================
// Mock Duplicate Scorer
// =============================================================================

/// Returns a fixed ranking (or a fixed failure) and records every call.
#[derive(Clone, Default)]
pub struct MockDuplicateScorer {
    candidates: Arc<Mutex<Vec<ScoredCandidate>>>,
    fail: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockDuplicateScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate(self, candidate: ScoredCandidate) -> Self {
        self.candidates.lock().unwrap().push(candidate);
        self
    }

    pub fn failing(self) -> Self {
        *self.fail.lock().unwrap() = true;
        self
    }

    /// (title, description) pairs passed to `score`.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseDuplicateScorer for MockDuplicateScorer {
    async fn score(&self, title: &str, description: &str) -> Result<Vec<ScoredCandidate>> {
        self.calls
            .lock()
            .unwrap()
            .push((title.to_string(), description.to_string()));

        if *self.fail.lock().unwrap() {
            anyhow::bail!("similarity service unavailable");
        }
        Ok(self.candidates.lock().unwrap().clone())
    }
}

// =============================================================================
// Fault Injecting Store
// =============================================================================

/// `MemoryStore` wrapper that sabotages commits touching chosen key prefixes.
///
/// Reads always pass through. A commit is judged as a whole: if any write in
/// the batch matches a faulted prefix, nothing in the batch is applied.
#[derive(Default)]
pub struct FaultInjectingStore {
    inner: MemoryStore,
    unavailable: Mutex<Vec<String>>,
    rejected: Mutex<Vec<String>>,
}

impl FaultInjectingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits touching `prefix` fail with `StoreError::Unavailable`.
    pub fn fail_writes_to(&self, prefix: &str) {
        self.unavailable.lock().unwrap().push(prefix.to_string());
    }

    /// Commits touching `prefix` report a lost precondition.
    pub fn reject_writes_to(&self, prefix: &str) {
        self.rejected.lock().unwrap().push(prefix.to_string());
    }

    pub fn heal(&self) {
        self.unavailable.lock().unwrap().clear();
        self.rejected.lock().unwrap().clear();
    }

    fn first_match<'a>(prefixes: &Mutex<Vec<String>>, writes: &'a [Write]) -> Option<&'a Write> {
        let prefixes = prefixes.lock().unwrap().clone();
        writes
            .iter()
            .find(|write| prefixes.iter().any(|prefix| write.key.starts_with(prefix.as_str())))
    }
}

#[async_trait]
impl DocumentStore for FaultInjectingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        self.inner.get(key).await
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Document)>> {
        self.inner.scan(prefix).await
    }

    async fn atomic_increment(&self, counter: &str) -> StoreResult<i64> {
        self.inner.atomic_increment(counter).await
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<WriteOutcome> {
        if let Some(write) = Self::first_match(&self.unavailable, &writes) {
            return Err(StoreError::Unavailable(format!("injected fault on {}", write.key)));
        }
        if let Some(write) = Self::first_match(&self.rejected, &writes) {
            return Ok(WriteOutcome::PreconditionFailed {
                key: write.key.clone(),
            });
        }
        self.inner.commit(writes).await
    }
}
