//! Counter allocator: dense, monotonically increasing, never-reused numbers.
//!
//! The current value lives only in the store. Allocation is a single
//! `atomic_increment`, so concurrent callers can never observe the same value
//! and a deleted issue's number is never handed out again.

use std::sync::Arc;

use crate::kernel::{DocumentStore, StoreResult};

/// Sequence that numbers issues.
pub const ISSUE_NUMBER_SEQUENCE: &str = "issue_number";

#[derive(Clone)]
pub struct CounterAllocator {
    store: Arc<dyn DocumentStore>,
}

impl CounterAllocator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Allocate the next value of `sequence` (the first allocation returns 1).
    pub async fn next(&self, sequence: &str) -> StoreResult<i64> {
        let value = self.store.atomic_increment(sequence).await?;
        tracing::debug!(sequence, value, "Allocated sequence value");
        Ok(value)
    }
}
