//! Kernel module - server infrastructure and dependencies.

pub mod memory_store;
pub mod postgres_store;
pub mod retry;
pub mod store;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;

pub use memory_store::MemoryStore;
pub use postgres_store::PostgresStore;
pub use retry::{Attempt, RetryPolicy, Retryable};
pub use store::{
    DocumentStore, Precondition, StoreError, StoreResult, Versioned, Write, WriteOutcome,
};
pub use stream_hub::{Frame, StreamHub, Subscription, ALL_TOPIC};
pub use test_dependencies::{FaultInjectingStore, MockDuplicateScorer};
pub use traits::*;
