//! Document store contract shared by every engagement component.
//!
//! Keys are plain strings namespaced by prefix (`issue:`, `upvote:`, ...), values
//! are JSON documents. Every stored document carries a version drawn from a
//! store-wide monotonic sequence, so a deleted-then-recreated key never reuses a
//! version a stale reader might still be holding.
//!
//! Conditional writes are the only concurrency primitive the domain relies on:
//!
//! | Need                               | Primitive                              |
//! |------------------------------------|----------------------------------------|
//! | at most one record per key         | `put` with [`Precondition::DoesNotExist`] |
//! | read-modify-write without lost updates | `put` with [`Precondition::MatchesVersion`] |
//! | invariant spanning two keys        | [`DocumentStore::commit`] batch          |
//! | sequence numbers                   | [`DocumentStore::atomic_increment`]      |
//!
//! A failed precondition is a normal [`WriteOutcome::PreconditionFailed`], never an error.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode or decode document {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            StoreError::Serialization { .. } => false,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A raw stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub value: Value,
    pub version: u64,
}

/// A decoded document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Condition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Apply unconditionally.
    None,
    /// Apply only if the key is absent.
    DoesNotExist,
    /// Apply only if the key exists at exactly this version.
    MatchesVersion(u64),
}

impl Precondition {
    /// Precondition that holds only if nothing changed since `observed` was read.
    pub fn unchanged_since<T>(observed: Option<&Versioned<T>>) -> Self {
        match observed {
            Some(doc) => Precondition::MatchesVersion(doc.version),
            None => Precondition::DoesNotExist,
        }
    }

    /// Checks the precondition against the current version of a key.
    pub fn holds(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (Precondition::None, _) => true,
            (Precondition::DoesNotExist, None) => true,
            (Precondition::DoesNotExist, Some(_)) => false,
            (Precondition::MatchesVersion(expected), Some(actual)) => *expected == actual,
            (Precondition::MatchesVersion(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Value),
    Delete,
}

/// One conditional write inside a [`DocumentStore::commit`] batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub key: String,
    pub op: WriteOp,
    pub precondition: Precondition,
}

impl Write {
    pub fn put(key: impl Into<String>, value: Value, precondition: Precondition) -> Self {
        Self {
            key: key.into(),
            op: WriteOp::Put(value),
            precondition,
        }
    }

    pub fn delete(key: impl Into<String>, precondition: Precondition) -> Self {
        Self {
            key: key.into(),
            op: WriteOp::Delete,
            precondition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every write in the batch was applied.
    Committed,
    /// Nothing was applied; `key` is the first write whose precondition failed.
    PreconditionFailed { key: String },
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed)
    }
}

/// Durable key/document store.
///
/// Implementations must apply a `commit` batch atomically: either every write
/// lands or none does, and preconditions are evaluated against the state the
/// batch is applied to.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> StoreResult<Option<Document>>;

    /// Every document whose key starts with `prefix`, ordered by key.
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Document)>>;

    /// Increments the named counter and returns the new value (first call returns 1).
    async fn atomic_increment(&self, counter: &str) -> StoreResult<i64>;

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<WriteOutcome>;

    async fn put(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> StoreResult<WriteOutcome> {
        self.commit(vec![Write::put(key, value, precondition)]).await
    }

    async fn delete(&self, key: &str, precondition: Precondition) -> StoreResult<WriteOutcome> {
        self.commit(vec![Write::delete(key, precondition)]).await
    }

    /// Cheap liveness check used by the health route.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Serializes a record for storage under `key`.
pub fn encode<T: Serialize>(key: &str, value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, document: Document) -> StoreResult<Versioned<T>> {
    let value = serde_json::from_value(document.value).map_err(|source| {
        StoreError::Serialization {
            key: key.to_string(),
            source,
        }
    })?;
    Ok(Versioned {
        value,
        version: document.version,
    })
}

/// Reads and decodes a single record.
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    key: &str,
) -> StoreResult<Option<Versioned<T>>> {
    match store.get(key).await? {
        Some(document) => decode(key, document).map(Some),
        None => Ok(None),
    }
}

/// Reads and decodes every record under `prefix`, ordered by key.
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    prefix: &str,
) -> StoreResult<Vec<Versioned<T>>> {
    store
        .scan(prefix)
        .await?
        .into_iter()
        .map(|(key, document)| decode(&key, document))
        .collect()
}
