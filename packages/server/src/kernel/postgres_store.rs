//! Postgres-backed `DocumentStore`.
//!
//! Schema (see `migrations/`):
//! - `documents(key, value jsonb, version)` where `version` is drawn from the
//!   `document_versions` sequence on every write.
//! - `counters(name, value)` for sequence allocation.
//!
//! Conditional writes are single statements whose `WHERE` clause carries the
//! precondition; a batch runs inside one transaction and is rolled back as soon
//! as any statement matches zero rows.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use super::store::{
    Document, DocumentStore, Precondition, StoreResult, Write, WriteOp, WriteOutcome,
};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies one write inside `tx`; returns false if its precondition failed.
    async fn apply(tx: &mut Transaction<'_, Postgres>, write: &Write) -> StoreResult<bool> {
        let applied = match (&write.op, write.precondition) {
            (WriteOp::Put(value), Precondition::None) => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (key, value)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO UPDATE
                    SET value = EXCLUDED.value,
                        version = nextval('document_versions'),
                        updated_at = NOW()
                    "#,
                )
                .bind(&write.key)
                .bind(value)
                .execute(&mut **tx)
                .await?
                .rows_affected()
                    > 0
            }
            (WriteOp::Put(value), Precondition::DoesNotExist) => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (key, value)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO NOTHING
                    "#,
                )
                .bind(&write.key)
                .bind(value)
                .execute(&mut **tx)
                .await?
                .rows_affected()
                    > 0
            }
            (WriteOp::Put(value), Precondition::MatchesVersion(version)) => {
                sqlx::query(
                    r#"
                    UPDATE documents
                    SET value = $2,
                        version = nextval('document_versions'),
                        updated_at = NOW()
                    WHERE key = $1 AND version = $3
                    "#,
                )
                .bind(&write.key)
                .bind(value)
                .bind(version as i64)
                .execute(&mut **tx)
                .await?
                .rows_affected()
                    > 0
            }
            (WriteOp::Delete, Precondition::None) => {
                sqlx::query("DELETE FROM documents WHERE key = $1")
                    .bind(&write.key)
                    .execute(&mut **tx)
                    .await?;
                true
            }
            (WriteOp::Delete, Precondition::DoesNotExist) => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM documents WHERE key = $1)")
                        .bind(&write.key)
                        .fetch_one(&mut **tx)
                        .await?;
                !exists
            }
            (WriteOp::Delete, Precondition::MatchesVersion(version)) => {
                sqlx::query("DELETE FROM documents WHERE key = $1 AND version = $2")
                    .bind(&write.key)
                    .bind(version as i64)
                    .execute(&mut **tx)
                    .await?
                    .rows_affected()
                    > 0
            }
        };

        Ok(applied)
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, (Value, i64)>(
            "SELECT value, version FROM documents WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value, version)| Document {
            value,
            version: version as u64,
        }))
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Document)>> {
        let rows = sqlx::query_as::<_, (String, Value, i64)>(
            r#"
            SELECT key, value, version
            FROM documents
            WHERE key LIKE $1 ESCAPE '\'
            ORDER BY key
            "#,
        )
        .bind(like_prefix_pattern(prefix))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, value, version)| {
                (
                    key,
                    Document {
                        value,
                        version: version as u64,
                    },
                )
            })
            .collect())
    }

    async fn atomic_increment(&self, counter: &str) -> StoreResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (name, value)
            VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE
            SET value = counters.value + 1
            RETURNING value
            "#,
        )
        .bind(counter)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<WriteOutcome> {
        let mut tx = self.pool.begin().await?;

        for write in &writes {
            if !Self::apply(&mut tx, write).await? {
                tx.rollback().await?;
                return Ok(WriteOutcome::PreconditionFailed {
                    key: write.key.clone(),
                });
            }
        }

        tx.commit().await?;
        Ok(WriteOutcome::Committed)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// `LIKE` pattern matching keys that start with `prefix`. A left-anchored
/// `LIKE` can use the `text_pattern_ops` index on `documents.key`.
fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
