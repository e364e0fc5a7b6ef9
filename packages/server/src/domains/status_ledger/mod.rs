//! Status ledger: append-only audit log of issue status transitions.
//!
//! There is no update or delete path for individual entries. A wrong
//! transition is corrected by recording another one; entries only disappear
//! with an administrative purge of the whole issue.

pub mod models;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::common::IssueId;
use crate::domains::issues::models::IssueStatus;
use crate::kernel::{DocumentStore, Precondition, StoreResult, Write};
pub use models::StatusLogEntry;

/// Order for `history`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    /// Oldest first (audit display).
    #[default]
    #[serde(alias = "ascending")]
    Asc,
    /// Most recent first.
    #[serde(alias = "descending")]
    Desc,
}

#[derive(Clone)]
pub struct StatusLedger {
    store: Arc<dyn DocumentStore>,
}

impl StatusLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append a transition on its own. Returns `None` when `from == to` or
    /// when the store refuses the append; only a committed entry is returned.
    ///
    /// The engine instead folds [`StatusLogEntry::append_write`] into the same
    /// commit as the status change, so the two can never disagree.
    pub async fn record(
        &self,
        issue_id: IssueId,
        from: IssueStatus,
        to: IssueStatus,
        actor: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<StatusLogEntry>> {
        let Some(entry) = StatusLogEntry::transition(issue_id, from, to, actor, at) else {
            return Ok(None);
        };

        let outcome = self.store.commit(vec![entry.append_write()?]).await?;
        if !outcome.is_committed() {
            tracing::warn!(issue_id = %issue_id, %from, %to, actor, ?outcome, "Status transition not recorded");
            return Ok(None);
        }
        tracing::info!(issue_id = %issue_id, %from, %to, actor, "Status transition recorded");
        Ok(Some(entry))
    }

    pub async fn history(&self, issue_id: IssueId, order: HistoryOrder) -> StoreResult<Vec<StatusLogEntry>> {
        let mut entries = StatusLogEntry::find_for_issue(issue_id, self.store.as_ref()).await?;
        if order == HistoryOrder::Desc {
            entries.reverse();
        }
        Ok(entries)
    }

    /// Deletes for every entry of an issue (administrative purge only).
    pub async fn purge_writes(&self, issue_id: IssueId) -> StoreResult<Vec<Write>> {
        Ok(self
            .store
            .scan(&StatusLogEntry::issue_prefix(issue_id))
            .await?
            .into_iter()
            .map(|(key, _)| Write::delete(key, Precondition::None))
            .collect())
    }
}
