use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{IssueId, StatusLogEntryId};
use crate::domains::issues::models::IssueStatus;
use crate::kernel::store::{encode, load_all};
use crate::kernel::{DocumentStore, Precondition, StoreResult, Write};

/// One executed status transition. Written once, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusLogEntry {
    pub id: StatusLogEntryId,
    pub issue_id: IssueId,
    pub from_status: IssueStatus,
    pub to_status: IssueStatus,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

impl StatusLogEntry {
    /// `None` when the transition is a no-op.
    pub fn transition(
        issue_id: IssueId,
        from_status: IssueStatus,
        to_status: IssueStatus,
        actor: &str,
        changed_at: DateTime<Utc>,
    ) -> Option<Self> {
        (from_status != to_status).then(|| Self {
            id: StatusLogEntryId::new(),
            issue_id,
            from_status,
            to_status,
            actor: actor.to_string(),
            changed_at,
        })
    }

    pub fn key(issue_id: IssueId, id: StatusLogEntryId) -> String {
        format!("{}{}", Self::issue_prefix(issue_id), id)
    }

    pub fn issue_prefix(issue_id: IssueId) -> String {
        format!("status_log:{}:", issue_id)
    }

    /// Append-only insert.
    pub fn append_write(&self) -> StoreResult<Write> {
        let key = Self::key(self.issue_id, self.id);
        Ok(Write::put(&key, encode(&key, self)?, Precondition::DoesNotExist))
    }

    /// Entries for an issue ordered by `changed_at`, oldest first.
    pub async fn find_for_issue(issue_id: IssueId, store: &dyn DocumentStore) -> StoreResult<Vec<Self>> {
        let mut entries: Vec<Self> = load_all::<Self>(store, &Self::issue_prefix(issue_id))
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .collect();
        entries.sort_by(|a, b| a.changed_at.cmp(&b.changed_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }
}
