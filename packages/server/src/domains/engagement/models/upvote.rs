use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::IssueId;
use crate::kernel::store::{encode, load_all};
use crate::kernel::{DocumentStore, Precondition, StoreResult, Write};

/// One user's vote on one issue. At most one exists per (issue, user);
/// records are never edited and only disappear with their issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpvoteRecord {
    pub issue_id: IssueId,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
}

impl UpvoteRecord {
    pub fn new(issue_id: IssueId, user_email: &str) -> Self {
        Self {
            issue_id,
            user_email: user_email.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn key(issue_id: IssueId, user_email: &str) -> String {
        format!("{}{}", Self::issue_prefix(issue_id), user_email)
    }

    pub fn issue_prefix(issue_id: IssueId) -> String {
        format!("upvote:{}:", issue_id)
    }

    pub async fn exists(issue_id: IssueId, user_email: &str, store: &dyn DocumentStore) -> StoreResult<bool> {
        Ok(store.get(&Self::key(issue_id, user_email)).await?.is_some())
    }

    pub async fn find_for_issue(issue_id: IssueId, store: &dyn DocumentStore) -> StoreResult<Vec<Self>> {
        Ok(load_all::<Self>(store, &Self::issue_prefix(issue_id))
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .collect())
    }

    /// Insert that fails if this user already voted.
    pub fn insert_write(&self) -> StoreResult<Write> {
        let key = Self::key(self.issue_id, &self.user_email);
        Ok(Write::put(&key, encode(&key, self)?, Precondition::DoesNotExist))
    }
}
