use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::common::{CommentId, IssueId};
use crate::kernel::store::{encode, load_all};
use crate::kernel::{DocumentStore, Precondition, StoreResult, Write};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub issue_id: IssueId,
    pub user: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(issue_id: IssueId, user: &str, message: &str) -> Self {
        Self {
            id: CommentId::new(),
            issue_id,
            user: user.to_string(),
            message: message.trim().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Keys are `comment:{issue}:{comment}`; v7 comment ids keep them chronological.
    pub fn key(issue_id: IssueId, id: CommentId) -> String {
        format!("{}{}", Self::issue_prefix(issue_id), id)
    }

    pub fn issue_prefix(issue_id: IssueId) -> String {
        format!("comment:{}:", issue_id)
    }

    /// Comments on an issue, oldest first.
    pub async fn find_for_issue(issue_id: IssueId, store: &dyn DocumentStore) -> StoreResult<Vec<Self>> {
        let mut comments: Vec<Self> = load_all::<Self>(store, &Self::issue_prefix(issue_id))
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    /// Distinct users who have commented on an issue.
    pub async fn commenters(issue_id: IssueId, store: &dyn DocumentStore) -> StoreResult<BTreeSet<String>> {
        Ok(Self::find_for_issue(issue_id, store)
            .await?
            .into_iter()
            .map(|comment| comment.user)
            .collect())
    }

    pub async fn has_commented(
        issue_id: IssueId,
        user: &str,
        store: &dyn DocumentStore,
    ) -> StoreResult<bool> {
        Ok(Self::commenters(issue_id, store).await?.contains(user))
    }

    pub fn insert_write(&self) -> StoreResult<Write> {
        let key = Self::key(self.issue_id, self.id);
        Ok(Write::put(&key, encode(&key, self)?, Precondition::DoesNotExist))
    }
}
