//! Per-(issue, user) votes and follows with idempotent, race-safe writes.
//!
//! Nothing here takes a lock. Each operation reads what it needs, then issues a
//! conditional write keyed on what it observed; losing the race means re-reading
//! under the shared [`RetryPolicy`].

use std::sync::Arc;

use serde::Serialize;

use super::models::{AutoFollow, FollowChange, FollowRecord, FollowState, FollowStatus, UpvoteRecord};
use crate::common::{EngineResult, IssueId};
use crate::domains::issues::models::Issue;
use crate::kernel::{Attempt, DocumentStore, Precondition, RetryPolicy, StoreResult, Write, WriteOutcome};

/// Result of an upvote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpvoteOutcome {
    pub success: bool,
    pub already_acted: bool,
    /// Issue vote count after the call.
    pub upvotes: i64,
}

impl UpvoteOutcome {
    fn recorded(upvotes: i64) -> Self {
        Self {
            success: true,
            already_acted: false,
            upvotes,
        }
    }

    fn already_voted(upvotes: i64) -> Self {
        Self {
            success: false,
            already_acted: true,
            upvotes,
        }
    }
}

#[derive(Clone)]
pub struct EngagementStore {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl EngagementStore {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    // =========================================================================
    // Votes
    // =========================================================================

    /// Record one vote per user. The record insert and the count increment are
    /// a single commit, so the cached count can never drift from the records.
    pub async fn upvote(&self, issue_id: IssueId, user: &str) -> EngineResult<UpvoteOutcome> {
        self.retry
            .run("upvote", move || self.try_upvote(issue_id, user))
            .await
    }

    async fn try_upvote(&self, issue_id: IssueId, user: &str) -> EngineResult<Attempt<UpvoteOutcome>> {
        let issue = Issue::require(issue_id, self.store.as_ref()).await?;
        let current = issue.value.upvote_count;

        if UpvoteRecord::exists(issue_id, user, self.store.as_ref()).await? {
            return Ok(Attempt::Done(UpvoteOutcome::already_voted(current)));
        }

        let record = UpvoteRecord::new(issue_id, user);
        let record_key = UpvoteRecord::key(issue_id, user);
        let mut updated = issue.value;
        updated.upvote_count += 1;

        let outcome = self
            .store
            .commit(vec![record.insert_write()?, updated.update_write(issue.version)?])
            .await?;

        match outcome {
            WriteOutcome::Committed => {
                tracing::info!(issue_id = %issue_id, user, upvotes = updated.upvote_count, "Upvote recorded");
                Ok(Attempt::Done(UpvoteOutcome::recorded(updated.upvote_count)))
            }
            // Another session of the same user won the insert.
            WriteOutcome::PreconditionFailed { key } if key == record_key => {
                Ok(Attempt::Done(UpvoteOutcome::already_voted(current)))
            }
            WriteOutcome::PreconditionFailed { .. } => Ok(Attempt::Retry),
        }
    }

    pub async fn count_upvotes(&self, issue_id: IssueId) -> StoreResult<i64> {
        Ok(UpvoteRecord::find_for_issue(issue_id, self.store.as_ref())
            .await?
            .len() as i64)
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Flip the effective follow state. Returns whether the user now follows.
    pub async fn toggle_follow(&self, issue_id: IssueId, user: &str, auto: AutoFollow) -> EngineResult<bool> {
        self.retry
            .run("toggle_follow", move || self.try_toggle_follow(issue_id, user, auto))
            .await
    }

    async fn try_toggle_follow(
        &self,
        issue_id: IssueId,
        user: &str,
        auto: AutoFollow,
    ) -> EngineResult<Attempt<bool>> {
        let observed = FollowRecord::find(issue_id, user, self.store.as_ref()).await?;
        let state = FollowState::resolve(observed.as_ref().map(|doc| doc.value.status), auto);
        let change = state.toggle();

        let write = match (change, observed.as_ref()) {
            (FollowChange::Set(status), _) => {
                FollowRecord::new(issue_id, user, status).upsert_write(observed.as_ref())?
            }
            (FollowChange::Clear, Some(doc)) => Write::delete(
                FollowRecord::key(issue_id, user),
                Precondition::MatchesVersion(doc.version),
            ),
            // Clear is only produced for an explicit record.
            (FollowChange::Clear, None) => return Ok(Attempt::Retry),
        };

        if !self.store.commit(vec![write]).await?.is_committed() {
            return Ok(Attempt::Retry);
        }

        let following = state.apply(change).is_following();
        tracing::info!(issue_id = %issue_id, user, following, ?change, "Follow toggled");
        Ok(Attempt::Done(following))
    }

    /// Guarantee an explicit `following` record. Returns true if anything changed.
    pub async fn ensure_following(&self, issue_id: IssueId, user: &str) -> EngineResult<bool> {
        self.retry
            .run("ensure_following", move || self.try_ensure_following(issue_id, user))
            .await
    }

    async fn try_ensure_following(&self, issue_id: IssueId, user: &str) -> EngineResult<Attempt<bool>> {
        let Some(write) = self.enroll_write(issue_id, user).await? else {
            return Ok(Attempt::Done(false));
        };

        if self.store.commit(vec![write]).await?.is_committed() {
            tracing::debug!(issue_id = %issue_id, user, "Auto-follow enrolled");
            Ok(Attempt::Done(true))
        } else {
            Ok(Attempt::Retry)
        }
    }

    /// Write that makes `user` an explicit follower, or `None` if they already are.
    ///
    /// Guarded on the record as observed, so callers can fold it into the same
    /// commit as the action that grants the follow and retry on a lost race.
    pub async fn enroll_write(&self, issue_id: IssueId, user: &str) -> StoreResult<Option<Write>> {
        let observed = FollowRecord::find(issue_id, user, self.store.as_ref()).await?;
        if matches!(&observed, Some(doc) if doc.value.status == FollowStatus::Following) {
            return Ok(None);
        }
        let record = FollowRecord::new(issue_id, user, FollowStatus::Following);
        Ok(Some(record.upsert_write(observed.as_ref())?))
    }

    pub async fn explicit_status(&self, issue_id: IssueId, user: &str) -> StoreResult<Option<FollowStatus>> {
        Ok(FollowRecord::find(issue_id, user, self.store.as_ref())
            .await?
            .map(|doc| doc.value.status))
    }

    /// Explicit record only. Not suitable for "will this user be notified".
    pub async fn is_explicitly_following(&self, issue_id: IssueId, user: &str) -> StoreResult<bool> {
        Ok(self.explicit_status(issue_id, user).await? == Some(FollowStatus::Following))
    }

    /// Canonical follow check: explicit record composed with the auto-follow default.
    pub async fn is_effectively_following(
        &self,
        issue_id: IssueId,
        user: &str,
        is_creator: bool,
        has_commented: bool,
    ) -> StoreResult<bool> {
        let explicit = self.explicit_status(issue_id, user).await?;
        let auto = AutoFollow {
            is_creator,
            has_commented,
        };
        Ok(FollowState::resolve(explicit, auto).is_following())
    }

    pub async fn follow_records(&self, issue_id: IssueId) -> StoreResult<Vec<FollowRecord>> {
        FollowRecord::find_for_issue(issue_id, self.store.as_ref()).await
    }

    // =========================================================================
    // Purge
    // =========================================================================

    /// Deletes for every vote and follow record of an issue.
    pub async fn purge_writes(&self, issue_id: IssueId) -> StoreResult<Vec<Write>> {
        let mut writes = Vec::new();
        for prefix in [UpvoteRecord::issue_prefix(issue_id), FollowRecord::issue_prefix(issue_id)] {
            for (key, _) in self.store.scan(&prefix).await? {
                writes.push(Write::delete(key, Precondition::None));
            }
        }
        Ok(writes)
    }
}
