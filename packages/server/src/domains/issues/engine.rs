//! Engagement engine: the public operations over issues.
//!
//! Each mutating operation follows the same shape: validate input, write
//! through the owning component (conditional writes, bounded retries), then
//! publish one event as the last step. Publishing never fails the write.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::events::{issue_topic, IssueEvent};
use super::models::{Comment, Issue, IssueStatus, NewIssue};
use super::policy::StatusPolicy;
use crate::common::{EngineError, EngineResult, IssueId};
use crate::domains::counters::{CounterAllocator, ISSUE_NUMBER_SEQUENCE};
use crate::domains::engagement::{
    AutoFollow, EngagementStore, FollowRecord, FollowState, FollowStatus, UpvoteOutcome,
};
use crate::domains::status_ledger::{HistoryOrder, StatusLedger, StatusLogEntry};
use crate::kernel::{
    Attempt, BaseDuplicateScorer, DocumentStore, NoopDuplicateScorer, Precondition, RetryPolicy,
    ScoredCandidate, StreamHub, Write,
};

/// Tunables for the engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub status_policy: StatusPolicy,
    /// Minimum similarity for a candidate to be reported as a possible duplicate.
    pub duplicate_threshold: f64,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            status_policy: StatusPolicy::default(),
            duplicate_threshold: 0.8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of `change_status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusChange {
    pub issue: Issue,
    pub from: IssueStatus,
    /// False when the issue was already in the requested status.
    pub changed: bool,
}

pub struct EngagementEngine {
    store: Arc<dyn DocumentStore>,
    counters: CounterAllocator,
    engagement: EngagementStore,
    ledger: StatusLedger,
    hub: StreamHub,
    scorer: Arc<dyn BaseDuplicateScorer>,
    settings: EngineSettings,
}

/// Identity arrives pre-authenticated; only normalize it.
fn normalize_user(user: &str) -> EngineResult<String> {
    let user = user.trim().to_ascii_lowercase();
    if user.is_empty() {
        return Err(EngineError::validation("user", "A user identifier is required"));
    }
    Ok(user)
}

impl EngagementEngine {
    pub fn new(store: Arc<dyn DocumentStore>, hub: StreamHub, settings: EngineSettings) -> Self {
        Self {
            counters: CounterAllocator::new(store.clone()),
            engagement: EngagementStore::new(store.clone(), settings.retry),
            ledger: StatusLedger::new(store.clone()),
            store,
            hub,
            scorer: Arc::new(NoopDuplicateScorer),
            settings,
        }
    }

    pub fn with_duplicate_scorer(mut self, scorer: Arc<dyn BaseDuplicateScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    pub fn engagement(&self) -> &EngagementStore {
        &self.engagement
    }

    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // =========================================================================
    // Creation
    // =========================================================================

    pub async fn create_issue(&self, input: NewIssue, creator: &str) -> EngineResult<Issue> {
        let creator = normalize_user(creator)?;
        input.validate()?;

        let issue_number = self.counters.next(ISSUE_NUMBER_SEQUENCE).await?;
        let issue = Issue::new(input, issue_number, &creator);

        // The issue and its creator's follow record land in one commit.
        let enroll = FollowRecord::new(issue.id, &creator, FollowStatus::Following).upsert_write(None)?;
        if !self
            .store
            .commit(vec![issue.insert_write()?, enroll])
            .await?
            .is_committed()
        {
            return Err(EngineError::Conflict("create_issue"));
        }

        tracing::info!(
            issue_id = %issue.id,
            issue_number,
            creator = %creator,
            "Issue created"
        );
        self.announce(IssueEvent::IssueCreated {
            issue: issue.clone(),
        });
        Ok(issue)
    }

    /// Rank existing issues that look like the draft, best match first.
    ///
    /// Advisory only: a failing similarity service yields no candidates.
    pub async fn find_possible_duplicates(
        &self,
        title: &str,
        description: &str,
    ) -> EngineResult<Vec<ScoredCandidate>> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("title", "Title is required"));
        }

        let candidates = match self.scorer.score(title, description).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Duplicate scoring failed, skipping check");
                return Ok(Vec::new());
            }
        };

        let mut flagged: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|c| c.similarity >= self.settings.duplicate_threshold)
            .collect();
        flagged.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(flagged)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_issue(&self, issue_id: IssueId) -> EngineResult<Issue> {
        Ok(Issue::require(issue_id, self.store.as_ref()).await?.value)
    }

    pub async fn list_issues(&self) -> EngineResult<Vec<Issue>> {
        Ok(Issue::find_all(self.store.as_ref()).await?)
    }

    pub async fn comments(&self, issue_id: IssueId) -> EngineResult<Vec<Comment>> {
        Issue::require(issue_id, self.store.as_ref()).await?;
        Ok(Comment::find_for_issue(issue_id, self.store.as_ref()).await?)
    }

    pub async fn status_history(
        &self,
        issue_id: IssueId,
        order: HistoryOrder,
    ) -> EngineResult<Vec<StatusLogEntry>> {
        Issue::require(issue_id, self.store.as_ref()).await?;
        Ok(self.ledger.history(issue_id, order).await?)
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub async fn change_status(
        &self,
        issue_id: IssueId,
        new_status: IssueStatus,
        actor: &str,
        resolution_note: Option<&str>,
    ) -> EngineResult<StatusChange> {
        let actor = normalize_user(actor)?;
        let actor = actor.as_str();
        let note = resolution_note.map(str::trim).filter(|note| !note.is_empty());
        self.settings.status_policy.check_request(new_status, note)?;

        let (change, entry) = self
            .settings
            .retry
            .run("change_status", move || {
                self.try_change_status(issue_id, new_status, actor, note)
            })
            .await?;

        if entry.is_some() {
            self.announce(IssueEvent::StatusChanged {
                issue_id,
                from: change.from,
                to: new_status,
            });
        }
        Ok(change)
    }

    async fn try_change_status(
        &self,
        issue_id: IssueId,
        new_status: IssueStatus,
        actor: &str,
        note: Option<&str>,
    ) -> EngineResult<Attempt<(StatusChange, Option<StatusLogEntry>)>> {
        let current = Issue::require(issue_id, self.store.as_ref()).await?;
        let from = current.value.status;
        self.settings.status_policy.check_transition(from, new_status)?;

        let now = Utc::now();
        let mut updated = current.value;
        updated.status = new_status;
        updated.last_updated_at = now;
        if let Some(note) = note {
            updated.resolution_note = Some(note.to_string());
        } else if !new_status.is_resolved() {
            updated.resolution_note = None;
        }

        // The status update and its ledger entry land together or not at all.
        let entry = StatusLogEntry::transition(issue_id, from, new_status, actor, now);
        let mut writes = vec![updated.update_write(current.version)?];
        if let Some(entry) = &entry {
            writes.push(entry.append_write()?);
        }

        if !self.store.commit(writes).await?.is_committed() {
            return Ok(Attempt::Retry);
        }

        tracing::info!(
            issue_id = %issue_id,
            %from,
            to = %new_status,
            actor,
            "Issue status updated"
        );
        let change = StatusChange {
            issue: updated,
            from,
            changed: entry.is_some(),
        };
        Ok(Attempt::Done((change, entry)))
    }

    // =========================================================================
    // Votes and follows
    // =========================================================================

    pub async fn upvote(&self, issue_id: IssueId, user: &str) -> EngineResult<UpvoteOutcome> {
        let user = normalize_user(user)?;
        let outcome = self.engagement.upvote(issue_id, &user).await?;

        if outcome.success {
            self.announce(IssueEvent::Upvoted {
                issue_id,
                upvotes: outcome.upvotes,
            });
        } else {
            tracing::debug!(issue_id = %issue_id, user = %user, "Already voted");
        }
        Ok(outcome)
    }

    /// Flip the caller's effective follow state. Returns whether they now follow.
    pub async fn toggle_follow(&self, issue_id: IssueId, user: &str) -> EngineResult<bool> {
        let user = normalize_user(user)?;
        let auto = self.auto_follow(issue_id, &user).await?;
        let following = self.engagement.toggle_follow(issue_id, &user, auto).await?;

        // Published in both directions so the user's other sessions converge.
        self.announce(IssueEvent::FollowUpdated {
            issue_id,
            user,
            following,
        });
        Ok(following)
    }

    /// Whether `user` currently receives notifications for the issue.
    pub async fn is_following(&self, issue_id: IssueId, user: &str) -> EngineResult<bool> {
        let user = normalize_user(user)?;
        let auto = self.auto_follow(issue_id, &user).await?;
        Ok(self
            .engagement
            .is_effectively_following(issue_id, &user, auto.is_creator, auto.has_commented)
            .await?)
    }

    /// Everyone currently notified about the issue, sorted.
    pub async fn followers(&self, issue_id: IssueId) -> EngineResult<Vec<String>> {
        let issue = Issue::require(issue_id, self.store.as_ref()).await?.value;
        let commenters = Comment::commenters(issue_id, self.store.as_ref()).await?;
        let explicit: HashMap<String, _> = self
            .engagement
            .follow_records(issue_id)
            .await?
            .into_iter()
            .map(|record| (record.user_email, record.status))
            .collect();

        let mut candidates: BTreeSet<String> = commenters.clone();
        candidates.insert(issue.created_by.clone());
        candidates.extend(explicit.keys().cloned());

        Ok(candidates
            .into_iter()
            .filter(|user| {
                let auto = AutoFollow {
                    is_creator: issue.is_creator(user),
                    has_commented: commenters.contains(user),
                };
                FollowState::resolve(explicit.get(user).copied(), auto).is_following()
            })
            .collect())
    }

    async fn auto_follow(&self, issue_id: IssueId, user: &str) -> EngineResult<AutoFollow> {
        let issue = Issue::require(issue_id, self.store.as_ref()).await?;
        Ok(AutoFollow {
            is_creator: issue.value.is_creator(user),
            has_commented: Comment::has_commented(issue_id, user, self.store.as_ref()).await?,
        })
    }

    // =========================================================================
    // Comments and assignment
    // =========================================================================

    /// Append a comment; commenting enrolls the author as a follower.
    pub async fn add_comment(&self, issue_id: IssueId, user: &str, message: &str) -> EngineResult<Comment> {
        let user = normalize_user(user)?;
        if message.trim().is_empty() {
            return Err(EngineError::validation("message", "Comment cannot be empty"));
        }

        let comment = Comment::new(issue_id, &user, message);
        let pending = &comment;
        self.settings
            .retry
            .run("add_comment", move || self.try_add_comment(pending))
            .await?;

        tracing::info!(issue_id = %issue_id, user = %user, comment_id = %comment.id, "Comment added");
        self.announce(IssueEvent::CommentAdded {
            issue_id,
            comment: comment.clone(),
        });
        Ok(comment)
    }

    /// Comment insert and the author's enrollment share one commit.
    async fn try_add_comment(&self, comment: &Comment) -> EngineResult<Attempt<()>> {
        Issue::require(comment.issue_id, self.store.as_ref()).await?;

        let mut writes = vec![comment.insert_write()?];
        writes.extend(self.engagement.enroll_write(comment.issue_id, &comment.user).await?);

        if self.store.commit(writes).await?.is_committed() {
            Ok(Attempt::Done(()))
        } else {
            Ok(Attempt::Retry)
        }
    }

    /// Assign the issue; the assignee is enrolled as a follower.
    pub async fn assign_issue(&self, issue_id: IssueId, assignee: &str, actor: &str) -> EngineResult<Issue> {
        let assignee = normalize_user(assignee)?;
        let actor = normalize_user(actor)?;
        let assignee_ref = assignee.as_str();

        let issue = self
            .settings
            .retry
            .run("assign_issue", move || self.try_assign(issue_id, assignee_ref))
            .await?;

        tracing::info!(issue_id = %issue_id, assignee = %assignee, actor = %actor, "Issue assigned");
        self.announce(IssueEvent::IssueAssigned {
            issue_id,
            assigned_to: assignee,
        });
        Ok(issue)
    }

    async fn try_assign(&self, issue_id: IssueId, assignee: &str) -> EngineResult<Attempt<Issue>> {
        let current = Issue::require(issue_id, self.store.as_ref()).await?;
        let mut updated = current.value;
        updated.assigned_to = Some(assignee.to_string());
        updated.last_updated_at = Utc::now();

        let mut writes = vec![updated.update_write(current.version)?];
        writes.extend(self.engagement.enroll_write(issue_id, assignee).await?);

        if self.store.commit(writes).await?.is_committed() {
            Ok(Attempt::Done(updated))
        } else {
            Ok(Attempt::Retry)
        }
    }

    // =========================================================================
    // Administrative purge
    // =========================================================================

    /// Delete an issue together with its votes, follows, comments and ledger.
    ///
    /// One commit guarded on the issue version: a vote racing the delete either
    /// lands first (and is purged) or finds the issue gone. The issue number is
    /// never reused.
    pub async fn delete_issue(&self, issue_id: IssueId) -> EngineResult<()> {
        let removed = self
            .settings
            .retry
            .run("delete_issue", move || self.try_delete(issue_id))
            .await?;

        tracing::info!(issue_id = %issue_id, records = removed, "Issue deleted");
        self.announce(IssueEvent::IssueDeleted { issue_id });
        self.hub.close(&issue_topic(issue_id));
        Ok(())
    }

    async fn try_delete(&self, issue_id: IssueId) -> EngineResult<Attempt<usize>> {
        let current = Issue::require(issue_id, self.store.as_ref()).await?;

        let mut writes = vec![Write::delete(
            Issue::key(issue_id),
            Precondition::MatchesVersion(current.version),
        )];
        writes.extend(self.engagement.purge_writes(issue_id).await?);
        writes.extend(self.ledger.purge_writes(issue_id).await?);
        for (key, _) in self.store.scan(&Comment::issue_prefix(issue_id)).await? {
            writes.push(Write::delete(key, Precondition::None));
        }

        let removed = writes.len();
        if self.store.commit(writes).await?.is_committed() {
            Ok(Attempt::Done(removed))
        } else {
            Ok(Attempt::Retry)
        }
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    fn announce(&self, event: IssueEvent) {
        let topics = event.topics();
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        let reached = self.hub.publish_event(&topics, &event);
        tracing::debug!(event = event.event_type(), reached, "Event published");
    }
}
