//! Follow records and the tri-state they resolve to.
//!
//! A missing record does not mean "not following": creators and commenters
//! follow by default. The effective state therefore composes an optional
//! explicit record with the auto-follow default, and every read path goes
//! through [`FollowState::resolve`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::IssueId;
use crate::kernel::store::{encode, load, load_all};
use crate::kernel::{DocumentStore, Precondition, StoreResult, Versioned, Write};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FollowStatus {
    Following,
    Unfollowed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowRecord {
    pub issue_id: IssueId,
    pub user_email: String,
    pub status: FollowStatus,
    pub updated_at: DateTime<Utc>,
}

impl FollowRecord {
    pub fn new(issue_id: IssueId, user_email: &str, status: FollowStatus) -> Self {
        Self {
            issue_id,
            user_email: user_email.to_string(),
            status,
            updated_at: Utc::now(),
        }
    }

    pub fn key(issue_id: IssueId, user_email: &str) -> String {
        format!("{}{}", Self::issue_prefix(issue_id), user_email)
    }

    pub fn issue_prefix(issue_id: IssueId) -> String {
        format!("follow:{}:", issue_id)
    }

    pub async fn find(
        issue_id: IssueId,
        user_email: &str,
        store: &dyn DocumentStore,
    ) -> StoreResult<Option<Versioned<Self>>> {
        load(store, &Self::key(issue_id, user_email)).await
    }

    pub async fn find_for_issue(issue_id: IssueId, store: &dyn DocumentStore) -> StoreResult<Vec<Self>> {
        Ok(load_all::<Self>(store, &Self::issue_prefix(issue_id))
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .collect())
    }

    /// Upsert guarded by whatever was observed (absent, or a specific version).
    pub fn upsert_write(&self, observed: Option<&Versioned<FollowRecord>>) -> StoreResult<Write> {
        let key = Self::key(self.issue_id, &self.user_email);
        Ok(Write::put(
            &key,
            encode(&key, self)?,
            Precondition::unchanged_since(observed),
        ))
    }
}

/// Whether the implicit default applies to a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoFollow {
    pub is_creator: bool,
    pub has_commented: bool,
}

impl AutoFollow {
    pub fn eligible(&self) -> bool {
        self.is_creator || self.has_commented
    }
}

/// Effective follow state for one (issue, user).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    /// No record; following iff auto-follow eligible.
    Implicit { auto_follow: bool },
    Explicit {
        status: FollowStatus,
        auto_follow: bool,
    },
}

/// Store change needed to move to the toggled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowChange {
    Set(FollowStatus),
    /// Drop the record and fall back to the (not-following) default.
    Clear,
}

impl FollowState {
    pub fn resolve(explicit: Option<FollowStatus>, auto: AutoFollow) -> Self {
        let auto_follow = auto.eligible();
        match explicit {
            Some(status) => FollowState::Explicit {
                status,
                auto_follow,
            },
            None => FollowState::Implicit { auto_follow },
        }
    }

    pub fn is_following(&self) -> bool {
        match self {
            FollowState::Implicit { auto_follow } => *auto_follow,
            FollowState::Explicit { status, .. } => *status == FollowStatus::Following,
        }
    }

    pub fn is_explicitly_following(&self) -> bool {
        matches!(
            self,
            FollowState::Explicit {
                status: FollowStatus::Following,
                ..
            }
        )
    }

    /// The change that flips the effective state.
    ///
    /// An opt-out from the default must be recorded explicitly; clearing it
    /// would silently resume following.
    pub fn toggle(&self) -> FollowChange {
        match *self {
            FollowState::Implicit { auto_follow: false } => FollowChange::Set(FollowStatus::Following),
            FollowState::Implicit { auto_follow: true } => FollowChange::Set(FollowStatus::Unfollowed),
            FollowState::Explicit {
                status: FollowStatus::Unfollowed,
                ..
            } => FollowChange::Set(FollowStatus::Following),
            FollowState::Explicit {
                status: FollowStatus::Following,
                auto_follow: true,
            } => FollowChange::Set(FollowStatus::Unfollowed),
            FollowState::Explicit {
                status: FollowStatus::Following,
                auto_follow: false,
            } => FollowChange::Clear,
        }
    }

    /// State after applying `change`.
    pub fn apply(&self, change: FollowChange) -> Self {
        let auto_follow = match *self {
            FollowState::Implicit { auto_follow } | FollowState::Explicit { auto_follow, .. } => {
                auto_follow
            }
        };
        match change {
            FollowChange::Set(status) => FollowState::Explicit {
                status,
                auto_follow,
            },
            FollowChange::Clear => FollowState::Implicit { auto_follow },
        }
    }
}
