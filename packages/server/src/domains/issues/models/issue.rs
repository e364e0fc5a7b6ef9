use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{EngineError, EngineResult, IssueId};
use crate::kernel::store::{encode, load, load_all};
use crate::kernel::{DocumentStore, Precondition, StoreResult, Versioned, Write};

const KEY_PREFIX: &str = "issue:";

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    PendingTesting,
    Backlog,
    Rejected,
    Closed,
}

impl IssueStatus {
    /// Statuses that end work on an issue.
    pub fn is_resolved(&self) -> bool {
        matches!(self, IssueStatus::Rejected | IssueStatus::Closed)
    }
}

impl Default for IssueStatus {
    fn default() -> Self {
        IssueStatus::Open
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueStatus::Open => write!(f, "open"),
            IssueStatus::InProgress => write!(f, "in_progress"),
            IssueStatus::PendingTesting => write!(f, "pending_testing"),
            IssueStatus::Backlog => write!(f, "backlog"),
            IssueStatus::Rejected => write!(f, "rejected"),
            IssueStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = anyhow::Error;

    /// Accepts both the wire form (`in_progress`) and display labels (`In Progress`).
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "open" => Ok(IssueStatus::Open),
            "in_progress" => Ok(IssueStatus::InProgress),
            "pending_testing" => Ok(IssueStatus::PendingTesting),
            "backlog" => Ok(IssueStatus::Backlog),
            "rejected" => Ok(IssueStatus::Rejected),
            "closed" => Ok(IssueStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid issue status: {}", s)),
        }
    }
}

/// Input for creating an issue. Content fields are opaque to the engine
/// beyond the required-field check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub issue_type: Option<String>,
}

impl NewIssue {
    pub fn validate(&self) -> EngineResult<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::validation("title", "Title is required"));
        }
        if self.description.trim().is_empty() {
            return Err(EngineError::validation(
                "description",
                "Description is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: IssueId,
    pub issue_number: i64,
    pub title: String,
    pub description: String,
    pub issue_type: Option<String>,
    pub status: IssueStatus,
    pub resolution_note: Option<String>,
    /// Cached count of upvote records; only changed in the same commit as a record insert.
    pub upvote_count: i64,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

// =============================================================================
// Store access - ALL issue keys are built here
// =============================================================================

impl Issue {
    pub fn new(input: NewIssue, issue_number: i64, created_by: &str) -> Self {
        let now = Utc::now();
        Self {
            id: IssueId::new(),
            issue_number,
            title: input.title.trim().to_string(),
            description: input.description,
            issue_type: input.issue_type,
            status: IssueStatus::Open,
            resolution_note: None,
            upvote_count: 0,
            created_by: created_by.to_string(),
            assigned_to: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn key(id: IssueId) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    pub fn is_creator(&self, user: &str) -> bool {
        self.created_by.eq_ignore_ascii_case(user)
    }

    /// Find issue by ID, with the version it was read at.
    pub async fn find_by_id(
        id: IssueId,
        store: &dyn DocumentStore,
    ) -> StoreResult<Option<Versioned<Self>>> {
        load(store, &Self::key(id)).await
    }

    /// Like `find_by_id`, but a missing issue is `NotFound`.
    pub async fn require(id: IssueId, store: &dyn DocumentStore) -> EngineResult<Versioned<Self>> {
        Self::find_by_id(id, store)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// All issues, ordered by issue number.
    pub async fn find_all(store: &dyn DocumentStore) -> StoreResult<Vec<Self>> {
        let mut issues: Vec<Self> = load_all::<Self>(store, KEY_PREFIX)
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .collect();
        issues.sort_by_key(|issue| issue.issue_number);
        Ok(issues)
    }

    /// Write that inserts a brand-new issue.
    pub fn insert_write(&self) -> StoreResult<Write> {
        let key = Self::key(self.id);
        Ok(Write::put(
            &key,
            encode(&key, self)?,
            Precondition::DoesNotExist,
        ))
    }

    /// Write that replaces the issue only if it is still at `read_version`.
    pub fn update_write(&self, read_version: u64) -> StoreResult<Write> {
        let key = Self::key(self.id);
        Ok(Write::put(
            &key,
            encode(&key, self)?,
            Precondition::MatchesVersion(read_version),
        ))
    }
}
