//! Change events pushed to live clients.
//!
//! Serialized with a `type` tag, e.g. `{"type":"upvoted","issue_id":"…","upvotes":3}`.

use serde::Serialize;

use super::models::{Comment, Issue, IssueStatus};
use crate::common::IssueId;
use crate::kernel::ALL_TOPIC;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueEvent {
    IssueCreated {
        issue: Issue,
    },
    StatusChanged {
        issue_id: IssueId,
        from: IssueStatus,
        to: IssueStatus,
    },
    Upvoted {
        issue_id: IssueId,
        upvotes: i64,
    },
    FollowUpdated {
        issue_id: IssueId,
        user: String,
        following: bool,
    },
    CommentAdded {
        issue_id: IssueId,
        comment: Comment,
    },
    IssueAssigned {
        issue_id: IssueId,
        assigned_to: String,
    },
    IssueDeleted {
        issue_id: IssueId,
    },
}

/// Topic carrying events scoped to one issue.
pub fn issue_topic(issue_id: IssueId) -> String {
    issue_id.to_string()
}

impl IssueEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            IssueEvent::IssueCreated { .. } => "issue_created",
            IssueEvent::StatusChanged { .. } => "status_changed",
            IssueEvent::Upvoted { .. } => "upvoted",
            IssueEvent::FollowUpdated { .. } => "follow_updated",
            IssueEvent::CommentAdded { .. } => "comment_added",
            IssueEvent::IssueAssigned { .. } => "issue_assigned",
            IssueEvent::IssueDeleted { .. } => "issue_deleted",
        }
    }

    /// Topics this event is published to.
    ///
    /// Creation goes to `all` only: nobody can be subscribed to an issue topic
    /// before the issue exists.
    pub fn topics(&self) -> Vec<String> {
        match self {
            IssueEvent::IssueCreated { .. } => vec![ALL_TOPIC.to_string()],
            IssueEvent::StatusChanged { issue_id, .. }
            | IssueEvent::Upvoted { issue_id, .. }
            | IssueEvent::FollowUpdated { issue_id, .. }
            | IssueEvent::CommentAdded { issue_id, .. }
            | IssueEvent::IssueAssigned { issue_id, .. }
            | IssueEvent::IssueDeleted { issue_id } => {
                vec![ALL_TOPIC.to_string(), issue_topic(*issue_id)]
            }
        }
    }
}
