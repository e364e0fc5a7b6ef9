//! Typed ID definitions for the engagement entities.

pub use super::id::Id;

/// Marker type for Issue entities.
pub struct Issue;

/// Marker type for Comment entities.
pub struct Comment;

/// Marker type for status ledger entries.
pub struct StatusLogEntry;

/// Typed ID for Issue entities.
pub type IssueId = Id<Issue>;

/// Typed ID for Comment entities.
pub type CommentId = Id<Comment>;

/// Typed ID for status ledger entries.
pub type StatusLogEntryId = Id<StatusLogEntry>;
