use serde::{Deserialize, Serialize};

use super::models::IssueStatus;
use crate::common::{EngineError, EngineResult};

/// Whether resolved issues (Closed / Rejected) may move again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Any status may move to any other; a closed issue can be reopened.
    #[default]
    Reopenable,
    /// Closed and Rejected accept no further transitions.
    TerminalResolved,
}

impl std::str::FromStr for StatusPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reopenable" => Ok(StatusPolicy::Reopenable),
            "terminal" | "terminal_resolved" => Ok(StatusPolicy::TerminalResolved),
            _ => Err(anyhow::anyhow!("Invalid status policy: {}", s)),
        }
    }
}

impl StatusPolicy {
    /// Input-only checks, independent of the current status.
    ///
    /// Entering `Closed` requires a non-empty resolution note.
    pub fn check_request(&self, to: IssueStatus, resolution_note: Option<&str>) -> EngineResult<()> {
        let has_note = resolution_note.is_some_and(|note| !note.trim().is_empty());
        if to == IssueStatus::Closed && !has_note {
            return Err(EngineError::validation(
                "resolution_note",
                "A resolution note is required to close an issue",
            ));
        }
        Ok(())
    }

    /// Checks that moving from `from` to `to` is allowed.
    pub fn check_transition(&self, from: IssueStatus, to: IssueStatus) -> EngineResult<()> {
        if *self == StatusPolicy::TerminalResolved && from.is_resolved() && from != to {
            return Err(EngineError::validation(
                "status",
                format!("Issue is {} and cannot change status", from),
            ));
        }
        Ok(())
    }
}
