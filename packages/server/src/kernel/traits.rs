// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Naming convention: Base* for trait names (e.g., BaseDuplicateScorer)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::IssueId;

// =============================================================================
// Duplicate Scorer Trait (Infrastructure - similarity ranking service)
// =============================================================================

/// One ranked candidate returned by the similarity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub issue_id: IssueId,
    pub issue_number: i64,
    pub title: String,
    /// Similarity in `[0.0, 1.0]`; higher is more similar.
    pub similarity: f64,
}

#[async_trait]
pub trait BaseDuplicateScorer: Send + Sync {
    /// Rank existing issues by similarity to a draft title/description.
    async fn score(&self, title: &str, description: &str) -> Result<Vec<ScoredCandidate>>;
}

/// Scorer used when no similarity service is configured: never flags anything.
pub struct NoopDuplicateScorer;

#[async_trait]
impl BaseDuplicateScorer for NoopDuplicateScorer {
    async fn score(&self, _title: &str, _description: &str) -> Result<Vec<ScoredCandidate>> {
        Ok(Vec::new())
    }
}
