//! Issues domain - the issue aggregate and the engine that orchestrates it.

pub mod engine;
pub mod events;
pub mod models;
pub mod policy;

pub use engine::{EngagementEngine, EngineSettings, StatusChange};
pub use events::{issue_topic, IssueEvent};
pub use models::*;
pub use policy::StatusPolicy;
