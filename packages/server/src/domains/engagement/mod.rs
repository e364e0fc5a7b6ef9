//! Engagement domain - votes and follows.

pub mod models;
pub mod store;

pub use models::*;
pub use store::{EngagementStore, UpvoteOutcome};
