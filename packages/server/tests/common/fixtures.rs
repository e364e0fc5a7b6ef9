// Test fixtures for creating issues and reading hub frames

#![allow(dead_code)]

use std::time::Duration;

use engagement_core::domains::issues::{EngagementEngine, Issue, NewIssue};
use engagement_core::kernel::{Frame, Subscription};

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const CAROL: &str = "carol@example.com";

pub fn new_issue(title: &str) -> NewIssue {
    NewIssue {
        title: title.to_string(),
        description: format!("Steps to reproduce: {}", title),
        issue_type: Some("bug".to_string()),
    }
}

pub async fn create_issue(engine: &EngagementEngine, creator: &str, title: &str) -> Issue {
    engine
        .create_issue(new_issue(title), creator)
        .await
        .expect("Failed to create issue")
}

/// Next event frame as JSON, failing the test if none arrives promptly.
pub async fn next_event(subscription: &mut Subscription) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Topic closed");
    match frame {
        Frame::Event(value) => value,
        other => panic!("Expected event, got {:?}", other),
    }
}

/// Every frame already queued, without waiting.
pub fn drain(subscription: &mut Subscription) -> Vec<Frame> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}
