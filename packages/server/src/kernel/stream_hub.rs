//! In-process pub/sub hub for live engagement updates.
//!
//! Topics are opaque strings. Two kinds are used in practice: the well-known
//! [`ALL_TOPIC`] that sees every event, and one topic per issue id.
//!
//! Delivery contract:
//! - at most once per live subscriber, FIFO per subscriber, no replay;
//! - `publish` never waits on subscribers. Each subscriber has a bounded backlog
//!   (the channel capacity); a subscriber that falls behind loses its oldest
//!   frames and is told how many it missed via [`Frame::Lagged`];
//! - dropping a [`Subscription`] is a normal disconnect. Topics left with no
//!   receivers are reaped by [`StreamHub::cleanup`].
//!
//! ```ignore
//! let mut sub = hub.subscribe(ALL_TOPIC);
//! hub.publish_event(&[ALL_TOPIC, &issue_id.to_string()], &event);
//! let frame = sub.recv().await;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Topic that receives every published event.
pub const ALL_TOPIC: &str = "all";

/// Default per-subscriber backlog.
pub const DEFAULT_CAPACITY: usize = 256;

/// Failure to hand an event to the hub. Never propagated to the writer.
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Failed to serialize event for topic {topic}: {source}")]
    Serialization {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Hub state lock poisoned")]
    Poisoned,
}

/// What a subscriber observes.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(serde_json::Value),
    /// The subscriber fell behind and `missed` frames were dropped.
    Lagged { missed: u64 },
}

impl Frame {
    /// Wire form: one JSON object per frame.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Frame::Event(value) => value.clone(),
            Frame::Lagged { missed } => serde_json::json!({"type": "lagged", "missed": missed}),
        }
    }
}

/// A live connection to one topic. Dropping it disconnects.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<serde_json::Value>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next frame, or `None` once the server has closed the topic.
    pub async fn recv(&mut self) -> Option<Frame> {
        match self.receiver.recv().await {
            Ok(value) => Some(Frame::Event(value)),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(Frame::Lagged { missed }),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking poll; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        match self.receiver.try_recv() {
            Ok(value) => Some(Frame::Event(value)),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Some(Frame::Lagged { missed }),
            Err(_) => None,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Frame> + Send + 'static {
        BroadcastStream::new(self.receiver).map(|result| match result {
            Ok(value) => Frame::Event(value),
            Err(BroadcastStreamRecvError::Lagged(missed)) => Frame::Lagged { missed },
        })
    }
}

/// Topic-keyed broadcaster. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>>,
    capacity: usize,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a hub whose subscribers each buffer at most `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Publish a value to a topic. Returns the number of live subscribers it reached.
    pub fn publish(&self, topic: &str, value: serde_json::Value) -> usize {
        let channels = match self.channels.read() {
            Ok(channels) => channels,
            Err(_) => {
                tracing::warn!(topic, error = %BroadcastError::Poisoned, "Dropping event");
                return 0;
            }
        };

        match channels.get(topic) {
            // Err only means every receiver is gone; the reaper will drop the topic.
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Serialize and publish; failures are logged and swallowed.
    pub fn publish_event<T: Serialize>(&self, topics: &[&str], event: &T) -> usize {
        let value = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(source) => {
                let err = BroadcastError::Serialization {
                    topic: topics.join(","),
                    source,
                };
                tracing::warn!(error = %err, "Dropping event");
                return 0;
            }
        };

        topics
            .iter()
            .map(|topic| self.publish(topic, value.clone()))
            .sum()
    }

    /// Subscribe to a topic. Creates the channel if it doesn't exist.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);

        Subscription {
            topic: topic.to_string(),
            receiver: tx.subscribe(),
        }
    }

    /// Server-side close: every subscriber of `topic` sees end of stream.
    pub fn close(&self, topic: &str) -> bool {
        self.channels
            .write()
            .map(|mut channels| channels.remove(topic).is_some())
            .unwrap_or(false)
    }

    pub fn topic_count(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Remove channels with zero subscribers. Returns how many were reaped.
    pub fn cleanup(&self) -> usize {
        let Ok(mut channels) = self.channels.write() else {
            return 0;
        };
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let reaped = before - channels.len();
        if reaped > 0 {
            tracing::debug!(reaped, remaining = channels.len(), "Reaped idle stream topics");
        }
        reaped
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}
