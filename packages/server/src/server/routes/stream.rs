//! Live update endpoint.
//!
//! GET /api/streams/:topic
//!
//! Streams newline-delimited JSON frames for a topic (`all` or an issue id).
//! The first frame is `{"type":"connected"}`; a client that falls behind gets
//! `{"type":"lagged","missed":n}`. There is no replay: clients re-fetch current
//! state after connecting or reconnecting.

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{Extension, Path},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{self, StreamExt};
use serde_json::json;

use crate::common::IssueId;
use crate::kernel::stream_hub::Frame;
use crate::kernel::ALL_TOPIC;
use crate::server::app::AppState;

pub const NDJSON: &str = "application/x-ndjson";

/// Encode one frame as a JSON line.
fn encode_line(value: &serde_json::Value) -> Bytes {
    let mut line = value.to_string().into_bytes();
    line.push(b'\n');
    Bytes::from(line)
}

/// Only `all` and issue ids are addressable.
fn validate_topic(topic: &str) -> bool {
    topic == ALL_TOPIC || IssueId::parse(topic).is_ok()
}

pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Path(topic): Path<String>,
) -> Response {
    if !validate_topic(&topic) {
        return (StatusCode::BAD_REQUEST, "Unknown topic").into_response();
    }

    let subscription = state.stream_hub.subscribe(&topic);
    tracing::debug!(topic = %topic, "Live client connected");

    let connected = stream::once(async move {
        Ok::<_, Infallible>(encode_line(&json!({"type": "connected", "topic": topic})))
    });
    let frames = subscription.into_stream().map(|frame: Frame| {
        if let Frame::Lagged { missed } = frame {
            tracing::debug!(missed, "Live client lagging, frames dropped");
        }
        Ok::<_, Infallible>(encode_line(&frame.to_json()))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, NDJSON)
        .body(Body::from_stream(connected.chain(frames)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
