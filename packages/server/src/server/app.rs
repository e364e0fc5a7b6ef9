//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::issues::EngagementEngine;
use crate::kernel::{DocumentStore, StreamHub};
use crate::server::middleware::{identity_middleware, USER_HEADER};
use crate::server::routes::{
    add_comment_handler, assign_handler, change_status_handler, create_issue_handler,
    delete_issue_handler, duplicates_handler, followers_handler, following_handler,
    get_issue_handler, health_handler, history_handler, list_comments_handler,
    list_issues_handler, stream_handler, toggle_follow_handler, upvote_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EngagementEngine>,
    pub stream_hub: StreamHub,
    pub store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(engine: Arc<EngagementEngine>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            stream_hub: engine.hub().clone(),
            engine,
            store,
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USER_HEADER)]);

    // No configured origins means development: allow any.
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    };

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/issues",
            get(list_issues_handler).post(create_issue_handler),
        )
        .route("/api/issues/duplicates", post(duplicates_handler))
        .route(
            "/api/issues/:id",
            get(get_issue_handler).delete(delete_issue_handler),
        )
        .route("/api/issues/:id/status", post(change_status_handler))
        .route("/api/issues/:id/upvote", post(upvote_handler))
        .route("/api/issues/:id/follow", post(toggle_follow_handler))
        .route("/api/issues/:id/following", get(following_handler))
        .route("/api/issues/:id/followers", get(followers_handler))
        .route(
            "/api/issues/:id/comments",
            get(list_comments_handler).post(add_comment_handler),
        )
        .route("/api/issues/:id/assign", post(assign_handler))
        .route("/api/issues/:id/history", get(history_handler))
        .route("/api/streams/:topic", get(stream_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(identity_middleware))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically drop stream topics whose subscribers have all disconnected.
///
/// Periods under a second are raised to one second.
pub fn spawn_stream_reaper(hub: StreamHub, every: Duration) -> tokio::task::JoinHandle<()> {
    let every = every.max(MIN_REAP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            hub.cleanup();
        }
    })
}
