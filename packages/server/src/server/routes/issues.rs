//! Issue endpoints.
//!
//! Thin adapters: parse input, pull the caller from `AuthUser`, delegate to
//! the engine. All rules live in the engine.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::IssueId;
use crate::domains::issues::{Comment, Issue, IssueStatus, NewIssue, StatusChange};
use crate::domains::status_ledger::{HistoryOrder, StatusLogEntry};
use crate::kernel::ScoredCandidate;
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;

type ApiResult<T> = Result<T, ApiError>;

fn require_user(user: Option<Extension<AuthUser>>) -> ApiResult<String> {
    user.map(|Extension(user)| user.email)
        .ok_or(ApiError::Unauthenticated)
}

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
    #[serde(default)]
    pub resolution_note: Option<String>,
}

#[derive(Deserialize)]
pub struct AddCommentRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub assignee: String,
}

#[derive(Deserialize)]
pub struct DuplicateCheckRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub order: HistoryOrder,
}

#[derive(Serialize)]
pub struct UpvoteResponse {
    pub success: bool,
    pub already_acted: bool,
    pub upvotes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Serialize)]
pub struct FollowResponse {
    pub following: bool,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn create_issue_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Json(input): Json<NewIssue>,
) -> ApiResult<(StatusCode, Json<Issue>)> {
    let creator = require_user(user)?;
    let issue = state.engine.create_issue(input, &creator).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn list_issues_handler(Extension(state): Extension<AppState>) -> ApiResult<Json<Vec<Issue>>> {
    Ok(Json(state.engine.list_issues().await?))
}

pub async fn get_issue_handler(
    Extension(state): Extension<AppState>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<Json<Issue>> {
    Ok(Json(state.engine.get_issue(issue_id).await?))
}

pub async fn delete_issue_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<StatusCode> {
    let actor = require_user(user)?;
    tracing::info!(issue_id = %issue_id, actor = %actor, "Purge requested");
    state.engine.delete_issue(issue_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_status_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
    Json(body): Json<ChangeStatusRequest>,
) -> ApiResult<Json<StatusChange>> {
    let actor = require_user(user)?;
    let status: IssueStatus = body
        .status
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;

    let change = state
        .engine
        .change_status(issue_id, status, &actor, body.resolution_note.as_deref())
        .await?;
    Ok(Json(change))
}

pub async fn upvote_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<Json<UpvoteResponse>> {
    let user = require_user(user)?;
    let outcome = state.engine.upvote(issue_id, &user).await?;

    Ok(Json(UpvoteResponse {
        success: outcome.success,
        already_acted: outcome.already_acted,
        upvotes: outcome.upvotes,
        message: outcome
            .already_acted
            .then_some("You already voted for this issue"),
    }))
}

pub async fn toggle_follow_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<Json<FollowResponse>> {
    let user = require_user(user)?;
    let following = state.engine.toggle_follow(issue_id, &user).await?;
    Ok(Json(FollowResponse { following }))
}

pub async fn following_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<Json<FollowResponse>> {
    let user = require_user(user)?;
    let following = state.engine.is_following(issue_id, &user).await?;
    Ok(Json(FollowResponse { following }))
}

pub async fn followers_handler(
    Extension(state): Extension<AppState>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.engine.followers(issue_id).await?))
}

pub async fn add_comment_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
    Json(body): Json<AddCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let user = require_user(user)?;
    let comment = state.engine.add_comment(issue_id, &user, &body.message).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments_handler(
    Extension(state): Extension<AppState>,
    Path(issue_id): Path<IssueId>,
) -> ApiResult<Json<Vec<Comment>>> {
    Ok(Json(state.engine.comments(issue_id).await?))
}

pub async fn assign_handler(
    Extension(state): Extension<AppState>,
    user: Option<Extension<AuthUser>>,
    Path(issue_id): Path<IssueId>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<Json<Issue>> {
    let actor = require_user(user)?;
    let issue = state
        .engine
        .assign_issue(issue_id, &body.assignee, &actor)
        .await?;
    Ok(Json(issue))
}

pub async fn history_handler(
    Extension(state): Extension<AppState>,
    Path(issue_id): Path<IssueId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<StatusLogEntry>>> {
    Ok(Json(state.engine.status_history(issue_id, query.order).await?))
}

pub async fn duplicates_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<DuplicateCheckRequest>,
) -> ApiResult<Json<Vec<ScoredCandidate>>> {
    Ok(Json(
        state
            .engine
            .find_possible_duplicates(&body.title, &body.description)
            .await?,
    ))
}
