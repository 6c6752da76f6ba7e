//! Poll endpoints.

use axum::{Json, Router, extract::State, routing::post};
use neighborly_common::{AppError, AppResult};
use neighborly_core::{
    CreateCommentInput, CreatePollInput, OptionTally, PollSummary, PollView, Voter,
};
use neighborly_db::{
    entities::{
        poll::{self, PollCategory, PollKind, PollStatus},
        poll_comment,
    },
    repositories::PollListFilter,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    extractors::{AuthMember, AuthVoter, MaybeVoter},
    middleware::AppState,
    response::ApiResponse,
};

const fn default_limit() -> u64 {
    20
}

fn round_share(share: f64) -> f64 {
    (share * 10.0).round() / 10.0
}

/// Poll option response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResponse {
    pub id: String,
    pub text: String,
    pub votes: i32,
    /// Share of all votes, rounded to one decimal place.
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<Vec<String>>,
}

fn option_responses(
    options: &[OptionTally],
    total_votes: i32,
    with_voters: bool,
) -> Vec<OptionResponse> {
    options
        .iter()
        .map(|o| OptionResponse {
            id: o.id.clone(),
            text: o.text.clone(),
            votes: o.votes,
            percentage: round_share(o.percentage(total_votes)),
            voters: with_voters.then(|| o.voters.clone()),
        })
        .collect()
}

fn tags_of(poll: &poll::Model) -> Vec<String> {
    serde_json::from_value(poll.tags.clone()).unwrap_or_default()
}

/// Full poll response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub description: String,
    pub category: PollCategory,
    #[serde(rename = "type")]
    pub kind: PollKind,
    pub is_anonymous: bool,
    pub allow_comments: bool,
    pub tags: Vec<String>,
    pub status: PollStatus,
    pub options: Vec<OptionResponse>,
    pub total_votes: i32,
    pub voters_count: i32,
    pub starts_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
    pub created_at: String,
    pub has_voted: bool,
    pub my_choices: Vec<String>,
}

impl From<PollView> for PollResponse {
    fn from(view: PollView) -> Self {
        let total_votes = view.tally.total_votes();
        let tags = tags_of(&view.poll);
        let poll = view.poll;
        Self {
            options: option_responses(view.tally.options(), total_votes, !poll.is_anonymous),
            total_votes,
            voters_count: view.tally.voters_count(),
            status: view.status,
            has_voted: view.has_voted,
            my_choices: view.viewer_choices,
            tags,
            id: poll.id,
            author_id: poll.author_id,
            title: poll.title,
            description: poll.description,
            category: poll.category,
            kind: poll.kind,
            is_anonymous: poll.is_anonymous,
            allow_comments: poll.allow_comments,
            starts_at: poll.starts_at.to_rfc3339(),
            ends_at: poll.ends_at.map(|e| e.to_rfc3339()),
            closed_at: poll.closed_at.map(|e| e.to_rfc3339()),
            created_at: poll.created_at.to_rfc3339(),
        }
    }
}

/// Poll listing entry with the first two options as a preview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPreviewResponse {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub category: PollCategory,
    #[serde(rename = "type")]
    pub kind: PollKind,
    pub is_anonymous: bool,
    pub tags: Vec<String>,
    pub status: PollStatus,
    pub preview: Vec<OptionResponse>,
    pub options_count: usize,
    pub total_votes: i32,
    pub voters_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    pub created_at: String,
}

impl From<PollSummary> for PollPreviewResponse {
    fn from(summary: PollSummary) -> Self {
        let total_votes = summary.tally.total_votes();
        let tags = tags_of(&summary.poll);
        let poll = summary.poll;
        Self {
            preview: option_responses(summary.tally.preview(), total_votes, false),
            options_count: summary.tally.options().len(),
            total_votes,
            voters_count: summary.tally.voters_count(),
            status: summary.status,
            tags,
            id: poll.id,
            author_id: poll.author_id,
            title: poll.title,
            category: poll.category,
            kind: poll.kind,
            is_anonymous: poll.is_anonymous,
            ends_at: poll.ends_at.map(|e| e.to_rfc3339()),
            created_at: poll.created_at.to_rfc3339(),
        }
    }
}

/// Comment response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub poll_id: String,
    pub user_id: String,
    pub comment: String,
    pub created_at: String,
}

impl From<poll_comment::Model> for CommentResponse {
    fn from(c: poll_comment::Model) -> Self {
        Self {
            id: c.id,
            poll_id: c.poll_id,
            user_id: c.user_id,
            comment: c.comment,
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

/// Request naming a single poll.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollIdRequest {
    pub poll_id: String,
}

/// List polls request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListPollsRequest {
    pub status: Option<PollStatus>,
    pub category: Option<PollCategory>,
    pub author_id: Option<String>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    pub until_id: Option<String>,
}

/// Vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub poll_id: String,
    #[serde(default)]
    pub option_ids: Vec<String>,
}

/// Has-voted response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HasVotedResponse {
    pub has_voted: bool,
}

/// List comments request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListCommentsRequest {
    pub poll_id: String,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    pub since_id: Option<String>,
}

/// Create a poll.
async fn create(
    AuthMember(author_id): AuthMember,
    State(state): State<AppState>,
    Json(req): Json<CreatePollInput>,
) -> AppResult<ApiResponse<PollResponse>> {
    let view = state.poll_service.create_poll(&author_id, req).await?;
    Ok(ApiResponse::ok(view.into()))
}

/// Get a poll with tallies.
async fn show(
    MaybeVoter(viewer): MaybeVoter,
    State(state): State<AppState>,
    Json(req): Json<PollIdRequest>,
) -> AppResult<ApiResponse<PollResponse>> {
    let view = state
        .poll_service
        .get_poll(&req.poll_id, viewer.as_ref())
        .await?;
    Ok(ApiResponse::ok(view.into()))
}

/// List polls, newest first.
async fn list(
    MaybeVoter(viewer): MaybeVoter,
    State(state): State<AppState>,
    Json(req): Json<ListPollsRequest>,
) -> AppResult<ApiResponse<Vec<PollPreviewResponse>>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let viewer_id = match viewer {
        Some(Voter::Member { id }) => Some(id),
        _ => None,
    };
    let filter = PollListFilter {
        status: req.status,
        category: req.category,
        author_id: req.author_id,
    };

    let polls = state
        .poll_service
        .list_polls(viewer_id.as_deref(), &filter, req.limit, req.until_id.as_deref())
        .await?;

    Ok(ApiResponse::ok(polls.into_iter().map(Into::into).collect()))
}

/// Cast a vote.
async fn vote(
    AuthVoter(voter): AuthVoter,
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<PollResponse>> {
    let view = state
        .poll_service
        .cast_vote(&req.poll_id, &voter, &req.option_ids)
        .await?;
    Ok(ApiResponse::ok(view.into()))
}

/// Check whether the caller has voted.
async fn has_voted(
    MaybeVoter(viewer): MaybeVoter,
    State(state): State<AppState>,
    Json(req): Json<PollIdRequest>,
) -> AppResult<ApiResponse<HasVotedResponse>> {
    let has_voted = state
        .poll_service
        .has_voted(&req.poll_id, viewer.as_ref())
        .await?;
    Ok(ApiResponse::ok(HasVotedResponse { has_voted }))
}

/// Open a draft poll.
async fn publish(
    AuthMember(author_id): AuthMember,
    State(state): State<AppState>,
    Json(req): Json<PollIdRequest>,
) -> AppResult<ApiResponse<PollResponse>> {
    state
        .poll_service
        .publish_poll(&req.poll_id, &author_id)
        .await?;
    let view = state
        .poll_service
        .get_poll(&req.poll_id, Some(&Voter::Member { id: author_id }))
        .await?;
    Ok(ApiResponse::ok(view.into()))
}

/// Close an active poll.
async fn close(
    AuthMember(author_id): AuthMember,
    State(state): State<AppState>,
    Json(req): Json<PollIdRequest>,
) -> AppResult<ApiResponse<PollResponse>> {
    state
        .poll_service
        .close_poll(&req.poll_id, &author_id)
        .await?;
    let view = state
        .poll_service
        .get_poll(&req.poll_id, Some(&Voter::Member { id: author_id }))
        .await?;
    Ok(ApiResponse::ok(view.into()))
}

/// Rebuild a poll's counters from its ballots.
async fn recount(
    AuthMember(author_id): AuthMember,
    State(state): State<AppState>,
    Json(req): Json<PollIdRequest>,
) -> AppResult<ApiResponse<PollResponse>> {
    let view = state
        .poll_service
        .recount_poll(&req.poll_id, &author_id)
        .await?;
    Ok(ApiResponse::ok(view.into()))
}

/// Comment on a poll.
async fn create_comment(
    AuthMember(user_id): AuthMember,
    State(state): State<AppState>,
    Json(req): Json<CreateCommentInput>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let comment = state.poll_service.add_comment(&user_id, req).await?;
    Ok(ApiResponse::ok(comment.into()))
}

/// List comments on a poll.
async fn list_comments(
    MaybeVoter(viewer): MaybeVoter,
    State(state): State<AppState>,
    Json(req): Json<ListCommentsRequest>,
) -> AppResult<ApiResponse<Vec<CommentResponse>>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let comments = state
        .poll_service
        .list_comments(
            &req.poll_id,
            viewer.as_ref(),
            req.limit,
            req.since_id.as_deref(),
        )
        .await?;

    Ok(ApiResponse::ok(
        comments.into_iter().map(Into::into).collect(),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/show", post(show))
        .route("/list", post(list))
        .route("/vote", post(vote))
        .route("/has-voted", post(has_voted))
        .route("/publish", post(publish))
        .route("/close", post(close))
        .route("/recount", post(recount))
        .route("/comments/create", post(create_comment))
        .route("/comments/list", post(list_comments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_share() {
        assert_eq!(round_share(45.0 / 76.0 * 100.0), 59.2);
        assert_eq!(round_share(31.0 / 76.0 * 100.0), 40.8);
        assert_eq!(round_share(0.0), 0.0);
    }
}
