//! API integration tests.
//!
//! These drive the poll router through the auth middleware against a mock
//! database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::Response,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use neighborly_api::{AppState, auth_middleware, router as api_router};
use neighborly_core::{Claims, IdentityService, PollService, PollSettings};
use neighborly_db::{
    entities::{
        poll::{self, PollCategory, PollKind, PollStatus},
        poll_option, poll_vote,
    },
    repositories::{PollCommentRepository, PollRepository, PollVoteRepository},
};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const DEVICE_TOKEN: &str = "device-0123456789abcdef";

/// Create test app state over the given database.
fn create_test_state(db: DatabaseConnection, allow_guests: bool) -> AppState {
    let db = Arc::new(db);

    let poll_service = PollService::new(
        PollRepository::new(Arc::clone(&db)),
        PollVoteRepository::new(Arc::clone(&db)),
        PollCommentRepository::new(Arc::clone(&db)),
        PollSettings::default(),
    );

    AppState {
        poll_service,
        identity_service: IdentityService::new(SECRET, allow_guests),
    }
}

/// Create the test router with auth middleware.
fn create_test_router(db: DatabaseConnection, allow_guests: bool) -> Router {
    let state = create_test_state(db, allow_guests);
    Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

fn empty_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

fn bearer(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

fn create_test_poll(status: PollStatus) -> poll::Model {
    poll::Model {
        id: "p1".to_string(),
        author_id: "author1".to_string(),
        title: "Should we add speed bumps on Oak Street?".to_string(),
        description: "Several residents reported speeding cars.".to_string(),
        category: PollCategory::Safety,
        kind: PollKind::Single,
        is_anonymous: false,
        allow_comments: true,
        tags: json!(["traffic", "safety"]),
        status,
        total_votes: 76,
        voters_count: 76,
        starts_at: chrono::Utc::now().into(),
        ends_at: None,
        closed_at: None,
        created_at: chrono::Utc::now().into(),
        updated_at: None,
    }
}

fn create_test_options() -> Vec<poll_option::Model> {
    vec![
        poll_option::Model {
            id: "yes".to_string(),
            poll_id: "p1".to_string(),
            position: 0,
            text: "Yes".to_string(),
            votes: 45,
        },
        poll_option::Model {
            id: "no".to_string(),
            poll_id: "p1".to_string(),
            position: 1,
            text: "No".to_string(),
            votes: 31,
        },
    ]
}

async fn post(app: Router, uri: &str, auth: Option<(&str, String)>, body: Value) -> Response {
    let mut builder = Request::builder()
        .uri(uri)
        .method("POST")
        .header("Content-Type", "application/json");
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }

    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_vote_requires_identity() {
    let app = create_test_router(empty_db(), false);

    let response = post(
        app,
        "/api/polls/vote",
        None,
        json!({ "pollId": "p1", "optionIds": ["yes"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_has_voted_without_identity_is_false() {
    let app = create_test_router(empty_db(), false);

    let response = post(app, "/api/polls/has-voted", None, json!({ "pollId": "p1" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["hasVoted"], false);
}

#[tokio::test]
async fn test_show_unknown_poll() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<poll::Model>::new()])
        .into_connection();
    let app = create_test_router(db, false);

    let response = post(app, "/api/polls/show", None, json!({ "pollId": "missing" })).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "POLL_NOT_FOUND");
}

#[tokio::test]
async fn test_show_poll_with_percentages() {
    let ballot = poll_vote::Model {
        id: "v1".to_string(),
        poll_id: "p1".to_string(),
        voter_key: "user1".to_string(),
        option_ids: json!(["no"]),
        created_at: chrono::Utc::now().into(),
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_poll(PollStatus::Active)]])
        .append_query_results([create_test_options()])
        .append_query_results([[ballot]])
        .into_connection();
    let app = create_test_router(db, false);

    let response = post(
        app,
        "/api/polls/show",
        Some(("Authorization", bearer("user1"))),
        json!({ "pollId": "p1" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let data = &body["data"];
    assert_eq!(data["type"], "single");
    assert_eq!(data["status"], "active");
    assert_eq!(data["totalVotes"], 76);
    assert_eq!(data["options"][0]["percentage"], 59.2);
    assert_eq!(data["options"][1]["percentage"], 40.8);
    assert_eq!(data["options"][1]["voters"], json!(["user1"]));
    assert_eq!(data["hasVoted"], true);
    assert_eq!(data["myChoices"], json!(["no"]));
}

fn count(n: i64) -> Vec<std::collections::BTreeMap<&'static str, sea_orm::Value>> {
    vec![std::collections::BTreeMap::from([(
        "num_items",
        sea_orm::Value::BigInt(Some(n)),
    )])]
}

#[tokio::test]
async fn test_vote_returns_updated_poll() {
    let ballot = poll_vote::Model {
        id: "v1".to_string(),
        poll_id: "p1".to_string(),
        voter_key: "user1".to_string(),
        option_ids: json!(["no"]),
        created_at: chrono::Utc::now().into(),
    };
    let mut before = create_test_poll(PollStatus::Active);
    before.total_votes = 75;
    before.voters_count = 75;
    let mut options = create_test_options();
    options[1].votes = 30;

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[before]])
        .append_query_results([options])
        .append_query_results([count(0)])
        .append_query_results([[ballot.clone()]])
        .append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .append_query_results([[create_test_poll(PollStatus::Active)]])
        .append_query_results([create_test_options()])
        .append_query_results([[ballot]])
        .into_connection();
    let app = create_test_router(db, false);

    let response = post(
        app,
        "/api/polls/vote",
        Some(("Authorization", bearer("user1"))),
        json!({ "pollId": "p1", "optionIds": ["no"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let data = &body["data"];
    assert_eq!(data["hasVoted"], true);
    assert_eq!(data["myChoices"], json!(["no"]));
    assert_eq!(data["totalVotes"], 76);
    assert_eq!(data["options"][1]["votes"], 31);
    assert_eq!(data["options"][0]["percentage"], 59.2);
    assert_eq!(data["options"][1]["percentage"], 40.8);
}

#[tokio::test]
async fn test_guest_voters_not_listed() {
    let guest_ballot = poll_vote::Model {
        id: "v1".to_string(),
        poll_id: "p1".to_string(),
        voter_key: format!("guest:{}", "0f".repeat(32)),
        option_ids: json!(["yes"]),
        created_at: chrono::Utc::now().into(),
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_poll(PollStatus::Active)]])
        .append_query_results([create_test_options()])
        .append_query_results([[guest_ballot]])
        .into_connection();
    let app = create_test_router(db, true);

    let response = post(app, "/api/polls/show", None, json!({ "pollId": "p1" })).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["options"][0]["votes"], 45);
    assert_eq!(body["data"]["options"][0]["voters"], json!([]));
}

#[tokio::test]
async fn test_vote_on_closed_poll_conflicts() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_poll(PollStatus::Closed)]])
        .into_connection();
    let app = create_test_router(db, false);

    let response = post(
        app,
        "/api/polls/vote",
        Some(("Authorization", bearer("user1"))),
        json!({ "pollId": "p1", "optionIds": ["yes"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "POLL_CLOSED");
}

#[tokio::test]
async fn test_guest_vote_with_empty_selection() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_poll(PollStatus::Active)]])
        .append_query_results([create_test_options()])
        .into_connection();
    let app = create_test_router(db, true);

    let response = post(
        app,
        "/api/polls/vote",
        Some(("X-Device-Token", DEVICE_TOKEN.to_string())),
        json!({ "pollId": "p1", "optionIds": [] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_guest_cannot_create_poll() {
    let app = create_test_router(empty_db(), true);

    let response = post(
        app,
        "/api/polls/create",
        Some(("X-Device-Token", DEVICE_TOKEN.to_string())),
        json!({
            "title": "Block party date",
            "description": "Pick a weekend",
            "options": ["June", "July"],
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_rejects_zero_limit() {
    let app = create_test_router(empty_db(), false);

    let response = post(app, "/api/polls/list", None, json!({ "limit": 0 })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_list_returns_preview() {
    let mut options = create_test_options();
    options.push(poll_option::Model {
        id: "maybe".to_string(),
        poll_id: "p1".to_string(),
        position: 2,
        text: "Maybe".to_string(),
        votes: 0,
    });
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[create_test_poll(PollStatus::Active)]])
        .append_query_results([options])
        .into_connection();
    let app = create_test_router(db, false);

    let response = post(app, "/api/polls/list", None, json!({})).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let first = &body["data"][0];
    assert_eq!(first["optionsCount"], 3);
    assert_eq!(first["preview"].as_array().unwrap().len(), 2);
    assert_eq!(first["tags"], json!(["traffic", "safety"]));
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = create_test_router(empty_db(), false);

    let response = post(app, "/api/polls/nonexistent", None, json!({})).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
