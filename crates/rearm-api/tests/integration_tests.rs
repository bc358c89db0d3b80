//! Integration tests for the Rearm HTTP API.
//!
//! Each test builds its own in-memory state and drives the router with
//! `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use rearm_action::{ActuatorConnector, ConnectionCache, Registrar, Scheduler, SimulatedVendor};
use rearm_api::create_router;
use rearm_api::handlers::{HealthResponse, PendingResponse, UsersResponse};
use rearm_api::state::AppState;
use rearm_core::config::RearmConfig;
use rearm_core::types::{CredentialRole, Mode};
use rearm_skill::{SkillRouter, SkillServices};
use rearm_storage::{EventStore, MemoryDelayQueue, MemoryRecordStore};

// =============================================================================
// Helpers
// =============================================================================

const TEST_TOKEN: &str = "test-token-12345";

struct TestApp {
    state: AppState,
    queue: Arc<MemoryDelayQueue>,
}

fn make_test_app() -> TestApp {
    let store = EventStore::new(Arc::new(MemoryRecordStore::new()));
    let queue = Arc::new(MemoryDelayQueue::default());
    let registrar = Registrar::new(store.clone(), CredentialRole::Listener);
    let connector = Arc::new(ActuatorConnector::new(
        store.clone(),
        CredentialRole::Listener,
        Arc::new(SimulatedVendor::new(Mode::Away)),
        Arc::new(ConnectionCache::new()),
        "test",
    ));
    let services = SkillServices {
        scheduler: Scheduler::new(store.clone(), queue.clone()),
        registrar: registrar.clone(),
        actuators: connector,
        default_delay_secs: 180,
    };
    let state = AppState::new(
        RearmConfig::default(),
        SkillRouter::new(services),
        registrar,
        store,
        TEST_TOKEN,
    );
    TestApp { state, queue }
}

fn make_app() -> axum::Router {
    create_router(make_test_app().state)
}

fn authed_get(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn authed_post_empty(uri: &str) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap()
}

fn authed_post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn skill_request(user_id: &str, kind: &str, intent: Option<&str>) -> Value {
    let mut request = json!({"type": kind, "requestId": "req-1"});
    if let Some(name) = intent {
        request["intent"] = json!({"name": name, "slots": {}});
    }
    json!({"session": {"user": {"userId": user_id}}, "request": request})
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_needs_no_auth() {
    let resp = make_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.version.is_empty());
}

#[tokio::test]
async fn test_cors_follows_bound_port() {
    let app = create_router(make_test_app().state.with_port(4555));
    let cors_origin = |origin: &'static str| {
        let app = app.clone();
        async move {
            let resp = app
                .oneshot(
                    Request::get("/health")
                        .header("origin", origin)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            resp.headers()
                .get("access-control-allow-origin")
                .map(|value| value.to_str().unwrap().to_string())
        }
    };

    assert_eq!(
        cors_origin("http://localhost:4555").await.as_deref(),
        Some("http://localhost:4555")
    );
    assert_eq!(cors_origin("http://localhost:3040").await, None);
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let resp = make_app()
        .oneshot(Request::get("/v1/credentials").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["message"], "Missing Authorization header");
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let req = Request::get("/v1/events/u1")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let resp = make_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let req = Request::get("/v1/credentials")
        .header("authorization", format!("Basic {}", TEST_TOKEN))
        .body(Body::empty())
        .unwrap();
    let resp = make_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Credentials
// =============================================================================

#[tokio::test]
async fn test_pending_then_register() {
    let app = make_app();

    let resp = app
        .clone()
        .oneshot(authed_post_empty("/v1/credentials/u1/pending"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let pending: PendingResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(pending.user_id, "u1");
    assert_eq!(pending.code.len(), 4);

    let resp = app
        .clone()
        .oneshot(authed_post_json(
            "/v1/credentials",
            &json!({"user_id": "u1", "token": "rt-abc"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["registered"], true);

    let resp = app.oneshot(authed_get("/v1/credentials")).await.unwrap();
    let users: UsersResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(users.user_ids, vec!["u1"]);
}

#[tokio::test]
async fn test_register_code_as_token_is_unprocessable() {
    let resp = make_app()
        .oneshot(authed_post_json(
            "/v1/credentials",
            &json!({"user_id": "u1", "token": "4321"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await["error"], "unprocessable_entity");
}

#[tokio::test]
async fn test_register_without_user_is_bad_request() {
    let resp = make_app()
        .oneshot(authed_post_json(
            "/v1/credentials",
            &json!({"user_id": " ", "token": "rt-abc"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Skill and events
// =============================================================================

#[tokio::test]
async fn test_skill_schedules_and_event_is_visible() {
    let test_app = make_test_app();
    test_app
        .state
        .registrar
        .complete("u1", "rt-abc")
        .await
        .unwrap();
    let app = create_router(test_app.state.clone());

    let resp = app
        .clone()
        .oneshot(authed_post_json(
            "/v1/skill",
            &skill_request("u1", "IntentRequest", Some("DelayAwayIntent")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(
        body["speech"],
        "Disarmed. Ring will be in away mode in 3 minute. Have a good trip!"
    );
    assert_eq!(body["end_session"], true);
    assert_eq!(test_app.queue.len(), 2);

    let resp = app.oneshot(authed_get("/v1/events/u1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let event = body_json(resp).await;
    assert_eq!(event["targetMode"], "away");
    assert_eq!(event["delaySeconds"], 180);
    assert_eq!(event["status"], "scheduled");
}

#[tokio::test]
async fn test_skill_for_unregistered_user_speaks_code() {
    let test_app = make_test_app();
    let app = create_router(test_app.state.clone());
    let resp = app
        .oneshot(authed_post_json(
            "/v1/skill",
            &skill_request("u2", "LaunchRequest", None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let speech = body_json(resp).await["speech"].as_str().unwrap().to_string();
    assert!(speech.contains("register code"));
    assert!(test_app.queue.is_empty());
}

#[tokio::test]
async fn test_skill_help_keeps_session_open() {
    let resp = make_app()
        .oneshot(authed_post_json(
            "/v1/skill",
            &skill_request("u1", "IntentRequest", Some("AMAZON.HelpIntent")),
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["end_session"], false);
    assert_eq!(body["reprompt"], body["speech"]);
}

#[tokio::test]
async fn test_skill_without_user_is_bad_request() {
    let resp = make_app()
        .oneshot(authed_post_json(
            "/v1/skill",
            &skill_request("", "LaunchRequest", None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_skill_rejects_malformed_envelope() {
    let resp = make_app()
        .oneshot(authed_post_json("/v1/skill", &json!({"request": {}})))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_missing_event_is_not_found() {
    let resp = make_app()
        .oneshot(authed_get("/v1/events/nobody"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "not_found");
}
