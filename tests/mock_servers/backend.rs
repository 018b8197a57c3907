//! Mock WizardLive backend for testing
//!
//! Accepts one account (`coach@example.test` / `secret`) and issues a fixed
//! bearer token. Authenticated routes answer 401 for any other token.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub const EMAIL: &str = "coach@example.test";
pub const PASSWORD: &str = "secret";
pub const TOKEN: &str = "tok-123";

#[derive(Debug, Clone, Default)]
pub struct MockBackendState {
    /// Titles received on `update_stream_title`
    pub titles: Vec<String>,
    /// Reply `{"ok": false}` to title updates
    pub reject_titles: bool,
    /// Reply to `channels/live` with an object instead of a list
    pub live_odd_shape: bool,
    pub live_auth_seen: Vec<Option<String>>,
}

type SharedState = Arc<RwLock<MockBackendState>>;

pub struct MockBackend {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockBackendState::default()));

        let app = Router::new()
            .route("/login", post(login))
            .route("/register", post(register))
            .route("/auth/recover-password", post(recover))
            .route("/channels/live", get(live_channels))
            .route("/channels/me", get(my_channel))
            .route("/channels/me/followers", get(followers))
            .route("/me/profile", get(profile))
            .route("/me/subscriptions", get(subscriptions))
            .route("/update_stream_title", post(update_title))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn backend_config(&self) -> wizardlive_broadcast::config::BackendConfig {
        wizardlive_broadcast::config::BackendConfig {
            base_url: self.base_url(),
            ..Default::default()
        }
    }

    pub async fn set(&self, f: impl FnOnce(&mut MockBackendState)) {
        let mut state = self.state.write().await;
        f(&mut state);
    }

    pub async fn snapshot(&self) -> MockBackendState {
        self.state.read().await.clone()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn authorized(headers: &HeaderMap) -> bool {
    bearer(headers).as_deref() == Some(format!("Bearer {}", TOKEN).as_str())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "invalid token"})),
    )
        .into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(json!({
            "token": TOKEN,
            "user": {"id": "u-1", "email": EMAIL, "username": "coach", "role": "broadcaster"}
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid credentials"})),
        )
            .into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL {
        return Json(json!({"ok": false, "error": "email already registered"})).into_response();
    }
    let username = body["username"].as_str().unwrap_or_default();
    Json(json!({"ok": true, "message": format!("welcome {}", username)})).into_response()
}

async fn recover(Json(body): Json<Value>) -> Response {
    Json(json!({
        "status": "sent",
        "message": format!("recovery mail sent to {}", body["email"].as_str().unwrap_or(""))
    }))
    .into_response()
}

async fn live_channels(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let mut s = state.write().await;
    s.live_auth_seen.push(bearer(&headers));
    if s.live_odd_shape {
        return Json(json!({"message": "no live channels"})).into_response();
    }
    Json(json!([
        {
            "stream_id": "s-1",
            "channelSlug": "elite-u17",
            "title": "Final",
            "ownerUsername": "coach",
            "hasPaid": false,
            "isSubscribed": authorized(&headers)
        }
    ]))
    .into_response()
}

async fn my_channel(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "channelSlug": "elite-u17",
        "title": "Elite U17",
        "isLive": 0,
        "logoUrl": null,
        "streamKeyMasked": "****abcd"
    }))
    .into_response()
}

async fn followers(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "ok": true,
        "channelSlug": "elite-u17",
        "count": 2,
        "items": [
            {"userId": "u-2", "username": "fan1"},
            {"userId": "u-3", "username": "fan2"}
        ]
    }))
    .into_response()
}

async fn profile(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "username": "coach",
        "email": EMAIL,
        "role": "broadcaster",
        "createdAt": "2025-01-01T00:00:00Z",
        "logo_url": null
    }))
    .into_response()
}

async fn subscriptions(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"ok": true, "count": 0, "items": []})).into_response()
}

async fn update_title(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut s = state.write().await;
    if s.reject_titles {
        return Json(json!({"ok": false, "message": "title not allowed"})).into_response();
    }
    s.titles
        .push(body["title"].as_str().unwrap_or_default().to_string());
    Json(json!({"ok": true})).into_response()
}
