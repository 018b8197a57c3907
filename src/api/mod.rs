//! HTTP API handlers

use crate::backend::models::{RegisterRequest, RegisterResponse};
use crate::backend::{BackendClient, BackendError};
use crate::bus::{BusEvent, SharedBus};
use crate::credentials::{CredentialError, Credentials};
use crate::session::{BroadcastSession, SessionError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: BroadcastSession,
    pub backend: Arc<BackendClient>,
    pub credentials: Arc<Credentials>,
    pub bus: SharedBus,
    /// HLS playlist candidates for the device preview player
    pub stream_urls: Arc<Vec<String>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        session: BroadcastSession,
        backend: Arc<BackendClient>,
        credentials: Arc<Credentials>,
        bus: SharedBus,
        stream_urls: Vec<String>,
    ) -> Self {
        Self {
            session,
            backend,
            credentials,
            bus,
            stream_urls: Arc::new(stream_urls),
            started_at: Instant::now(),
        }
    }
}

/// All API routes, without middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/status", get(status_handler))
        // Broadcast session
        .route("/broadcast", get(broadcast_handler))
        .route("/broadcast/refresh", post(refresh_handler))
        .route("/broadcast/stream/start", post(start_streaming_handler))
        .route("/broadcast/stream/stop", post(stop_streaming_handler))
        .route("/broadcast/preview/start", post(preview_start_handler))
        .route("/broadcast/preview/stop", post(preview_stop_handler))
        .route("/broadcast/title", post(post_title_handler))
        .route("/broadcast/stream_urls", get(stream_urls_handler))
        // Backend account
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/recover", post(recover_handler))
        .route("/channels/live", get(live_channels_handler))
        .route("/me/channel", get(my_channel_handler))
        .route("/me/profile", get(my_profile_handler))
        .route("/me/followers", get(my_followers_handler))
        .route("/me/subscriptions", get(my_subscriptions_handler))
        // Event stream (SSE)
        .route("/events", get(events_handler))
        .with_state(state)
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn session_error_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::Credentials(CredentialError::Missing) => StatusCode::UNAUTHORIZED,
        SessionError::Credentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Backend(e) => backend_error_status(e),
        SessionError::PreviewNotConfirmed | SessionError::PreviewStillActive => {
            StatusCode::CONFLICT
        }
        SessionError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Device(_) => StatusCode::BAD_GATEWAY,
    }
}

fn backend_error_status(e: &BackendError) -> StatusCode {
    match e.status() {
        Some(401) | Some(403) => StatusCode::UNAUTHORIZED,
        Some(400) | Some(409) | Some(422) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn session_result(
    result: Result<crate::session::BroadcastSnapshot, SessionError>,
) -> Response {
    match result {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(session_error_status(&e), e),
    }
}

/// General status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub git_sha: &'static str,
    pub uptime_secs: u64,
    pub device_connected: bool,
    pub is_live: bool,
    pub signed_in: bool,
    pub bus_subscribers: usize,
}

/// GET /status - Service health check
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.session.snapshot().await;

    Json(StatusResponse {
        service: "wizardlive-broadcast",
        version: env!("WLB_VERSION"),
        git_sha: env!("WLB_GIT_SHA"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        device_connected: snapshot.connected,
        is_live: snapshot.is_live,
        signed_in: state.credentials.cached_token().is_some(),
        bus_subscribers: state.bus.subscriber_count(),
    })
}

// =============================================================================
// Broadcast handlers
// =============================================================================

/// GET /broadcast - Current session snapshot
pub async fn broadcast_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.snapshot().await)
}

/// POST /broadcast/refresh - Refresh now instead of waiting for the next tick
pub async fn refresh_handler(State(state): State<AppState>) -> Response {
    session_result(state.session.refresh().await)
}

/// POST /broadcast/stream/start
pub async fn start_streaming_handler(State(state): State<AppState>) -> Response {
    session_result(state.session.start_streaming().await)
}

/// POST /broadcast/stream/stop
pub async fn stop_streaming_handler(State(state): State<AppState>) -> Response {
    session_result(state.session.stop_streaming().await)
}

/// POST /broadcast/preview/start
pub async fn preview_start_handler(State(state): State<AppState>) -> Response {
    session_result(state.session.ensure_preview_active().await)
}

/// POST /broadcast/preview/stop
pub async fn preview_stop_handler(State(state): State<AppState>) -> Response {
    session_result(state.session.ensure_preview_inactive().await)
}

#[derive(Deserialize)]
pub struct TitleRequest {
    #[serde(default)]
    pub title: String,
}

/// POST /broadcast/title - Set the stream title, then go live
pub async fn post_title_handler(
    State(state): State<AppState>,
    Json(req): Json<TitleRequest>,
) -> Response {
    session_result(state.session.post_title_and_start(&req.title).await)
}

/// GET /broadcast/stream_urls
pub async fn stream_urls_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.stream_urls.as_ref().clone())
}

// =============================================================================
// Account handlers
// =============================================================================

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Serialize)]
pub struct LoginResult {
    pub ok: bool,
    pub user_id: String,
    pub username: String,
    pub role: String,
}

/// POST /auth/login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginBody>,
) -> Response {
    let login = match state.backend.login(req.email.trim(), &req.password).await {
        Ok(login) => login,
        Err(e) => return error_response(backend_error_status(&e), e),
    };

    if let Err(e) = state.credentials.sign_in(&login, req.remember_me).await {
        tracing::error!("failed to persist session: {}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }
    state.bus.publish(BusEvent::SignedIn {
        username: login.user.username.clone(),
    });

    Json(LoginResult {
        ok: true,
        user_id: login.user.id,
        username: login.user.username,
        role: login.user.role,
    })
    .into_response()
}

/// POST /auth/logout
pub async fn logout_handler(State(state): State<AppState>) -> Response {
    match state.credentials.sign_out().await {
        Ok(()) => {
            state.bus.publish(BusEvent::SignedOut);
            Json(serde_json::json!({"ok": true})).into_response()
        }
        Err(e) => {
            tracing::error!("failed to clear stored session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// POST /auth/register
pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    match state.backend.register(&req).await {
        Ok(RegisterResponse {
            ok: Some(false),
            message,
            error,
        }) => error_response(
            StatusCode::BAD_REQUEST,
            error.or(message).unwrap_or_else(|| "registration rejected".into()),
        ),
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(backend_error_status(&e), e),
    }
}

#[derive(Deserialize)]
pub struct RecoverBody {
    pub email: String,
}

/// POST /auth/recover - Send a password recovery email
pub async fn recover_handler(
    State(state): State<AppState>,
    Json(req): Json<RecoverBody>,
) -> Response {
    match state.backend.recover_password(req.email.trim()).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(backend_error_status(&e), e),
    }
}

/// GET /channels/live - Works signed out; the token only personalizes flags
pub async fn live_channels_handler(State(state): State<AppState>) -> impl IntoResponse {
    let token = state.credentials.resolve_token().await.ok();
    Json(state.backend.live_channels(token.as_deref()).await)
}

/// Resolve the bearer token or answer 401.
async fn require_token(state: &AppState) -> Result<String, Response> {
    state.credentials.resolve_token().await.map_err(|e| match e {
        CredentialError::Missing => error_response(StatusCode::UNAUTHORIZED, e),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    })
}

fn backend_result<T: Serialize>(result: Result<T, BackendError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(backend_error_status(&e), e),
    }
}

/// GET /me/channel
pub async fn my_channel_handler(State(state): State<AppState>) -> Response {
    match require_token(&state).await {
        Ok(token) => backend_result(state.backend.my_channel(&token).await),
        Err(resp) => resp,
    }
}

/// GET /me/profile
pub async fn my_profile_handler(State(state): State<AppState>) -> Response {
    match require_token(&state).await {
        Ok(token) => backend_result(state.backend.my_profile(&token).await),
        Err(resp) => resp,
    }
}

/// GET /me/followers
pub async fn my_followers_handler(State(state): State<AppState>) -> Response {
    match require_token(&state).await {
        Ok(token) => backend_result(state.backend.my_followers(&token).await),
        Err(resp) => resp,
    }
}

/// GET /me/subscriptions
pub async fn my_subscriptions_handler(State(state): State<AppState>) -> Response {
    match require_token(&state).await {
        Ok(token) => backend_result(state.backend.my_subscriptions(&token).await),
        Err(resp) => resp,
    }
}

// =============================================================================
// SSE Events
// =============================================================================

/// GET /events - Server-Sent Events stream
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().data(json))),
                Err(_) => None,
            },
            Err(_) => None, // Skip lagged messages
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
