//! Mock WizardCam device controller for testing
//!
//! Serves the controller's REST endpoints with scriptable state and counts
//! every request per endpoint.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Scriptable device state
#[derive(Debug, Clone)]
pub struct MockDeviceState {
    pub status_code: String,
    /// `/status` answers 500 when set
    pub status_down: bool,
    pub linked: bool,
    pub cams_running: bool,
    /// Whether `/start_cams` actually brings the cameras up
    pub cams_start_works: bool,
    pub preview_active: bool,
    /// `/start_preview` answers 404 when unset
    pub start_preview_supported: bool,
    /// Endpoint that replies `{"error": true, ...}`
    pub error_on: Option<String>,
    pub streaming_types: Vec<String>,
    pub hits: HashMap<String, u32>,
}

impl Default for MockDeviceState {
    fn default() -> Self {
        Self {
            status_code: "2".to_string(),
            status_down: false,
            linked: true,
            cams_running: false,
            cams_start_works: true,
            preview_active: false,
            start_preview_supported: true,
            error_on: None,
            streaming_types: Vec::new(),
            hits: HashMap::new(),
        }
    }
}

type SharedState = Arc<RwLock<MockDeviceState>>;

/// Mock WizardCam controller
pub struct MockWizardCam {
    addr: SocketAddr,
    state: SharedState,
    handle: JoinHandle<()>,
}

impl MockWizardCam {
    /// Start a mock device on a random port
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockDeviceState::default()));

        let app = Router::new()
            .route("/status", get(status))
            .route("/get_wizard_id", get(wizard_id))
            .route("/cams_status", get(cams_status))
            .route("/start_cams", post(start_cams))
            .route("/preview_status", get(preview_status))
            .route("/start_preview", post(start_preview))
            .route("/toggle_preview", post(toggle_preview))
            .route("/start_streaming_full", post(start_streaming))
            .route("/stop_streaming_full", post(stop_streaming))
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

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Device config pointing at this mock
    pub fn device_config(&self) -> wizardlive_broadcast::config::DeviceConfig {
        wizardlive_broadcast::config::DeviceConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            ..Default::default()
        }
    }

    pub async fn set(&self, f: impl FnOnce(&mut MockDeviceState)) {
        let mut state = self.state.write().await;
        f(&mut state);
    }

    pub async fn snapshot(&self) -> MockDeviceState {
        self.state.read().await.clone()
    }

    /// Number of requests seen on `endpoint`
    pub async fn hits(&self, endpoint: &str) -> u32 {
        self.state
            .read()
            .await
            .hits
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

async fn hit(state: &SharedState, endpoint: &str) -> Option<Response> {
    let mut s = state.write().await;
    *s.hits.entry(endpoint.to_string()).or_default() += 1;
    if s.error_on.as_deref() == Some(endpoint) {
        return Some(
            Json(json!({"error": true, "message": format!("{} failed", endpoint)}))
                .into_response(),
        );
    }
    None
}

async fn status(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/status").await {
        return resp;
    }
    let s = state.read().await;
    if s.status_down {
        return (StatusCode::INTERNAL_SERVER_ERROR, "controller crashed").into_response();
    }
    Json(json!({
        "battery": 87,
        "cpu_temp": "41.5",
        "status": s.status_code,
        "wizard_name": "Wizard-01",
        "full_serial_number": "WZ-0001"
    }))
    .into_response()
}

async fn wizard_id(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/get_wizard_id").await {
        return resp;
    }
    if state.read().await.linked {
        Json(json!({
            "message": "Current Wizard ID and username",
            "wizard_id": "wz-42",
            "username": "coach"
        }))
        .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "No wizard linked"})),
        )
            .into_response()
    }
}

async fn cams_status(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/cams_status").await {
        return resp;
    }
    let message = if state.read().await.cams_running {
        "Cams are running"
    } else {
        "Cams are not running"
    };
    Json(json!({ "message": message })).into_response()
}

async fn start_cams(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/start_cams").await {
        return resp;
    }
    let mut s = state.write().await;
    if s.cams_start_works {
        s.cams_running = true;
    }
    Json(json!({"message": "Cams started"})).into_response()
}

async fn preview_status(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/preview_status").await {
        return resp;
    }
    let message = if state.read().await.preview_active {
        "Preview is active"
    } else {
        "Preview is not active"
    };
    Json(json!({ "message": message })).into_response()
}

async fn start_preview(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/start_preview").await {
        return resp;
    }
    let mut s = state.write().await;
    if !s.start_preview_supported {
        return StatusCode::NOT_FOUND.into_response();
    }
    s.preview_active = true;
    Json(json!({"message": "Preview started"})).into_response()
}

async fn toggle_preview(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/toggle_preview").await {
        return resp;
    }
    let mut s = state.write().await;
    s.preview_active = !s.preview_active;
    Json(json!({"message": "Preview toggled"})).into_response()
}

async fn start_streaming(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(resp) = hit(&state, "/start_streaming_full").await {
        return resp;
    }
    let mut s = state.write().await;
    s.streaming_types
        .push(params.get("type").cloned().unwrap_or_default());
    s.status_code = "6".to_string();
    Json(json!({"message": "Streaming started"})).into_response()
}

async fn stop_streaming(State(state): State<SharedState>) -> Response {
    if let Some(resp) = hit(&state, "/stop_streaming_full").await {
        return resp;
    }
    state.write().await.status_code = "2".to_string();
    Json(json!({"message": "Streaming stopped"})).into_response()
}
