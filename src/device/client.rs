//! HTTP client for the WizardCam device controller.
//!
//! Every operation is one request/response cycle against the controller's
//! local REST API (default `http://10.42.0.1:2223`). The client keeps no
//! state between calls; the underlying `reqwest::Client` connection pool is
//! shared by all of them.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::DeviceConfig;
use crate::device::classify::{cams_running, preview_active};
use crate::device::types::{
    field_string, CamsState, DeviceStatus, PreviewState, WizardAccountInfo,
};

const STATUS: &str = "/status";
const WIZARD_ID: &str = "/get_wizard_id";
const CAMS_STATUS: &str = "/cams_status";
const START_CAMS: &str = "/start_cams";
const PREVIEW_STATUS: &str = "/preview_status";
const START_PREVIEW: &str = "/start_preview";
const TOGGLE_PREVIEW: &str = "/toggle_preview";
const START_STREAMING: &str = "/start_streaming_full";
const STOP_STREAMING: &str = "/stop_streaming_full";

/// Streaming is always started bound to the linked wizard account.
const STREAMING_TYPE: &str = "wizard";

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to build device HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{endpoint}: request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} on {endpoint}: {body}")]
    Http {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: {message}")]
    Device {
        endpoint: &'static str,
        message: String,
    },

    #[error("cameras could not be started")]
    CamsUnavailable,
}

/// Operations the device controller exposes.
///
/// [`DeviceClient`] is the production implementation; the orchestrator is
/// generic over this trait.
#[async_trait]
pub trait DeviceApi: Send + Sync + 'static {
    async fn get_status(&self) -> Result<DeviceStatus, DeviceError>;

    /// Never fails: any error degrades to an unlinked account.
    async fn get_wizard_account_info(&self) -> WizardAccountInfo;

    async fn get_cams_state(&self) -> Result<CamsState, DeviceError>;
    async fn start_cams(&self) -> Result<(), DeviceError>;

    async fn get_preview_state(&self) -> Result<PreviewState, DeviceError>;
    async fn start_preview(&self) -> Result<(), DeviceError>;
    async fn toggle_preview(&self) -> Result<(), DeviceError>;

    async fn start_streaming(&self) -> Result<(), DeviceError>;
    async fn stop_streaming(&self) -> Result<(), DeviceError>;
}

#[derive(Clone)]
pub struct DeviceClient {
    client: Client,
    base_url: String,
    stream_base_url: String,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(DeviceError::Build)?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", config.host, config.port),
            stream_base_url: format!("http://{}:{}", config.host, config.stream_port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URLs the device may publish its HLS stream under, most likely first.
    pub fn stream_candidates(&self) -> Vec<String> {
        let base = format!("{}/live/mystream/", self.stream_base_url);
        let mut candidates = vec![
            base.clone(),
            format!("{}index.m3u8", base),
            format!("{}playlist.m3u8", base),
            format!("{}.m3u8", base.trim_end_matches('/')),
        ];
        candidates.dedup();
        candidates
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<(u16, String), DeviceError> {
        let response = request
            .send()
            .await
            .map_err(|source| DeviceError::Transport { endpoint, source })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|source| DeviceError::Transport { endpoint, source })?;

        debug!(endpoint, status, body = %body, "device response");
        Ok((status, body))
    }

    async fn get(&self, endpoint: &'static str) -> Result<(u16, String), DeviceError> {
        self.send(endpoint, self.client.get(self.url(endpoint))).await
    }

    /// POST an empty JSON object and apply the standard reply contract.
    async fn post_command(&self, endpoint: &'static str) -> Result<Value, DeviceError> {
        let request = self.client.post(self.url(endpoint)).json(&json!({}));
        let (status, body) = self.send(endpoint, request).await?;
        parse_reply(endpoint, status, &body)
    }

    /// GET a state endpoint and return its `message` field.
    async fn get_message(&self, endpoint: &'static str) -> Result<String, DeviceError> {
        let (status, body) = self.get(endpoint).await?;
        if !is_success(status) {
            return Err(DeviceError::Http {
                endpoint,
                status,
                body,
            });
        }
        let j = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| json!({}));
        Ok(field_string(&j, "message"))
    }
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn get_status(&self) -> Result<DeviceStatus, DeviceError> {
        let (status, body) = self.get(STATUS).await?;
        let j = parse_reply(STATUS, status, &body)?;
        Ok(DeviceStatus::from_json(&j))
    }

    async fn get_wizard_account_info(&self) -> WizardAccountInfo {
        let (status, body) = match self.get(WIZARD_ID).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!("wizard account check failed: {}", e);
                return WizardAccountInfo::unlinked();
            }
        };
        if !is_success(status) {
            return WizardAccountInfo::unlinked();
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(j) => WizardAccountInfo::from_json(&j),
            Err(_) => WizardAccountInfo::unlinked(),
        }
    }

    async fn get_cams_state(&self) -> Result<CamsState, DeviceError> {
        let message = self.get_message(CAMS_STATUS).await?;
        Ok(CamsState {
            running: cams_running(&message),
            message,
        })
    }

    async fn start_cams(&self) -> Result<(), DeviceError> {
        self.post_command(START_CAMS).await.map(|_| ())
    }

    async fn get_preview_state(&self) -> Result<PreviewState, DeviceError> {
        let message = self.get_message(PREVIEW_STATUS).await?;
        Ok(PreviewState {
            active: preview_active(&message),
            message,
        })
    }

    async fn start_preview(&self) -> Result<(), DeviceError> {
        self.post_command(START_PREVIEW).await.map(|_| ())
    }

    async fn toggle_preview(&self) -> Result<(), DeviceError> {
        self.post_command(TOGGLE_PREVIEW).await.map(|_| ())
    }

    async fn start_streaming(&self) -> Result<(), DeviceError> {
        let request = self
            .client
            .post(self.url(START_STREAMING))
            .query(&[("type", STREAMING_TYPE)])
            .json(&json!({}));
        let (status, body) = self.send(START_STREAMING, request).await?;
        parse_reply(START_STREAMING, status, &body).map(|_| ())
    }

    async fn stop_streaming(&self) -> Result<(), DeviceError> {
        self.post_command(STOP_STREAMING).await.map(|_| ())
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Standard reply contract: non-2xx is an HTTP error, a JSON body with a
/// truthy `error` flag is a device error, anything else (including a body
/// that is not JSON) is success.
fn parse_reply(endpoint: &'static str, status: u16, body: &str) -> Result<Value, DeviceError> {
    if !is_success(status) {
        return Err(DeviceError::Http {
            endpoint,
            status,
            body: body.to_string(),
        });
    }

    let j = match serde_json::from_str::<Value>(body) {
        Ok(j) => j,
        Err(_) => return Ok(json!({})),
    };

    let flagged = match j.get("error") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if flagged {
        let message = j
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("error")
            .to_string();
        return Err(DeviceError::Device { endpoint, message });
    }

    Ok(j)
}
