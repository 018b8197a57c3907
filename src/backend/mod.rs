//! WizardLive REST backend client
//!
//! Authentication, channel/profile/social reads and the stream title update
//! used before going live. Authenticated calls take the bearer token
//! explicitly; resolving it is the caller's job (see [`crate::credentials`]).

pub mod models;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BackendConfig;
use models::{
    Followers, LiveChannel, LoginRequest, LoginResponse, MyChannel, Profile,
    RecoverPasswordRequest, RecoverPasswordResponse, RegisterRequest, RegisterResponse,
    Subscriptions, UpdateStreamTitleRequest,
};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build backend HTTP client: {0}")]
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

    #[error("{endpoint}: unexpected response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{endpoint}: {message}")]
    Rejected {
        endpoint: &'static str,
        message: String,
    },
}

impl BackendError {
    /// HTTP status for errors that carry one
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Stream title update, the only backend call the broadcast session makes.
#[async_trait]
pub trait StreamTitleApi: Send + Sync + 'static {
    async fn update_stream_title(&self, token: &str, title: &str) -> Result<(), BackendError>;
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        // Url::join drops the last path segment unless the base ends in '/'
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(BackendError::Build)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(endpoint)?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send(endpoint, request).await?;
        serde_json::from_str(&body).map_err(|source| BackendError::Decode { endpoint, source })
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<String, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Transport { endpoint, source })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| BackendError::Transport { endpoint, source })?;

        debug!(endpoint, status = status.as_u16(), "backend response");

        if !status.is_success() {
            return Err(BackendError::Http {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, BackendError> {
        const ENDPOINT: &str = "login";
        debug!(email, "logging in");
        let request = self.client.post(self.url(ENDPOINT)?).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        self.send_json(ENDPOINT, request).await
    }

    pub async fn register(&self, body: &RegisterRequest) -> Result<RegisterResponse, BackendError> {
        const ENDPOINT: &str = "register";
        let request = self.client.post(self.url(ENDPOINT)?).json(body);
        self.send_json(ENDPOINT, request).await
    }

    pub async fn recover_password(
        &self,
        email: &str,
    ) -> Result<RecoverPasswordResponse, BackendError> {
        const ENDPOINT: &str = "auth/recover-password";
        let request = self
            .client
            .post(self.url(ENDPOINT)?)
            .json(&RecoverPasswordRequest {
                email: email.to_string(),
            });
        self.send_json(ENDPOINT, request).await
    }

    /// Live channels. The backend answers with odd shapes when nothing is
    /// live, so every failure degrades to an empty list.
    pub async fn live_channels(&self, token: Option<&str>) -> Vec<LiveChannel> {
        const ENDPOINT: &str = "channels/live";
        let url = match self.url(ENDPOINT) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}", e);
                return Vec::new();
            }
        };
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        match self.send_json::<Vec<LiveChannel>>(ENDPOINT, request).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!("live channel listing unusable, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn my_channel(&self, token: &str) -> Result<MyChannel, BackendError> {
        const ENDPOINT: &str = "channels/me";
        let request = self.client.get(self.url(ENDPOINT)?).bearer_auth(token);
        self.send_json(ENDPOINT, request).await
    }

    pub async fn my_profile(&self, token: &str) -> Result<Profile, BackendError> {
        const ENDPOINT: &str = "me/profile";
        let request = self.client.get(self.url(ENDPOINT)?).bearer_auth(token);
        self.send_json(ENDPOINT, request).await
    }

    pub async fn my_followers(&self, token: &str) -> Result<Followers, BackendError> {
        const ENDPOINT: &str = "channels/me/followers";
        let request = self.client.get(self.url(ENDPOINT)?).bearer_auth(token);
        self.send_json(ENDPOINT, request).await
    }

    pub async fn my_subscriptions(&self, token: &str) -> Result<Subscriptions, BackendError> {
        const ENDPOINT: &str = "me/subscriptions";
        let request = self.client.get(self.url(ENDPOINT)?).bearer_auth(token);
        self.send_json(ENDPOINT, request).await
    }
}

#[async_trait]
impl StreamTitleApi for BackendClient {
    async fn update_stream_title(&self, token: &str, title: &str) -> Result<(), BackendError> {
        const ENDPOINT: &str = "update_stream_title";
        let request = self
            .client
            .post(self.url(ENDPOINT)?)
            .bearer_auth(token)
            .json(&UpdateStreamTitleRequest {
                title: title.to_string(),
            });
        let body = self.send(ENDPOINT, request).await?;

        // A 2xx may still carry {"ok": false, "message": ...}
        if let Ok(j) = serde_json::from_str::<Value>(&body) {
            if j.get("ok").and_then(|v| v.as_bool()) == Some(false) {
                let message = j
                    .get("message")
                    .or_else(|| j.get("error"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("title rejected")
                    .to_string();
                return Err(BackendError::Rejected {
                    endpoint: ENDPOINT,
                    message,
                });
            }
        }

        info!(title, "stream title updated");
        Ok(())
    }
}
