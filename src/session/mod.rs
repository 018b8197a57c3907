//! Broadcast session state
//!
//! Owns the reconciled view of device and account state that a presentation
//! layer renders, refreshes it on a fixed interval, and runs user actions
//! against it. Every mutation goes through [`BroadcastSession::update`], which
//! takes the lock, applies a closure and publishes the resulting snapshot.
//! A refresh tick and a user action may interleave: whichever writes last
//! wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, StreamTitleApi};
use crate::bus::{BusEvent, SharedBus};
use crate::config::SessionConfig;
use crate::credentials::{CredentialError, Credentials};
use crate::device::{DeviceError, DeviceStatus, Orchestrator};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("preview did not activate")]
    PreviewNotConfirmed,

    #[error("could not stop preview")]
    PreviewStillActive,

    #[error("broadcast session closed")]
    Closed,
}

/// What the presentation layer renders. Each error slot belongs to one
/// subsystem so a failure in one does not hide the state of the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSnapshot {
    pub connected: bool,
    pub loading: bool,
    pub status: Option<DeviceStatus>,
    pub wizard_username: String,
    /// Streaming controls are disabled unless the device is linked to an account
    pub disable_stream: bool,
    pub streaming_busy: bool,
    pub error: Option<String>,

    pub title_busy: bool,
    pub title_error: Option<String>,

    pub preview_busy: bool,
    pub preview_active: bool,
    pub preview_error: Option<String>,

    pub is_live: bool,
    /// A start was requested and the device has not reported live yet
    pub start_pending: bool,
    pub live_since: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl Default for BroadcastSnapshot {
    fn default() -> Self {
        Self {
            connected: false,
            loading: false,
            status: None,
            wizard_username: String::new(),
            disable_stream: true,
            streaming_busy: false,
            error: None,
            title_busy: false,
            title_error: None,
            preview_busy: false,
            preview_active: false,
            preview_error: None,
            is_live: false,
            start_pending: false,
            live_since: None,
            last_refresh: None,
        }
    }
}

impl BroadcastSnapshot {
    /// State on session start, before the first refresh lands.
    pub fn initial() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    /// State after a failed refresh. Previously shown device data is dropped.
    pub fn disconnected(error: String) -> Self {
        Self {
            connected: false,
            loading: false,
            error: Some(error),
            last_refresh: Some(Utc::now()),
            ..Default::default()
        }
    }
}

struct SessionState {
    snapshot: BroadcastSnapshot,
    start_pending_until: Option<Instant>,
}

impl SessionState {
    fn view(&self) -> BroadcastSnapshot {
        let mut snapshot = self.snapshot.clone();
        snapshot.start_pending = !snapshot.is_live
            && self
                .start_pending_until
                .is_some_and(|until| Instant::now() < until);
        snapshot
    }
}

/// Transitions observed by one write, published after the lock is released.
#[derive(Default)]
struct Transitions {
    connected: Option<String>,
    live: Option<bool>,
    preview: Option<bool>,
}

#[derive(Clone)]
pub struct BroadcastSession {
    orchestrator: Orchestrator,
    titles: Arc<dyn StreamTitleApi>,
    credentials: Arc<Credentials>,
    bus: SharedBus,
    state: Arc<RwLock<SessionState>>,
    refresh_interval: Duration,
    start_pending_ceiling: Duration,
    lifetime: CancellationToken,
}

impl BroadcastSession {
    pub fn new(
        orchestrator: Orchestrator,
        titles: Arc<dyn StreamTitleApi>,
        credentials: Arc<Credentials>,
        bus: SharedBus,
        config: &SessionConfig,
    ) -> Self {
        Self {
            orchestrator,
            titles,
            credentials,
            bus,
            state: Arc::new(RwLock::new(SessionState {
                snapshot: BroadcastSnapshot::initial(),
                start_pending_until: None,
            })),
            refresh_interval: Duration::from_millis(config.refresh_interval_ms),
            start_pending_ceiling: Duration::from_secs(config.start_pending_ceiling_secs),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn snapshot(&self) -> BroadcastSnapshot {
        self.state.read().await.view()
    }

    /// End the session: stops the refresh loop and abandons in-flight actions.
    pub fn close(&self) {
        self.lifetime.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Spawn the periodic refresh loop.
    pub fn spawn(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run().await })
    }

    /// Refresh immediately, then every `refresh_interval` until closed.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.refresh_interval, "broadcast session started");

        loop {
            tokio::select! {
                _ = self.lifetime.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = self.lifetime.cancelled() => break,
                result = self.refresh() => {
                    if let Err(e) = result {
                        debug!("refresh failed: {}", e);
                    }
                }
            }
        }

        info!("broadcast session ended");
    }

    /// Apply `f` under the write lock and publish the result.
    async fn update<F>(&self, f: F) -> BroadcastSnapshot
    where
        F: FnOnce(&mut SessionState),
    {
        let snapshot = {
            let mut state = self.state.write().await;
            f(&mut state);
            state.view()
        };
        self.bus.publish(BusEvent::SessionUpdated {
            snapshot: Box::new(snapshot.clone()),
        });
        snapshot
    }

    /// Run `fut` unless the session ends first.
    async fn until_closed<T, F>(&self, fut: F) -> Result<T, SessionError>
    where
        F: std::future::Future<Output = Result<T, SessionError>>,
    {
        tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => Err(SessionError::Closed),
            result = fut => result,
        }
    }

    /// Fetch status, account link and (best effort) preview state and merge
    /// them. A failed status fetch resets the snapshot to disconnected.
    pub async fn refresh(&self) -> Result<BroadcastSnapshot, SessionError> {
        let device = self.orchestrator.device().clone();

        let status = match device.get_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!("device refresh failed: {}", e);
                let message = e.to_string();
                let mut was_live = false;
                self.update(|s| {
                    was_live = s.snapshot.is_live;
                    s.snapshot = BroadcastSnapshot::disconnected(message.clone());
                })
                .await;
                self.bus
                    .publish(BusEvent::DeviceDisconnected { error: message });
                if was_live {
                    info!("device lost while live");
                    self.bus.publish(BusEvent::LiveEnded);
                }
                return Err(e.into());
            }
        };
        let wizard = device.get_wizard_account_info().await;
        // An answered but failed preview read means inactive; an unreachable
        // endpoint leaves the last value in place.
        let preview = match device.get_preview_state().await {
            Ok(preview) => Some(preview.active),
            Err(DeviceError::Transport { .. }) => None,
            Err(_) => Some(false),
        };

        debug!(
            status = %status.status,
            wizard_ok = wizard.ok,
            user = %wizard.username,
            preview = ?preview,
            "refresh"
        );

        let mut transitions = Transitions::default();
        let snapshot = self
            .update(|s| {
                let was = &s.snapshot;
                let is_live = status.is_live();

                if !was.connected {
                    transitions.connected = Some(status.wizard_name.clone());
                }
                if is_live != was.is_live {
                    transitions.live = Some(is_live);
                }
                let preview_active = preview.unwrap_or(was.preview_active);
                if preview_active != was.preview_active {
                    transitions.preview = Some(preview_active);
                }

                let live_since = match (is_live, was.live_since) {
                    (true, Some(since)) => Some(since),
                    (true, None) => Some(Utc::now()),
                    (false, _) => None,
                };
                if is_live {
                    s.start_pending_until = None;
                }

                let next = &mut s.snapshot;
                next.connected = true;
                next.loading = false;
                next.wizard_username = wizard.username.clone();
                next.disable_stream = !wizard.ok;
                next.preview_active = preview_active;
                next.error = None;
                next.is_live = is_live;
                next.live_since = live_since;
                next.last_refresh = Some(Utc::now());
                next.status = Some(status.clone());
            })
            .await;

        if let Some(device_name) = transitions.connected {
            self.bus.publish(BusEvent::DeviceConnected { device_name });
        }
        match transitions.live {
            Some(true) => {
                info!("device is live");
                self.bus.publish(BusEvent::LiveStarted {
                    device_name: status.wizard_name.clone(),
                });
            }
            Some(false) => {
                info!("device went off air");
                self.bus.publish(BusEvent::LiveEnded);
            }
            None => {}
        }
        if let Some(active) = transitions.preview {
            self.bus.publish(BusEvent::PreviewChanged { active });
        }

        Ok(snapshot)
    }

    /// Refresh after a successful action; its failure is already recorded.
    async fn refresh_after_action(&self) {
        if let Err(e) = self.refresh().await {
            debug!("post-action refresh failed: {}", e);
        }
    }

    fn action_failed(&self, action: &str, error: &str) {
        warn!(action, "{}", error);
        self.bus.publish(BusEvent::ActionFailed {
            action: action.to_string(),
            error: error.to_string(),
        });
    }

    pub async fn start_streaming(&self) -> Result<BroadcastSnapshot, SessionError> {
        let ceiling = self.start_pending_ceiling;
        self.update(|s| {
            s.snapshot.streaming_busy = true;
            s.snapshot.error = None;
            s.start_pending_until = Some(Instant::now() + ceiling);
        })
        .await;

        let outcome = self
            .until_closed(async {
                self.orchestrator.start_streaming_session().await?;
                self.refresh_after_action().await;
                Ok::<(), SessionError>(())
            })
            .await;

        if let Err(e) = &outcome {
            let message = format!("start streaming failed: {}", e);
            self.action_failed("start_streaming", &message);
            self.update(|s| {
                s.snapshot.error = Some(message);
                s.start_pending_until = None;
            })
            .await;
        }

        let snapshot = self.update(|s| s.snapshot.streaming_busy = false).await;
        outcome.map(|()| snapshot)
    }

    pub async fn stop_streaming(&self) -> Result<BroadcastSnapshot, SessionError> {
        self.update(|s| {
            s.snapshot.streaming_busy = true;
            s.snapshot.error = None;
            s.start_pending_until = None;
        })
        .await;

        let outcome = self
            .until_closed(async {
                self.orchestrator.stop_streaming_session().await?;
                self.refresh_after_action().await;
                Ok::<(), SessionError>(())
            })
            .await;

        if let Err(e) = &outcome {
            let message = format!("stop streaming failed: {}", e);
            self.action_failed("stop_streaming", &message);
            self.update(|s| s.snapshot.error = Some(message)).await;
        }

        let snapshot = self.update(|s| s.snapshot.streaming_busy = false).await;
        outcome.map(|()| snapshot)
    }

    pub async fn ensure_preview_active(&self) -> Result<BroadcastSnapshot, SessionError> {
        self.update(|s| {
            s.snapshot.preview_busy = true;
            s.snapshot.preview_error = None;
        })
        .await;

        let outcome = self
            .until_closed(async {
                Ok::<bool, SessionError>(self.orchestrator.ensure_preview_active().await?)
            })
            .await;

        let result = match outcome {
            Ok(true) => {
                self.update(|s| s.snapshot.preview_active = true).await;
                self.bus.publish(BusEvent::PreviewChanged { active: true });
                Ok(())
            }
            Ok(false) => {
                let e = SessionError::PreviewNotConfirmed;
                self.action_failed("preview_start", &e.to_string());
                let message = e.to_string();
                self.update(|s| {
                    s.snapshot.preview_active = false;
                    s.snapshot.preview_error = Some(message);
                })
                .await;
                Err(e)
            }
            Err(e) => {
                let message = e.to_string();
                self.action_failed("preview_start", &message);
                self.update(|s| s.snapshot.preview_error = Some(message)).await;
                Err(e)
            }
        };

        let snapshot = self.update(|s| s.snapshot.preview_busy = false).await;
        result.map(|()| snapshot)
    }

    pub async fn ensure_preview_inactive(&self) -> Result<BroadcastSnapshot, SessionError> {
        self.update(|s| {
            s.snapshot.preview_busy = true;
            s.snapshot.preview_error = None;
        })
        .await;

        let outcome = self
            .until_closed(async {
                Ok::<bool, SessionError>(self.orchestrator.ensure_preview_inactive().await?)
            })
            .await;

        let result = match outcome {
            Ok(true) => {
                self.update(|s| s.snapshot.preview_active = false).await;
                self.bus.publish(BusEvent::PreviewChanged { active: false });
                Ok(())
            }
            Ok(false) => {
                // last poll still read "active"
                let e = SessionError::PreviewStillActive;
                let message = e.to_string();
                self.action_failed("preview_stop", &message);
                self.update(|s| {
                    s.snapshot.preview_active = true;
                    s.snapshot.preview_error = Some(message);
                })
                .await;
                Err(e)
            }
            Err(e) => {
                let message = e.to_string();
                self.action_failed("preview_stop", &message);
                self.update(|s| s.snapshot.preview_error = Some(message)).await;
                Err(e)
            }
        };

        let snapshot = self.update(|s| s.snapshot.preview_busy = false).await;
        result.map(|()| snapshot)
    }

    /// Publish the stream title to the backend, then start streaming.
    ///
    /// The credential is resolved before anything touches the network. A
    /// blank title skips the backend call; a failed title update aborts the
    /// start.
    pub async fn post_title_and_start(
        &self,
        title: &str,
    ) -> Result<BroadcastSnapshot, SessionError> {
        self.update(|s| {
            s.snapshot.title_busy = true;
            s.snapshot.title_error = None;
            s.snapshot.error = None;
        })
        .await;

        let published = self.until_closed(self.publish_title(title)).await;

        if let Err(e) = published {
            let message = e.to_string();
            self.action_failed("post_title", &message);
            self.update(|s| {
                s.snapshot.title_busy = false;
                s.snapshot.title_error = Some(message.clone());
                s.snapshot.error = Some(message);
            })
            .await;
            return Err(e);
        }

        self.update(|s| s.snapshot.title_busy = false).await;
        self.start_streaming().await
    }

    async fn publish_title(&self, title: &str) -> Result<(), SessionError> {
        let token = self.credentials.resolve_token().await?;

        let title = title.trim();
        if title.is_empty() {
            debug!("no title given, skipping title update");
            return Ok(());
        }

        self.titles.update_stream_title(&token, title).await?;
        Ok(())
    }
}
