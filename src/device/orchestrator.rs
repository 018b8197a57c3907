//! Multi-step device operations.
//!
//! The controller brings cameras and preview up asynchronously and has no
//! push channel, so every "ensure" operation issues its command once and then
//! polls the matching state endpoint on a fixed cadence. Polling is bounded:
//! after the last attempt the operation reports `Ok(false)` instead of waiting
//! any longer. Dropping the returned future abandons the poll.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::device::client::{DeviceApi, DeviceError};

/// Fixed-cadence poll bound. Worst-case wait is `attempts * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// After `/start_cams`.
    pub cams: PollPolicy,
    /// After `/start_preview` (or the toggle fallback).
    pub preview_on: PollPolicy,
    /// After `/toggle_preview` when switching the preview off.
    pub preview_off: PollPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cams: PollPolicy::new(10, Duration::from_millis(350)),
            preview_on: PollPolicy::new(8, Duration::from_millis(350)),
            preview_off: PollPolicy::new(10, Duration::from_millis(250)),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    device: Arc<dyn DeviceApi>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(device: Arc<dyn DeviceApi>) -> Self {
        Self::with_config(device, OrchestratorConfig::default())
    }

    pub fn with_config(device: Arc<dyn DeviceApi>, config: OrchestratorConfig) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &Arc<dyn DeviceApi> {
        &self.device
    }

    /// Make sure the cameras are running, starting them if needed.
    ///
    /// Issues `/start_cams` at most once. Returns `Ok(false)` if the cameras
    /// were not observed running within the poll bound.
    pub async fn ensure_cams_running(&self) -> Result<bool, DeviceError> {
        if self.observe_cams().await? {
            debug!("cameras already running");
            return Ok(true);
        }

        info!("cameras not running, starting them");
        self.device.start_cams().await?;

        let running = poll_until(self.config.cams, || self.observe_cams()).await?;
        if !running {
            warn!(
                "cameras not running after {} polls",
                self.config.cams.attempts
            );
        }
        Ok(running)
    }

    /// Make sure the preview is active. Requires running cameras.
    ///
    /// If `/start_preview` is rejected, `/toggle_preview` is tried instead:
    /// the preview is known to be off at that point, so toggling turns it on.
    pub async fn ensure_preview_active(&self) -> Result<bool, DeviceError> {
        if !self.ensure_cams_running().await? {
            return Ok(false);
        }

        if self.observe_preview().await? {
            debug!("preview already active");
            return Ok(true);
        }

        if let Err(e) = self.device.start_preview().await {
            warn!("start_preview failed ({}), falling back to toggle", e);
            if let Err(e) = self.device.toggle_preview().await {
                warn!("toggle_preview failed: {}", e);
            }
        }

        poll_until(self.config.preview_on, || self.observe_preview()).await
    }

    /// Make sure the preview is off.
    pub async fn ensure_preview_inactive(&self) -> Result<bool, DeviceError> {
        if !self.observe_preview().await? {
            debug!("preview already inactive");
            return Ok(true);
        }

        if let Err(e) = self.device.toggle_preview().await {
            warn!("toggle_preview failed: {}", e);
        }

        poll_until(self.config.preview_off, move || async move {
            Ok(!self.observe_preview().await?)
        })
        .await
    }

    /// Bring the cameras up, then start the full broadcast bound to the
    /// linked wizard account. Nothing is sent to the streaming endpoint
    /// unless the cameras are confirmed running.
    pub async fn start_streaming_session(&self) -> Result<(), DeviceError> {
        if !self.ensure_cams_running().await? {
            return Err(DeviceError::CamsUnavailable);
        }
        self.device.start_streaming().await?;
        info!("streaming started");
        Ok(())
    }

    pub async fn stop_streaming_session(&self) -> Result<(), DeviceError> {
        self.device.stop_streaming().await?;
        info!("streaming stopped");
        Ok(())
    }

    /// A non-2xx state reply counts as "not running"; transport errors propagate.
    async fn observe_cams(&self) -> Result<bool, DeviceError> {
        match self.device.get_cams_state().await {
            Ok(state) => Ok(state.running),
            Err(DeviceError::Http { status, .. }) => {
                debug!(status, "cams_status rejected, treating as not running");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn observe_preview(&self) -> Result<bool, DeviceError> {
        match self.device.get_preview_state().await {
            Ok(state) => Ok(state.active),
            Err(DeviceError::Http { status, .. }) => {
                debug!(status, "preview_status rejected, treating as inactive");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Sleep `policy.interval`, probe, repeat up to `policy.attempts` times.
async fn poll_until<F, Fut>(policy: PollPolicy, mut probe: F) -> Result<bool, DeviceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, DeviceError>>,
{
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.interval).await;
        if probe().await? {
            debug!(attempt, "poll condition met");
            return Ok(true);
        }
    }
    Ok(false)
}
