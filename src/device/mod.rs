//! WizardCam device controller: HTTP client, message classifiers and the
//! multi-step orchestration built on top of them.

pub mod classify;
pub mod client;
pub mod orchestrator;
pub mod types;

pub use client::{DeviceApi, DeviceClient, DeviceError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, PollPolicy};
pub use types::{CamsState, DeviceStatus, PreviewState, WizardAccountInfo};
