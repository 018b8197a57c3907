//! WizardLive Broadcast
//!
//! Control bridge for WizardCam broadcast devices and the WizardLive backend.
//!
//! This library provides:
//! - A WizardCam controller client with bounded multi-step orchestration
//! - A WizardLive REST backend client and persisted credentials
//! - A broadcast session that reconciles device and account state
//! - Server-Sent Events for real-time updates

pub mod api;
pub mod backend;
pub mod bus;
pub mod config;
pub mod credentials;
pub mod device;
pub mod session;
