//! Mock servers for integration testing
//!
//! These mock servers simulate the WizardCam device controller and the
//! WizardLive backend, allowing full integration testing without hardware.

pub mod backend;
pub mod wizardcam;

pub use backend::MockBackend;
pub use wizardcam::MockWizardCam;
