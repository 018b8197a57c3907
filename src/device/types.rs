//! Snapshots returned by the device controller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status code the device reports while a broadcast is on air.
pub const LIVE_STATUS_CODE: &str = "6";

/// Message `/get_wizard_id` returns when the device is linked to an account.
pub const WIZARD_LINKED_MESSAGE: &str = "Current Wizard ID and username";

/// `/status` snapshot. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub battery: String,
    pub cpu_temp: String,
    /// Numeric-as-string state code; only [`LIVE_STATUS_CODE`] has a known meaning.
    pub status: String,
    pub wizard_name: String,
    pub full_serial_number: String,
}

impl DeviceStatus {
    pub(crate) fn from_json(j: &Value) -> Self {
        Self {
            battery: field_string(j, "battery"),
            cpu_temp: field_string(j, "cpu_temp"),
            status: field_string(j, "status"),
            wizard_name: field_string(j, "wizard_name"),
            full_serial_number: field_string(j, "full_serial_number"),
        }
    }

    /// Whether the device is currently broadcasting. Every code other than
    /// "6" is treated as not live.
    pub fn is_live(&self) -> bool {
        self.status.trim() == LIVE_STATUS_CODE
    }
}

/// Result of the linked-account check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardAccountInfo {
    pub ok: bool,
    pub username: String,
}

impl WizardAccountInfo {
    pub fn unlinked() -> Self {
        Self::default()
    }

    pub(crate) fn from_json(j: &Value) -> Self {
        let message = field_string(j, "message");
        let wizard_id = field_string(j, "wizard_id");
        let ok = message == WIZARD_LINKED_MESSAGE && !wizard_id.trim().is_empty();
        Self {
            ok,
            username: if ok {
                field_string(j, "username")
            } else {
                String::new()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CamsState {
    pub running: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewState {
    pub active: bool,
    pub message: String,
}

/// Read a field as a string, stringifying numbers and booleans.
/// The firmware is inconsistent about quoting (`"battery": 87` vs `"87"`).
pub(crate) fn field_string(j: &Value, key: &str) -> String {
    match j.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
