//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

const APP_DIR_NAME: &str = "wizardlive-broadcast";

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Port for the local control API
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

fn default_port() -> u16 {
    8090
}

/// WizardCam controller on the camera's own network
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_host")]
    pub host: String,
    #[serde(default = "default_device_port")]
    pub port: u16,
    /// HLS server port (live/mystream)
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_device_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_device_host(),
            port: default_device_port(),
            stream_port: default_stream_port(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_device_timeout(),
        }
    }
}

fn default_device_host() -> String {
    "10.42.0.1".to_string()
}

fn default_device_port() -> u16 {
    2223
}

fn default_stream_port() -> u16 {
    8889
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_device_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_backend_timeout(),
        }
    }
}

fn default_backend_url() -> String {
    "https://livewizard.westeurope.cloudapp.azure.com/".to_string()
}

fn default_backend_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    /// How long "start requested" stays pending without the device going live
    #[serde(default = "default_start_pending_ceiling")]
    pub start_pending_ceiling_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            start_pending_ceiling_secs: default_start_pending_ceiling(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    3000
}

fn default_start_pending_ceiling() -> u64 {
    20
}

/// Get config directory (WLB_CONFIG_DIR, XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WLB_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    PathBuf::from(".")
}

/// Get data directory (WLB_DATA_DIR, XDG_DATA_HOME or platform default)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WLB_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/share").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    PathBuf::from("./data")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        .set_default("port", default_port() as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (WLB_PORT, WLB_DEVICE__HOST, etc.)
        .add_source(
            ::config::Environment::with_prefix("WLB")
                .separator("__")
                .try_parsing(true),
        );

    // Precedence for the listen port: WLB_PORT > PORT > config > default
    if let Ok(port) = std::env::var("WLB_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    } else if let Ok(port) = std::env::var("PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    }

    // Shorthand for pointing at a device on another subnet
    if let Ok(host) = std::env::var("WLB_DEVICE_HOST") {
        builder = builder.set_override("device.host", host)?;
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}
