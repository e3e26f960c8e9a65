use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::serial::parse_parity;
use crate::io::SerialConfig;
use crate::supervisor::SupervisorConfig;

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "MOTORLINK_SETTINGS";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_vendor_signature")]
    pub vendor_signature: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: String, // "none" | "odd" | "even"
    /// Directory for log files; file logging is off when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_discovery_interval_ms() -> u64 {
    2000
}
fn default_heartbeat_timeout_ms() -> u64 {
    3000
}
fn default_vendor_signature() -> String {
    "stm".to_string()
}
fn default_baud_rate() -> u32 {
    19200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_parity() -> String {
    "none".to_string()
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            discovery_interval_ms: default_discovery_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            vendor_signature: default_vendor_signature(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            log_dir: None,
        }
    }
}

impl LinkSettings {
    pub fn serial_config(&self) -> Result<SerialConfig, String> {
        let config = SerialConfig {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: parse_parity(&self.parity)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn supervisor_config(&self) -> Result<SupervisorConfig, String> {
        if self.vendor_signature.trim().is_empty() {
            return Err("vendor_signature must not be empty".to_string());
        }
        Ok(SupervisorConfig {
            discovery_interval: Duration::from_millis(self.discovery_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms.max(1)),
            vendor_signature: self.vendor_signature.clone(),
            serial: self.serial_config()?,
        })
    }
}

/// Settings path for the console shell: `$MOTORLINK_SETTINGS`, otherwise
/// `<config dir>/MotorLink/settings.json`.
pub fn default_settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(SETTINGS_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("MotorLink")
        .join("settings.json")
}

pub fn load_settings(path: &Path) -> Result<LinkSettings, String> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))
    } else {
        // First run: write the defaults so there is a file to edit
        let settings = LinkSettings::default();
        save_settings(path, &settings)?;
        tlog!("[settings] Wrote default settings to {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &LinkSettings) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Parity;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("motorlink-settings-{}-{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let path = temp_path("missing");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings, LinkSettings::default());
        assert!(path.exists());

        // Second load reads the file back
        assert_eq!(load_settings(&path).unwrap(), settings);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"baud_rate": 115200, "parity": "even"}"#).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.heartbeat_timeout_ms, 3000);
        assert_eq!(settings.vendor_signature, "stm");

        let serial = settings.serial_config().unwrap();
        assert_eq!(serial.parity, Parity::Even);
        assert_eq!(serial.describe(), "115200 8E1");
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let path = temp_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_settings(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse settings"));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_supervisor_config_from_defaults() {
        let config = LinkSettings::default().supervisor_config().unwrap();
        assert_eq!(config, SupervisorConfig::default());
    }

    #[test]
    fn test_bad_serial_values_rejected() {
        let settings = LinkSettings {
            parity: "mark".to_string(),
            ..LinkSettings::default()
        };
        assert!(settings.serial_config().is_err());

        let settings = LinkSettings {
            data_bits: 9,
            ..LinkSettings::default()
        };
        assert!(settings.supervisor_config().is_err());

        let settings = LinkSettings {
            vendor_signature: "  ".to_string(),
            ..LinkSettings::default()
        };
        assert!(settings.supervisor_config().is_err());
    }
}
