//! Monitor settings
//!
//! Settings are read from `settings.json` in the config directory and never
//! written back; edit the file by hand.

use std::path::{Path, PathBuf};

use sdbg_detect::DeviceMatchRule;
use sdbg_session::DEFAULT_BAUD_RATE;
use serde::Deserialize;
use tracing::{info, warn};

/// Monitor settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Port scan interval in milliseconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    /// Baud rate used when connecting
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Connect automatically when the debugger is detected
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// What counts as the debugger
    #[serde(default)]
    pub match_rule: DeviceMatchRule,
}

fn default_scan_interval() -> u64 {
    1500
}

fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval(),
            baud_rate: default_baud(),
            auto_connect: true,
            match_rule: DeviceMatchRule::default(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for servedebug
    /// Uses $XDG_CONFIG_HOME/servedebug on Linux/macOS, falls back to ~/.config/servedebug
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("servedebug"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("servedebug"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring malformed settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"baud_rate": 9600, "auto_connect": false}"#).unwrap();
        assert_eq!(settings.baud_rate, 9600);
        assert!(!settings.auto_connect);
        assert_eq!(settings.scan_interval_ms, 1500);
        assert_eq!(settings.match_rule, DeviceMatchRule::default());
    }

    #[test]
    fn test_match_rule_from_json() {
        let settings: Settings = serde_json::from_str(
            r#"{"match_rule": {"vendor_id": 1027, "product_id": 24577, "description_tokens": ["ftdi"]}}"#,
        )
        .unwrap();
        assert_eq!(
            settings.match_rule,
            DeviceMatchRule::new(0x0403, 0x6001, ["ftdi"])
        );
    }

    #[test]
    fn test_missing_or_malformed_file_falls_back() {
        let dir = std::env::temp_dir().join(format!("servedebug-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("missing.json");
        assert_eq!(Settings::load_from(&missing), Settings::default());

        let malformed = dir.join("malformed.json");
        std::fs::write(&malformed, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&malformed), Settings::default());

        let valid = dir.join("valid.json");
        std::fs::write(&valid, r#"{"scan_interval_ms": 250}"#).unwrap();
        assert_eq!(Settings::load_from(&valid).scan_interval_ms, 250);

        std::fs::remove_dir_all(&dir).ok();
    }
}
