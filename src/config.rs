//! Threshold and engine configuration, loaded from TOML.

use std::{fs, io::Write, path::PathBuf};

use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Timing and movement thresholds driving classification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    /// Max per-axis displacement for a gesture to stay stationary.
    pub drag_tolerance: f32,
    /// Release under this duration counts as a tap.
    pub tap_ms: u64,
    /// Hold past this duration counts as a press.
    pub press_ms: u64,
    /// Hold past this duration resolves the long-press flag.
    pub long_press_ms: u64,
    /// End-to-end window for the tracker's double-tap flag.
    pub double_tap_ms: u64,
    /// Window linking two taps in the recognizer, and the deferred tap delay.
    pub double_tap_link_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            drag_tolerance: 5.0,
            tap_ms: 100,
            press_ms: 500,
            long_press_ms: 1000,
            double_tap_ms: 200,
            double_tap_link_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Broadcast every tap immediately (true) or defer taps so a following
    /// second tap can upgrade them to a double-tap (false).
    pub emit_every_tap: bool,
    pub thresholds: Thresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            emit_every_tap: true,
            thresholds: Thresholds::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config").join("tapsense")
}

fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn default_config_text() -> &'static str {
    include_str!("../config/default.toml")
}

impl EngineConfig {
    /// Load the user config, installing the embedded default on first run.
    pub fn load_or_install_default() -> Result<Self, ConfigError> {
        let dir = config_dir();
        let path = config_path();
        if !path.exists() {
            let _ = fs::create_dir_all(&dir);
            if let Ok(mut f) = fs::File::create(&path) {
                let _ = f.write_all(default_config_text().as_bytes());
                info!("installed default config at {}", path.display());
            }
        }
        Self::load(&path)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let txt = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: EngineConfig = toml::from_str(&txt).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let th = &self.thresholds;
        if th.tap_ms == 0 || th.press_ms == 0 || th.long_press_ms == 0 {
            return Err(ConfigError::Invalid(
                "thresholds must be positive durations".into(),
            ));
        }
        if th.double_tap_ms == 0 || th.double_tap_link_ms == 0 {
            return Err(ConfigError::Invalid(
                "double-tap windows must be positive durations".into(),
            ));
        }
        if th.drag_tolerance <= 0.0 {
            return Err(ConfigError::Invalid(
                "thresholds.drag_tolerance must be positive".into(),
            ));
        }
        if th.tap_ms >= th.press_ms {
            return Err(ConfigError::Invalid(
                "thresholds.tap_ms must be below thresholds.press_ms".into(),
            ));
        }
        Ok(())
    }
}
