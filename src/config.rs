//! Pipeline configuration.
//!
//! Loaded from TOML with every field defaulted, then optionally overridden from
//! the environment:
//! 1. `POSE_PIPELINE_CONFIG` or `./pose_pipeline.toml` (missing file = defaults)
//! 2. `POSE_WEIGHTS_PATH`, `POSE_DEVICE`, `POSE_DISPLAY`

use crate::control::StopMatch;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "POSE_PIPELINE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "pose_pipeline.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline: LoopConfig,
    pub display: DisplayConfig,
    pub estimator: EstimatorConfig,
    pub control: ControlConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Backoff between checks while waiting for the first frame.
    pub first_frame_poll_ms: u64,
    /// Interval between estimator readiness probes.
    pub ready_poll_ms: u64,
    /// Whether inference runs before any control command arrives.
    pub start_armed: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            first_frame_poll_ms: 2000,
            ready_poll_ms: 1,
            start_armed: true,
        }
    }
}

impl LoopConfig {
    pub fn first_frame_poll(&self) -> Duration {
        Duration::from_millis(self.first_frame_poll_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub wait_key_delay_ms: u64,
    pub console_output: bool,
    pub snapshot_dir: Option<PathBuf>,
    /// Save every n-th displayed frame.
    pub snapshot_every: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wait_key_delay_ms: 3,
            console_output: false,
            snapshot_dir: None,
            snapshot_every: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub weights_path: PathBuf,
    pub model_name: String,
    pub device: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("/default"),
            model_name: "human-pose-estimation.xml".to_string(),
            device: "CPU".to_string(),
        }
    }
}

impl EstimatorConfig {
    pub fn model_path(&self) -> PathBuf {
        self.weights_path.join(&self.model_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub target: String,
    pub stop_match: StopMatch,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target: "human_pose".to_string(),
            stop_match: StopMatch::Contains,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub capacity: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { capacity: 4 }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Resolves the config file from the environment, falls back to defaults
    /// when none exists, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("POSE_WEIGHTS_PATH") {
            self.estimator.weights_path = PathBuf::from(path);
        }
        if let Some(device) = lookup("POSE_DEVICE") {
            self.estimator.device = device;
        }
        if let Some(flag) = lookup("POSE_DISPLAY") {
            self.display.enabled = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ConfigError::Invalid(format!("POSE_DISPLAY={other} is not a boolean")));
                }
            };
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.first_frame_poll_ms == 0 {
            return Err(ConfigError::Invalid("pipeline.first_frame_poll_ms must be > 0".into()));
        }
        if self.pipeline.ready_poll_ms == 0 {
            return Err(ConfigError::Invalid("pipeline.ready_poll_ms must be > 0".into()));
        }
        if self.feedback.capacity == 0 {
            return Err(ConfigError::Invalid("feedback.capacity must be > 0".into()));
        }
        if self.display.snapshot_every == 0 {
            return Err(ConfigError::Invalid("display.snapshot_every must be > 0".into()));
        }
        if self.control.target.is_empty() {
            return Err(ConfigError::Invalid("control.target must not be empty".into()));
        }
        Ok(())
    }
}
