// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Configuration module

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{CrashGuardError, Result};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Isolation forest configuration
    pub model: ModelConfig,

    /// Crash verification configuration
    pub detection: DetectionConfig,

    /// Sensor read configuration
    pub sensors: SensorConfig,

    /// Drive simulator configuration
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "CrashGuard".to_string(),
            log_level: "info".to_string(),
            model: ModelConfig::default(),
            detection: DetectionConfig::default(),
            sensors: SensorConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("crashguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject values no monitor can run with
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.detection.validate()?;
        Ok(())
    }
}

/// Isolation forest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of partition trees
    pub num_trees: usize,

    /// Bootstrap subsample size per tree
    pub subsample_size: usize,

    /// Maximum tree height
    pub max_tree_depth: usize,

    /// Seed for tree construction; entropy when absent
    pub seed: Option<u64>,

    /// JSON corpus of normal driving; synthetic corpus when absent
    pub corpus_path: Option<PathBuf>,

    /// Size of the synthetic corpus
    pub synthetic_corpus_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            subsample_size: 256,
            max_tree_depth: 12,
            seed: None,
            corpus_path: None,
            synthetic_corpus_size: 512,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        if self.subsample_size == 0 {
            return Err(CrashGuardError::InvalidConfig(
                "model.subsample_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Crash verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Scores strictly above this flag a tick as anomalous
    pub anomaly_score_threshold: f64,

    /// Length of the verification window in seconds
    pub verification_duration_secs: f64,

    /// Detection loop cadence in milliseconds
    pub sampling_interval_ms: u64,

    /// Ticks below this speed (m/s) are not scored
    pub min_speed_for_crash_detection: f64,

    /// Final speed (m/s) must be below this to confirm a crash
    pub low_speed_confirm_threshold: f64,

    /// Fraction of expected window samples that must be anomalous
    pub anomaly_ratio_confirm_threshold: f64,

    /// Number of recent scores kept for inspection
    pub score_history_len: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            anomaly_score_threshold: 0.7,
            verification_duration_secs: 5.0,
            sampling_interval_ms: 1000,
            min_speed_for_crash_detection: 2.0,
            low_speed_confirm_threshold: 3.0,
            anomaly_ratio_confirm_threshold: 0.6,
            score_history_len: 60,
        }
    }
}

impl DetectionConfig {
    /// Samples a full window holds at the configured cadence
    pub fn expected_samples_in_window(&self) -> f64 {
        self.verification_duration_secs * (1000.0 / self.sampling_interval_ms as f64)
    }

    pub fn verification_duration(&self) -> Duration {
        Duration::from_secs_f64(self.verification_duration_secs)
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.sampling_interval_ms == 0 {
            return Err(CrashGuardError::InvalidConfig(
                "detection.sampling_interval_ms must be positive".into(),
            ));
        }
        if !(self.verification_duration_secs > 0.0 && self.verification_duration_secs.is_finite()) {
            return Err(CrashGuardError::InvalidConfig(
                "detection.verification_duration_secs must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.anomaly_score_threshold) {
            return Err(CrashGuardError::InvalidConfig(format!(
                "detection.anomaly_score_threshold {} outside [0, 1]",
                self.anomaly_score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.anomaly_ratio_confirm_threshold) {
            return Err(CrashGuardError::InvalidConfig(format!(
                "detection.anomaly_ratio_confirm_threshold {} outside [0, 1]",
                self.anomaly_ratio_confirm_threshold
            )));
        }
        Ok(())
    }
}

/// Sensor read configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Bounded wait for an acceleration reading
    pub accel_timeout_ms: u64,

    /// Bounded wait for a speed reading
    pub speed_timeout_ms: u64,

    /// Forward sensor fallbacks to error subscribers
    pub report_sensor_faults: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            accel_timeout_ms: 500,
            speed_timeout_ms: 500,
            report_sensor_faults: true,
        }
    }
}

impl SensorConfig {
    pub fn accel_timeout(&self) -> Duration {
        Duration::from_millis(self.accel_timeout_ms)
    }

    pub fn speed_timeout(&self) -> Duration {
        Duration::from_millis(self.speed_timeout_ms)
    }
}

/// Drive simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Cruising speed in m/s
    pub cruise_speed: f64,

    /// Standard deviation of cruising speed in m/s
    pub speed_jitter: f64,

    /// Log-scale spread of cruising motion magnitude
    pub motion_jitter: f64,

    /// Seed for the simulator; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 25.0,
            speed_jitter: 0.4,
            motion_jitter: 0.3,
            seed: None,
        }
    }
}
