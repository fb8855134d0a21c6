// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Telemetry sampler - turns raw sensor reads into feature vectors

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Acceleration, AccelerationSource, SpeedSource};
use crate::analysis::FeatureVector;
use crate::config::SensorConfig;
use crate::error::CrashGuardError;

/// One sampled tick
#[derive(Debug)]
pub struct Sample {
    pub feature: FeatureVector,
    pub acceleration: Acceleration,
    /// Reads that fell back to a default value this tick
    pub faults: Vec<CrashGuardError>,
}

/// Counters for sensor fallbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub samples: u64,
    pub speed_fallbacks: u64,
    pub accel_fallbacks: u64,
}

/// Reads speed and acceleration once per tick
///
/// The only state carried between calls is the previous speed, used to
/// derive `delta_speed`. The first sample after creation or reset has a
/// `delta_speed` of 0.
pub struct TelemetrySampler {
    speed_source: Arc<dyn SpeedSource>,
    accel_source: Arc<dyn AccelerationSource>,
    speed_timeout: Duration,
    accel_timeout: Duration,
    previous_speed: Option<f64>,
    stats: SamplerStats,
}

impl TelemetrySampler {
    pub fn new(
        speed_source: Arc<dyn SpeedSource>,
        accel_source: Arc<dyn AccelerationSource>,
        config: &SensorConfig,
    ) -> Self {
        Self {
            speed_source,
            accel_source,
            speed_timeout: config.speed_timeout(),
            accel_timeout: config.accel_timeout(),
            previous_speed: None,
            stats: SamplerStats::default(),
        }
    }

    /// Read both sensors and build one feature vector
    ///
    /// Never fails: an absent speed reads as 0, a failed or late
    /// acceleration read as `{0, 0, 0}`. Failures are returned in
    /// [`Sample::faults`].
    pub async fn sample_once(&mut self) -> Sample {
        let mut faults = Vec::new();

        let speed = match self.read_speed().await {
            Ok(speed) => speed,
            Err(fault) => {
                self.stats.speed_fallbacks += 1;
                faults.push(fault);
                0.0
            }
        };

        let acceleration = match self.read_acceleration().await {
            Ok(accel) => accel,
            Err(fault) => {
                self.stats.accel_fallbacks += 1;
                faults.push(fault);
                Acceleration::ZERO
            }
        };

        for fault in &faults {
            warn!("{}, using fallback value", fault);
        }

        let motion = acceleration.magnitude();
        let delta_speed = self.previous_speed.map(|prev| speed - prev).unwrap_or(0.0);
        self.previous_speed = Some(speed);
        self.stats.samples += 1;

        let feature = FeatureVector::new(speed, motion, delta_speed);
        debug!(
            "Sampled speed={:.2} motion={:.2} delta={:.2}",
            feature.speed, feature.motion, feature.delta_speed
        );

        Sample {
            feature,
            acceleration,
            faults,
        }
    }

    async fn read_speed(&self) -> Result<f64, CrashGuardError> {
        match timeout(self.speed_timeout, self.speed_source.read_speed()).await {
            Ok(Ok(Some(speed))) if speed.is_finite() && speed >= 0.0 => Ok(speed),
            Ok(Ok(Some(speed))) => Err(CrashGuardError::sensor(
                "speed",
                format!("{} reported invalid speed {}", self.speed_source.id(), speed),
            )),
            // No fix yet is not a fault, the tick is simply not scored
            Ok(Ok(None)) => Ok(0.0),
            Ok(Err(e)) => Err(CrashGuardError::sensor(
                "speed",
                format!("{}: {}", self.speed_source.id(), e),
            )),
            Err(_) => Err(CrashGuardError::sensor(
                "speed",
                format!("{} timed out after {:?}", self.speed_source.id(), self.speed_timeout),
            )),
        }
    }

    async fn read_acceleration(&self) -> Result<Acceleration, CrashGuardError> {
        match timeout(self.accel_timeout, self.accel_source.read_acceleration()).await {
            Ok(Ok(accel)) if accel.is_finite() => Ok(accel),
            Ok(Ok(accel)) => Err(CrashGuardError::sensor(
                "acceleration",
                format!("{} reported invalid reading {:?}", self.accel_source.id(), accel),
            )),
            Ok(Err(e)) => Err(CrashGuardError::sensor(
                "acceleration",
                format!("{}: {}", self.accel_source.id(), e),
            )),
            Err(_) => Err(CrashGuardError::sensor(
                "acceleration",
                format!("{} timed out after {:?}", self.accel_source.id(), self.accel_timeout),
            )),
        }
    }

    pub fn previous_speed(&self) -> Option<f64> {
        self.previous_speed
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Forget the previous speed, e.g. when monitoring restarts
    pub fn reset(&mut self) {
        self.previous_speed = None;
    }
}
