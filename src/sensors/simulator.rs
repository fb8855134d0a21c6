// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Drive simulator for demo/testing

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::{LogNormal, Normal};
use serde::{Deserialize, Serialize};

use super::{Acceleration, AccelerationSource, SpeedSource};
use crate::config::SimulationConfig;

/// Speed (m/s) and motion (m/s²) in the seconds after an impact
const CRASH_PROFILE: [(f64, f64); 6] = [
    (15.0, 40.0),
    (9.0, 25.0),
    (5.5, 14.0),
    (2.8, 8.0),
    (2.1, 4.0),
    (0.3, 0.6),
];

/// Sharp stop followed by recovery to cruising speed
const BRAKING_PROFILE: [(f64, f64); 3] = [(12.0, 7.0), (13.0, 2.5), (15.0, 1.5)];

/// Simulated driving scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Scenario {
    /// Steady cruising
    Cruise,
    /// Impact at `at_tick`, vehicle slides to a stop
    Crash { at_tick: u64 },
    /// Emergency braking at `at_tick`, then back to cruising
    HardBraking { at_tick: u64 },
    /// Both sensors stop answering for `ticks` ticks from `from_tick`
    SensorDropout { from_tick: u64, ticks: u64 },
}

struct SimState {
    scenario: Scenario,
    config: SimulationConfig,
    rng: StdRng,
    tick: u64,
    speed: f64,
    motion: f64,
}

impl SimState {
    fn advance(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        let scenario = self.scenario;

        match scenario {
            Scenario::Crash { at_tick } if tick >= at_tick => {
                let i = ((tick - at_tick) as usize).min(CRASH_PROFILE.len() - 1);
                let (speed, motion) = CRASH_PROFILE[i];
                self.speed = speed;
                // Stationary wreck: only sensor noise once the profile ends
                self.motion = if tick - at_tick >= CRASH_PROFILE.len() as u64 {
                    0.2
                } else {
                    motion
                };
            }
            Scenario::HardBraking { at_tick }
                if tick >= at_tick && tick - at_tick < BRAKING_PROFILE.len() as u64 =>
            {
                let (speed, motion) = BRAKING_PROFILE[(tick - at_tick) as usize];
                self.speed = speed;
                self.motion = motion;
            }
            Scenario::HardBraking { at_tick } if tick >= at_tick => {
                // Accelerate back toward cruise
                let target = self.config.cruise_speed;
                self.speed = (self.speed + 2.0).min(target);
                self.motion = self.cruise_motion();
            }
            _ => {
                let jitter = Normal::new(0.0, self.config.speed_jitter.max(1e-6)).unwrap();
                self.speed = (self.config.cruise_speed + jitter.sample(&mut self.rng)).max(0.0);
                self.motion = self.cruise_motion();
            }
        }
    }

    fn cruise_motion(&mut self) -> f64 {
        let dist = LogNormal::new(0.1, self.config.motion_jitter.max(1e-6)).unwrap();
        dist.sample(&mut self.rng)
    }

    fn dropped_out(&self) -> bool {
        match self.scenario {
            Scenario::SensorDropout { from_tick, ticks } => {
                self.tick >= from_tick && self.tick < from_tick + ticks
            }
            _ => false,
        }
    }

    /// Spread the current motion magnitude over a random direction
    fn acceleration(&mut self) -> Acceleration {
        let unit = Normal::new(0.0, 1.0).unwrap();
        let (x, y, z): (f64, f64, f64) = (
            unit.sample(&mut self.rng),
            unit.sample(&mut self.rng),
            unit.sample(&mut self.rng),
        );
        let norm = (x * x + y * y + z * z).sqrt();
        if norm < 1e-9 {
            return Acceleration::new(self.motion, 0.0, 0.0);
        }
        let k = self.motion / norm;
        Acceleration::new(x * k, y * k, z * k)
    }
}

/// Simulated vehicle serving both speed and acceleration reads
///
/// Each speed read advances the simulation by one tick; the acceleration
/// read that follows reports the same tick.
#[derive(Clone)]
pub struct DriveSimulator {
    id: String,
    state: Arc<Mutex<SimState>>,
}

impl DriveSimulator {
    pub fn new(id: &str, scenario: Scenario, config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            id: id.to_string(),
            state: Arc::new(Mutex::new(SimState {
                scenario,
                config: config.clone(),
                rng,
                tick: 0,
                speed: config.cruise_speed,
                motion: 0.0,
            })),
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.state.lock().scenario
    }

    /// Ticks simulated so far
    pub fn tick(&self) -> u64 {
        self.state.lock().tick
    }

    pub fn current_speed(&self) -> f64 {
        self.state.lock().speed
    }
}

#[async_trait]
impl SpeedSource for DriveSimulator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_speed(&self) -> Result<Option<f64>> {
        let mut state = self.state.lock();
        state.advance();
        if state.dropped_out() {
            bail!("no GNSS fix");
        }
        Ok(Some(state.speed))
    }
}

#[async_trait]
impl AccelerationSource for DriveSimulator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_acceleration(&self) -> Result<Acceleration> {
        let reading = {
            let mut state = self.state.lock();
            if state.dropped_out() {
                None
            } else {
                Some(state.acceleration())
            }
        };

        match reading {
            Some(accel) => Ok(accel),
            // Unresponsive IMU: never answers, the sampler's timeout fires
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            seed: Some(21),
            ..SimulationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cruise_stays_near_cruise_speed() {
        let sim = DriveSimulator::new("sim", Scenario::Cruise, &config());
        for _ in 0..50 {
            let speed = sim.read_speed().await.unwrap().unwrap();
            assert!((speed - 25.0).abs() < 5.0);
            let accel = sim.read_acceleration().await.unwrap();
            assert!(accel.magnitude() < 6.0);
        }
        assert_eq!(sim.tick(), 50);
    }

    #[tokio::test]
    async fn test_crash_follows_impact_profile() {
        let sim = DriveSimulator::new("sim", Scenario::Crash { at_tick: 3 }, &config());
        sim.read_speed().await.unwrap();
        sim.read_speed().await.unwrap();

        let impact = sim.read_speed().await.unwrap().unwrap();
        assert_eq!(impact, 15.0);
        let accel = sim.read_acceleration().await.unwrap();
        assert!((accel.magnitude() - 40.0).abs() < 1e-9);

        for _ in 0..10 {
            sim.read_speed().await.unwrap();
        }
        assert_eq!(sim.current_speed(), 0.3);
    }

    #[tokio::test]
    async fn test_braking_recovers() {
        let sim = DriveSimulator::new("sim", Scenario::HardBraking { at_tick: 1 }, &config());
        assert_eq!(sim.read_speed().await.unwrap(), Some(12.0));
        for _ in 0..20 {
            sim.read_speed().await.unwrap();
        }
        assert_eq!(sim.current_speed(), 25.0);
    }

    #[tokio::test]
    async fn test_dropout_fails_speed_reads() {
        let sim = DriveSimulator::new(
            "sim",
            Scenario::SensorDropout { from_tick: 2, ticks: 2 },
            &config(),
        );
        assert!(sim.read_speed().await.is_ok());
        assert!(sim.read_speed().await.is_err());
        assert!(sim.read_speed().await.is_err());
        assert!(sim.read_speed().await.is_ok());
    }
}
