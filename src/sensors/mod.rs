// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Sensor module - telemetry sources, sampling and simulation

mod traits;
mod sampler;
mod simulator;

pub use traits::{Acceleration, AccelerationSource, SpeedSource};
pub use sampler::{Sample, SamplerStats, TelemetrySampler};
pub use simulator::{DriveSimulator, Scenario};
