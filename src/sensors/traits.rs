// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Sensor traits and common types

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A 3-axis acceleration reading in m/s²
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub const ZERO: Acceleration = Acceleration { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Whether the reading has a finite norm
    ///
    /// Finite components can still overflow when squared.
    pub fn is_finite(&self) -> bool {
        self.magnitude().is_finite()
    }
}

/// Source of the vehicle's last-known speed
#[async_trait]
pub trait SpeedSource: Send + Sync {
    /// Source identifier used in logs and fault messages
    fn id(&self) -> &str;

    /// Speed in m/s, `None` when no fix is available
    async fn read_speed(&self) -> Result<Option<f64>>;
}

/// Source of linear (gravity-free) acceleration
#[async_trait]
pub trait AccelerationSource: Send + Sync {
    /// Source identifier used in logs and fault messages
    fn id(&self) -> &str;

    /// Current reading; may take arbitrarily long, callers bound the wait
    async fn read_acceleration(&self) -> Result<Acceleration>;
}
