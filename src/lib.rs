// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! CrashGuard - Real-Time Vehicle Crash Detection
//!
//! Detects crashes from a speed source and a 3-axis accelerometer:
//! - Isolation forest anomaly scoring trained on normal driving only
//! - Windowed verification that separates impacts from hard braking
//! - Fault-tolerant sampling with per-read timeouts and fallbacks
//! - Broadcast event stream and a host trigger hook
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Crash Monitor                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌─────────┐  │
//! │  │ Telemetry │→ │ Isolation  │→ │   Crash   │→ │ Trigger │  │
//! │  │ Sampler   │  │ Forest     │  │ Verifier  │  │ Sink    │  │
//! │  └───────────┘  └────────────┘  └───────────┘  └─────────┘  │
//! │       ↓              ↓               ↓                      │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Event Bus                        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod sensors;

// Re-exports for convenience
pub use analysis::{AnomalyScorer, FeatureVector, IsolationForest, TrainingCorpus};
pub use config::Config;
pub use core::{train_forest, CrashMonitor, EventBus, MonitorEvent, TriggerSink};
pub use detection::{CrashDetector, CrashReport, TickOutcome, VerifierState};
pub use error::{CrashGuardError, Result};
pub use sensors::{AccelerationSource, DriveSimulator, Scenario, SpeedSource};

/// CrashGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CrashGuard name
pub const NAME: &str = "CrashGuard";
