// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Crash verification state machine
//!
//! An anomalous tick opens a verification window. When the window has run
//! for its full duration the share of anomalous samples and the terminal
//! speed decide between a confirmed crash and a dismissal. A burst of high
//! acceleration alone is ordinary driving; the burst followed by a near
//! stop is the impact signature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DetectionConfig;

/// Verifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifierState {
    /// No open window
    Monitoring,
    /// A window is collecting anomaly flags
    Verifying,
}

/// Open verification window
#[derive(Debug, Clone)]
pub struct VerificationWindow {
    pub started_at: Instant,
    /// One entry per anomalous tick; non-anomalous ticks add nothing
    pub anomaly_flags: Vec<bool>,
}

impl VerificationWindow {
    fn open(now: Instant) -> Self {
        Self {
            started_at: now,
            anomaly_flags: Vec::new(),
        }
    }

    pub fn flag_count(&self) -> usize {
        self.anomaly_flags.iter().filter(|f| **f).count()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// Confirmed crash details handed to the trigger sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Anomalous share of the expected window samples, capped at 1
    pub anomaly_ratio: f64,
    pub anomalous_samples: usize,
    pub expected_samples: f64,
    pub final_speed: f64,
    pub reason: String,
}

/// Outcome of an expired window
#[derive(Debug, Clone)]
pub enum Verdict {
    Confirmed(CrashReport),
    Dismissed { anomaly_ratio: f64, final_speed: f64 },
}

/// Windowed crash verifier
pub struct CrashVerifier {
    anomaly_threshold: f64,
    duration: Duration,
    expected_samples: f64,
    ratio_threshold: f64,
    low_speed_threshold: f64,
    window: Option<VerificationWindow>,
}

impl CrashVerifier {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            anomaly_threshold: config.anomaly_score_threshold,
            duration: config.verification_duration(),
            expected_samples: config.expected_samples_in_window(),
            ratio_threshold: config.anomaly_ratio_confirm_threshold,
            low_speed_threshold: config.low_speed_confirm_threshold,
            window: None,
        }
    }

    pub fn state(&self) -> VerifierState {
        if self.window.is_some() {
            VerifierState::Verifying
        } else {
            VerifierState::Monitoring
        }
    }

    pub fn window(&self) -> Option<&VerificationWindow> {
        self.window.as_ref()
    }

    /// Record a score; returns whether it was anomalous
    ///
    /// An anomalous score opens a window when none is open, otherwise it
    /// extends the open one.
    pub fn observe(&mut self, score: f64, now: Instant) -> bool {
        if score <= self.anomaly_threshold {
            return false;
        }

        let duration = self.duration;
        let window = self.window.get_or_insert_with(|| {
            info!("Anomaly score {:.3} above threshold, verifying for {:?}", score, duration);
            VerificationWindow::open(now)
        });
        window.anomaly_flags.push(true);

        debug!("Anomalous tick, {} flags in window", window.flag_count());
        true
    }

    /// Decide on the open window once it has run its full duration
    ///
    /// `speed` is the current tick's speed. Either verdict closes the window.
    pub fn check_expiry(&mut self, speed: f64, now: Instant) -> Option<Verdict> {
        let expired = self
            .window
            .as_ref()
            .map(|w| w.elapsed(now) >= self.duration)
            .unwrap_or(false);
        if !expired {
            return None;
        }

        let window = self.window.take()?;
        let flags = window.flag_count();
        let anomaly_ratio = (flags as f64 / self.expected_samples).min(1.0);

        if anomaly_ratio >= self.ratio_threshold && speed < self.low_speed_threshold {
            let reason = format!(
                "Crash confirmed: anomaly ratio {:.0}% ({} of {:.0} samples), final speed {:.1} m/s",
                anomaly_ratio * 100.0,
                flags,
                self.expected_samples,
                speed
            );
            info!("{}", reason);

            Some(Verdict::Confirmed(CrashReport {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                anomaly_ratio,
                anomalous_samples: flags,
                expected_samples: self.expected_samples,
                final_speed: speed,
                reason,
            }))
        } else {
            info!(
                "Anomaly dismissed: ratio {:.0}%, final speed {:.1} m/s",
                anomaly_ratio * 100.0,
                speed
            );
            Some(Verdict::Dismissed {
                anomaly_ratio,
                final_speed: speed,
            })
        }
    }

    /// Drop any open window without a verdict
    pub fn reset(&mut self) {
        if self.window.take().is_some() {
            debug!("Verification window discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_starts_monitoring() {
        let verifier = CrashVerifier::new(&DetectionConfig::default());
        assert_eq!(verifier.state(), VerifierState::Monitoring);
        assert!(verifier.window().is_none());
    }

    #[test]
    fn test_only_anomalous_score_opens_window() {
        let mut verifier = CrashVerifier::new(&DetectionConfig::default());
        let t0 = Instant::now();

        assert!(!verifier.observe(0.7, t0));
        assert_eq!(verifier.state(), VerifierState::Monitoring);

        assert!(verifier.observe(0.71, t0));
        assert_eq!(verifier.state(), VerifierState::Verifying);
        assert_eq!(verifier.window().unwrap().started_at, t0);
    }

    #[test]
    fn test_anomalies_extend_single_window() {
        let mut verifier = CrashVerifier::new(&DetectionConfig::default());
        let t0 = Instant::now();

        verifier.observe(0.9, t0);
        verifier.observe(0.2, t0 + secs(1));
        verifier.observe(0.8, t0 + secs(2));

        let window = verifier.window().unwrap();
        assert_eq!(window.started_at, t0);
        assert_eq!(window.flag_count(), 2);
    }

    #[test]
    fn test_no_verdict_before_duration() {
        let mut verifier = CrashVerifier::new(&DetectionConfig::default());
        let t0 = Instant::now();
        verifier.observe(0.9, t0);

        assert!(verifier.check_expiry(0.0, t0 + Duration::from_millis(4999)).is_none());
        assert_eq!(verifier.state(), VerifierState::Verifying);
    }

    #[test]
    fn test_confirms_on_high_ratio_and_low_speed() {
        let mut verifier = CrashVerifier::new(&DetectionConfig::default());
        let t0 = Instant::now();
        for i in 0..3 {
            verifier.observe(0.95, t0 + secs(i));
        }

        match verifier.check_expiry(2.5, t0 + secs(5)) {
            Some(Verdict::Confirmed(report)) => {
                assert!((report.anomaly_ratio - 0.6).abs() < 1e-12);
                assert_eq!(report.anomalous_samples, 3);
                assert_eq!(report.final_speed, 2.5);
                assert!(report.reason.contains("60%"));
                assert!(report.reason.contains("2.5 m/s"));
            }
            other => panic!("expected confirmation, got {:?}", other),
        }
        assert_eq!(verifier.state(), VerifierState::Monitoring);
    }

    #[test]
    fn test_dismisses_when_still_moving() {
        let mut verifier = CrashVerifier::new(&DetectionConfig::default());
        let t0 = Instant::now();
        for i in 0..5 {
            verifier.observe(0.95, t0 + secs(i));
        }

        assert!(matches!(
            verifier.check_expiry(3.0, t0 + secs(5)),
            Some(Verdict::Dismissed { .. })
        ));
        assert!(verifier.window().is_none());
    }

    #[test]
    fn test_ratio_uses_configured_cadence() {
        let config = DetectionConfig {
            sampling_interval_ms: 500,
            ..DetectionConfig::default()
        };
        let mut verifier = CrashVerifier::new(&config);
        let t0 = Instant::now();
        // Five flags out of ten expected samples
        for i in 0..5 {
            verifier.observe(0.95, t0 + secs(i));
        }

        match verifier.check_expiry(0.0, t0 + secs(5)) {
            Some(Verdict::Dismissed { anomaly_ratio, .. }) => {
                assert!((anomaly_ratio - 0.5).abs() < 1e-12)
            }
            other => panic!("expected dismissal, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_discards_window() {
        let mut verifier = CrashVerifier::new(&DetectionConfig::default());
        let t0 = Instant::now();
        verifier.observe(0.95, t0);
        verifier.reset();

        assert_eq!(verifier.state(), VerifierState::Monitoring);
        assert!(verifier.check_expiry(0.0, t0 + secs(10)).is_none());
    }
}
