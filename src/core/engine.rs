// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Crash monitor - drives sampling, scoring and verification on a timer

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{EventBus, MonitorEvent};
use crate::analysis::AnomalyScorer;
use crate::config::Config;
use crate::detection::{CrashDetector, CrashReport, ScoredSample, TickOutcome, VerifierState};
use crate::error::{CrashGuardError, Result};
use crate::sensors::{AccelerationSource, Sample, SpeedSource, TelemetrySampler};

/// Host hook invoked once per confirmed crash
///
/// Delivery is fire-and-forget from the monitor's side. The sink runs after
/// the monitor state is unlocked, but on the loop task, so implementations
/// should hand the report off quickly.
pub trait TriggerSink: Send + Sync {
    fn trigger(&self, report: &CrashReport);
}

/// Adapts a closure into a [`TriggerSink`]
pub struct FnTrigger<F>(pub F);

impl<F> TriggerSink for FnTrigger<F>
where
    F: Fn(&CrashReport) + Send + Sync,
{
    fn trigger(&self, report: &CrashReport) {
        (self.0)(report)
    }
}

/// Default sink: logs the crash
pub struct LogTrigger;

impl TriggerSink for LogTrigger {
    fn trigger(&self, report: &CrashReport) {
        error!("CRASH DETECTED [{}]: {}", report.id, report.reason);
    }
}

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub ticks: u64,
    pub scored: u64,
    pub skipped: u64,
    pub crashes: u64,
    pub dismissals: u64,
    pub sensor_faults: u64,
    pub cycle_faults: u64,
}

/// All per-tick mutable state, owned by whichever cycle holds the lock
struct MonitorCore {
    sampler: TelemetrySampler,
    detector: CrashDetector,
    stats: MonitorStats,
    report_sensor_faults: bool,
}

impl MonitorCore {
    /// Account for one sample; the trigger sink is left to the caller
    fn handle_sample(&mut self, sample: Sample, bus: &EventBus) -> Result<TickOutcome> {
        self.stats.ticks += 1;

        for fault in &sample.faults {
            self.stats.sensor_faults += 1;
            if self.report_sensor_faults {
                bus.publish_error(&fault.to_string());
            }
        }

        let outcome = match self.detector.process(&sample.feature, Instant::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.cycle_faults += 1;
                warn!("Detection tick failed: {}", e);
                bus.publish_error(&e.to_string());
                return Err(e);
            }
        };

        if let Some(score) = outcome.score() {
            self.stats.scored += 1;
            bus.publish_score(score, sample.feature.speed);
        }

        match &outcome {
            TickOutcome::Skipped { .. } => self.stats.skipped += 1,
            TickOutcome::Scored { .. } => {}
            TickOutcome::Confirmed { report, .. } => {
                self.stats.crashes += 1;
                bus.publish_crash(report.clone());
            }
            TickOutcome::Dismissed {
                anomaly_ratio,
                final_speed,
                ..
            } => {
                self.stats.dismissals += 1;
                bus.publish_dismissal(*anomaly_ratio, *final_speed);
            }
        }

        Ok(outcome)
    }
}

/// Periodic crash monitor
///
/// Each instance owns its sampler and verifier state, so independent
/// monitors can share one fitted model.
pub struct CrashMonitor {
    config: Arc<Config>,
    core: Arc<Mutex<MonitorCore>>,
    event_bus: Arc<EventBus>,
    trigger: Arc<dyn TriggerSink>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    start_time: Option<Instant>,
}

impl CrashMonitor {
    pub fn new(
        config: Config,
        scorer: Arc<dyn AnomalyScorer>,
        speed_source: Arc<dyn SpeedSource>,
        accel_source: Arc<dyn AccelerationSource>,
    ) -> Result<Self> {
        config.validate()?;

        if !scorer.is_fitted() {
            warn!("Anomaly model is not fitted, every tick will score neutral");
        }

        let core = MonitorCore {
            sampler: TelemetrySampler::new(speed_source, accel_source, &config.sensors),
            detector: CrashDetector::new(scorer, &config.detection),
            stats: MonitorStats::default(),
            report_sensor_faults: config.sensors.report_sensor_faults,
        };

        Ok(Self {
            config: Arc::new(config),
            core: Arc::new(Mutex::new(core)),
            event_bus: Arc::new(EventBus::default()),
            trigger: Arc::new(LogTrigger),
            shutdown_tx: None,
            task: None,
            start_time: None,
        })
    }

    /// Replace the crash trigger
    pub fn with_trigger(mut self, trigger: Arc<dyn TriggerSink>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_bus.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start the periodic loop; no-op when already running
    pub async fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            debug!("Crash monitor already running");
            return Ok(());
        }

        let period = self.config.detection.sampling_interval();
        info!("Starting crash monitor, sampling every {:?}", period);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            self.core.clone(),
            self.event_bus.clone(),
            self.trigger.clone(),
            period,
            shutdown_rx,
        ));

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        self.start_time = Some(Instant::now());
        self.event_bus.publish_status(true);

        Ok(())
    }

    /// Stop the loop and discard any open verification window
    ///
    /// Returns once the loop has exited; nothing is published afterwards.
    /// No-op when not running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            debug!("Crash monitor not running");
            return Ok(());
        };

        info!("Stopping crash monitor...");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Err(e) = task.await {
            error!("Detection loop ended abnormally: {}", e);
        }

        {
            let mut core = self.core.lock().await;
            core.detector.cancel_verification();
            core.sampler.reset();
        }

        self.start_time = None;
        self.event_bus.publish_status(false);
        info!("Crash monitor stopped");
        Ok(())
    }

    /// Run one full cycle now, outside the timer
    ///
    /// Serialized with the periodic loop, so the two never interleave.
    pub async fn step(&self) -> Result<TickOutcome> {
        let outcome = {
            let mut core = self.core.lock().await;
            let sample = core.sampler.sample_once().await;
            core.handle_sample(sample, &self.event_bus)?
        };

        if let TickOutcome::Confirmed { report, .. } = &outcome {
            self.trigger.trigger(report);
        }
        Ok(outcome)
    }

    pub async fn stats(&self) -> MonitorStats {
        self.core.lock().await.stats
    }

    pub async fn state(&self) -> VerifierState {
        self.core.lock().await.detector.state()
    }

    /// Recent scored ticks, oldest first
    pub async fn score_history(&self) -> Vec<ScoredSample> {
        self.core.lock().await.detector.score_history().copied().collect()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }
}

impl Drop for CrashMonitor {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_loop(
    core: Arc<Mutex<MonitorCore>>,
    bus: Arc<EventBus>,
    trigger: Arc<dyn TriggerSink>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    // A cycle that overruns its slot swallows the missed ticks
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cycle = run_cycle(&core, &bus, trigger.as_ref(), &shutdown);
                match AssertUnwindSafe(cycle).catch_unwind().await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(panic) => {
                        let fault = CrashGuardError::CycleFault(format!(
                            "tick panicked: {}",
                            panic_message(panic.as_ref())
                        ));
                        error!("{}", fault);
                        core.lock().await.stats.cycle_faults += 1;
                        bus.publish_error(&fault.to_string());
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("Detection loop exited");
}

/// One timer-driven cycle; `false` when a stop arrived during the sensor reads
async fn run_cycle(
    core: &Mutex<MonitorCore>,
    bus: &EventBus,
    trigger: &dyn TriggerSink,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    let outcome = {
        let mut core = core.lock().await;
        let sample = core.sampler.sample_once().await;

        if *shutdown.borrow() {
            debug!("Stop requested during sensor reads, tick discarded");
            return false;
        }

        core.handle_sample(sample, bus)
    };

    // Failures are already published as error events
    if let Ok(TickOutcome::Confirmed { report, .. }) = &outcome {
        trigger.trigger(report);
    }
    true
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
