// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/crashguard-rs

//! Event bus for delivering monitor output to the host

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::detection::CrashReport;

/// Monitor output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A tick was scored
    ScoreUpdate { score: f64, speed: f64 },
    /// A verification window confirmed a crash
    CrashDetected(CrashReport),
    /// A verification window closed without a crash
    AnomalyDismissed { anomaly_ratio: f64, final_speed: f64 },
    /// Sensor fallback or failed tick
    Error { message: String },
    /// Monitor started or stopped
    Status { running: bool },
}

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Broadcasts monitor events to any number of subscribers
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped.
pub struct EventBus {
    event_tx: broadcast::Sender<MonitorEvent>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_score(&self, score: f64, speed: f64) {
        self.publish(EventPayload::ScoreUpdate { score, speed });
    }

    pub fn publish_crash(&self, report: CrashReport) {
        self.publish(EventPayload::CrashDetected(report));
    }

    pub fn publish_dismissal(&self, anomaly_ratio: f64, final_speed: f64) {
        self.publish(EventPayload::AnomalyDismissed {
            anomaly_ratio,
            final_speed,
        });
    }

    pub fn publish_error(&self, message: &str) {
        self.publish(EventPayload::Error {
            message: message.to_string(),
        });
    }

    pub fn publish_status(&self, running: bool) {
        self.publish(EventPayload::Status { running });
    }

    fn publish(&self, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = MonitorEvent {
            id,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// Events published so far
    pub fn published(&self) -> u64 {
        self.event_counter.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish_status(true);
        bus.publish_score(0.42, 17.0);
        bus.publish_error("acceleration timed out");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.id, 0);
        assert!(matches!(first.payload, EventPayload::Status { running: true }));

        let second = rx.try_recv().unwrap();
        assert!(matches!(second.payload, EventPayload::ScoreUpdate { score, .. } if score == 0.42));

        let third = rx.try_recv().unwrap();
        match third.payload {
            EventPayload::Error { message } => assert!(message.contains("timed out")),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(bus.published(), 3);
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish_dismissal(0.4, 12.0);
        assert_eq!(bus.published(), 1);
    }
}
