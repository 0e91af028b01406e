use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::config::RoomConfig;
use crate::relay::Transition;
use crate::room::{RoomId, StatusReport};
use crate::watering::WateringEvent;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<ControllerState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct ControllerState {
    pub started_at: Instant,
    pub ticks: u64,
    pub reports: BTreeMap<RoomId, StatusReport>,
    pub events: VecDeque<ControllerEvent>,
}

#[derive(Clone, Serialize)]
pub struct ControllerEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Relay,
    Watering,
    Config,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// Snapshot (what `status` shows)
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize)]
pub struct StatusView {
    pub uptime_secs: u64,
    pub ticks: u64,
    pub rooms: Vec<StatusReport>,
    /// Newest first.
    pub events: Vec<ControllerEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl ControllerState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            ticks: 0,
            reports: BTreeMap::new(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Store a room's tick report and log what it did.
    pub fn record_report(&mut self, report: StatusReport) {
        for t in &report.transitions {
            self.record_transition(report.room, t);
        }
        for ev in &report.watering {
            self.record_watering(ev);
        }
        self.reports.insert(report.room, report);
    }

    fn record_transition(&mut self, room: RoomId, t: &Transition) {
        let state_str = if t.on { "ON" } else { "OFF" };
        self.push_event(EventKind::Relay, format!("{room} {} set {state_str}", t.actuator));
    }

    fn record_watering(&mut self, ev: &WateringEvent) {
        let detail = match ev {
            WateringEvent::FloodStarted { zone, soil, .. } => {
                format!("{zone} flood started (soil {soil:.0})")
            }
            WateringEvent::FloodEnded { zone, .. } => format!("{zone} flood finished"),
        };
        self.push_event(EventKind::Watering, detail);
    }

    /// Record a config change made from the console.
    pub fn record_config(&mut self, room: RoomId, cfg: &RoomConfig) {
        self.push_event(
            EventKind::Config,
            format!(
                "{room}: temp {:.1} humidity {:.0} soil {}",
                cfg.ideal_temp, cfg.ideal_humidity, cfg.ideal_soil
            ),
        );
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    pub fn to_status(&self) -> StatusView {
        StatusView {
            uptime_secs: self.started_at.elapsed().as_secs(),
            ticks: self.ticks,
            rooms: self.reports.values().cloned().collect(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(ControllerEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
