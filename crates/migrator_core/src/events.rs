//! Events the engine emits for whatever frontend is listening.
//!
//! The core never renders anything itself: phase changes, log lines, and
//! counter snapshots go out over an unbounded mpsc channel, and the CLI (or a
//! test) drains the receiver. A closed receiver is fine; emission is
//! fire-and-forget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::StatsSnapshot;

/// Orchestrator phase. Strict happens-before between phases; the
/// `Migrator` enforces the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunPhase {
    AwaitingStart,
    GettingTags,
    GettingOrgs,
    CheckingOrgs,
    PickingOrgs,
    GettingUsers,
    MigratingUsers,
    PrefetchingDestTickets,
    MigratingTickets,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::AwaitingStart => "awaiting start",
            RunPhase::GettingTags => "loading tags",
            RunPhase::GettingOrgs => "discovering organizations",
            RunPhase::CheckingOrgs => "checking organizations",
            RunPhase::PickingOrgs => "awaiting selection",
            RunPhase::GettingUsers => "listing users",
            RunPhase::MigratingUsers => "migrating users",
            RunPhase::PrefetchingDestTickets => "prefetching destination tickets",
            RunPhase::MigratingTickets => "migrating tickets",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum MigrationEvent {
    PhaseChanged(RunPhase),
    Log(LogLine),
    Counters(StatsSnapshot),
    /// The run cannot continue; carries the rendered cause.
    Fatal(String),
}

/// Cloneable emitting half of the event stream.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<MigrationEvent>,
}

impl EventSender {
    pub fn emit(&self, event: MigrationEvent) {
        // Receiver dropped means headless operation; nothing to do.
        let _ = self.tx.send(event);
    }

    pub fn phase(&self, phase: RunPhase) {
        self.emit(MigrationEvent::PhaseChanged(phase));
    }

    pub fn counters(&self, snapshot: StatsSnapshot) {
        self.emit(MigrationEvent::Counters(snapshot));
    }
}

pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<MigrationEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}
