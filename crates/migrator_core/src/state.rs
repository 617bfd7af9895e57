//! Per-run migration state.
//!
//! One `MigrationState` lives for the duration of a run and is the only
//! shared mutable object. The concurrently-written maps are `DashMap`s, the
//! counters are atomics with a coherent-enough `snapshot()` for display, and
//! the output log is a mutex-guarded append-only buffer the frontend reads.
//! Org records are handed to exactly one task at a time; the map only
//! arbitrates ownership.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::TagWindow;
use crate::connectwise::Company;
use crate::events::{LogLevel, LogLine};
use crate::zendesk::Organization;

/// Where an org sits in the readiness state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgStatus {
    /// Added after tag search.
    Discovered,
    /// Ticket probe done, found at least one.
    Probed,
    /// Looking for the destination company.
    Matching,
    /// Writing the company stamp.
    Stamping,
    /// Terminal: eligible for selection.
    Ready,
    /// Terminal: zero tickets in window.
    NoTickets,
    /// Terminal: no destination company matched the org name.
    AbsentInDestination,
    /// Terminal: readiness check failed.
    Errored,
}

impl OrgStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrgStatus::Ready
                | OrgStatus::NoTickets
                | OrgStatus::AbsentInDestination
                | OrgStatus::Errored
        )
    }
}

/// One source organization and everything the run learns about it.
#[derive(Debug, Clone)]
pub struct OrgRecord {
    pub source: Organization,
    pub destination: Option<Company>,
    pub window: TagWindow,
    pub status: OrgStatus,
    pub has_tickets: bool,
    pub selected: bool,
    pub tickets_already_in_destination: u64,
    pub tickets_processed: u64,
    pub migrated: bool,
}

impl OrgRecord {
    pub fn new(source: Organization, window: TagWindow) -> Self {
        Self {
            source,
            destination: None,
            window,
            status: OrgStatus::Discovered,
            has_tickets: false,
            selected: false,
            tickets_already_in_destination: 0,
            tickets_processed: 0,
            migrated: false,
        }
    }

    /// Eligible for user/ticket migration: has tickets, matched a company,
    /// and the source-side stamp agrees with the match.
    pub fn ready_for_migration(&self) -> bool {
        let Some(dest) = &self.destination else {
            return false;
        };
        self.has_tickets && self.source.psa_company_stamp() == Some(dest.id)
    }
}

/// A source user's matched destination contact, kept with enough identity to
/// attribute ticket comments later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestContact {
    pub contact_id: i64,
    pub name: String,
    pub email: String,
}

/// Minimal identity for comment authors outside every selected org.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalUser {
    pub name: String,
    pub email: Option<String>,
}

/// Run counters. All monotonic; read via [`Stats::snapshot`].
#[derive(Debug, Default)]
pub struct Stats {
    pub orgs_discovered: AtomicU64,
    pub orgs_checked: AtomicU64,
    pub orgs_ready: AtomicU64,
    pub orgs_not_in_psa: AtomicU64,
    pub org_errors: AtomicU64,
    pub users_processed: AtomicU64,
    pub contacts_created: AtomicU64,
    pub user_migration_errors: AtomicU64,
    pub tickets_processed: AtomicU64,
    pub new_tickets_created: AtomicU64,
    pub tickets_already_in_destination: AtomicU64,
    pub ticket_migration_errors: AtomicU64,
    pub ticket_orgs_processed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub orgs_discovered: u64,
    pub orgs_checked: u64,
    pub orgs_ready: u64,
    pub orgs_not_in_psa: u64,
    pub org_errors: u64,
    pub users_processed: u64,
    pub contacts_created: u64,
    pub user_migration_errors: u64,
    pub tickets_processed: u64,
    pub new_tickets_created: u64,
    pub tickets_already_in_destination: u64,
    pub ticket_migration_errors: u64,
    pub ticket_orgs_processed: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            orgs_discovered: self.orgs_discovered.load(Ordering::Relaxed),
            orgs_checked: self.orgs_checked.load(Ordering::Relaxed),
            orgs_ready: self.orgs_ready.load(Ordering::Relaxed),
            orgs_not_in_psa: self.orgs_not_in_psa.load(Ordering::Relaxed),
            org_errors: self.org_errors.load(Ordering::Relaxed),
            users_processed: self.users_processed.load(Ordering::Relaxed),
            contacts_created: self.contacts_created.load(Ordering::Relaxed),
            user_migration_errors: self.user_migration_errors.load(Ordering::Relaxed),
            tickets_processed: self.tickets_processed.load(Ordering::Relaxed),
            new_tickets_created: self.new_tickets_created.load(Ordering::Relaxed),
            tickets_already_in_destination: self
                .tickets_already_in_destination
                .load(Ordering::Relaxed),
            ticket_migration_errors: self.ticket_migration_errors.load(Ordering::Relaxed),
            ticket_orgs_processed: self.ticket_orgs_processed.load(Ordering::Relaxed),
        }
    }
}

/// Bump a counter by one.
pub(crate) fn bump(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Default)]
pub struct MigrationState {
    /// Every org discovered this run, keyed by source org id.
    pub orgs: DashMap<i64, OrgRecord>,
    /// Source user id -> matched destination contact.
    pub users_in_destination: DashMap<i64, DestContact>,
    /// Source ticket id -> destination ticket id (the idempotency oracle).
    pub ticket_index: DashMap<i64, i64>,
    /// Comment authors not in any selected org, cached across comments.
    pub external_users: DashMap<i64, ExternalUser>,
    pub stats: Stats,
    output: Mutex<Vec<LogLine>>,
}

impl MigrationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_output(&self, level: LogLevel, message: String) {
        self.output.lock().push(LogLine {
            level,
            message,
            at: Utc::now(),
        });
    }

    /// Frontend view of the output log. Clones; callers tolerate staleness.
    pub fn output_lines(&self) -> Vec<LogLine> {
        self.output.lock().clone()
    }

    /// Source ids of orgs the operator selected.
    pub fn selected_org_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .orgs
            .iter()
            .filter(|entry| entry.value().selected)
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of orgs that finished readiness as `Ready`, sorted for stable
    /// selection menus.
    pub fn ready_org_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .orgs
            .iter()
            .filter(|entry| entry.value().status == OrgStatus::Ready)
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Record a destination ticket discovered or created for a source ticket.
    pub fn index_ticket(&self, source_ticket_id: i64, destination_ticket_id: i64) {
        self.ticket_index
            .insert(source_ticket_id, destination_ticket_id);
    }

    pub fn ticket_migrated(&self, source_ticket_id: i64) -> Option<i64> {
        self.ticket_index
            .get(&source_ticket_id)
            .map(|entry| *entry.value())
    }
}
