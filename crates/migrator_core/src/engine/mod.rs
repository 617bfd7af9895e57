//! The migration orchestrator and the context shared by the phase
//! engines.
//!
//! A run is driven phase by phase: readiness, selection, users, ticket-index
//! prefetch, tickets. The frontend calls the phase methods in order; the
//! `RunPhase` machine rejects anything out of order. Cancellation is one
//! token scoped to the whole run and checked at every suspension point that
//! matters (the HTTP clients race every request against it).

pub mod readiness;
pub mod tickets;
pub mod users;

use std::sync::Arc;

use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connectwise::ConnectWiseApi;
use crate::error::{MigrationError, Result};
use crate::events::{EventSender, LogLevel, MigrationEvent, RunPhase};
use crate::state::{MigrationState, OrgStatus, StatsSnapshot};
use crate::zendesk::ZendeskApi;

/// Global cap on in-flight ticket workers, across all orgs.
pub const TICKET_WORKER_CAP: usize = 25;

/// Everything a phase engine needs. Cheap to clone; handed to worker tasks.
#[derive(Clone)]
pub struct MigrationCtx {
    pub config: Arc<Config>,
    pub tz: Tz,
    pub zendesk: Arc<dyn ZendeskApi>,
    pub connectwise: Arc<dyn ConnectWiseApi>,
    pub state: Arc<MigrationState>,
    pub events: EventSender,
    pub cancel: CancellationToken,
}

impl MigrationCtx {
    /// Log to the tracing subscriber, the run output buffer, and the event
    /// stream in one go. No failure is silent: anything WARN and up lands in
    /// front of the operator.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warn => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        self.state.append_output(level, message.clone());
        self.events.emit(MigrationEvent::Log(crate::events::LogLine {
            level,
            message,
            at: chrono::Utc::now(),
        }));
    }

    pub fn emit_counters(&self) {
        self.events.counters(self.state.stats.snapshot());
    }
}

/// Summary handed back after the readiness phase for the selection step.
#[derive(Debug, Clone)]
pub struct ReadyOrg {
    pub org_id: i64,
    pub name: String,
    pub tag: String,
    pub destination_company_id: i64,
}

/// The orchestrator. Owns the phase machine; everything else lives in the
/// shared [`MigrationState`].
pub struct Migrator {
    ctx: MigrationCtx,
    phase: RunPhase,
}

impl Migrator {
    pub fn new(
        config: Config,
        zendesk: Arc<dyn ZendeskApi>,
        connectwise: Arc<dyn ConnectWiseApi>,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let tz = config.time_zone()?;
        Ok(Self {
            ctx: MigrationCtx {
                config: Arc::new(config),
                tz,
                zendesk,
                connectwise,
                state: Arc::new(MigrationState::new()),
                events,
                cancel,
            },
            phase: RunPhase::AwaitingStart,
        })
    }

    pub fn state(&self) -> Arc<MigrationState> {
        self.ctx.state.clone()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to the next phase. Only the immediate successor or `Done` is
    /// legal; anything else is a caller bug.
    fn advance(&mut self, to: RunPhase) -> Result<()> {
        let legal = to == RunPhase::Done || successor(self.phase) == Some(to);
        if !legal {
            return Err(MigrationError::PhaseOrder {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        self.phase = to;
        self.ctx.events.phase(to);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.ctx.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        Ok(())
    }

    /// Phases `GettingTags` through `CheckingOrgs`: discover orgs for every
    /// configured tag and run the readiness checks in parallel. Returns the
    /// orgs that ended `Ready`, sorted by id, for the selection step.
    pub async fn run_readiness(&mut self) -> Result<Vec<ReadyOrg>> {
        self.check_cancelled()?;
        self.advance(RunPhase::GettingTags)?;
        let tags = self.ctx.config.zendesk.tags_to_migrate.clone();
        self.ctx.log(
            LogLevel::Info,
            format!("migrating {} tag(s)", tags.len()),
        );

        self.advance(RunPhase::GettingOrgs)?;
        readiness::discover_orgs(&self.ctx, &tags).await?;

        self.advance(RunPhase::CheckingOrgs)?;
        readiness::check_all_orgs(&self.ctx).await?;

        self.advance(RunPhase::PickingOrgs)?;
        let state = &self.ctx.state;
        let ready = state
            .ready_org_ids()
            .into_iter()
            .filter_map(|id| {
                let record = state.orgs.get(&id)?;
                let dest = record.destination.as_ref()?;
                Some(ReadyOrg {
                    org_id: id,
                    name: record.source.name.clone(),
                    tag: record.window.tag.clone(),
                    destination_company_id: dest.id,
                })
            })
            .collect();
        Ok(ready)
    }

    /// Record the operator's selection. Only `Ready` orgs can be selected.
    pub fn select_orgs(&mut self, org_ids: &[i64]) -> usize {
        let mut selected = 0;
        for mut entry in self.ctx.state.orgs.iter_mut() {
            let record = entry.value_mut();
            record.selected = record.status == OrgStatus::Ready
                && record.ready_for_migration()
                && org_ids.contains(&record.source.id);
            if record.selected {
                selected += 1;
            }
        }
        self.ctx.log(
            LogLevel::Info,
            format!("{selected} organization(s) selected for migration"),
        );
        selected
    }

    /// Phases `GettingUsers` / `MigratingUsers` over the selected orgs.
    pub async fn run_user_migration(&mut self) -> Result<()> {
        self.check_cancelled()?;
        self.advance(RunPhase::GettingUsers)?;
        self.advance(RunPhase::MigratingUsers)?;
        users::run(&self.ctx).await
    }

    /// Phases `PrefetchingDestTickets` / `MigratingTickets`. A prefetch
    /// failure is fatal: without the index the run cannot be idempotent.
    pub async fn run_ticket_migration(&mut self) -> Result<()> {
        self.check_cancelled()?;
        self.advance(RunPhase::PrefetchingDestTickets)?;
        if let Err(cause) = tickets::prefetch_index(&self.ctx).await {
            self.phase = RunPhase::Done;
            self.ctx.events.phase(RunPhase::Done);
            let err = match cause {
                MigrationError::ConnectWise(cw) => MigrationError::IndexPrefetchFailed { cause: cw },
                other => other,
            };
            self.ctx
                .events
                .emit(MigrationEvent::Fatal(err.to_string()));
            return Err(err);
        }

        self.advance(RunPhase::MigratingTickets)?;
        tickets::run(&self.ctx).await
    }

    /// Terminal transition; returns the final counters.
    pub fn finish(&mut self) -> StatsSnapshot {
        self.phase = RunPhase::Done;
        self.ctx.events.phase(RunPhase::Done);
        let snapshot = self.ctx.state.stats.snapshot();
        self.ctx.events.counters(snapshot);
        snapshot
    }

}

fn successor(phase: RunPhase) -> Option<RunPhase> {
    use RunPhase::*;
    Some(match phase {
        AwaitingStart => GettingTags,
        GettingTags => GettingOrgs,
        GettingOrgs => CheckingOrgs,
        CheckingOrgs => PickingOrgs,
        PickingOrgs => GettingUsers,
        GettingUsers => MigratingUsers,
        MigratingUsers => PrefetchingDestTickets,
        PrefetchingDestTickets => MigratingTickets,
        MigratingTickets => Done,
        Done => return None,
    })
}

#[cfg(test)]
mod tests;
