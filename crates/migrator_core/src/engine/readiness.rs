//! Org readiness engine.
//!
//! Discovery populates the org table from tag searches; the readiness check
//! then drives each org through probe -> match -> stamp -> ready as an
//! independent task. Terminal states: `Ready`, `NoTickets`,
//! `AbsentInDestination`, `Errored`.

use std::collections::HashMap;

use tokio::task::JoinSet;

use crate::config::TagConfig;
use crate::error::{ConnectWiseError, MigrationError, Result};
use crate::events::LogLevel;
use crate::state::{bump, OrgRecord, OrgStatus};
use crate::zendesk::{TicketSearch, PROBE_PAGE_SIZE};

use super::MigrationCtx;

/// Search every configured tag and add each org (first tag wins for orgs
/// carrying several migration tags).
pub(crate) async fn discover_orgs(ctx: &MigrationCtx, tags: &[TagConfig]) -> Result<()> {
    for tag in tags {
        let window = ctx.config.window_for_tag(tag);
        let orgs = ctx.zendesk.search_orgs_by_tag(&tag.name).await?;
        ctx.log(
            LogLevel::Info,
            format!("tag {:?}: {} organization(s)", tag.name, orgs.len()),
        );
        for org in orgs {
            let org_id = org.id;
            let record = OrgRecord::new(org, window.clone());
            if ctx.state.orgs.insert(org_id, record).is_none() {
                bump(&ctx.state.stats.orgs_discovered);
            }
        }
    }
    ctx.emit_counters();
    Ok(())
}

/// Run the readiness state machine for every discovered org, in parallel.
/// The phase is complete when `orgs_checked == orgs_discovered`.
pub(crate) async fn check_all_orgs(ctx: &MigrationCtx) -> Result<()> {
    let org_ids: Vec<i64> = ctx.state.orgs.iter().map(|e| *e.key()).collect();
    let mut tasks = JoinSet::new();
    for org_id in org_ids {
        let ctx = ctx.clone();
        tasks.spawn(async move {
            check_org(&ctx, org_id).await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            ctx.log(LogLevel::Error, format!("readiness task panicked: {e}"));
            bump(&ctx.state.stats.org_errors);
            bump(&ctx.state.stats.orgs_checked);
        }
        ctx.emit_counters();
    }
    if ctx.cancel.is_cancelled() {
        return Err(MigrationError::Cancelled);
    }
    Ok(())
}

fn set_status(ctx: &MigrationCtx, org_id: i64, status: OrgStatus) {
    if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
        entry.value_mut().status = status;
    }
}

/// One org's readiness check. All failures are terminal for the org, never
/// for the run.
pub(crate) async fn check_org(ctx: &MigrationCtx, org_id: i64) {
    let Some(record) = ctx.state.orgs.get(&org_id).map(|e| e.value().clone()) else {
        return;
    };
    if record.status.is_terminal() {
        return;
    }
    let name = record.source.name.clone();
    let status = run_state_machine(ctx, org_id, record).await;
    set_status(ctx, org_id, status);
    match status {
        OrgStatus::Ready => {
            bump(&ctx.state.stats.orgs_ready);
            ctx.log(LogLevel::Info, format!("org {name:?} is ready for migration"));
        }
        OrgStatus::NoTickets => {
            ctx.log(
                LogLevel::Debug,
                format!("org {name:?} has no tickets in window, skipping"),
            );
        }
        OrgStatus::AbsentInDestination => {
            bump(&ctx.state.stats.orgs_not_in_psa);
            ctx.log(
                LogLevel::Warn,
                format!("org {name:?} has no matching company in the PSA"),
            );
        }
        OrgStatus::Errored => {
            bump(&ctx.state.stats.org_errors);
        }
        // run_state_machine only returns terminal states
        _ => {}
    }
    bump(&ctx.state.stats.orgs_checked);
}

async fn run_state_machine(ctx: &MigrationCtx, org_id: i64, mut record: OrgRecord) -> OrgStatus {
    // Probe: one page is enough to tell whether the org is silent.
    let probe = TicketSearch {
        include_open: ctx.config.migrate_open_tickets,
        page_size: PROBE_PAGE_SIZE,
        limit: PROBE_PAGE_SIZE as u64,
    };
    let tickets = match ctx.zendesk.search_tickets(org_id, &record.window, probe).await {
        Ok(tickets) => tickets,
        Err(e) => {
            ctx.log(
                LogLevel::Error,
                format!("org {:?}: ticket probe failed: {e}", record.source.name),
            );
            return OrgStatus::Errored;
        }
    };
    if tickets.is_empty() {
        return OrgStatus::NoTickets;
    }
    if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
        entry.value_mut().has_tickets = true;
        entry.value_mut().status = OrgStatus::Probed;
    }
    record.has_tickets = true;

    set_status(ctx, org_id, OrgStatus::Matching);
    let company = match ctx.connectwise.find_company_by_name(&record.source.name).await {
        Ok(Some(company)) => company,
        Ok(None) => return OrgStatus::AbsentInDestination,
        Err(e @ ConnectWiseError::UnexpectedCompanyCount { .. }) => {
            ctx.log(LogLevel::Error, format!("org {:?}: {e}", record.source.name));
            return OrgStatus::Errored;
        }
        Err(e) => {
            ctx.log(
                LogLevel::Error,
                format!("org {:?}: company lookup failed: {e}", record.source.name),
            );
            return OrgStatus::Errored;
        }
    };
    if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
        entry.value_mut().destination = Some(company.clone());
    }

    set_status(ctx, org_id, OrgStatus::Stamping);
    if record.source.psa_company_stamp() == Some(company.id) {
        // Re-run: stamp already correct, reach Ready with no writes.
        ctx.log(
            LogLevel::Debug,
            format!("org {:?} already stamped, no action", record.source.name),
        );
        return OrgStatus::Ready;
    }
    let mut fields = HashMap::new();
    fields.insert(
        "psa_company".to_string(),
        serde_json::Value::from(company.id),
    );
    if let Err(e) = ctx.zendesk.update_org_fields(org_id, fields).await {
        ctx.log(
            LogLevel::Error,
            format!("org {:?}: stamping failed: {e}", record.source.name),
        );
        return OrgStatus::Errored;
    }
    if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
        entry
            .value_mut()
            .source
            .organization_fields
            .insert("psa_company".to_string(), serde_json::Value::from(company.id));
    }
    ctx.log(
        LogLevel::Info,
        format!(
            "org {:?} stamped with company {}",
            record.source.name, company.id
        ),
    );
    OrgStatus::Ready
}
