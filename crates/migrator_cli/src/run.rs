//! The interactive migration run: connection tests, readiness, org
//! selection, then the user and ticket phases, with the engine's event
//! stream rendered behind an indicatif spinner.

use std::sync::Arc;
use std::time::Duration;

use dialoguer::MultiSelect;
use indicatif::{ProgressBar, ProgressStyle};
use miette::Result;
use owo_colors::OwoColorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use migrator_core::connectwise::ConnectWiseClient;
use migrator_core::zendesk::ZendeskClient;
use migrator_core::{
    event_channel, Config, LogLevel, MigrationEvent, Migrator, ReadyOrg, StatsSnapshot,
};

use crate::output::Output;

pub async fn run(config: Config, output: &Output) -> Result<()> {
    let missing = config.missing_required_fields();
    if !missing.is_empty() {
        return Err(miette::miette!(
            "missing required config fields: {}",
            missing.join(", ")
        ));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling the run");
                cancel.cancel();
            }
        });
    }

    let zendesk = Arc::new(ZendeskClient::new(&config.zendesk.api_creds, cancel.clone()));
    let connectwise = Arc::new(ConnectWiseClient::new(
        &config.connectwise_psa.api_creds,
        cancel.clone(),
    ));

    // Fail fast on either side before touching any data.
    output.status("Testing connections...");
    zendesk
        .test_connection()
        .await
        .map_err(|e| miette::miette!("Zendesk connection test failed: {e}"))?;
    connectwise
        .test_connection()
        .await
        .map_err(|e| miette::miette!("ConnectWise connection test failed: {e}"))?;
    output.success("Both APIs reachable");

    let stop_after_orgs = config.stop_after_orgs;
    let (events, rx) = event_channel();
    let mut migrator = Migrator::new(config, zendesk, connectwise, events, cancel)?;

    let bar = spawn_event_printer(rx);

    let ready = migrator.run_readiness().await?;
    if ready.is_empty() {
        bar.finish_and_clear();
        output.warning("No orgs are ready to migrate.");
        print_summary(output, &migrator.finish());
        return Ok(());
    }

    if stop_after_orgs {
        bar.finish_and_clear();
        output.section("Ready Orgs");
        for org in &ready {
            output.list_item(
                org.org_id,
                &format!(
                    "{} (tag {}) -> company {}",
                    org.name, org.tag, org.destination_company_id
                ),
            );
        }
        output.status("stop_after_orgs is set; no data was migrated.");
        print_summary(output, &migrator.finish());
        return Ok(());
    }

    let ids = pick_orgs(&bar, &ready)?;
    let selected = migrator.select_orgs(&ids);
    if selected == 0 {
        bar.finish_and_clear();
        output.warning("Nothing selected; no data was migrated.");
        migrator.finish();
        return Ok(());
    }
    output.status(&format!("{selected} org(s) selected"));

    migrator.run_user_migration().await?;
    migrator.run_ticket_migration().await?;

    let stats = migrator.finish();
    bar.finish_and_clear();
    print_summary(output, &stats);

    if stats.ticket_migration_errors > 0 || stats.user_migration_errors > 0 {
        output.warning("Some items failed; re-running will pick up where this run left off.");
    } else {
        output.success("Migration complete.");
    }
    Ok(())
}

fn pick_orgs(bar: &ProgressBar, ready: &[ReadyOrg]) -> Result<Vec<i64>> {
    let items: Vec<String> = ready
        .iter()
        .map(|org| {
            format!(
                "{} (tag {}) -> company {}",
                org.name, org.tag, org.destination_company_id
            )
        })
        .collect();
    let defaults = vec![true; items.len()];

    let picks = bar.suspend(|| {
        MultiSelect::new()
            .with_prompt("Orgs to migrate (space toggles, enter confirms)")
            .items(&items)
            .defaults(&defaults)
            .interact()
    });
    let picks = picks.map_err(|e| miette::miette!("org selection aborted: {e}"))?;
    Ok(picks.into_iter().map(|i| ready[i].org_id).collect())
}

/// Render the engine's event stream: phase changes retitle the spinner,
/// counters update its message, log lines print above it.
fn spawn_event_printer(mut rx: mpsc::UnboundedReceiver<MigrationEvent>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let printer = bar.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                MigrationEvent::PhaseChanged(phase) => printer.set_prefix(phase.to_string()),
                MigrationEvent::Log(line) => match line.level {
                    LogLevel::Debug => {}
                    LogLevel::Info => printer.println(line.message),
                    LogLevel::Warn => printer.println(line.message.yellow().to_string()),
                    LogLevel::Error => printer.println(line.message.red().to_string()),
                },
                MigrationEvent::Counters(stats) => printer.set_message(format!(
                    "orgs {}/{} ready · users {} · tickets {} ({} new, {} existing)",
                    stats.orgs_ready,
                    stats.orgs_checked,
                    stats.users_processed,
                    stats.tickets_processed,
                    stats.new_tickets_created,
                    stats.tickets_already_in_destination,
                )),
                MigrationEvent::Fatal(message) => {
                    printer.println(message.red().bold().to_string())
                }
            }
        }
    });
    bar
}

fn print_summary(output: &Output, stats: &StatsSnapshot) {
    output.section("Run Summary");
    output.info("Orgs discovered:", &stats.orgs_discovered.to_string());
    output.info("Orgs ready:", &stats.orgs_ready.to_string());
    output.info("Orgs not in PSA:", &stats.orgs_not_in_psa.to_string());
    output.info("Org errors:", &stats.org_errors.to_string());
    output.info("Users processed:", &stats.users_processed.to_string());
    output.info("Contacts created:", &stats.contacts_created.to_string());
    output.info("User errors:", &stats.user_migration_errors.to_string());
    output.info("Tickets processed:", &stats.tickets_processed.to_string());
    output.info("New tickets:", &stats.new_tickets_created.to_string());
    output.info(
        "Already migrated:",
        &stats.tickets_already_in_destination.to_string(),
    );
    output.info(
        "Ticket errors:",
        &stats.ticket_migration_errors.to_string(),
    );
}
