//! Id discovery against the destination, for filling in the config: boards,
//! board statuses, and members, plus the Zendesk stamp-field bootstrap.

use miette::Result;
use tokio_util::sync::CancellationToken;

use migrator_core::connectwise::{ConnectWiseApi, ConnectWiseClient};
use migrator_core::zendesk::ZendeskClient;
use migrator_core::Config;

use crate::output::Output;

fn connectwise(config: &Config) -> Result<ConnectWiseClient> {
    if !config.connectwise_psa.api_creds.is_complete() {
        return Err(miette::miette!(
            "ConnectWise credentials are incomplete; fill in connectwise_psa.api_creds first"
        ));
    }
    Ok(ConnectWiseClient::new(
        &config.connectwise_psa.api_creds,
        CancellationToken::new(),
    ))
}

pub async fn boards(config: &Config, output: &Output) -> Result<()> {
    let client = connectwise(config)?;
    let boards = client.list_boards().await?;
    output.section("Service Boards");
    for board in &boards {
        output.list_item(board.id, &board.name);
    }
    output.status(&format!("{} board(s)", boards.len()));
    Ok(())
}

pub async fn statuses(config: &Config, board: Option<i64>, output: &Output) -> Result<()> {
    let board_id = match board {
        Some(id) => id,
        None if config.connectwise_psa.destination_board_id > 0 => {
            config.connectwise_psa.destination_board_id
        }
        None => {
            return Err(miette::miette!(
                "no board id: pass --board or set connectwise_psa.destination_board_id"
            ));
        }
    };
    let client = connectwise(config)?;
    let statuses = client.list_board_statuses(board_id).await?;
    output.section(&format!("Statuses on Board {board_id}"));
    for status in &statuses {
        output.list_item(status.id, &status.name);
    }
    output.status(&format!("{} status(es)", statuses.len()));
    Ok(())
}

pub async fn members(config: &Config, output: &Output) -> Result<()> {
    let client = connectwise(config)?;
    let members = client.list_members().await?;
    output.section("Members");
    for member in &members {
        output.list_item(
            member.id,
            &format!(
                "{} {} ({})",
                member.first_name, member.last_name, member.identifier
            ),
        );
    }
    output.status(&format!("{} member(s)", members.len()));
    Ok(())
}

/// Create any missing Zendesk stamp fields and print the ids to drop into
/// `zendesk.field_ids`.
pub async fn fields(config: &Config, output: &Output) -> Result<()> {
    if !config.zendesk.api_creds.is_complete() {
        return Err(miette::miette!(
            "Zendesk credentials are incomplete; fill in zendesk.api_creds first"
        ));
    }
    let client = ZendeskClient::new(&config.zendesk.api_creds, CancellationToken::new());
    let ids = client.ensure_stamp_fields().await?;
    output.section("Zendesk Stamp Fields");
    output.info("psa_company_id:", &ids.psa_company_id.to_string());
    output.info("psa_contact_id:", &ids.psa_contact_id.to_string());
    output.info("psa_ticket_id:", &ids.psa_ticket_id.to_string());
    output.status("Copy the first two into zendesk.field_ids in the config.");
    Ok(())
}
