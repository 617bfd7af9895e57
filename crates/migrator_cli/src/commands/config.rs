use std::path::Path;

use dialoguer::{Input, Password};
use miette::{IntoDiagnostic, Result};
use migrator_core::Config;

use crate::output::Output;

/// Show the loaded configuration, with anything missing called out.
pub fn show(config: &Config, output: &Output) -> Result<()> {
    output.section("Current Configuration");
    let json = serde_json::to_string_pretty(config).into_diagnostic()?;
    for line in json.lines() {
        output.print(line);
    }

    let missing = config.missing_required_fields();
    if missing.is_empty() {
        output.success("All required fields are set");
    } else {
        output.print("");
        output.warning("Missing required fields:");
        for field in missing {
            output.status(&format!("  {field}"));
        }
    }
    Ok(())
}

/// Prompt for any missing credential fields and persist the result. Ids
/// (boards, statuses, custom fields) are left to `setup` and `fields`.
pub fn complete_credentials(config: &mut Config, path: &Path, output: &Output) -> Result<()> {
    let mut changed = false;

    let zd = &mut config.zendesk.api_creds;
    if zd.subdomain.is_empty() {
        zd.subdomain = prompt_text("Zendesk subdomain")?;
        changed = true;
    }
    if zd.username.is_empty() {
        zd.username = prompt_text("Zendesk username (email)")?;
        changed = true;
    }
    if zd.token.is_empty() {
        zd.token = prompt_secret("Zendesk API token")?;
        changed = true;
    }

    let cw = &mut config.connectwise_psa.api_creds;
    if cw.company_id.is_empty() {
        cw.company_id = prompt_text("ConnectWise company id")?;
        changed = true;
    }
    if cw.public_key.is_empty() {
        cw.public_key = prompt_text("ConnectWise public key")?;
        changed = true;
    }
    if cw.private_key.is_empty() {
        cw.private_key = prompt_secret("ConnectWise private key")?;
        changed = true;
    }
    if cw.client_id.is_empty() {
        cw.client_id = prompt_text("ConnectWise client id")?;
        changed = true;
    }

    if changed {
        config.save(path)?;
        output.success(&format!("Credentials saved to {}", path.display()));
    }
    Ok(())
}

fn prompt_text(label: &str) -> Result<String> {
    Input::new()
        .with_prompt(label)
        .interact_text()
        .into_diagnostic()
}

fn prompt_secret(label: &str) -> Result<String> {
    Password::new()
        .with_prompt(label)
        .interact()
        .into_diagnostic()
}
