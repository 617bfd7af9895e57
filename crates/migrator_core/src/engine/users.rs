//! User migration engine.
//!
//! For each selected org: list source users, match each to a destination
//! contact by email (creating it if absent), and stamp the contact id back
//! into the source user. Users are independent; each batch of 20 runs
//! concurrently, one org at a time.

use std::collections::HashMap;

use futures::future::join_all;

use crate::connectwise::{CommunicationItem, NewContact, Ref};
use crate::error::{ConnectWiseError, MigrationError, Result};
use crate::events::LogLevel;
use crate::state::{bump, DestContact};
use crate::zendesk::User;

use super::MigrationCtx;

const USER_BATCH_SIZE: usize = 20;

pub(crate) async fn run(ctx: &MigrationCtx) -> Result<()> {
    for org_id in ctx.state.selected_org_ids() {
        if ctx.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        let Some((org_name, company_id)) = ctx.state.orgs.get(&org_id).and_then(|e| {
            let record = e.value();
            Some((record.source.name.clone(), record.destination.as_ref()?.id))
        }) else {
            continue;
        };

        let users = match ctx.zendesk.list_org_users(org_id).await {
            Ok(users) => users,
            Err(e) => {
                bump(&ctx.state.stats.user_migration_errors);
                ctx.log(
                    LogLevel::Error,
                    format!("org {org_name:?}: listing users failed: {e}"),
                );
                continue;
            }
        };
        ctx.log(
            LogLevel::Info,
            format!("org {org_name:?}: migrating {} user(s)", users.len()),
        );

        for batch in users.chunks(USER_BATCH_SIZE) {
            join_all(
                batch
                    .iter()
                    .map(|user| migrate_user(ctx, company_id, user.clone())),
            )
            .await;
            ctx.emit_counters();
        }
    }
    Ok(())
}

/// Migrate a single user. Every exit path counts the user as processed;
/// failures are logged and never retried within the run.
pub(crate) async fn migrate_user(ctx: &MigrationCtx, company_id: i64, user: User) {
    let user_id = user.id;
    let Some(email) = user.email.as_deref().filter(|e| !e.is_empty()) else {
        ctx.log(
            LogLevel::Warn,
            format!("user {:?} ({user_id}) has no email, skipping", user.name),
        );
        bump(&ctx.state.stats.users_processed);
        return;
    };

    let contact = match ctx.connectwise.find_contact_by_email(email).await {
        Ok(contact) => contact,
        Err(ConnectWiseError::NoUserFound { .. }) => {
            let (first_name, last_name) = split_name(&user.name);
            let payload = NewContact {
                first_name,
                last_name,
                company: Ref::new(company_id),
                communication_items: vec![CommunicationItem::email(email)],
            };
            match ctx.connectwise.create_contact(&payload).await {
                Ok(contact) => {
                    bump(&ctx.state.stats.contacts_created);
                    ctx.log(
                        LogLevel::Info,
                        format!("created contact {} for {email}", contact.id),
                    );
                    contact
                }
                Err(e) => {
                    bump(&ctx.state.stats.user_migration_errors);
                    bump(&ctx.state.stats.users_processed);
                    ctx.log(
                        LogLevel::Error,
                        format!("creating contact for {email} failed: {e}"),
                    );
                    return;
                }
            }
        }
        Err(e) => {
            bump(&ctx.state.stats.user_migration_errors);
            bump(&ctx.state.stats.users_processed);
            ctx.log(
                LogLevel::Error,
                format!("contact lookup for {email} failed: {e}"),
            );
            return;
        }
    };

    if user.psa_contact_stamp() == Some(contact.id) {
        ctx.log(
            LogLevel::Debug,
            format!("user {email} already stamped, no action"),
        );
    } else {
        let mut fields = HashMap::new();
        fields.insert(
            "psa_contact".to_string(),
            serde_json::Value::from(contact.id),
        );
        if let Err(e) = ctx.zendesk.update_user_fields(user_id, fields).await {
            bump(&ctx.state.stats.user_migration_errors);
            bump(&ctx.state.stats.users_processed);
            ctx.log(
                LogLevel::Error,
                format!("stamping user {email} failed: {e}"),
            );
            return;
        }
    }

    ctx.state.users_in_destination.insert(
        user_id,
        DestContact {
            contact_id: contact.id,
            name: user.name.clone(),
            email: email.to_string(),
        },
    );
    bump(&ctx.state.stats.users_processed);
}

/// First/last split on the first space; single-word names keep an empty
/// last name.
fn split_name(name: &str) -> (String, String) {
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.to_string()),
        None => (name.to_string(), String::new()),
    }
}
