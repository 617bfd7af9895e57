//! Ticket migration engine.
//!
//! Phase 1 prefetches the destination ticket index (the idempotency oracle):
//! every destination ticket whose source-id custom field is set maps
//! `source_ticket_id -> destination_ticket_id`, and anything in the index is
//! skipped. Phase 2 walks the selected orgs sequentially and fans each org's
//! work list out behind one global semaphore, so at most
//! [`TICKET_WORKER_CAP`](super::TICKET_WORKER_CAP) tickets are in flight
//! across the whole run.
//!
//! Each worker is sequential internally: create -> notes -> close -> stamp.
//! Failures are per-ticket terminal; nothing is retried within a run.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::connectwise::{CustomFieldValue, NewNote, NewTicket, Ref};
use crate::error::{MigrationError, Result, ZendeskError};
use crate::events::LogLevel;
use crate::format::{self, SentBy};
use crate::state::{bump, ExternalUser};
use crate::zendesk::{Comment, CommentCc, Ticket, TicketSearch};

use super::{MigrationCtx, TICKET_WORKER_CAP};

const TICKET_PAGE_SIZE: u32 = 100;

/// Phase 1: build the `source_ticket_id -> destination_ticket_id` index from
/// the destination. A failure here is fatal for the run.
pub(crate) async fn prefetch_index(ctx: &MigrationCtx) -> Result<()> {
    let field_id = ctx.config.connectwise_psa.field_ids.zendesk_ticket_id;
    let tickets = ctx.connectwise.query_tickets_by_custom_field(field_id).await?;

    let mut indexed = 0u64;
    for ticket in &tickets {
        let Some(source_id) = ticket.custom_field_i64(field_id) else {
            continue;
        };
        ctx.state.index_ticket(source_id, ticket.id);
        bump(&ctx.state.stats.tickets_already_in_destination);
        indexed += 1;

        // Attribute the existing ticket to its org for the per-org counter.
        if let Some(company) = &ticket.company {
            for mut entry in ctx.state.orgs.iter_mut() {
                let record = entry.value_mut();
                if record.destination.as_ref().map(|c| c.id) == Some(company.id) {
                    record.tickets_already_in_destination += 1;
                    break;
                }
            }
        }
    }
    ctx.log(
        LogLevel::Info,
        format!("destination index: {indexed} previously migrated ticket(s)"),
    );
    ctx.emit_counters();
    Ok(())
}

/// Phase 2: migrate tickets for every selected org.
pub(crate) async fn run(ctx: &MigrationCtx) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(TICKET_WORKER_CAP));

    for org_id in ctx.state.selected_org_ids() {
        if ctx.cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        migrate_org_tickets(ctx, org_id, semaphore.clone()).await;
        bump(&ctx.state.stats.ticket_orgs_processed);
        ctx.emit_counters();
    }
    Ok(())
}

async fn migrate_org_tickets(ctx: &MigrationCtx, org_id: i64, semaphore: Arc<Semaphore>) {
    let Some((org_name, company_id, window)) = ctx.state.orgs.get(&org_id).and_then(|e| {
        let record = e.value();
        Some((
            record.source.name.clone(),
            record.destination.as_ref()?.id,
            record.window.clone(),
        ))
    }) else {
        return;
    };

    let search = TicketSearch {
        include_open: ctx.config.migrate_open_tickets,
        page_size: TICKET_PAGE_SIZE,
        limit: ctx.config.ticket_limit,
    };
    let tickets = match ctx.zendesk.search_tickets(org_id, &window, search).await {
        Ok(tickets) => tickets,
        Err(e) => {
            bump(&ctx.state.stats.ticket_migration_errors);
            ctx.log(
                LogLevel::Error,
                format!("org {org_name:?}: ticket search failed: {e}"),
            );
            return;
        }
    };

    // Partition on the index: already-migrated tickets count as processed.
    let mut work = Vec::new();
    for ticket in tickets {
        if let Some(dest_id) = ctx.state.ticket_migrated(ticket.id) {
            ctx.log(
                LogLevel::Debug,
                format!("ticket {} already migrated as {dest_id}", ticket.id),
            );
            bump(&ctx.state.stats.tickets_processed);
            if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
                entry.value_mut().tickets_processed += 1;
            }
        } else {
            work.push(ticket);
        }
    }
    ctx.log(
        LogLevel::Info,
        format!("org {org_name:?}: {} ticket(s) to migrate", work.len()),
    );

    let mut workers = JoinSet::new();
    for ticket in work {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            if ctx.cancel.is_cancelled() {
                return;
            }
            migrate_one_ticket(&ctx, org_id, company_id, ticket).await;
            ctx.emit_counters();
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            bump(&ctx.state.stats.ticket_migration_errors);
            ctx.log(LogLevel::Error, format!("ticket worker panicked: {e}"));
        }
    }

    if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
        entry.value_mut().migrated = true;
    }
}

/// One ticket, start to finish. Owns all its error handling; every failure
/// is terminal for this ticket only.
pub(crate) async fn migrate_one_ticket(
    ctx: &MigrationCtx,
    org_id: i64,
    company_id: i64,
    ticket: Ticket,
) {
    // Approximate limit: in-flight workers may overshoot by up to the
    // semaphore capacity.
    let limit = ctx.config.ticket_limit;
    if limit > 0
        && ctx
            .state
            .stats
            .tickets_processed
            .load(std::sync::atomic::Ordering::Relaxed)
            >= limit
    {
        // Still counts against the org so its totals reconcile.
        if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
            entry.value_mut().tickets_processed += 1;
        }
        return;
    }

    let source_id = ticket.id;
    let payload = match build_ticket(ctx, company_id, &ticket) {
        Ok(payload) => payload,
        Err(e) => {
            // Requester outside the selected orgs: expected, warned, counted.
            bump(&ctx.state.stats.ticket_migration_errors);
            bump(&ctx.state.stats.tickets_processed);
            if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
                entry.value_mut().tickets_processed += 1;
            }
            ctx.log(LogLevel::Warn, format!("skipping ticket {source_id}: {e}"));
            return;
        }
    };

    let created = match ctx.connectwise.create_ticket(&payload).await {
        Ok(created) => created,
        Err(e) => {
            bump(&ctx.state.stats.ticket_migration_errors);
            bump(&ctx.state.stats.tickets_processed);
            ctx.log(
                LogLevel::Error,
                format!("ticket {source_id}: create failed: {e}"),
            );
            return;
        }
    };
    let dest_id = created.id;

    // Single comment fetch, reused for every note.
    let comments = match ctx.zendesk.list_ticket_comments(source_id).await {
        Ok(comments) => comments,
        Err(e) => {
            bump(&ctx.state.stats.ticket_migration_errors);
            bump(&ctx.state.stats.tickets_processed);
            ctx.log(
                LogLevel::Error,
                format!("ticket {source_id} -> {dest_id}: listing comments failed: {e}"),
            );
            return;
        }
    };
    for comment in &comments {
        let note = build_note(ctx, comment).await;
        if let Err(e) = ctx.connectwise.append_ticket_note(dest_id, &note).await {
            bump(&ctx.state.stats.ticket_migration_errors);
            bump(&ctx.state.stats.tickets_processed);
            ctx.log(
                LogLevel::Error,
                format!("ticket {source_id} -> {dest_id}: note failed: {e}"),
            );
            return;
        }
    }

    if ticket.is_closed() {
        let closed_status = ctx.config.connectwise_psa.closed_status_id;
        if let Err(e) = ctx.connectwise.update_ticket_status(dest_id, closed_status).await {
            bump(&ctx.state.stats.ticket_migration_errors);
            bump(&ctx.state.stats.tickets_processed);
            ctx.log(
                LogLevel::Error,
                format!("ticket {source_id} -> {dest_id}: closing failed: {e}"),
            );
            return;
        }
    }

    ctx.state.index_ticket(source_id, dest_id);
    bump(&ctx.state.stats.new_tickets_created);
    bump(&ctx.state.stats.tickets_processed);
    if let Some(mut entry) = ctx.state.orgs.get_mut(&org_id) {
        entry.value_mut().tickets_processed += 1;
    }
    ctx.log(
        LogLevel::Info,
        format!("ticket {source_id} migrated as {dest_id}"),
    );
}

/// Assemble the base ticket payload. Fails only when the requester has no
/// destination contact.
pub(crate) fn build_ticket(
    ctx: &MigrationCtx,
    company_id: i64,
    ticket: &Ticket,
) -> Result<NewTicket> {
    let contact = ctx
        .state
        .users_in_destination
        .get(&ticket.requester_id)
        .map(|entry| Ref::new(entry.value().contact_id))
        .ok_or(MigrationError::RequesterUnknown {
            source_ticket_id: ticket.id,
            requester_id: ticket.requester_id,
        })?;

    let (summary, initial_internal_analysis) = format::summarize_subject(&ticket.subject);

    let field_ids = &ctx.config.connectwise_psa.field_ids;
    let mut custom_fields = vec![CustomFieldValue {
        id: field_ids.zendesk_ticket_id,
        value: Some(serde_json::Value::from(ticket.id)),
    }];
    if ticket.is_closed() {
        custom_fields.push(CustomFieldValue {
            id: field_ids.zendesk_closed_date,
            value: Some(serde_json::Value::from(format::closed_date_value(
                ticket.updated_at,
                ctx.tz,
            ))),
        });
    }

    let owner = ticket
        .assignee_id
        .and_then(|id| ctx.config.agent_for(id))
        .map(|agent| Ref::new(agent.destination_id));

    Ok(NewTicket {
        summary,
        company: Ref::new(company_id),
        board: Ref::new(ctx.config.connectwise_psa.destination_board_id),
        status: Ref::new(ctx.config.connectwise_psa.open_status_id),
        contact,
        owner,
        initial_internal_analysis,
        custom_fields,
    })
}

/// Assemble a note from a source comment. Public comments become the
/// customer-visible detail description; private comments set both the detail
/// and internal-analysis flags (preserved behavior).
pub(crate) async fn build_note(ctx: &MigrationCtx, comment: &Comment) -> NewNote {
    let (member, sent_by) = resolve_author(ctx, comment.author_id).await;
    let ccs = resolve_ccs(ctx, comment.email_ccs());
    let text = format::note_body(
        sent_by.as_ref(),
        comment.created_at,
        ctx.tz,
        &ccs,
        &comment.body,
    );
    NewNote {
        text,
        detail_description_flag: true,
        internal_analysis_flag: !comment.public,
        member,
    }
}

/// Author attribution precedence: agent mapping, then migrated users, then
/// the external-user cache, then a live fetch (cached). A mapped agent posts
/// as the destination member with no `Sent By` line; everyone else gets one,
/// with `Unknown (no email)` as the last resort.
async fn resolve_author(ctx: &MigrationCtx, author_id: i64) -> (Option<Ref>, Option<SentBy>) {
    if let Some(agent) = ctx.config.agent_for(author_id) {
        return (Some(Ref::new(agent.destination_id)), None);
    }
    if let Some(user) = ctx.state.users_in_destination.get(&author_id) {
        let user = user.value();
        return (
            None,
            Some(SentBy {
                name: user.name.clone(),
                email: user.email.clone(),
            }),
        );
    }
    if let Some(cached) = ctx.state.external_users.get(&author_id) {
        return (None, Some(sent_by_from_external(cached.value())));
    }
    match ctx.zendesk.get_user(author_id).await {
        Ok(user) => {
            let external = ExternalUser {
                name: user.name.clone(),
                email: user.email.clone(),
            };
            let sent_by = sent_by_from_external(&external);
            ctx.state.external_users.insert(author_id, external);
            (None, Some(sent_by))
        }
        Err(ZendeskError::NotFound { .. }) => (None, Some(SentBy::unknown())),
        Err(e) => {
            // Attribution failure is never a ticket failure.
            ctx.log(
                LogLevel::Debug,
                format!("author {author_id} lookup failed ({e}), using Unknown"),
            );
            (None, Some(SentBy::unknown()))
        }
    }
}

fn sent_by_from_external(user: &ExternalUser) -> SentBy {
    SentBy {
        name: if user.name.is_empty() {
            format::UNKNOWN_NAME.to_string()
        } else {
            user.name.clone()
        },
        email: user
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format::NO_EMAIL.to_string()),
    }
}

/// CC resolution: literal strings pass through verbatim; ids resolve through
/// the agent map, then migrated users; unresolved ids are dropped.
fn resolve_ccs(ctx: &MigrationCtx, ccs: &[CommentCc]) -> Vec<String> {
    let mut resolved = Vec::new();
    for cc in ccs {
        match cc {
            CommentCc::Literal(s) => resolved.push(s.clone()),
            CommentCc::Id(id) => {
                if let Some(agent) = ctx.config.agent_for(*id) {
                    resolved.push(agent.name.clone());
                } else if let Some(user) = ctx.state.users_in_destination.get(id) {
                    resolved.push(user.value().name.clone());
                }
            }
        }
    }
    resolved
}
