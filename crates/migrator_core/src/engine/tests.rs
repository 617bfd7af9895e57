//! End-to-end engine tests over the deterministic adapter fakes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::config::{AgentMapping, Config, TagConfig};
use crate::error::MigrationError;
use crate::events::{event_channel, LogLevel, MigrationEvent, RunPhase};
use crate::state::{OrgStatus, StatsSnapshot};
use crate::test_helpers::{MockConnectWise, MockZendesk};
use crate::zendesk::{Comment, Organization, Ticket, User, Via, ViaSource, ViaTo};

use super::Migrator;

const TAG: &str = "migrate-acme";
const TICKET_FIELD: i64 = 10;
const CLOSED_DATE_FIELD: i64 = 11;

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.zendesk.tags_to_migrate = vec![TagConfig {
        name: TAG.to_string(),
        ..Default::default()
    }];
    cfg.connectwise_psa.destination_board_id = 7;
    cfg.connectwise_psa.open_status_id = 1;
    cfg.connectwise_psa.closed_status_id = 2;
    cfg.connectwise_psa.field_ids.zendesk_ticket_id = TICKET_FIELD;
    cfg.connectwise_psa.field_ids.zendesk_closed_date = CLOSED_DATE_FIELD;
    cfg.migrate_open_tickets = true;
    cfg.agent_mappings.insert(
        "9".to_string(),
        AgentMapping {
            name: "Agent Nine".to_string(),
            email: "nine@psa.test".to_string(),
            source_id: 9,
            destination_id: 900,
        },
    );
    cfg
}

fn org(id: i64, name: &str) -> Organization {
    Organization {
        id,
        name: name.to_string(),
        tags: vec![TAG.to_string()],
        ..Default::default()
    }
}

fn user(id: i64, name: &str, email: &str) -> User {
    User {
        id,
        name: name.to_string(),
        email: Some(email.to_string()),
        ..Default::default()
    }
}

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn ticket(id: i64, subject: &str, status: &str, requester: i64) -> Ticket {
    Ticket {
        id,
        subject: subject.to_string(),
        status: status.to_string(),
        requester_id: requester,
        assignee_id: Some(9),
        organization_id: Some(100),
        created_at: at("2024-05-15T12:00:00Z"),
        updated_at: at("2024-06-01T10:00:00Z"),
    }
}

fn comment(id: i64, author: i64, body: &str, public: bool) -> Comment {
    Comment {
        id,
        author_id: author,
        body: body.to_string(),
        public,
        created_at: at("2024-05-15T12:30:00Z"),
        via: Via {
            source: ViaSource {
                to: ViaTo { email_ccs: vec![] },
            },
        },
    }
}

fn migrator(cfg: Config, zd: Arc<MockZendesk>, cw: Arc<MockConnectWise>) -> Migrator {
    let (events, _rx) = event_channel();
    Migrator::new(cfg, zd, cw, events, CancellationToken::new()).unwrap()
}

async fn full_run(m: &mut Migrator) -> StatsSnapshot {
    let ready = m.run_readiness().await.unwrap();
    let ids: Vec<i64> = ready.iter().map(|r| r.org_id).collect();
    m.select_orgs(&ids);
    m.run_user_migration().await.unwrap();
    m.run_ticket_migration().await.unwrap();
    m.finish()
}

/// Scenario 1: fresh run, one org, one open ticket with two comments.
#[tokio::test]
async fn fresh_run_migrates_org_user_ticket_and_notes() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(42, "Printer down", "open", 7));
    zd.add_comment(42, comment(1, 7, "Help", true));
    zd.add_comment(42, comment(2, 7, "escalate", false));
    cw.add_company(500, "Acme");

    let mut m = migrator(test_config(), zd.clone(), cw.clone());
    let stats = full_run(&mut m).await;

    // Org stamped with the matched company.
    let org_writes = zd.org_field_writes.lock();
    assert_eq!(org_writes.len(), 1);
    assert_eq!(org_writes[0].0, 100);
    assert_eq!(org_writes[0].1["psa_company"], serde_json::json!(500));
    drop(org_writes);

    // One contact created for the requester, stamped back into the source.
    let contacts = cw.created_contacts.lock();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].first_name, "Dana");
    assert_eq!(contacts[0].last_name, "Ortiz");
    assert_eq!(contacts[0].company.id, 500);
    drop(contacts);
    let contact_id = m.state().users_in_destination.get(&7).unwrap().contact_id;
    let user_writes = zd.user_field_writes.lock();
    assert_eq!(user_writes.len(), 1);
    assert_eq!(user_writes[0].0, 7);
    assert_eq!(user_writes[0].1["psa_contact"], serde_json::json!(contact_id));
    drop(user_writes);

    // One ticket with the expected payload.
    let tickets = cw.created_tickets.lock();
    assert_eq!(tickets.len(), 1);
    let (dest_id, payload) = &tickets[0];
    assert_eq!(payload.summary, "Printer down");
    assert_eq!(payload.company.id, 500);
    assert_eq!(payload.board.id, 7);
    assert_eq!(payload.status.id, 1);
    assert_eq!(payload.contact.id, contact_id);
    assert_eq!(payload.owner.map(|o| o.id), Some(900));
    assert_eq!(payload.custom_fields.len(), 1);
    assert_eq!(payload.custom_fields[0].id, TICKET_FIELD);
    assert_eq!(payload.custom_fields[0].value, Some(serde_json::json!(42)));
    let dest_id = *dest_id;
    drop(tickets);

    // Two notes, in comment order; the private one is also internal.
    let notes = cw.notes.lock();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].0, dest_id);
    assert!(notes[0].1.text.contains("Help"));
    assert!(notes[0].1.text.contains("**Sent By:** Dana Ortiz (dana@acme.test)"));
    assert!(notes[0].1.detail_description_flag);
    assert!(!notes[0].1.internal_analysis_flag);
    assert!(notes[1].1.text.contains("escalate"));
    assert!(notes[1].1.internal_analysis_flag);
    drop(notes);

    // Open ticket: no status update.
    assert!(cw.status_updates.lock().is_empty());

    assert_eq!(stats.new_tickets_created, 1);
    assert_eq!(stats.tickets_processed, 1);
    assert_eq!(stats.contacts_created, 1);
    assert_eq!(stats.ticket_migration_errors, 0);
    assert_eq!(m.state().ticket_migrated(42), Some(dest_id));
    assert_eq!(cw.created_ticket_ids(), vec![dest_id]);
}

/// Scenario 2: a second run over already-migrated data creates and stamps
/// nothing.
#[tokio::test]
async fn rerun_is_idempotent() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());

    let mut acme = org(100, "Acme");
    acme.organization_fields
        .insert("psa_company".to_string(), serde_json::json!(500));
    zd.add_org(TAG, acme);

    let mut dana = user(7, "Dana Ortiz", "dana@acme.test");
    dana.user_fields
        .insert("psa_contact".to_string(), serde_json::json!(600));
    zd.add_user(100, dana);

    zd.add_ticket(100, ticket(42, "Printer down", "open", 7));
    cw.add_company(500, "Acme");
    cw.add_contact(600, "Dana", "Ortiz", 500, "dana@acme.test");
    cw.add_indexed_ticket(9100, 500, TICKET_FIELD, 42);

    let mut m = migrator(test_config(), zd.clone(), cw.clone());
    let stats = full_run(&mut m).await;

    assert!(zd.org_field_writes.lock().is_empty(), "org already stamped");
    assert!(zd.user_field_writes.lock().is_empty(), "user already stamped");
    assert!(cw.created_contacts.lock().is_empty());
    assert!(cw.created_tickets.lock().is_empty());
    assert!(cw.notes.lock().is_empty());

    assert_eq!(stats.new_tickets_created, 0);
    assert_eq!(stats.tickets_processed, 1);
    assert_eq!(stats.ticket_migration_errors, 0);
    assert_eq!(stats.user_migration_errors, 0);
    assert_eq!(m.state().ticket_migrated(42), Some(9100));

    let record = m.state().orgs.get(&100).unwrap().value().clone();
    assert_eq!(record.tickets_already_in_destination, 1);
}

/// Scenario 3: a solved ticket carries the closed-date custom field in the
/// run time zone and is closed in the destination exactly once.
#[tokio::test]
async fn closed_ticket_gets_closed_date_and_status() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(43, "Broken again", "solved", 7));
    cw.add_company(500, "Acme");

    let mut cfg = test_config();
    cfg.time_zone = "America/New_York".to_string();
    let mut m = migrator(cfg, zd, cw.clone());
    full_run(&mut m).await;

    let tickets = cw.created_tickets.lock();
    assert_eq!(tickets.len(), 1);
    let (dest_id, payload) = &tickets[0];
    let closed = payload
        .custom_fields
        .iter()
        .find(|f| f.id == CLOSED_DATE_FIELD)
        .expect("closed tickets carry the closed-date field");
    assert_eq!(
        closed.value,
        Some(serde_json::json!("2024-06-01T06:00:00-04:00"))
    );

    let updates = cw.status_updates.lock();
    assert_eq!(*updates, vec![(*dest_id, 2)]);
}

/// Scenario 4: a requester outside the selected orgs fails the ticket with a
/// WARN, not an error-level stop.
#[tokio::test]
async fn unknown_requester_warns_and_counts() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_ticket(100, ticket(44, "Orphan", "open", 999));
    cw.add_company(500, "Acme");

    let mut m = migrator(test_config(), zd, cw.clone());
    let stats = full_run(&mut m).await;

    assert!(cw.created_tickets.lock().is_empty());
    assert_eq!(stats.ticket_migration_errors, 1);
    assert_eq!(stats.tickets_processed, 1);

    let warned = m.state().output_lines().iter().any(|line| {
        line.level == LogLevel::Warn && line.message.contains("999")
    });
    assert!(warned, "expected a WARN naming the requester");
}

/// Scenario 5: an org with no destination company never reaches selection.
#[tokio::test]
async fn absent_org_is_terminal_and_unselectable() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_org(TAG, org(200, "Ghost"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(42, "Printer down", "open", 7));
    zd.add_ticket(200, ticket(60, "Haunting", "open", 7));
    cw.add_company(500, "Acme");

    let mut m = migrator(test_config(), zd.clone(), cw.clone());
    let ready = m.run_readiness().await.unwrap();

    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].org_id, 100);
    let ghost = m.state().orgs.get(&200).unwrap().value().clone();
    assert_eq!(ghost.status, OrgStatus::AbsentInDestination);
    assert_eq!(m.state().stats.snapshot().orgs_not_in_psa, 1);

    m.select_orgs(&[100, 200]);
    assert_eq!(m.state().selected_org_ids(), vec![100], "ghost not selectable");

    m.run_user_migration().await.unwrap();
    m.run_ticket_migration().await.unwrap();
    let migrated: Vec<i64> = cw
        .created_tickets
        .lock()
        .iter()
        .map(|(_, p)| p.company.id)
        .collect();
    assert_eq!(migrated, vec![500], "only the matched org's tickets migrate");
}

/// Scenario 6: an oversized subject is truncated, with the original kept in
/// the initial internal analysis.
#[tokio::test]
async fn oversized_subject_is_truncated_with_notice() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    let subject = "s".repeat(150);
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(45, &subject, "open", 7));
    cw.add_company(500, "Acme");

    let mut m = migrator(test_config(), zd, cw.clone());
    full_run(&mut m).await;

    let tickets = cw.created_tickets.lock();
    let (_, payload) = &tickets[0];
    assert_eq!(payload.summary.chars().count(), 100);
    let analysis = payload
        .initial_internal_analysis
        .as_ref()
        .expect("truncation keeps the original subject");
    assert!(analysis.starts_with(crate::format::TRUNCATED_SUBJECT_NOTICE));
    assert!(analysis.contains(&subject));
}

/// No-tickets orgs go terminal without company lookups; windows filter.
#[tokio::test]
async fn org_outside_window_is_no_tickets() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_ticket(100, ticket(42, "Old news", "open", 7));
    cw.add_company(500, "Acme");

    let mut cfg = test_config();
    // Ticket created 2024-05-15; window starts after it.
    cfg.zendesk.master_start_date = "2024-06-01".to_string();
    let mut m = migrator(cfg, zd, cw);
    let ready = m.run_readiness().await.unwrap();

    assert!(ready.is_empty());
    let record = m.state().orgs.get(&100).unwrap().value().clone();
    assert_eq!(record.status, OrgStatus::NoTickets);
    assert!(!record.has_tickets);
}

/// The ticket limit short-circuits workers once the processed counter
/// reaches it (approximate by design).
#[tokio::test]
async fn ticket_limit_short_circuits_after_skips() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(42, "Migrated before", "open", 7));
    zd.add_ticket(100, ticket(46, "Should not migrate", "open", 7));
    cw.add_company(500, "Acme");
    // Ticket 42 is already in the destination, so the skip pass alone
    // reaches the limit before any worker runs.
    cw.add_indexed_ticket(9100, 500, TICKET_FIELD, 42);

    let mut cfg = test_config();
    cfg.ticket_limit = 1;
    let mut m = migrator(cfg, zd, cw.clone());
    let stats = full_run(&mut m).await;

    assert!(cw.created_ticket_ids().is_empty());
    assert_eq!(stats.tickets_processed, 1);
    assert_eq!(stats.new_tickets_created, 0);
    // The short-circuited worker still counts toward the org's own total:
    // one skip plus one limit hit.
    let record = m.state().orgs.get(&100).unwrap().value().clone();
    assert_eq!(record.tickets_processed, 2);
}

/// A failed index prefetch is fatal: the run jumps to Done with a Fatal
/// event and nothing is migrated.
#[tokio::test]
async fn prefetch_failure_is_fatal() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(42, "Printer down", "open", 7));
    cw.add_company(500, "Acme");
    cw.fail_ticket_query
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let (events, mut rx) = event_channel();
    let mut m = Migrator::new(
        test_config(),
        zd,
        cw.clone(),
        events,
        CancellationToken::new(),
    )
    .unwrap();

    let ready = m.run_readiness().await.unwrap();
    let ids: Vec<i64> = ready.iter().map(|r| r.org_id).collect();
    m.select_orgs(&ids);
    m.run_user_migration().await.unwrap();

    let err = m.run_ticket_migration().await.unwrap_err();
    assert!(matches!(err, MigrationError::IndexPrefetchFailed { .. }));
    assert_eq!(m.phase(), RunPhase::Done);
    assert!(cw.created_tickets.lock().is_empty());

    let mut saw_fatal = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, MigrationEvent::Fatal(_)) {
            saw_fatal = true;
        }
    }
    assert!(saw_fatal, "expected a Fatal event");
}

/// Phases must be driven in order.
#[tokio::test]
async fn phases_out_of_order_are_rejected() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    let mut m = migrator(test_config(), zd, cw);

    let err = m.run_ticket_migration().await.unwrap_err();
    assert!(matches!(err, MigrationError::PhaseOrder { .. }));
    assert_eq!(m.phase(), RunPhase::AwaitingStart);
}

/// Cancellation before a phase starts surfaces as `Cancelled`.
#[tokio::test]
async fn cancelled_token_stops_the_run() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    let (events, _rx) = event_channel();
    let cancel = CancellationToken::new();
    let mut m = Migrator::new(test_config(), zd, cw, events, cancel.clone()).unwrap();

    cancel.cancel();
    let err = m.run_readiness().await.unwrap_err();
    assert!(err.is_cancelled());
}

/// Comment authors resolve through the agent map first: agent comments post
/// as the member with no Sent By line.
#[tokio::test]
async fn agent_comments_post_as_member() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(42, "Printer down", "open", 7));
    zd.add_comment(42, comment(1, 9, "On it", true));
    cw.add_company(500, "Acme");

    let mut m = migrator(test_config(), zd, cw.clone());
    full_run(&mut m).await;

    let notes = cw.notes.lock();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].1.member.map(|r| r.id), Some(900));
    assert!(!notes[0].1.text.contains("Sent By"));
}

/// Unknown comment authors fall back to the external-user fetch, then to
/// the Unknown label; the note still posts.
#[tokio::test]
async fn external_and_unknown_authors_still_post() {
    let zd = Arc::new(MockZendesk::new());
    let cw = Arc::new(MockConnectWise::new());
    zd.add_org(TAG, org(100, "Acme"));
    zd.add_user(100, user(7, "Dana Ortiz", "dana@acme.test"));
    zd.add_ticket(100, ticket(42, "Printer down", "open", 7));
    // Author 55 exists in the source but not in any selected org.
    zd.users_by_id.lock().insert(
        55,
        User {
            id: 55,
            name: "Outside Org".to_string(),
            email: Some("out@other.test".to_string()),
            ..Default::default()
        },
    );
    zd.add_comment(42, comment(1, 55, "external voice", true));
    zd.add_comment(42, comment(2, 404, "ghost voice", true));
    cw.add_company(500, "Acme");

    let mut m = migrator(test_config(), zd, cw.clone());
    full_run(&mut m).await;

    let notes = cw.notes.lock();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].1.text.contains("**Sent By:** Outside Org (out@other.test)"));
    assert!(notes[1].1.text.contains("**Sent By:** Unknown (no email)"));
    drop(notes);

    // The external author is cached for later comments.
    assert!(m.state().external_users.contains_key(&55));
}
