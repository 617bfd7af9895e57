//! Migrator Core - Zendesk to ConnectWise PSA migration engine
//!
//! This crate provides the org-readiness state machine, the user and ticket
//! migration engines, and the orchestrator that drives a one-way, idempotent
//! batch migration from a tag-scoped Zendesk instance into a ConnectWise PSA
//! board. Frontends consume the engine through [`engine::Migrator`] and the
//! [`events::MigrationEvent`] stream.

pub mod config;
pub mod connectwise;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod state;
pub mod zendesk;

#[cfg(test)]
pub mod test_helpers;

pub use config::{Config, LoadOutcome, TagWindow};
pub use engine::{Migrator, ReadyOrg, TICKET_WORKER_CAP};
pub use error::{ConfigError, ConnectWiseError, MigrationError, Result, ZendeskError};
pub use events::{event_channel, EventSender, LogLevel, MigrationEvent, RunPhase};
pub use state::{MigrationState, OrgStatus, StatsSnapshot};

/// reqwest client with the defaults both adapters share.
pub fn migrator_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("zd-cw-migrator/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap() // panics for the same reasons Client::new() would
}
