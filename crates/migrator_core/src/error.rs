//! Error types for the migration engine.
//!
//! Adapter errors stay typed (`ZendeskError`, `ConnectWiseError`) so the
//! engines can tell an expected lookup miss from a transport failure; the
//! top-level `MigrationError` is what phase drivers and the CLI see.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-specific errors
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("JSON serialize error: {0}")]
    JsonSerialize(String),
}

/// Errors from the Zendesk (source) adapter.
#[derive(Error, Diagnostic, Debug)]
pub enum ZendeskError {
    #[error("Zendesk {resource} {id} not found")]
    #[diagnostic(
        code(migrator_core::zendesk_not_found),
        help("The referenced {resource} does not exist (or is not visible to this token)")
    )]
    NotFound { resource: &'static str, id: i64 },

    #[error("Zendesk API error: HTTP {status} on {endpoint}")]
    #[diagnostic(
        code(migrator_core::zendesk_api_error),
        help("Check API credentials, subdomain, and rate limits")
    )]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Zendesk request failed: {endpoint}")]
    #[diagnostic(
        code(migrator_core::zendesk_transport),
        help("Check network connectivity and the configured subdomain")
    )]
    Transport {
        endpoint: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("Zendesk response for {endpoint} could not be decoded")]
    #[diagnostic(code(migrator_core::zendesk_decode))]
    Decode {
        endpoint: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("request cancelled")]
    #[diagnostic(code(migrator_core::cancelled))]
    Cancelled,
}

/// Errors from the ConnectWise PSA (destination) adapter.
#[derive(Error, Diagnostic, Debug)]
pub enum ConnectWiseError {
    #[error("no ConnectWise contact with email {email}")]
    #[diagnostic(
        code(migrator_core::cw_no_user_found),
        help("The contact will be created by the user migration engine")
    )]
    NoUserFound { email: String },

    #[error("company search for {name:?}: expected 1, got {count}")]
    #[diagnostic(
        code(migrator_core::cw_company_mismatch),
        help("Company names must match exactly one ConnectWise company")
    )]
    UnexpectedCompanyCount { name: String, count: usize },

    #[error("ConnectWise API error: HTTP {status} on {endpoint}")]
    #[diagnostic(
        code(migrator_core::cw_api_error),
        help("Check companyId/publicKey/privateKey/clientId and board/status ids")
    )]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("ConnectWise request failed: {endpoint}")]
    #[diagnostic(code(migrator_core::cw_transport))]
    Transport {
        endpoint: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("ConnectWise response for {endpoint} could not be decoded")]
    #[diagnostic(code(migrator_core::cw_decode))]
    Decode {
        endpoint: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("request cancelled")]
    #[diagnostic(code(migrator_core::cancelled))]
    Cancelled,
}

/// Top-level engine error.
#[derive(Error, Diagnostic, Debug)]
pub enum MigrationError {
    #[error("configuration error for field '{field}'")]
    #[diagnostic(
        code(migrator_core::configuration_error),
        help("Check the config file at {config_path}\nExpected: {expected}")
    )]
    Configuration {
        config_path: String,
        field: String,
        expected: String,
        #[source]
        cause: ConfigError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Zendesk(#[from] ZendeskError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ConnectWise(#[from] ConnectWiseError),

    #[error("ticket {source_ticket_id}: requester {requester_id} has no destination contact")]
    #[diagnostic(
        code(migrator_core::requester_unknown),
        help("The requester's org was not selected for migration, or user migration skipped them")
    )]
    RequesterUnknown {
        source_ticket_id: i64,
        requester_id: i64,
    },

    #[error("invalid phase transition: {from} -> {to}")]
    #[diagnostic(
        code(migrator_core::phase_order),
        help("Phases must be driven in order; this is a bug in the caller")
    )]
    PhaseOrder { from: String, to: String },

    #[error("destination ticket index prefetch failed")]
    #[diagnostic(
        code(migrator_core::index_prefetch_failed),
        help("Without the index the run cannot guarantee idempotence; nothing was migrated")
    )]
    IndexPrefetchFailed {
        #[source]
        cause: ConnectWiseError,
    },

    #[error("unknown time zone: {name}")]
    #[diagnostic(
        code(migrator_core::bad_time_zone),
        help("time_zone must be an IANA zone name such as \"America/New_York\"")
    )]
    BadTimeZone { name: String },

    #[error("run cancelled")]
    #[diagnostic(code(migrator_core::cancelled))]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            MigrationError::Cancelled
                | MigrationError::Zendesk(ZendeskError::Cancelled)
                | MigrationError::ConnectWise(ConnectWiseError::Cancelled)
        )
    }
}
