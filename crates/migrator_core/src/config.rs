//! Configuration for a migration run.
//!
//! The config lives as JSON at `$HOME/migrator_config.json`. On first run an
//! empty scaffold is written so the operator has every key in front of them;
//! the CLI prompts for anything still blank before a run starts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, MigrationError, Result};

pub const CONFIG_FILE_NAME: &str = "migrator_config.json";

/// Directory holding run artifacts (rotating log file).
pub const WORK_DIR_NAME: &str = "ticket-migration";

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Zendesk API credentials. Auth is basic with `{username}/token : {token}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZendeskCreds {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub subdomain: String,
}

impl ZendeskCreds {
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.username.is_empty() && !self.subdomain.is_empty()
    }
}

/// A tag to migrate plus its optional date window. Blank bounds inherit the
/// master window; a bound that fails to parse is treated as blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagConfig {
    pub name: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

/// Source-side custom field ids that carry destination stamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZendeskFieldIds {
    #[serde(default)]
    pub psa_company_id: i64,
    #[serde(default)]
    pub psa_contact_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZendeskConfig {
    #[serde(default)]
    pub api_creds: ZendeskCreds,
    #[serde(default)]
    pub tags_to_migrate: Vec<TagConfig>,
    #[serde(default)]
    pub master_start_date: String,
    #[serde(default)]
    pub master_end_date: String,
    #[serde(default)]
    pub field_ids: ZendeskFieldIds,
}

/// ConnectWise API credentials. Auth is basic with
/// `{company_id}+{public_key} : {private_key}` plus a `clientId` header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectWiseCreds {
    #[serde(default)]
    pub company_id: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_id: String,
}

impl ConnectWiseCreds {
    pub fn is_complete(&self) -> bool {
        !self.company_id.is_empty()
            && !self.public_key.is_empty()
            && !self.private_key.is_empty()
            && !self.client_id.is_empty()
    }
}

/// Destination-side custom field ids that carry source stamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectWiseFieldIds {
    #[serde(default)]
    pub zendesk_ticket_id: i64,
    #[serde(default)]
    pub zendesk_closed_date: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectWiseConfig {
    #[serde(default)]
    pub api_creds: ConnectWiseCreds,
    #[serde(default)]
    pub destination_board_id: i64,
    #[serde(default)]
    pub open_status_id: i64,
    #[serde(default)]
    pub closed_status_id: i64,
    #[serde(default)]
    pub field_ids: ConnectWiseFieldIds,
}

/// Maps a Zendesk agent to the ConnectWise member who should own their
/// tickets and notes. Keyed in the config by the stringified source user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMapping {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub source_id: i64,
    #[serde(default)]
    pub destination_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub zendesk: ZendeskConfig,
    #[serde(default)]
    pub connectwise_psa: ConnectWiseConfig,
    #[serde(default)]
    pub agent_mappings: HashMap<String, AgentMapping>,
    #[serde(default)]
    pub migrate_open_tickets: bool,
    /// Approximate cap on tickets processed this run. Workers check the
    /// global counter before creating, so in-flight workers can overshoot by
    /// up to the ticket-worker concurrency cap. 0 means unlimited.
    #[serde(default)]
    pub ticket_limit: u64,
    /// Stop after org readiness + selection display, migrating nothing.
    #[serde(default)]
    pub stop_after_orgs: bool,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zendesk: ZendeskConfig::default(),
            connectwise_psa: ConnectWiseConfig::default(),
            agent_mappings: HashMap::new(),
            migrate_open_tickets: false,
            ticket_limit: 0,
            stop_after_orgs: false,
            time_zone: default_time_zone(),
        }
    }
}

/// Result of trying to load the config file.
pub enum LoadOutcome {
    Loaded(Box<Config>),
    /// File did not exist; an empty scaffold was written at this path.
    Scaffolded(PathBuf),
}

/// A resolved per-tag migration window. Either side may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagWindow {
    pub tag: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Config {
    /// `$HOME/migrator_config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    /// `$HOME/ticket-migration/`, where the rotating log lands.
    pub fn work_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(WORK_DIR_NAME)
    }

    /// Load the config, writing an empty scaffold if the file is absent.
    pub fn load_or_scaffold(path: &Path) -> Result<LoadOutcome> {
        if !path.exists() {
            let scaffold = Config::default();
            scaffold.save(path)?;
            return Ok(LoadOutcome::Scaffolded(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| config_err(path, "file", e))?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| MigrationError::Configuration {
            config_path: path.display().to_string(),
            field: "document".to_string(),
            expected: "valid JSON matching the config schema".to_string(),
            cause: ConfigError::JsonParse(e.to_string()),
        })?;
        Ok(LoadOutcome::Loaded(Box::new(config)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).map_err(|e| MigrationError::Configuration {
            config_path: path.display().to_string(),
            field: "document".to_string(),
            expected: "serializable config".to_string(),
            cause: ConfigError::JsonSerialize(e.to_string()),
        })?;
        std::fs::write(path, raw).map_err(|e| config_err(path, "file", e))?;
        Ok(())
    }

    /// Fields a run cannot proceed without. Returns the missing field paths.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let zd = &self.zendesk;
        if zd.api_creds.subdomain.is_empty() {
            missing.push("zendesk.api_creds.subdomain");
        }
        if zd.api_creds.username.is_empty() {
            missing.push("zendesk.api_creds.username");
        }
        if zd.api_creds.token.is_empty() {
            missing.push("zendesk.api_creds.token");
        }
        if zd.tags_to_migrate.is_empty() {
            missing.push("zendesk.tags_to_migrate");
        }
        let cw = &self.connectwise_psa;
        if cw.api_creds.company_id.is_empty() {
            missing.push("connectwise_psa.api_creds.company_id");
        }
        if cw.api_creds.public_key.is_empty() {
            missing.push("connectwise_psa.api_creds.public_key");
        }
        if cw.api_creds.private_key.is_empty() {
            missing.push("connectwise_psa.api_creds.private_key");
        }
        if cw.api_creds.client_id.is_empty() {
            missing.push("connectwise_psa.api_creds.client_id");
        }
        if cw.destination_board_id == 0 {
            missing.push("connectwise_psa.destination_board_id");
        }
        if cw.open_status_id == 0 {
            missing.push("connectwise_psa.open_status_id");
        }
        if cw.closed_status_id == 0 {
            missing.push("connectwise_psa.closed_status_id");
        }
        if cw.field_ids.zendesk_ticket_id == 0 {
            missing.push("connectwise_psa.field_ids.zendesk_ticket_id");
        }
        if cw.field_ids.zendesk_closed_date == 0 {
            missing.push("connectwise_psa.field_ids.zendesk_closed_date");
        }
        missing
    }

    /// The configured IANA zone, parsed.
    pub fn time_zone(&self) -> Result<Tz> {
        Tz::from_str(&self.time_zone).map_err(|_| MigrationError::BadTimeZone {
            name: self.time_zone.clone(),
        })
    }

    /// Resolve a tag's window: each bound is validated independently, and a
    /// blank or unparseable bound inherits the master bound for that side.
    pub fn window_for_tag(&self, tag: &TagConfig) -> TagWindow {
        let start = parse_bound(&tag.name, "start_date", &tag.start_date)
            .or_else(|| parse_bound("master", "master_start_date", &self.zendesk.master_start_date));
        let end = parse_bound(&tag.name, "end_date", &tag.end_date)
            .or_else(|| parse_bound("master", "master_end_date", &self.zendesk.master_end_date));
        TagWindow {
            tag: tag.name.clone(),
            start,
            end,
        }
    }

    /// Agent mapping lookup by source user id.
    pub fn agent_for(&self, source_user_id: i64) -> Option<&AgentMapping> {
        self.agent_mappings.get(&source_user_id.to_string())
    }
}

fn parse_bound(scope: &str, field: &str, raw: &str) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            warn!(tag = scope, field, value = raw, "unparseable date bound, treating as open");
            None
        }
    }
}

fn config_err(path: &Path, field: &str, cause: std::io::Error) -> MigrationError {
    MigrationError::Configuration {
        config_path: path.display().to_string(),
        field: field.to_string(),
        expected: "readable/writable config file".to_string(),
        cause: ConfigError::Io(cause.to_string()),
    }
}
