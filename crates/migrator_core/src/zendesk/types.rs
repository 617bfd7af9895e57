//! Wire types for the Zendesk REST API, trimmed to the fields the migration
//! reads. Unknown fields are ignored on deserialize.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Custom org fields, keyed by field key (e.g. `psa_company`).
    #[serde(default)]
    pub organization_fields: HashMap<String, serde_json::Value>,
}

impl Organization {
    /// The stamped destination company id, if present and numeric.
    pub fn psa_company_stamp(&self) -> Option<i64> {
        field_as_i64(self.organization_fields.get("psa_company"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization_id: Option<i64>,
    /// Custom user fields, keyed by field key (e.g. `psa_contact`).
    #[serde(default)]
    pub user_fields: HashMap<String, serde_json::Value>,
}

impl User {
    /// The stamped destination contact id, if present and numeric.
    pub fn psa_contact_stamp(&self) -> Option<i64> {
        field_as_i64(self.user_fields.get("psa_contact"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub requester_id: i64,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub organization_id: Option<i64>,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Ticket {
    /// Closed and solved tickets are migrated as closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.status.as_str(), "closed" | "solved")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    #[serde(default)]
    pub author_id: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub via: Via,
}

impl Comment {
    pub fn email_ccs(&self) -> &[CommentCc] {
        &self.via.source.to.email_ccs
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Via {
    #[serde(default)]
    pub source: ViaSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViaSource {
    #[serde(default)]
    pub to: ViaTo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViaTo {
    #[serde(default)]
    pub email_ccs: Vec<CommentCc>,
}

/// A comment CC as Zendesk serializes it: sometimes a literal email string,
/// sometimes a user id as an integer, sometimes that same id float-encoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommentCc {
    Literal(String),
    Id(i64),
}

impl<'de> Deserialize<'de> for CommentCc {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(CommentCc::Literal(s)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CommentCc::Id(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(CommentCc::Id(f as i64))
                } else {
                    Err(serde::de::Error::custom("email_cc number out of range"))
                }
            }
            other => Err(serde::de::Error::custom(format!(
                "email_cc must be string or number, got {other}"
            ))),
        }
    }
}

fn field_as_i64(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
