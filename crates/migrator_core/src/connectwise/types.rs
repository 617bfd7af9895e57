//! Wire types for the ConnectWise PSA REST API (camelCase on the wire).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: String,
}

/// `{ "id": N }` reference used inside ticket/contact payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub id: i64,
}

impl Ref {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: Option<Ref>,
    #[serde(default)]
    pub communication_items: Vec<CommunicationItem>,
}

impl Contact {
    /// First Email communication item, if any.
    pub fn email(&self) -> Option<&str> {
        self.communication_items
            .iter()
            .find(|item| item.item_type.name.eq_ignore_ascii_case("Email"))
            .map(|item| item.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationItem {
    #[serde(rename = "type")]
    pub item_type: CommunicationType,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub default_flag: bool,
}

impl CommunicationItem {
    pub fn email(value: impl Into<String>) -> Self {
        Self {
            item_type: CommunicationType {
                name: "Email".to_string(),
            },
            value: value.into(),
            default_flag: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicationType {
    #[serde(default)]
    pub name: String,
}

/// Contact creation payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub company: Ref,
    pub communication_items: Vec<CommunicationItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldValue {
    pub id: i64,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwTicket {
    pub id: i64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub company: Option<Ref>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

impl CwTicket {
    /// Numeric value of a custom field, tolerating string encoding.
    pub fn custom_field_i64(&self, field_id: i64) -> Option<i64> {
        let value = self
            .custom_fields
            .iter()
            .find(|f| f.id == field_id)?
            .value
            .as_ref()?;
        match value {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Ticket creation payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub summary: String,
    pub company: Ref,
    pub board: Ref,
    pub status: Ref,
    pub contact: Ref,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Ref>,
    /// Set only when the source subject was truncated; carries the original.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_internal_analysis: Option<String>,
    pub custom_fields: Vec<CustomFieldValue>,
}

/// Service note payload. A private source comment sets both flags (preserved
/// behavior of the tool this replaces).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub text: String,
    pub detail_description_flag: bool,
    pub internal_analysis_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Ref>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStatus {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}
