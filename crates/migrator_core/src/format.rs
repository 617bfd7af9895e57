//! Text assembly for destination tickets and notes.
//!
//! The note body layout is a compatibility contract with tickets migrated by
//! earlier runs; do not reorder lines or change the markers.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Destination summary field cap.
pub const SUMMARY_MAX_CHARS: usize = 100;

pub const NO_SUBJECT: &str = "No Subject";

/// Prefix for the internal-analysis note carrying an over-long subject.
pub const TRUNCATED_SUBJECT_NOTICE: &str =
    "Subject was truncated to fit the PSA summary field. Original subject:\n";

/// Sender label fallbacks when an author cannot be identified.
pub const UNKNOWN_NAME: &str = "Unknown";
pub const NO_EMAIL: &str = "no email";

/// Build the destination summary from a source subject. Returns the summary
/// and, when the subject was truncated, the full-subject internal-analysis
/// text.
pub fn summarize_subject(subject: &str) -> (String, Option<String>) {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return (NO_SUBJECT.to_string(), None);
    }
    let mut chars = trimmed.chars();
    let summary: String = chars.by_ref().take(SUMMARY_MAX_CHARS).collect();
    if chars.next().is_some() {
        let analysis = format!("{TRUNCATED_SUBJECT_NOTICE}{trimmed}");
        (summary, Some(analysis))
    } else {
        (summary, None)
    }
}

/// Note timestamp in the run time zone, e.g. `Sat 6/1/2024 6:00AM`.
pub fn note_timestamp(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%a %-m/%-d/%Y %-I:%M%p").to_string()
}

/// Closed-date custom field value in the run time zone, RFC 3339.
pub fn closed_date_value(updated_at: DateTime<Utc>, tz: Tz) -> String {
    at_tz_rfc3339(updated_at, tz)
}

fn at_tz_rfc3339(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Identity line for comment authors who are not mapped agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBy {
    pub name: String,
    pub email: String,
}

impl SentBy {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            email: NO_EMAIL.to_string(),
        }
    }
}

/// Assemble a note body. Order-preserving and exact:
/// optional `**Sent By:** name (email)` line, the bold timestamp line, an
/// optional `**CCs:**` line, a blank line, then the comment body.
pub fn note_body(
    sent_by: Option<&SentBy>,
    created_at: DateTime<Utc>,
    tz: Tz,
    ccs: &[String],
    body: &str,
) -> String {
    let mut text = String::new();
    if let Some(sender) = sent_by {
        text.push_str(&format!("**Sent By:** {} ({})\n", sender.name, sender.email));
    }
    text.push_str(&format!("**{}**\n", note_timestamp(created_at, tz)));
    if !ccs.is_empty() {
        text.push_str(&format!("**CCs:** {}\n", ccs.join(", ")));
    }
    text.push('\n');
    text.push_str(body);
    text
}
