//! Data models for Grievance Insights.
//!
//! Complaint records are owned by the remote backend and arrive as camelCase
//! JSON. They are immutable once fetched; everything derived from them lives
//! in [`crate::aggregation`].
//!
//! Status spelling is normalised exactly once, in [`ComplaintStatus::parse`].
//! The backend has historically emitted both `"InProgress"` and `"In Progress"`,
//! and every consumer sees the same classification.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle status of a complaint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ComplaintStatus {
    /// Submitted, not yet picked up. Also the value of a missing status.
    #[default]
    Pending,

    /// Being worked on.
    InProgress,

    /// Closed with a resolution.
    Resolved,

    /// Sent back to the submitter.
    Returned,

    /// Any status string the dashboard does not know about, kept verbatim.
    Unrecognized(String),
}

impl ComplaintStatus {
    /// Classify a raw status string.
    ///
    /// All whitespace is stripped before an exact, case-sensitive comparison,
    /// so `"In Progress"` and `"InProgress"` are the same status. A blank
    /// string is treated like a missing status.
    pub fn parse(raw: &str) -> Self {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "" | "Pending" => ComplaintStatus::Pending,
            "InProgress" => ComplaintStatus::InProgress,
            "Resolved" => ComplaintStatus::Resolved,
            "Returned" => ComplaintStatus::Returned,
            _ => ComplaintStatus::Unrecognized(raw.to_string()),
        }
    }

    /// Human-readable label used in charts.
    pub fn label(&self) -> &str {
        match self {
            ComplaintStatus::Pending => "Pending",
            ComplaintStatus::InProgress => "In Progress",
            ComplaintStatus::Resolved => "Resolved",
            ComplaintStatus::Returned => "Returned",
            ComplaintStatus::Unrecognized(raw) => raw,
        }
    }

    /// Spelling used on the wire by the backend.
    pub fn wire_name(&self) -> &str {
        match self {
            ComplaintStatus::Pending => "Pending",
            ComplaintStatus::InProgress => "InProgress",
            ComplaintStatus::Resolved => "Resolved",
            ComplaintStatus::Returned => "Returned",
            ComplaintStatus::Unrecognized(raw) => raw,
        }
    }
}

impl Serialize for ComplaintStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_name())
    }
}

impl<'de> Deserialize<'de> for ComplaintStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| ComplaintStatus::parse(&s)).unwrap_or_default())
    }
}

/// One complaint as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRecord {
    /// Backend identifier.
    #[serde(default)]
    pub id: i64,

    /// Current status.
    #[serde(default)]
    pub status: ComplaintStatus,

    /// When the complaint was submitted.
    ///
    /// `None` when the backend omitted the field or sent something that is not
    /// a timestamp. Such records still count towards status totals but are left
    /// out of the time-bucketed views.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,

    /// Owning department, if the backend supplied one.
    #[serde(default)]
    pub department_name: Option<String>,

    /// Name of the employee who filed the complaint.
    #[serde(default)]
    pub employee_name: Option<String>,
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 (`2024-03-05T10:00:00Z`, with or without offset) as well as
/// the naive ISO form the backend emits for UTC values (`2024-03-05T10:00:00.123`).
/// A bare date is taken as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Role of the signed-in user, as issued by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
    Admin,
}

impl Role {
    /// Parse a role name. Anything other than `Manager` or `Admin` is a plain employee.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Admin" => Role::Admin,
            "Manager" => Role::Manager,
            _ => Role::Employee,
        }
    }
}

/// The authenticated identity of a caller.
///
/// Built once per request from what the identity gateway forwards and passed
/// explicitly to whatever needs it. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    /// Department managed by the user (managers only).
    pub dept_id: Option<i64>,
    /// Bearer token forwarded to the complaint backend.
    pub token: String,
}

impl Session {
    /// Managers and admins may see the reports page.
    pub fn can_view_reports(&self) -> bool {
        matches!(self.role, Role::Manager | Role::Admin)
    }
}

/// A live notification shown as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Strictly increasing, derived from the receive time in milliseconds.
    pub id: u64,

    /// Message text pushed by the hub.
    pub message: String,

    /// When the notification arrived.
    pub received_at: DateTime<Utc>,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Role name understood by the generative-language API.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        }
    }
}

/// One entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Request body for POST /chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Text typed by the user.
    pub message: String,
}

/// Response for POST /chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReplyResponse {
    /// The assistant's answer (or a fallback message).
    pub reply: ChatMessage,

    /// Whole transcript including the new exchange.
    pub transcript: Vec<ChatMessage>,
}

/// Response for GET /chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTranscriptResponse {
    pub transcript: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_status_parse_canonical() {
        assert_eq!(ComplaintStatus::parse("Pending"), ComplaintStatus::Pending);
        assert_eq!(ComplaintStatus::parse("Resolved"), ComplaintStatus::Resolved);
        assert_eq!(ComplaintStatus::parse("Returned"), ComplaintStatus::Returned);
        assert_eq!(
            ComplaintStatus::parse("InProgress"),
            ComplaintStatus::InProgress
        );
    }

    #[test]
    fn test_status_parse_spelling_variants() {
        assert_eq!(
            ComplaintStatus::parse("In Progress"),
            ComplaintStatus::InProgress
        );
        assert_eq!(
            ComplaintStatus::parse(" In  Progress "),
            ComplaintStatus::InProgress
        );
        assert_eq!(ComplaintStatus::parse(""), ComplaintStatus::Pending);
    }

    #[test]
    fn test_status_parse_is_case_sensitive() {
        assert_eq!(
            ComplaintStatus::parse("resolved"),
            ComplaintStatus::Unrecognized("resolved".to_string())
        );
        assert_eq!(ComplaintStatus::parse("Escalated").label(), "Escalated");
    }

    #[test]
    fn test_record_deserialize_full() {
        let record: ComplaintRecord = serde_json::from_str(
            r#"{
                "id": 7,
                "status": "In Progress",
                "createdAt": "2024-03-05T10:15:00Z",
                "departmentName": "Finance",
                "employeeName": "Asha",
                "title": "ignored"
            }"#,
        )
        .unwrap();

        assert_eq!(record.id, 7);
        assert_eq!(record.status, ComplaintStatus::InProgress);
        assert_eq!(record.department_name.as_deref(), Some("Finance"));
        assert_eq!(record.employee_name.as_deref(), Some("Asha"));
        let created = record.created_at.unwrap();
        assert_eq!((created.year(), created.month(), created.day()), (2024, 3, 5));
    }

    #[test]
    fn test_record_deserialize_missing_fields() {
        let record: ComplaintRecord =
            serde_json::from_str(r#"{"id": 1, "status": null, "createdAt": "not a date"}"#)
                .unwrap();

        assert_eq!(record.status, ComplaintStatus::Pending);
        assert!(record.created_at.is_none());
        assert!(record.department_name.is_none());
        assert!(record.employee_name.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let naive = parse_timestamp("2024-01-15T10:30:00.1234567").unwrap();
        assert_eq!(naive.hour(), 10);
        assert_eq!(naive.minute(), 30);

        let offset = parse_timestamp("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(offset.hour(), 8);

        let date_only = parse_timestamp("2024-01-15").unwrap();
        assert_eq!(date_only.hour(), 0);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse("Manager"), Role::Manager);
        assert_eq!(Role::parse("Employee"), Role::Employee);
        assert_eq!(Role::parse("Auditor"), Role::Employee);
    }

    #[test]
    fn test_session_report_access() {
        let mut session = Session {
            user_id: "u1".to_string(),
            name: "Asha".to_string(),
            role: Role::Employee,
            dept_id: None,
            token: "t".to_string(),
        };
        assert!(!session.can_view_reports());

        session.role = Role::Manager;
        assert!(session.can_view_reports());

        session.role = Role::Admin;
        assert!(session.can_view_reports());
    }

    #[test]
    fn test_chat_role_wire_name() {
        assert_eq!(ChatRole::User.wire_name(), "user");
        assert_eq!(ChatRole::Assistant.wire_name(), "model");
    }
}
