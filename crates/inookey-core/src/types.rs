//! Entity and payload types shared by the storage, chat and API crates.
//!
//! Incoming request bodies (`ChatRequest`, `AppointmentRequest`) keep every
//! field optional so the validator can report precise messages; the
//! validated counterparts (`ChatMessage`, `NewAppointment`) are what the
//! rest of the pipeline consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation history entry.
///
/// Anything other than `"user"` deserializes as [`Sender::Assistant`], since
/// clients label the bot side inconsistently ("assistant", "ai", "bot").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Sender {
    User,
    Assistant,
}

impl From<String> for Sender {
    fn from(value: String) -> Self {
        if value == "user" {
            Sender::User
        } else {
            Sender::Assistant
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

/// Coarse topic of a visitor message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Services,
    Pricing,
    Process,
    Booking,
    Technology,
    Support,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Services => "services",
            Intent::Pricing => "pricing",
            Intent::Process => "process",
            Intent::Booking => "booking",
            Intent::Technology => "technology",
            Intent::Support => "support",
            Intent::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "services" => Ok(Intent::Services),
            "pricing" => Ok(Intent::Pricing),
            "process" => Ok(Intent::Process),
            "booking" => Ok(Intent::Booking),
            "technology" => Ok(Intent::Technology),
            "support" => Ok(Intent::Support),
            "general" => Ok(Intent::General),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Appointment lifecycle states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
    ];
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            _ => Err(format!("Unknown appointment status: {}", s)),
        }
    }
}

// =============================================================================
// Chat
// =============================================================================

/// One prior turn as supplied by the client. Not authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sender: Sender,
    #[serde(alias = "content")]
    pub text: String,
}

impl HistoryEntry {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }
}

/// Raw chat body, shared by `POST /api/chat` and the `chat_message` socket
/// event. `message` stays untyped so a non-string value can be rejected with
/// a proper validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Option<Vec<HistoryEntry>>,
}

/// A validated, sanitized chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub text: String,
    pub session_id: String,
    pub conversation_history: Vec<HistoryEntry>,
}

/// Intent label plus normalized keyword score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentScore {
    pub intent: Intent,
    pub confidence: f64,
}

/// A turn about to be written to the conversation store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub session_id: String,
    pub user_message: String,
    pub ai_response: String,
    pub intent: Intent,
    pub confidence: f64,
}

/// A persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: i64,
    pub session_id: String,
    pub user_message: String,
    pub ai_response: String,
    pub intent: Intent,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-visitor bookkeeping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub total_messages: i64,
}

/// A session row together with the number of stored turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    #[serde(flatten)]
    pub session: Session,
    pub conversation_count: i64,
}

// =============================================================================
// Appointments
// =============================================================================

/// Raw appointment body as posted by the booking form or socket event.
///
/// Fields stay untyped JSON so a wrong-typed field is reported by the
/// validator alongside every other violation instead of failing the parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    #[serde(default)]
    pub session_id: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_name: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_email: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_phone: Option<serde_json::Value>,
    #[serde(default)]
    pub project_description: Option<serde_json::Value>,
    #[serde(default)]
    pub preferred_date: Option<serde_json::Value>,
    #[serde(default)]
    pub preferred_time: Option<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<serde_json::Value>,
}

/// Validated and normalized appointment data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub session_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub project_description: String,
    pub preferred_date: String,
    pub preferred_time: String,
    pub notes: Option<String>,
}

/// A stored appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub session_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub project_description: String,
    pub preferred_date: String,
    pub preferred_time: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
