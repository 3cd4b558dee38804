//! Boundary validation for chat messages and appointment bookings.
//!
//! Validators consume the raw request body and return the normalized,
//! typed payload the pipeline works with. Nothing downstream re-checks.

use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::types::{AppointmentRequest, ChatMessage, ChatRequest, NewAppointment};

pub const MAX_MESSAGE_CHARS: usize = 1000;
pub const MAX_SESSION_ID_CHARS: usize = 100;
pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script>").expect("Invalid script regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid date regex"));
static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9] (AM|PM)$").expect("Invalid time regex")
});
static PHONE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-()]").expect("Invalid phone separator regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{0,15}$").expect("Invalid phone regex"));

/// Client-input problems. Always reported verbatim, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    TooLong(String),

    #[error("Validation failed")]
    ValidationFailed { details: Vec<String> },
}

impl ValidationError {
    /// Field-level messages, if any.
    pub fn details(&self) -> Option<&[String]> {
        match self {
            ValidationError::ValidationFailed { details } => Some(details),
            _ => None,
        }
    }
}

/// Remove `<script>...</script>` blocks and trim surrounding whitespace.
pub fn sanitize(text: &str) -> String {
    SCRIPT_TAG.replace_all(text, "").trim().to_string()
}

/// Validate a chat body and produce the sanitized message.
///
/// A missing session id is replaced with a generated `session_<millis>` id.
pub fn validate_chat_request(request: ChatRequest) -> Result<ChatMessage, ValidationError> {
    let raw = match request.message {
        Some(Value::String(s)) => s,
        _ => {
            return Err(ValidationError::InvalidInput(
                "Message is required and must be a string".to_string(),
            ))
        }
    };
    let text = validate_message(&raw)?;
    let session_id = validate_session_id(request.session_id.as_deref())?;

    Ok(ChatMessage {
        text,
        session_id,
        conversation_history: request.conversation_history.unwrap_or_default(),
    })
}

/// Check length bounds and sanitize a message string.
pub fn validate_message(raw: &str) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::InvalidInput(
            "Message cannot be empty".to_string(),
        ));
    }
    if raw.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::TooLong(format!(
            "Message is too long (maximum {} characters)",
            MAX_MESSAGE_CHARS
        )));
    }

    let text = sanitize(raw);
    // A message made only of script blocks has nothing left to answer.
    if text.is_empty() {
        return Err(ValidationError::InvalidInput(
            "Message cannot be empty".to_string(),
        ));
    }
    Ok(text)
}

/// Accept a caller-supplied session id or mint one.
pub fn validate_session_id(session_id: Option<&str>) -> Result<String, ValidationError> {
    match session_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) if id.chars().count() > MAX_SESSION_ID_CHARS => Err(ValidationError::TooLong(
            "Session ID is too long".to_string(),
        )),
        Some(id) => Ok(id.to_string()),
        None => Ok(generate_session_id()),
    }
}

/// Like [`validate_session_id`], but the id must be present.
pub fn require_session_id(session_id: Option<&str>) -> Result<String, ValidationError> {
    match session_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(_) => validate_session_id(session_id),
        None => Err(ValidationError::InvalidInput(
            "Session ID is required".to_string(),
        )),
    }
}

pub fn generate_session_id() -> String {
    format!("session_{}", Utc::now().timestamp_millis())
}

/// Validate a booking against `today`, collecting every violation.
///
/// A missing session id is generated, as for chat messages.
pub fn validate_appointment(
    request: AppointmentRequest,
    today: NaiveDate,
) -> Result<NewAppointment, ValidationError> {
    let mut details = Vec::new();

    // Length limits apply to the value as sent, before trimming.
    let raw_name = as_text(&request.customer_name);
    let customer_name = non_blank(raw_name);
    match (raw_name, customer_name) {
        (_, None) => details.push("Customer name is required".to_string()),
        (Some(raw), Some(_)) if raw.chars().count() > MAX_NAME_CHARS => details.push(format!(
            "Customer name is too long (maximum {} characters)",
            MAX_NAME_CHARS
        )),
        _ => {}
    }

    let customer_email =
        non_blank(as_text(&request.customer_email)).map(|e| e.to_lowercase());
    match customer_email.as_deref() {
        None => details.push("Customer email is required".to_string()),
        Some(email) if !EMAIL.is_match(email) => {
            details.push("Invalid email format".to_string())
        }
        Some(_) => {}
    }

    let raw_description = as_text(&request.project_description);
    let project_description = non_blank(raw_description);
    match (raw_description, project_description) {
        (_, None) => details.push("Project description is required".to_string()),
        (Some(raw), Some(_)) if raw.chars().count() > MAX_DESCRIPTION_CHARS => {
            details.push(format!(
                "Project description is too long (maximum {} characters)",
                MAX_DESCRIPTION_CHARS
            ))
        }
        _ => {}
    }

    let preferred_date = non_blank(as_text(&request.preferred_date));
    match preferred_date {
        None => details.push("Preferred date is required".to_string()),
        Some(date) => match parse_date(date) {
            None => details.push("Invalid date format (use YYYY-MM-DD)".to_string()),
            Some(parsed) if parsed < today => {
                details.push("Preferred date cannot be in the past".to_string())
            }
            Some(_) => {}
        },
    }

    let preferred_time = non_blank(as_text(&request.preferred_time));
    match preferred_time {
        None => details.push("Preferred time is required".to_string()),
        Some(time) if !TIME.is_match(time) => {
            details.push("Invalid time format (use HH:MM AM/PM)".to_string())
        }
        Some(_) => {}
    }

    let customer_phone = match &request.customer_phone {
        None | Some(Value::Null) => None,
        Some(Value::String(phone)) => non_blank(Some(phone.as_str())),
        Some(_) => {
            details.push("Invalid phone number format".to_string());
            None
        }
    };
    if let Some(phone) = customer_phone {
        let digits = PHONE_SEPARATORS.replace_all(phone, "");
        if !PHONE.is_match(&digits) {
            details.push("Invalid phone number format".to_string());
        }
    }

    if !details.is_empty() {
        return Err(ValidationError::ValidationFailed { details });
    }

    match (
        customer_name,
        customer_email,
        project_description,
        preferred_date,
        preferred_time,
    ) {
        (Some(name), Some(email), Some(desc), Some(date), Some(time)) => Ok(NewAppointment {
            session_id: non_blank(as_text(&request.session_id))
                .map(str::to_string)
                .unwrap_or_else(generate_session_id),
            customer_name: name.to_string(),
            customer_email: email,
            customer_phone: customer_phone.map(str::to_string),
            project_description: desc.to_string(),
            preferred_date: date.to_string(),
            preferred_time: time.to_string(),
            notes: non_blank(as_text(&request.notes)).map(str::to_string),
        }),
        // Every None above already produced a detail.
        _ => Err(ValidationError::ValidationFailed {
            details: vec!["Validation failed".to_string()],
        }),
    }
}

/// The string inside a JSON field; any other JSON type counts as absent.
fn as_text(value: &Option<Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if !DATE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
