//! Route handler functions for all API endpoints.
//!
//! Each handler extracts body/path/query via axum extractors, calls into the
//! orchestrator or repositories on AppState, and returns a JSON body with a
//! `success` flag. Extractor rejections are folded into [`ApiError`] so every
//! failure has the same shape.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use inookey_chat::gateway::GatewayHealth;
use inookey_chat::{intent, ChatReply};
use inookey_core::types::{
    Appointment, AppointmentRequest, AppointmentStatus, ChatRequest, ConversationTurn,
    NewAppointment, SessionStats,
};
use inookey_core::validation;

use crate::client::ClientMeta;
use crate::error::{ApiError, INVALID_BODY_MESSAGE, MALFORMED_JSON_MESSAGE};
use crate::state::AppState;

/// Upper bound on `?limit=` for history reads.
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// Consultation slots offered on any day.
pub const AVAILABLE_SLOTS: [&str; 6] = [
    "09:00 AM", "10:00 AM", "11:00 AM", "02:00 PM", "03:00 PM", "04:00 PM",
];

const DEFAULT_CANCEL_REASON: &str = "Cancelled by user";

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SlotParams {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    #[serde(flatten)]
    pub reply: ChatReply,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<ConversationTurn>,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub success: bool,
    pub session: SessionStats,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentCreatedResponse {
    pub success: bool,
    pub appointment_id: i64,
    pub message: String,
    pub data: NewAppointment,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppointmentResponse {
    pub success: bool,
    pub appointment: Appointment,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub message: String,
    pub appointment_id: i64,
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
    pub appointment_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsResponse {
    pub success: bool,
    pub date: String,
    pub available_slots: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub model: GatewayHealth,
    pub uptime_secs: u64,
}

// =============================================================================
// Chat
// =============================================================================

/// POST /api/chat - run one message through the chat pipeline.
pub async fn chat(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let reply = state.chat.handle(request, &client).await?;
    Ok(Json(ChatResponse {
        success: true,
        reply,
    }))
}

/// GET /api/chat/history/{session_id} - stored turns, oldest first.
pub async fn chat_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) = params?;
    let session_id = validation::require_session_id(Some(session_id.as_str()))?;
    let limit = params.limit.map(|l| l.clamp(1, MAX_HISTORY_LIMIT));

    let history = state
        .chat
        .history(&session_id, limit)
        .map_err(|e| ApiError::internal("Failed to fetch conversation history", e))?;

    Ok(Json(HistoryResponse {
        success: true,
        history,
        session_id,
    }))
}

/// GET /api/chat/suggestions - starter prompts for an empty chat.
pub async fn chat_suggestions() -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        success: true,
        suggestions: intent::starter_suggestions(),
    })
}

/// GET /api/chat/sessions/{session_id} - session row plus turn count.
pub async fn session_stats(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .chat
        .session_stats(&session_id)
        .map_err(|e| ApiError::internal("Failed to fetch session", e))?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

// =============================================================================
// Appointments
// =============================================================================

/// POST /api/appointments - validate and store a consultation booking.
pub async fn create_appointment(
    State(state): State<AppState>,
    payload: Result<Json<AppointmentRequest>, JsonRejection>,
) -> Result<Json<AppointmentCreatedResponse>, ApiError> {
    let Json(request) = payload?;
    let appointment = validation::validate_appointment(request, Local::now().date_naive())?;

    let appointment_id = state
        .appointments
        .save(&appointment)
        .map_err(|e| ApiError::internal("Failed to create appointment", e))?;

    tracing::info!(
        appointment_id,
        session_id = %appointment.session_id,
        date = %appointment.preferred_date,
        "Appointment created"
    );

    Ok(Json(AppointmentCreatedResponse {
        success: true,
        appointment_id,
        message: "Appointment created successfully".to_string(),
        data: appointment,
    }))
}

/// GET /api/appointments/{id}
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let id = parse_appointment_id(&id)?;
    let appointment = state
        .appointments
        .find_by_id(id)
        .map_err(|e| ApiError::internal("Failed to fetch appointment", e))?
        .ok_or_else(appointment_not_found)?;

    Ok(Json(AppointmentResponse {
        success: true,
        appointment,
    }))
}

/// PATCH /api/appointments/{id}/status - move a booking through its lifecycle.
pub async fn update_appointment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    let Json(body) = payload?;
    let status = body
        .status
        .as_deref()
        .and_then(|s| s.parse::<AppointmentStatus>().ok())
        .ok_or_else(invalid_status)?;
    let id = parse_appointment_id(&id)?;
    let notes = body.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let updated = state
        .appointments
        .update_status(id, status, notes)
        .map_err(|e| ApiError::internal("Failed to update appointment", e))?;
    if updated == 0 {
        return Err(appointment_not_found());
    }

    tracing::info!(appointment_id = id, status = %status, "Appointment status updated");

    Ok(Json(StatusUpdateResponse {
        success: true,
        message: format!("Appointment status updated to {}", status),
        appointment_id: id,
        status,
    }))
}

/// POST /api/appointments/{id}/cancel - body `{reason?}` is optional.
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<CancelResponse>, ApiError> {
    let request: CancelRequest = parse_optional_json(&body)?;
    let id = parse_appointment_id(&id)?;
    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_CANCEL_REASON);

    let updated = state
        .appointments
        .update_status(id, AppointmentStatus::Cancelled, Some(reason))
        .map_err(|e| ApiError::internal("Failed to cancel appointment", e))?;
    if updated == 0 {
        return Err(appointment_not_found());
    }

    tracing::info!(appointment_id = id, "Appointment cancelled");

    Ok(Json(CancelResponse {
        success: true,
        message: "Appointment cancelled successfully".to_string(),
        appointment_id: id,
    }))
}

/// GET /api/appointments/slots/available?date=YYYY-MM-DD
pub async fn available_slots(
    params: Result<Query<SlotParams>, QueryRejection>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let Query(params) = params?;
    let date = params
        .date
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| Local::now().date_naive().format("%Y-%m-%d").to_string());

    Ok(Json(SlotsResponse {
        success: true,
        date,
        available_slots: AVAILABLE_SLOTS.iter().map(|s| s.to_string()).collect(),
    }))
}

// =============================================================================
// Health and fallback
// =============================================================================

/// GET /health - liveness plus model gateway state.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.chat.gateway().health_check().await;
    let status = match state.database.ping() {
        Ok(()) => "OK",
        Err(e) => {
            tracing::warn!(error = %e, "Health check: database unavailable");
            "DEGRADED"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Any unmatched route.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_appointment_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| appointment_not_found())
}

fn appointment_not_found() -> ApiError {
    ApiError::NotFound("Appointment not found".to_string())
}

fn invalid_status() -> ApiError {
    let allowed: Vec<String> = AppointmentStatus::ALL.iter().map(|s| s.to_string()).collect();
    ApiError::BadRequest(format!(
        "Invalid status. Must be one of: {}",
        allowed.join(", ")
    ))
}

/// Parse a JSON body that may legitimately be empty.
fn parse_optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected JSON body");
        let message = if e.is_syntax() || e.is_eof() {
            MALFORMED_JSON_MESSAGE
        } else {
            INVALID_BODY_MESSAGE
        };
        ApiError::BadRequest(message.to_string())
    })
}
