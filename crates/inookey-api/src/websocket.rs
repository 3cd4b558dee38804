//! Real-time chat over WebSocket.
//!
//! Every frame is JSON text of the form `{"event": "<name>", "data": {...}}`.
//! Each socket is split into a reader loop and a writer task fed by an mpsc
//! channel; the registry keeps a clone of every writer channel so events can
//! be broadcast to the other visitors. A failed event answers with an `error`
//! event and never closes the socket.
//!
//! A background sweep closes connections that have been silent for longer
//! than the configured inactivity timeout.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Local, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use inookey_chat::{ChatError, ClientInfo};
use inookey_core::types::{AppointmentRequest, ChatRequest, Intent};
use inookey_core::validation::{self, ValidationError};

use crate::client::ClientMeta;
use crate::error::GENERIC_ERROR_MESSAGE;
use crate::state::AppState;

/// Outbound events queued per connection before broadcasts start dropping.
const OUTBOUND_BUFFER: usize = 64;

// =============================================================================
// Client events
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSession {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointment {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub appointment_data: AppointmentRequest,
}

/// Payload of events that carry nothing. Any `data` value is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoData;

impl<'de> Deserialize<'de> for NoData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(NoData)
    }
}

/// Events a visitor's browser sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    InitSession(InitSession),
    ChatMessage(ChatRequest),
    TypingStart(SessionRef),
    TypingStop(SessionRef),
    UserPresent(Presence),
    BookAppointment(BookAppointment),
    Ping(#[serde(default)] NoData),
}

// =============================================================================
// Server events
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitialized {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub response: String,
    pub intent: Intent,
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub session_id: Option<String>,
    pub is_typing: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub session_id: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentBooked {
    pub success: bool,
    pub appointment_id: i64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pong {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMessage {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub message: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

/// Events the server pushes to browsers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionInitialized(SessionInitialized),
    AiResponse(AiResponse),
    UserTyping(UserTyping),
    UserStatus(UserStatus),
    AppointmentBooked(AppointmentBooked),
    Pong(Pong),
    SystemMessage(SystemMessage),
    Error(ErrorEvent),
}

impl ServerEvent {
    pub fn error(
        message: impl Into<String>,
        error: impl Into<String>,
        details: Option<Vec<String>>,
    ) -> Self {
        ServerEvent::Error(ErrorEvent {
            message: message.into(),
            error: error.into(),
            details,
            timestamp: Utc::now(),
        })
    }

    pub fn user_status(session_id: Option<String>, status: impl Into<String>) -> Self {
        ServerEvent::UserStatus(UserStatus {
            session_id,
            status: status.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn system_message(message: impl Into<String>, kind: impl Into<String>) -> Self {
        ServerEvent::SystemMessage(SystemMessage {
            message: message.into(),
            kind: kind.into(),
            timestamp: Utc::now(),
        })
    }
}

// =============================================================================
// Connection registry
// =============================================================================

struct Connection {
    session_id: Option<String>,
    connected_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    tx: mpsc::Sender<ServerEvent>,
    close: Arc<Notify>,
}

impl Connection {
    fn info(&self, id: Uuid) -> ConnectionInfo {
        ConnectionInfo {
            id,
            session_id: self.session_id.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

/// Metadata for one open socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// Open sockets keyed by connection id.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new socket. The returned `Notify` fires when the registry
    /// wants the socket closed.
    pub async fn register(&self, tx: mpsc::Sender<ServerEvent>) -> (Uuid, Arc<Notify>) {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let close = Arc::new(Notify::new());
        self.connections.write().await.insert(
            id,
            Connection {
                session_id: None,
                connected_at: now,
                last_activity: now,
                tx,
                close: Arc::clone(&close),
            },
        );
        (id, close)
    }

    pub async fn bind_session(&self, id: Uuid, session_id: &str) {
        if let Some(conn) = self.connections.write().await.get_mut(&id) {
            conn.session_id = Some(session_id.to_string());
            conn.last_activity = Utc::now();
        }
    }

    pub async fn session_of(&self, id: Uuid) -> Option<String> {
        self.connections
            .read()
            .await
            .get(&id)
            .and_then(|c| c.session_id.clone())
    }

    pub async fn touch(&self, id: Uuid) {
        self.touch_at(id, Utc::now()).await;
    }

    pub async fn touch_at(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(conn) = self.connections.write().await.get_mut(&id) {
            conn.last_activity = at;
        }
    }

    pub async fn remove(&self, id: Uuid) -> Option<ConnectionInfo> {
        self.connections
            .write()
            .await
            .remove(&id)
            .map(|c| c.info(id))
    }

    /// Queue `event` for every connection except `origin`. Returns how many
    /// connections accepted it; slow consumers with a full queue are skipped.
    pub async fn broadcast_except(&self, origin: Uuid, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (id, conn) in connections.iter().filter(|(id, _)| **id != origin) {
            match conn.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(connection_id = %id, error = %e, "Broadcast dropped"),
            }
        }
        delivered
    }

    /// Queue `event` for every connection.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        self.broadcast_except(Uuid::nil(), event).await
    }

    pub async fn broadcast_system_message(&self, message: &str, kind: &str) -> usize {
        self.broadcast(ServerEvent::system_message(message, kind))
            .await
    }

    /// Close and forget every connection idle for longer than `threshold`.
    /// Visitors bound to a session are announced offline to the others.
    pub async fn sweep_inactive(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<ConnectionInfo> {
        let evicted: Vec<ConnectionInfo> = {
            let mut connections = self.connections.write().await;
            let stale: Vec<Uuid> = connections
                .iter()
                .filter(|(_, c)| {
                    (now - c.last_activity)
                        .to_std()
                        .map(|idle| idle > threshold)
                        .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect();

            stale
                .into_iter()
                .filter_map(|id| connections.remove(&id).map(|c| (id, c)))
                .map(|(id, conn)| {
                    conn.close.notify_one();
                    conn.info(id)
                })
                .collect()
        };

        for conn in &evicted {
            info!(connection_id = %conn.id, "Closing inactive WebSocket connection");
            if conn.session_id.is_some() {
                self.broadcast(ServerEvent::user_status(conn.session_id.clone(), "offline"))
                    .await;
            }
        }
        evicted
    }

    pub async fn stats(&self) -> ConnectionStats {
        let connections = self.connections.read().await;
        ConnectionStats {
            total_connections: connections.len(),
            connections: connections.iter().map(|(id, c)| c.info(*id)).collect(),
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run [`sweep_inactive`](Self::sweep_inactive) every `interval` until the
    /// returned handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration, threshold: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let interval = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = registry.sweep_inactive(Utc::now(), threshold).await;
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Inactivity sweep closed connections");
                }
            }
        })
    }
}

// =============================================================================
// Socket handling
// =============================================================================

/// GET /ws - upgrade to a chat socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, client))
}

async fn handle_socket(socket: WebSocket, state: AppState, client: ClientInfo) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);
    let (conn_id, close) = state.connections.register(tx.clone()).await;
    info!(connection_id = %conn_id, "WebSocket connected");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize WebSocket event");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.connections.touch(conn_id).await;
                    if let Some(reply) = dispatch(&state, conn_id, &client, text.as_str()).await {
                        if tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => state.connections.touch(conn_id).await,
                Some(Err(e)) => {
                    debug!(connection_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
            _ = close.notified() => break,
        }
    }

    if let Some(conn) = state.connections.remove(conn_id).await {
        if conn.session_id.is_some() {
            state
                .connections
                .broadcast_except(conn_id, ServerEvent::user_status(conn.session_id, "offline"))
                .await;
        }
    }
    drop(tx);
    let _ = writer.await;
    info!(connection_id = %conn_id, "WebSocket disconnected");
}

/// Handle one text frame. Returns the event to send back to the same socket,
/// if any; broadcasts go through the registry.
pub async fn dispatch(
    state: &AppState,
    conn_id: Uuid,
    client: &ClientInfo,
    text: &str,
) -> Option<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => return Some(ServerEvent::error("Invalid event", e.to_string(), None)),
    };
    let bound = state.connections.session_of(conn_id).await;

    match event {
        ClientEvent::InitSession(init) => {
            let session_id = match validation::validate_session_id(init.session_id.as_deref()) {
                Ok(id) => id,
                Err(e) => return Some(rejected("Failed to initialize session", e)),
            };
            let client = ClientInfo {
                user_agent: init.user_agent.or_else(|| client.user_agent.clone()),
                ip_address: client.ip_address.clone(),
            };
            if let Err(e) = state.chat.init_session(&session_id, &client) {
                return Some(chat_failure("Failed to initialize session", e));
            }
            state.connections.bind_session(conn_id, &session_id).await;
            info!(connection_id = %conn_id, session_id = %session_id, "Session initialized");
            Some(ServerEvent::SessionInitialized(SessionInitialized {
                session_id,
                timestamp: Utc::now(),
            }))
        }
        ClientEvent::ChatMessage(mut request) => {
            if request.session_id.is_none() {
                request.session_id = bound.clone();
            }
            match state.chat.handle(request, client).await {
                Ok(reply) => {
                    if bound.is_none() {
                        state.connections.bind_session(conn_id, &reply.session_id).await;
                    }
                    Some(ServerEvent::AiResponse(AiResponse {
                        response: reply.response,
                        intent: reply.intent,
                        confidence: reply.confidence,
                        suggestions: reply.suggestions,
                        session_id: reply.session_id,
                        timestamp: Utc::now(),
                    }))
                }
                Err(e) => Some(chat_failure("Failed to process message", e)),
            }
        }
        ClientEvent::TypingStart(r) => {
            broadcast_typing(state, conn_id, r.session_id.or(bound), true).await;
            None
        }
        ClientEvent::TypingStop(r) => {
            broadcast_typing(state, conn_id, r.session_id.or(bound), false).await;
            None
        }
        ClientEvent::UserPresent(presence) => {
            let status = presence.status.unwrap_or_else(|| "online".to_string());
            state
                .connections
                .broadcast_except(
                    conn_id,
                    ServerEvent::user_status(presence.session_id.or(bound), status),
                )
                .await;
            None
        }
        ClientEvent::BookAppointment(booking) => {
            let mut data = booking.appointment_data;
            if data.session_id.is_none() {
                data.session_id = booking.session_id.or(bound).map(serde_json::Value::String);
            }
            let appointment = match validation::validate_appointment(data, Local::now().date_naive()) {
                Ok(appointment) => appointment,
                Err(e) => return Some(rejected("Failed to book appointment", e)),
            };
            match state.appointments.save(&appointment) {
                Ok(id) => {
                    info!(
                        appointment_id = id,
                        session_id = %appointment.session_id,
                        "Appointment booked over WebSocket"
                    );
                    Some(ServerEvent::AppointmentBooked(AppointmentBooked {
                        success: true,
                        appointment_id: id,
                        message: "Appointment booked successfully".to_string(),
                        timestamp: Utc::now(),
                    }))
                }
                Err(e) => Some(internal("Failed to book appointment", e)),
            }
        }
        ClientEvent::Ping(_) => Some(ServerEvent::Pong(Pong {
            timestamp: Utc::now(),
        })),
    }
}

async fn broadcast_typing(state: &AppState, conn_id: Uuid, session_id: Option<String>, is_typing: bool) {
    let event = ServerEvent::UserTyping(UserTyping {
        session_id,
        is_typing,
        timestamp: Utc::now(),
    });
    state.connections.broadcast_except(conn_id, event).await;
}

fn rejected(context: &str, err: ValidationError) -> ServerEvent {
    let details = err.details().map(<[String]>::to_vec);
    ServerEvent::error(context, err.to_string(), details)
}

fn internal(context: &str, err: impl Display) -> ServerEvent {
    warn!(error = %err, "{}", context);
    ServerEvent::error(context, GENERIC_ERROR_MESSAGE, None)
}

fn chat_failure(context: &str, err: ChatError) -> ServerEvent {
    match err {
        ChatError::Validation(v) => rejected(context, v),
        other => internal(context, other),
    }
}
