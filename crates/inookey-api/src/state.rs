//! Application state shared across all route handlers and socket tasks.

use std::sync::Arc;
use std::time::Instant;

use inookey_chat::{ChatOrchestrator, ModelGateway};
use inookey_core::config::InookeyConfig;
use inookey_storage::{AppointmentRepository, Database};

use crate::websocket::ConnectionRegistry;

/// Shared application state.
///
/// Constructed once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InookeyConfig>,
    pub database: Arc<Database>,
    pub chat: Arc<ChatOrchestrator>,
    pub appointments: Arc<AppointmentRepository>,
    /// Open WebSocket connections.
    pub connections: ConnectionRegistry,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the orchestrator and repositories around an opened database and
    /// an initialized model gateway.
    pub fn new(config: InookeyConfig, database: Arc<Database>, gateway: Arc<ModelGateway>) -> Self {
        let chat = ChatOrchestrator::from_config(&config, Arc::clone(&database), gateway);
        Self {
            appointments: Arc::new(AppointmentRepository::new(Arc::clone(&database))),
            chat: Arc::new(chat),
            config: Arc::new(config),
            database,
            connections: ConnectionRegistry::new(),
            start_time: Instant::now(),
        }
    }
}
