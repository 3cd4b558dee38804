//! Inookey API crate - axum HTTP server, route handlers, WebSocket chat.
//!
//! Exposes the chat pipeline and appointment booking over REST, and the same
//! chat flow over a JSON-framed WebSocket with presence and typing events.

pub mod client;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use routes::{create_router, serve, start_server};
pub use state::AppState;
pub use websocket::{ConnectionRegistry, ServerEvent};
