//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, the body
//! limit and the per-client rate limiter on `/api`.

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use inookey_core::error::InookeyError;

use crate::handlers;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;
use crate::websocket;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors = cors_layer(&server.frontend_url);
    let limiter = RateLimiter::from_config(server);
    let body_limit = server.body_limit_bytes;

    let api_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/history/{session_id}", get(handlers::chat_history))
        .route("/chat/suggestions", get(handlers::chat_suggestions))
        .route("/chat/sessions/{session_id}", get(handlers::session_stats))
        .route("/appointments", post(handlers::create_appointment))
        .route(
            "/appointments/slots/available",
            get(handlers::available_slots),
        )
        .route("/appointments/{id}", get(handlers::get_appointment))
        .route(
            "/appointments/{id}/status",
            patch(handlers::update_appointment_status),
        )
        .route(
            "/appointments/{id}/cancel",
            post(handlers::cancel_appointment),
        )
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(limiter));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::ws_handler))
        .nest("/api", api_routes)
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for the marketing site front end only.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(origin = %frontend_url, error = %e, "Invalid frontend URL; CORS disabled");
            cors
        }
    }
}

/// Sent to every open socket once the shutdown signal fires.
pub const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// Bind the configured address and serve until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after the signal fires.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), InookeyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| InookeyError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "API server listening");
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves, then tell
/// WebSocket clients the server is going away.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), InookeyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let connections = state.connections.clone();
    let router = create_router(state);

    let shutdown = async move {
        shutdown.await;
        let notified = connections
            .broadcast_system_message(SHUTDOWN_NOTICE, "shutdown")
            .await;
        tracing::info!(notified, "Announced shutdown to WebSocket clients");
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| InookeyError::Api(format!("Server error: {}", e)))
}
