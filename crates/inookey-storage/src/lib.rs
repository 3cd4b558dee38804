//! Inookey storage crate: SQLite persistence for the chat backend.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and the
//! conversation, session and appointment repositories.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{AppointmentRepository, ConversationRepository};
