//! Chat pipeline for the Inookey receptionist.
//!
//! Keyword intent classification, canned suggestions, prompt assembly, the
//! Ollama-backed model gateway and the orchestrator that ties them to the
//! conversation store.

pub mod error;
pub mod gateway;
pub mod intent;
pub mod orchestrator;
pub mod prompt;

pub use error::ChatError;
pub use gateway::{Completion, GatewayHealth, ModelBackend, ModelGateway, OllamaBackend};
pub use orchestrator::{ChatOrchestrator, ChatReply, ClientInfo};
pub use prompt::{GenerationParams, ModelRequest, PromptAssembler};
