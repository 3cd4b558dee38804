//! Chat orchestrator: validate, classify, prompt, complete, persist.
//!
//! Shared by the HTTP handler and the WebSocket event loop. A failed model
//! call never aborts the pipeline; the fallback reply is persisted and
//! returned like any other completion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use inookey_core::config::InookeyConfig;
use inookey_core::types::{
    ChatMessage, ChatRequest, ConversationTurn, Intent, NewTurn, SessionStats,
};
use inookey_core::validation;
use inookey_storage::{ConversationRepository, Database};

use crate::error::ChatError;
use crate::gateway::{Completion, ModelGateway, FALLBACK_CONFIDENCE};
use crate::intent;
use crate::prompt::{GenerationParams, PromptAssembler, DEFAULT_PERSONA};

/// Characters of a visitor message included in log lines.
const LOG_PREVIEW_CHARS: usize = 50;

/// Where a message came from, for session bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Reply for one processed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub intent: Intent,
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub session_id: String,
    #[serde(skip)]
    pub turn_id: i64,
    #[serde(skip)]
    pub fallback: bool,
}

pub struct ChatOrchestrator {
    conversations: ConversationRepository,
    gateway: Arc<ModelGateway>,
    assembler: PromptAssembler,
    history_limit: u32,
}

impl ChatOrchestrator {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<ModelGateway>,
        assembler: PromptAssembler,
        history_limit: u32,
    ) -> Self {
        Self {
            conversations: ConversationRepository::new(db),
            gateway,
            assembler,
            history_limit,
        }
    }

    /// Orchestrator with persona, window and sampling taken from configuration.
    pub fn from_config(
        config: &InookeyConfig,
        db: Arc<Database>,
        gateway: Arc<ModelGateway>,
    ) -> Self {
        let persona = config
            .chat
            .persona
            .clone()
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string());
        let assembler = PromptAssembler::new(
            persona,
            config.chat.history_window,
            GenerationParams::from(&config.ollama),
        );
        Self::new(db, gateway, assembler, config.chat.history_limit)
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    pub fn default_history_limit(&self) -> u32 {
        self.history_limit
    }

    /// Validate a raw request, then run it through the pipeline.
    pub async fn handle(
        &self,
        request: ChatRequest,
        client: &ClientInfo,
    ) -> Result<ChatReply, ChatError> {
        let message = validation::validate_chat_request(request)?;
        self.process(message, client).await
    }

    /// Run an already validated message through the pipeline.
    pub async fn process(
        &self,
        message: ChatMessage,
        client: &ClientInfo,
    ) -> Result<ChatReply, ChatError> {
        info!(
            session_id = %message.session_id,
            message = %preview(&message.text),
            "Chat message received"
        );

        let score = intent::classify(&message.text);
        let request = self
            .assembler
            .assemble(&message.conversation_history, &message.text);

        let completion = self.gateway.complete(&request).await;
        let (intent, confidence, suggestions) = match &completion {
            Completion::Generated(_) => (
                score.intent,
                score.confidence,
                intent::suggestions(score.intent),
            ),
            Completion::Fallback => {
                warn!(session_id = %message.session_id, "Serving fallback reply");
                (
                    Intent::General,
                    FALLBACK_CONFIDENCE,
                    intent::fallback_suggestions(),
                )
            }
        };
        let response = completion.text().to_string();

        self.conversations.upsert_session(
            &message.session_id,
            client.user_agent.as_deref(),
            client.ip_address.as_deref(),
        )?;
        let turn_id = self.conversations.save_turn(&NewTurn {
            session_id: message.session_id.clone(),
            user_message: message.text.clone(),
            ai_response: response.clone(),
            intent,
            confidence,
        })?;

        info!(
            session_id = %message.session_id,
            intent = %intent,
            confidence,
            turn_id,
            "Chat reply sent"
        );

        Ok(ChatReply {
            response,
            intent,
            confidence,
            suggestions,
            session_id: message.session_id,
            turn_id,
            fallback: completion.is_fallback(),
        })
    }

    /// Register (or refresh) a session without processing a message.
    pub fn init_session(&self, session_id: &str, client: &ClientInfo) -> Result<(), ChatError> {
        self.conversations.upsert_session(
            session_id,
            client.user_agent.as_deref(),
            client.ip_address.as_deref(),
        )?;
        Ok(())
    }

    /// Stored turns, oldest first. `None` uses the configured default.
    pub fn history(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ConversationTurn>, ChatError> {
        let limit = limit.unwrap_or(self.history_limit);
        Ok(self.conversations.get_history(session_id, limit)?)
    }

    pub fn session_stats(&self, session_id: &str) -> Result<Option<SessionStats>, ChatError> {
        Ok(self.conversations.session_stats(session_id)?)
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    if text.chars().count() > LOG_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
