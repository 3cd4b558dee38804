//! Prompt assembly: persona, trailing history window, new message.

use serde::{Deserialize, Serialize};

use inookey_core::config::OllamaConfig;
use inookey_core::types::{HistoryEntry, Sender};

/// Number of history entries forwarded to the model by default.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Receptionist persona sent as the system message.
pub const DEFAULT_PERSONA: &str = "\
You are Inookey's virtual receptionist - a warm, friendly assistant who welcomes visitors and helps them understand how we can help their business.

ABOUT INOOKEY:
We're a software development company that builds custom applications and AI solutions for businesses.

OUR SERVICES:
1. Custom Software - We build web apps, mobile apps, and custom systems
2. AI Integration - We add smart features using artificial intelligence
3. Process Automation - We automate tasks to save time and money
4. Consulting - We help plan your technology projects

SIMPLE ANSWERS:
- Projects typically take 2-4 weeks
- We offer free consultations to discuss your needs
- Pricing depends on what you need - we'll give you a quote after our chat
- We work with businesses of all sizes
- Yes, we can work with your existing systems

RESPONSE STYLE:
- Be warm, friendly, and conversational like a receptionist
- Keep responses short and easy to understand
- Don't be overly technical - speak in simple terms
- Always offer to connect them with our team
- Focus on how we can help THEM specifically
- Sound genuinely interested in helping

BOOKING MEETINGS:
When someone wants to schedule:
- Ask for their name, email, and preferred time
- Confirm we'll send them a meeting link
- Let them know we'll discuss their specific needs

Remember: You're the friendly first impression of Inookey. Keep it simple, warm, and helpful.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
        }
    }
}

impl From<&OllamaConfig> for GenerationParams {
    fn from(config: &OllamaConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// A complete, backend-neutral completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub messages: Vec<PromptMessage>,
    pub params: GenerationParams,
}

/// Builds [`ModelRequest`]s from a persona and a history window.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    persona: String,
    history_window: usize,
    params: GenerationParams,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA, DEFAULT_HISTORY_WINDOW, GenerationParams::default())
    }
}

impl PromptAssembler {
    pub fn new(persona: impl Into<String>, history_window: usize, params: GenerationParams) -> Self {
        Self {
            persona: persona.into(),
            history_window,
            params,
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// System persona, then the last `history_window` entries in order,
    /// then the new user message.
    pub fn assemble(&self, history: &[HistoryEntry], message: &str) -> ModelRequest {
        let start = history.len().saturating_sub(self.history_window);
        let window = &history[start..];

        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(PromptMessage::new(Role::System, self.persona.as_str()));
        messages.extend(window.iter().map(|entry| {
            let role = match entry.sender {
                Sender::User => Role::User,
                Sender::Assistant => Role::Assistant,
            };
            PromptMessage::new(role, entry.text.as_str())
        }));
        messages.push(PromptMessage::new(Role::User, message));

        ModelRequest {
            messages,
            params: self.params,
        }
    }
}

/// Render history as `sender: text` lines, for logs and debugging.
pub fn render_history(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|entry| format!("{}: {}", entry.sender, entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> Vec<HistoryEntry> {
        (1..=n)
            .map(|i| {
                let sender = if i % 2 == 1 {
                    Sender::User
                } else {
                    Sender::Assistant
                };
                HistoryEntry::new(sender, format!("turn {}", i))
            })
            .collect()
    }

    #[test]
    fn test_only_last_five_turns_included() {
        let assembler = PromptAssembler::default();
        let request = assembler.assemble(&history(7), "new question");

        assert_eq!(request.messages.len(), 1 + 5 + 1);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, DEFAULT_PERSONA);

        let middle: Vec<&str> = request.messages[1..6]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(middle, ["turn 3", "turn 4", "turn 5", "turn 6", "turn 7"]);

        let last = request.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "new question");
    }

    #[test]
    fn test_roles_follow_sender() {
        let request = PromptAssembler::default().assemble(&history(2), "q");
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[2].role, Role::Assistant);
    }

    #[test]
    fn test_empty_history() {
        let request = PromptAssembler::default().assemble(&[], "hello");
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn test_custom_window_and_params() {
        let params = GenerationParams {
            temperature: 0.1,
            top_p: 0.5,
            max_tokens: 64,
        };
        let assembler = PromptAssembler::new("persona", 2, params);
        let request = assembler.assemble(&history(4), "q");
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[1].content, "turn 3");
        assert_eq!(request.params, params);
        assert_eq!(assembler.persona(), "persona");
    }

    #[test]
    fn test_params_from_config() {
        let params = GenerationParams::from(&OllamaConfig::default());
        assert_eq!(params, GenerationParams::default());
    }

    #[test]
    fn test_render_history() {
        let rendered = render_history(&history(2));
        assert_eq!(rendered, "user: turn 1\nassistant: turn 2");
    }
}
