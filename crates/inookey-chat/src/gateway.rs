//! Model gateway: the only path from the chat pipeline to the language model.
//!
//! [`ModelBackend`] is the raw transport (Ollama over HTTP in production, a
//! scripted double in tests). [`ModelGateway`] wraps it with the startup
//! check, a per-request timeout and the degrade-to-fallback policy: callers
//! of [`ModelGateway::complete`] never see an upstream error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use inookey_core::config::OllamaConfig;

use crate::error::ChatError;
use crate::prompt::{ModelRequest, PromptMessage};

/// Reply used whenever the model cannot produce one.
pub const FALLBACK_RESPONSE: &str = "I apologize, but I'm having trouble processing your request right now. Please try again in a moment, or feel free to contact us directly for immediate assistance. You can also book a consultation call and I'll be happy to help you get started with your project!";

/// Confidence reported alongside [`FALLBACK_RESPONSE`].
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Raw access to a chat-completion service.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Identifier of the configured model.
    fn model(&self) -> &str;

    /// Names of the models the service has available.
    async fn list_models(&self) -> Result<Vec<String>, ChatError>;

    /// Download a model onto the service.
    async fn pull_model(&self, name: &str) -> Result<(), ChatError>;

    /// Run one non-streaming chat completion.
    async fn complete(&self, request: &ModelRequest) -> Result<String, ChatError>;
}

// =============================================================================
// Ollama backend
// =============================================================================

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaTag {
    name: String,
}

#[derive(Debug, Serialize)]
struct OllamaPullRequest<'a> {
    model: &'a str,
    stream: bool,
}

/// [`ModelBackend`] talking to an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    host: String,
    model: String,
    pull_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &OllamaConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("inookey/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        info!(host = %config.host, model = %config.model, "Initialized Ollama backend");

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            pull_timeout: Duration::from_secs(config.pull_timeout_secs),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        error!("Ollama returned error {}: {}", status, error_text);
        Err(ChatError::Upstream(format!(
            "Ollama returned error {}: {}",
            status, error_text
        )))
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let url = format!("{}/api/tags", self.host);
        debug!("Fetching models from Ollama: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("Failed to fetch Ollama models: {}", e);
            ChatError::Upstream(format!("Failed to connect to Ollama server: {}", e))
        })?;
        let response = Self::check_status(response).await?;

        let tags: OllamaTagsResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Ollama tags response: {}", e);
            ChatError::Upstream(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self, name: &str) -> Result<(), ChatError> {
        let url = format!("{}/api/pull", self.host);
        info!(model = %name, "Pulling model from Ollama");

        let response = self
            .client
            .post(&url)
            .timeout(self.pull_timeout)
            .json(&OllamaPullRequest {
                model: name,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| ChatError::Upstream(format!("Ollama pull failed: {}", e)))?;
        Self::check_status(response).await?;

        info!(model = %name, "Model pulled");
        Ok(())
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ChatError> {
        let url = format!("{}/api/chat", self.host);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.params.temperature,
                top_p: request.params.top_p,
                num_predict: request.params.max_tokens,
            },
        };

        debug!("Sending Ollama request: {} messages", request.messages.len());

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            error!("Ollama request failed: {}", e);
            ChatError::Upstream(format!("Ollama request failed: {}", e))
        })?;
        let response = Self::check_status(response).await?;

        let parsed: OllamaChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Ollama response: {}", e);
            ChatError::Upstream(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(parsed.message.content)
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Outcome of a gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Generated(String),
    Fallback,
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Completion::Generated(text) => text,
            Completion::Fallback => FALLBACK_RESPONSE,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Completion::Fallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayHealth {
    Healthy,
    Unhealthy,
    NotInitialized,
}

/// True if `available` contains `model`, or any entry contains its family
/// name (the part before `:`).
pub fn model_is_available(available: &[String], model: &str) -> bool {
    let family = model.split(':').next().unwrap_or(model);
    available
        .iter()
        .any(|name| name == model || name.contains(family))
}

pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    request_timeout: Duration,
    pull_missing_model: bool,
    ready: AtomicBool,
}

impl ModelGateway {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        request_timeout: Duration,
        pull_missing_model: bool,
    ) -> Self {
        Self {
            backend,
            request_timeout,
            pull_missing_model,
            ready: AtomicBool::new(false),
        }
    }

    /// Gateway over an [`OllamaBackend`] built from configuration.
    pub fn from_config(config: &OllamaConfig) -> Result<Self, ChatError> {
        let backend = OllamaBackend::new(config)?;
        Ok(Self::new(
            Arc::new(backend),
            Duration::from_secs(config.request_timeout_secs),
            config.pull_missing_model,
        ))
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Verify the service is reachable and the model is present, pulling it
    /// if allowed. The gateway only serves completions after this succeeds.
    pub async fn initialize(&self) -> Result<(), ChatError> {
        let model = self.backend.model().to_string();
        let available = self.backend.list_models().await?;

        if model_is_available(&available, &model) {
            info!(model = %model, "Model available");
        } else if self.pull_missing_model {
            warn!(model = %model, "Model not found, pulling");
            self.backend.pull_model(&model).await?;
        } else {
            return Err(ChatError::Upstream(format!(
                "Model {} is not available on the model service",
                model
            )));
        }

        self.ready.store(true, Ordering::Release);
        info!(model = %model, "Model gateway ready");
        Ok(())
    }

    pub async fn health_check(&self) -> GatewayHealth {
        if !self.is_ready() {
            return GatewayHealth::NotInitialized;
        }
        match self.backend.list_models().await {
            Ok(_) => GatewayHealth::Healthy,
            Err(e) => {
                warn!(error = %e, "Model service health check failed");
                GatewayHealth::Unhealthy
            }
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        self.backend.list_models().await
    }

    /// Run a completion. Errors, timeouts and empty output all collapse to
    /// [`Completion::Fallback`].
    pub async fn complete(&self, request: &ModelRequest) -> Completion {
        if !self.is_ready() {
            warn!("Completion requested before the model gateway was initialized");
            return Completion::Fallback;
        }

        match tokio::time::timeout(self.request_timeout, self.backend.complete(request)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!("Model returned an empty completion");
                    Completion::Fallback
                } else {
                    Completion::Generated(text.to_string())
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Model completion failed");
                Completion::Fallback
            }
            Err(_) => {
                error!(
                    timeout_secs = self.request_timeout.as_secs_f64(),
                    "Model completion timed out"
                );
                Completion::Fallback
            }
        }
    }
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("model", &self.backend.model())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Scripted backend for tests in this crate and downstream crates.
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted reply for [`ScriptedBackend`].
    #[derive(Debug, Clone)]
    pub enum Reply {
        Text(String),
        Fail(String),
        /// Sleep before answering, to exercise timeouts.
        Delay(Duration, String),
    }

    /// Returns queued replies in order; once the queue is empty every call
    /// answers with the default text.
    pub struct ScriptedBackend {
        model: String,
        models: Vec<String>,
        replies: Mutex<VecDeque<Reply>>,
        default_reply: String,
        requests: Mutex<Vec<ModelRequest>>,
        pulled: Mutex<Vec<String>>,
        reachable: AtomicBool,
    }

    impl ScriptedBackend {
        pub fn new(default_reply: impl Into<String>) -> Self {
            Self {
                model: "llama3.1:8b".to_string(),
                models: vec!["llama3.1:8b".to_string()],
                replies: Mutex::new(VecDeque::new()),
                default_reply: default_reply.into(),
                requests: Mutex::new(Vec::new()),
                pulled: Mutex::new(Vec::new()),
                reachable: AtomicBool::new(true),
            }
        }

        pub fn with_models(mut self, models: &[&str]) -> Self {
            self.models = models.iter().map(|m| m.to_string()).collect();
            self
        }

        pub fn push(&self, reply: Reply) {
            if let Ok(mut replies) = self.replies.lock() {
                replies.push_back(reply);
            }
        }

        pub fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default()
        }

        pub fn pulled(&self) -> Vec<String> {
            self.pulled.lock().map(|p| p.clone()).unwrap_or_default()
        }

        fn unreachable(&self) -> Option<ChatError> {
            if self.reachable.load(Ordering::SeqCst) {
                None
            } else {
                Some(ChatError::Upstream("connection refused".to_string()))
            }
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn model(&self) -> &str {
            &self.model
        }

        async fn list_models(&self) -> Result<Vec<String>, ChatError> {
            match self.unreachable() {
                Some(err) => Err(err),
                None => Ok(self.models.clone()),
            }
        }

        async fn pull_model(&self, name: &str) -> Result<(), ChatError> {
            if let Some(err) = self.unreachable() {
                return Err(err);
            }
            if let Ok(mut pulled) = self.pulled.lock() {
                pulled.push(name.to_string());
            }
            Ok(())
        }

        async fn complete(&self, request: &ModelRequest) -> Result<String, ChatError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            if let Some(err) = self.unreachable() {
                return Err(err);
            }
            let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
            match next {
                Some(Reply::Text(text)) => Ok(text),
                Some(Reply::Fail(message)) => Err(ChatError::Upstream(message)),
                Some(Reply::Delay(delay, text)) => {
                    tokio::time::sleep(delay).await;
                    Ok(text)
                }
                None => Ok(self.default_reply.clone()),
            }
        }
    }
}
