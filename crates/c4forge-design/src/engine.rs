use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use llm::LLMProvider;
use tracing::{debug, warn};

use c4forge_core::AiSettings;

use crate::prompt::{PromptMessage, Role};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("build LLM: {0}")]
    Build(String),

    #[error("chat: {0}")]
    Chat(String),

    #[error("LLM returned no text")]
    EmptyReply,
}

/// A chat completion service: ordered role-tagged messages in, reply text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ModelError>;
}

fn map_backend(provider: &str) -> Result<LLMBackend, ModelError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(ModelError::UnknownProvider(other.to_string())),
    }
}

/// [`ChatModel`] backed by the `llm` crate, configured from [`AiSettings`].
pub struct LlmChatModel {
    settings: AiSettings,
}

impl LlmChatModel {
    pub fn new(settings: AiSettings) -> Self {
        Self { settings }
    }

    fn build(&self, system: &str) -> Result<Box<dyn LLMProvider>, ModelError> {
        let settings = &self.settings;
        let backend = map_backend(&settings.provider)?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&settings.model)
            .timeout_seconds(settings.timeout_secs);

        if !system.is_empty() {
            builder = builder.system(system);
        }
        if !settings.api_key.is_empty() {
            builder = builder.api_key(&settings.api_key);
        }
        if let Some(url) = &settings.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temperature) = settings.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = settings.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.build().map_err(|e| ModelError::Build(e.to_string()))
    }
}

#[async_trait]
impl ChatModel for LlmChatModel {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ModelError> {
        // The llm crate takes system text on the builder, not as a chat message.
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let chat: Vec<ChatMessage> = messages
            .iter()
            .filter_map(|m| match m.role {
                Role::System => None,
                Role::User => Some(ChatMessage::user().content(&m.content).build()),
                Role::Assistant => Some(ChatMessage::assistant().content(&m.content).build()),
            })
            .collect();

        let llm = self.build(&system)?;
        debug!(
            "sending {} messages to {} ({})",
            chat.len(),
            self.settings.provider,
            self.settings.model
        );

        let response = llm
            .chat(&chat)
            .await
            .map_err(|e| ModelError::Chat(e.to_string()))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ModelError::EmptyReply),
        }
    }
}

const PING: &str = "Are you running? Answer with one word.";

/// Whether `model` answers a trivial prompt at all.
pub async fn ping(model: &dyn ChatModel) -> bool {
    match model.complete(&[PromptMessage::user(PING)]).await {
        Ok(_) => true,
        Err(e) => {
            warn!("model health check failed: {e}");
            false
        }
    }
}

/// Health check against the configured provider.
pub async fn health_check(settings: &AiSettings) -> bool {
    ping(&LlmChatModel::new(settings.clone())).await
}
