//! Anthropic messages API adapter.

use assistant_core::{AssistantError, ConversationTurn, NormalizedResult, Result, Settings};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::messages::{build_messages, extract_text, failure, ChatMessage, Role};
use crate::transport::{HttpRequest, HttpTransport};
use crate::{ProviderAdapter, ProviderId};

pub const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const TEXT_POINTER: &str = "/content/0/text";
const ERROR_POINTER: &str = "/error/message";
const FALLBACK_ERROR: &str = "Anthropic API request failed";

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    system: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
}

pub struct AnthropicAdapter {
    endpoint: String,
    transport: Arc<dyn HttpTransport>,
}

impl AnthropicAdapter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            endpoint: ANTHROPIC_ENDPOINT.to_string(),
            transport,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Splits the canonical sequence into the top-level system prompt and the
/// user/assistant exchange the messages API expects.
fn split_system(messages: Vec<ChatMessage>) -> (String, Vec<ChatMessage>) {
    let mut system = String::new();
    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == Role::System {
            system = message.content;
        } else {
            rest.push(message);
        }
    }
    (system, rest)
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    #[instrument(skip_all, fields(provider = "anthropic", model = %settings.model_id))]
    async fn invoke(
        &self,
        query: &str,
        page_content: &str,
        turns: &[ConversationTurn],
        settings: &Settings,
    ) -> Result<NormalizedResult> {
        let provider = ProviderId::Anthropic.as_str();
        let (system, messages) = split_system(build_messages(query, page_content, turns));
        debug!("Sending {} messages", messages.len());

        let body = MessagesBody {
            model: &settings.model_id,
            system: &system,
            messages: &messages,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        };
        let request = HttpRequest::post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", settings.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(serde_json::to_value(&body)?);

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| AssistantError::provider(provider, e.to_string()))?;

        if !response.is_success() {
            return Err(failure(provider, &response, ERROR_POINTER, FALLBACK_ERROR));
        }

        Ok(NormalizedResult {
            text: extract_text(provider, &response, TEXT_POINTER)?,
            provider_id: provider.to_string(),
        })
    }
}
