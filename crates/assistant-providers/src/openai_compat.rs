//! Adapter for providers speaking the OpenAI chat-completions dialect.
//!
//! OpenAI, Zhipu and Moonshot share request and response shapes and only
//! differ in endpoint and fallback error text.

use assistant_core::{ConversationTurn, NormalizedResult, Result, Settings};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::messages::{build_messages, extract_text, failure, ChatMessage};
use crate::transport::{HttpRequest, HttpTransport};
use crate::{ProviderAdapter, ProviderId};

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const ZHIPU_ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
pub const MOONSHOT_ENDPOINT: &str = "https://api.moonshot.cn/v1/chat/completions";

const TEXT_POINTER: &str = "/choices/0/message/content";
const ERROR_POINTER: &str = "/error/message";

#[derive(Debug, Serialize)]
struct ChatCompletionsBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

pub struct ChatCompletionsAdapter {
    provider: ProviderId,
    endpoint: String,
    fallback_error: &'static str,
    transport: Arc<dyn HttpTransport>,
}

impl ChatCompletionsAdapter {
    pub fn openai(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            provider: ProviderId::OpenAi,
            endpoint: OPENAI_ENDPOINT.to_string(),
            fallback_error: "OpenAI API request failed",
            transport,
        }
    }

    pub fn zhipu(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            provider: ProviderId::Zhipu,
            endpoint: ZHIPU_ENDPOINT.to_string(),
            fallback_error: "Zhipu API request failed",
            transport,
        }
    }

    pub fn moonshot(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            provider: ProviderId::Moonshot,
            endpoint: MOONSHOT_ENDPOINT.to_string(),
            fallback_error: "Moonshot API request failed",
            transport,
        }
    }

    /// Point the adapter at a compatible gateway instead of the vendor endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request(&self, messages: &[ChatMessage], settings: &Settings) -> Result<HttpRequest> {
        let body = ChatCompletionsBody {
            model: &settings.model_id,
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };

        Ok(HttpRequest::post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", settings.api_key))
            .json(serde_json::to_value(&body)?))
    }
}

#[async_trait]
impl ProviderAdapter for ChatCompletionsAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    #[instrument(skip_all, fields(provider = %self.provider, model = %settings.model_id))]
    async fn invoke(
        &self,
        query: &str,
        page_content: &str,
        turns: &[ConversationTurn],
        settings: &Settings,
    ) -> Result<NormalizedResult> {
        let provider = self.provider.as_str();
        let messages = build_messages(query, page_content, turns);
        debug!("Sending {} messages", messages.len());

        let request = self.build_request(&messages, settings)?;
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| assistant_core::AssistantError::provider(provider, e.to_string()))?;

        if !response.is_success() {
            return Err(failure(provider, &response, ERROR_POINTER, self.fallback_error));
        }

        let text = extract_text(provider, &response, TEXT_POINTER)?;
        Ok(NormalizedResult {
            text,
            provider_id: provider.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, MockHttpTransport, TransportError};
    use assistant_core::AssistantError;
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            provider_id: "zhipu".into(),
            model_id: "glm-4".into(),
            api_key: "zk-1".into(),
            max_tokens: 256,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn test_zhipu_request_shape() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(|request| {
                let body = request.body.as_ref().unwrap();
                request.url == ZHIPU_ENDPOINT
                    && request.header_value("Authorization") == Some("Bearer zk-1")
                    && request.header_value("Content-Type") == Some("application/json")
                    && body["model"] == "glm-4"
                    && body["max_tokens"] == 256
                    && body["temperature"] == 0.3
                    && body["messages"].as_array().map(|m| m.len()) == Some(2)
            })
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    json!({"choices": [{"message": {"content": "glm says hi"}}]}).to_string(),
                ))
            });

        let adapter = ChatCompletionsAdapter::zhipu(Arc::new(transport));
        let result = adapter.invoke("hi?", "page", &[], &settings()).await.unwrap();

        assert_eq!(result.text, "glm says hi");
        assert_eq!(result.provider_id, "zhipu");
    }

    #[tokio::test]
    async fn test_fallback_message_without_error_body() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Ok(HttpResponse::new(503, "Service Unavailable")));

        let adapter = ChatCompletionsAdapter::moonshot(Arc::new(transport));
        let err = adapter.invoke("q", "p", &[], &settings()).await.unwrap_err();

        match err {
            AssistantError::Provider { provider, message } => {
                assert_eq!(provider, "moonshot");
                assert_eq!(message, "Moonshot API request failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_provider_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Err(TransportError("connection refused".into())));

        let adapter = ChatCompletionsAdapter::openai(Arc::new(transport));
        let err = adapter.invoke("q", "p", &[], &settings()).await.unwrap_err();
        assert!(matches!(err, AssistantError::Provider { ref message, .. } if message.contains("connection refused")));
    }
}
