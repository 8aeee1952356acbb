//! Baidu ERNIE adapter.
//!
//! The stored credential is an `API_KEY:SECRET_KEY` pair which is first
//! exchanged for an access token; the chat call then carries that token as a
//! query parameter. Tokens are fetched per call and never cached.

use assistant_core::{AssistantError, ConversationTurn, NormalizedResult, Result, Settings};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::messages::{build_messages, extract_text, failure, string_at, ChatMessage};
use crate::transport::{HttpRequest, HttpTransport};
use crate::{ProviderAdapter, ProviderId};

pub const BAIDU_TOKEN_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";
pub const BAIDU_CHAT_BASE_URL: &str = "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat";

const TEXT_POINTER: &str = "/result";
const ERROR_POINTER: &str = "/error_msg";
const FALLBACK_ERROR: &str = "Baidu ERNIE API request failed";
const TOP_P: f64 = 0.8;

#[derive(Debug, Serialize)]
struct ErnieBody<'a> {
    messages: &'a [ChatMessage],
    temperature: f64,
    top_p: f64,
    stream: bool,
}

/// Splits `API_KEY:SECRET_KEY` at the first separator.
///
/// The secret keeps any further `:` characters.
pub fn split_key_pair(credential: &str) -> Option<(&str, &str)> {
    let (key, secret) = credential.trim().split_once(':')?;
    if key.is_empty() || secret.is_empty() {
        return None;
    }
    Some((key, secret))
}

pub struct BaiduAdapter {
    token_url: String,
    chat_base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl BaiduAdapter {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            token_url: BAIDU_TOKEN_URL.to_string(),
            chat_base_url: BAIDU_CHAT_BASE_URL.to_string(),
            transport,
        }
    }

    pub fn with_urls(mut self, token_url: impl Into<String>, chat_base_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.chat_base_url = chat_base_url.into();
        self
    }

    async fn access_token(&self, api_key: &str, secret_key: &str) -> Result<String> {
        let provider = ProviderId::Baidu.as_str();
        let request = HttpRequest::post(&self.token_url)
            .query_param("grant_type", "client_credentials")
            .query_param("client_id", api_key)
            .query_param("client_secret", secret_key)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| AssistantError::token_exchange(provider, e.to_string()))?;

        if !response.is_success() {
            warn!("Token endpoint answered with status {}", response.status);
            let detail = response
                .json()
                .and_then(|body| string_at(&body, "/error_description"))
                .unwrap_or_else(|| format!("token endpoint returned status {}", response.status));
            return Err(AssistantError::token_exchange(provider, detail));
        }

        response
            .json()
            .and_then(|body| string_at(&body, "/access_token"))
            .ok_or_else(|| AssistantError::token_exchange(provider, "response carried no access_token"))
    }
}

#[async_trait]
impl ProviderAdapter for BaiduAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Baidu
    }

    #[instrument(skip_all, fields(provider = "baidu", model = %settings.model_id))]
    async fn invoke(
        &self,
        query: &str,
        page_content: &str,
        turns: &[ConversationTurn],
        settings: &Settings,
    ) -> Result<NormalizedResult> {
        let provider = ProviderId::Baidu.as_str();
        let (api_key, secret_key) = split_key_pair(&settings.api_key).ok_or_else(|| {
            AssistantError::token_exchange(provider, "credential must have the form API_KEY:SECRET_KEY")
        })?;

        let token = self.access_token(api_key, secret_key).await?;
        debug!("Obtained access token");

        let messages = build_messages(query, page_content, turns);
        let body = ErnieBody {
            messages: &messages,
            temperature: settings.temperature,
            top_p: TOP_P,
            stream: false,
        };
        let request = HttpRequest::post(format!("{}/{}", self.chat_base_url, settings.model_id))
            .query_param("access_token", token)
            .header("Content-Type", "application/json")
            .json(serde_json::to_value(&body)?);

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| AssistantError::provider(provider, e.to_string()))?;

        // ERNIE reports some failures with a 200 status and an error_msg body.
        let reported_error = response.json().and_then(|body| string_at(&body, ERROR_POINTER));
        if !response.is_success() || reported_error.is_some() {
            return Err(failure(provider, &response, ERROR_POINTER, FALLBACK_ERROR));
        }

        Ok(NormalizedResult {
            text: extract_text(provider, &response, TEXT_POINTER)?,
            provider_id: provider.to_string(),
        })
    }
}
