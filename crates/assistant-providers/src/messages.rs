use assistant_core::{AssistantError, ConversationTurn, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::HttpResponse;

/// Text placed before the page content in the system message.
pub const CONTEXT_PREAMBLE: &str = "You are a web page assistant. Your task is to answer questions \
based on the content of the page the user is currently viewing. Here is the content of the current page:\n\n";

/// Text placed after the page content in the system message.
pub const CONTEXT_POSTSCRIPT: &str = "\n\nAnswer the user's question based on the page content above. \
If the question is unrelated to the page, politely tell the user that you can only answer questions \
about the current page.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// System instruction with the page content embedded verbatim.
pub fn system_context(page_content: &str) -> String {
    format!("{CONTEXT_PREAMBLE}{page_content}{CONTEXT_POSTSCRIPT}")
}

/// Canonical message sequence: system context, prior turns in order, then the query.
pub fn build_messages(query: &str, page_content: &str, turns: &[ConversationTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(ChatMessage::new(Role::System, system_context(page_content)));
    messages.extend(turns.iter().map(|turn| {
        let role = if turn.is_user { Role::User } else { Role::Assistant };
        ChatMessage::new(role, turn.text.clone())
    }));
    messages.push(ChatMessage::new(Role::User, query));
    messages
}

/// Provider error for a non-success response.
///
/// Uses the provider's own message at `error_pointer` when the body carries
/// one, the adapter's fallback text otherwise.
pub(crate) fn failure(
    provider: &str,
    response: &HttpResponse,
    error_pointer: &str,
    fallback: &str,
) -> AssistantError {
    let message = response
        .json()
        .as_ref()
        .and_then(|body| string_at(body, error_pointer))
        .unwrap_or_else(|| fallback.to_string());
    AssistantError::provider(provider, message)
}

/// Top completion text at `text_pointer`; anything else is a malformed response.
pub(crate) fn extract_text(provider: &str, response: &HttpResponse, text_pointer: &str) -> Result<String> {
    let body = response.json().ok_or_else(|| {
        AssistantError::provider(provider, format!("Malformed response from {}: body is not JSON", provider))
    })?;

    body.pointer(text_pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AssistantError::provider(
                provider,
                format!("Malformed response from {}: missing {}", provider, text_pointer),
            )
        })
}

pub(crate) fn string_at(body: &Value, pointer: &str) -> Option<String> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
