use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation settings shared by every provider call.
///
/// Owned by the settings collaborator; the core only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub provider_id: String,
    pub model_id: String,
    /// Opaque credential. Its internal layout is provider-defined
    /// (a plain bearer key for most, `API_KEY:SECRET_KEY` for baidu).
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: "openai".to_string(),
            model_id: "gpt-3.5-turbo".to_string(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Settings {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Copy of the settings safe to log or display.
    pub fn redacted(&self) -> Self {
        let api_key = if self.has_credential() {
            "********".to_string()
        } else {
            String::new()
        };
        Self {
            api_key,
            ..self.clone()
        }
    }
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

/// One message of a conversation, either from the user or the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub text: String,
    pub is_user: bool,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
        }
    }
}

/// A question about one page, together with the conversation so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    pub page_content: String,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, page_content: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page_content: page_content.into(),
            turns: Vec::new(),
            url: String::new(),
            title: String::new(),
        }
    }

    pub fn with_turns(mut self, turns: Vec<ConversationTurn>) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_page(mut self, url: impl Into<String>, title: impl Into<String>) -> Self {
        self.url = url.into();
        self.title = title.into();
        self
    }

    /// The conversation as it stands once `answer` has been given.
    pub fn completed_turns(&self, answer: &str) -> Vec<ConversationTurn> {
        let mut turns = self.turns.clone();
        turns.push(ConversationTurn::user(self.query.clone()));
        turns.push(ConversationTurn::assistant(answer));
        turns
    }
}

/// Provider answer reduced to the single top completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub text: String,
    pub provider_id: String,
}

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("No API key configured. Set one in the settings first.")]
    MissingCredential,

    #[error("Unsupported provider: {0}")]
    UnknownProvider(String),

    #[error("Provider '{0}' is not implemented yet")]
    NotImplemented(String),

    #[error("Failed to obtain {provider} access token: {message}")]
    TokenExchange { provider: String, message: String },

    #[error("{message}")]
    Provider { provider: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(String),

    /// Failure reported by the other side of a context boundary, as text.
    #[error("{0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AssistantError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn token_exchange(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TokenExchange {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before any network traffic.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::UnknownProvider(_))
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_wire_format() {
        let turn = ConversationTurn::user("hello");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hello", "isUser": true}));
    }

    #[test]
    fn test_completed_turns_appends_query_then_answer() {
        let request = QueryRequest::new("second?", "page")
            .with_turns(vec![ConversationTurn::user("first?"), ConversationTurn::assistant("yes")]);

        let turns = request.completed_turns("no");
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2], ConversationTurn::user("second?"));
        assert_eq!(turns[3], ConversationTurn::assistant("no"));
        // the request itself is untouched
        assert_eq!(request.turns.len(), 2);
    }

    #[test]
    fn test_provider_error_displays_provider_message() {
        let err = AssistantError::provider("openai", "invalid key");
        assert_eq!(err.to_string(), "invalid key");
        assert!(!err.is_precondition());
        assert!(AssistantError::MissingCredential.is_precondition());
    }

    #[test]
    fn test_redacted_settings_hide_key() {
        let settings = Settings {
            api_key: "sk-secret".into(),
            ..Settings::default()
        };
        assert_eq!(settings.redacted().api_key, "********");
        assert_eq!(Settings::default().redacted().api_key, "");
    }
}
