use assistant_core::{AssistantError, ConversationTurn, NormalizedResult, Result, Settings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod anthropic;
pub mod baidu;
pub mod catalog;
pub mod messages;
pub mod openai_compat;
pub mod registry;
pub mod stub;
pub mod transport;

pub use anthropic::AnthropicAdapter;
pub use baidu::BaiduAdapter;
pub use catalog::{credential_status, supported_models, CredentialStatus, ModelInfo};
pub use messages::{build_messages, ChatMessage, Role};
pub use openai_compat::ChatCompletionsAdapter;
pub use registry::AdapterRegistry;
pub use stub::UnimplementedAdapter;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

/// The statically declared provider set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Google,
    Anthropic,
    Baidu,
    Zhipu,
    Moonshot,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::OpenAi,
        ProviderId::Google,
        ProviderId::Anthropic,
        ProviderId::Baidu,
        ProviderId::Zhipu,
        ProviderId::Moonshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Google => "google",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Baidu => "baidu",
            ProviderId::Zhipu => "zhipu",
            ProviderId::Moonshot => "moonshot",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| AssistantError::UnknownProvider(s.to_string()))
    }
}

/// Translates the uniform query contract to and from one provider's wire format.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn invoke(
        &self,
        query: &str,
        page_content: &str,
        turns: &[ConversationTurn],
        settings: &Settings,
    ) -> Result<NormalizedResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_round_trip() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
            assert_eq!(serde_json::to_value(id).unwrap(), serde_json::json!(id.as_str()));
        }
    }

    #[test]
    fn test_unknown_provider_id() {
        let err = "openia".parse::<ProviderId>().unwrap_err();
        assert!(matches!(err, AssistantError::UnknownProvider(ref id) if id == "openia"));
    }
}
