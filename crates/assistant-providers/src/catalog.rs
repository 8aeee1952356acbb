//! Static provider metadata used by the settings surface.

use serde::{Deserialize, Serialize};

use crate::baidu::split_key_pair;
use crate::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub label: &'static str,
}

const fn model(id: &'static str, label: &'static str) -> ModelInfo {
    ModelInfo { id, label }
}

const OPENAI_MODELS: &[ModelInfo] = &[
    model("gpt-3.5-turbo", "GPT-3.5 Turbo"),
    model("gpt-4", "GPT-4"),
    model("gpt-4-turbo", "GPT-4 Turbo"),
];
const GOOGLE_MODELS: &[ModelInfo] = &[
    model("gemini-pro", "Gemini Pro"),
    model("gemini-ultra", "Gemini Ultra"),
];
const ANTHROPIC_MODELS: &[ModelInfo] = &[
    model("claude-2", "Claude 2"),
    model("claude-instant", "Claude Instant"),
];
const BAIDU_MODELS: &[ModelInfo] = &[
    model("ernie-bot-4", "ERNIE Bot 4.0"),
    model("ernie-bot", "ERNIE Bot"),
    model("ernie-bot-lite", "ERNIE Bot Lite"),
];
const ZHIPU_MODELS: &[ModelInfo] = &[
    model("glm-4", "GLM-4"),
    model("glm-3-turbo", "GLM-3 Turbo"),
];
const MOONSHOT_MODELS: &[ModelInfo] = &[
    model("moonshot-v1-8k", "Moonshot v1 8K"),
    model("moonshot-v1-32k", "Moonshot v1 32K"),
    model("moonshot-v1-128k", "Moonshot v1 128K"),
];

/// Models offered for selection, first entry is the provider's default.
pub fn supported_models(provider: ProviderId) -> &'static [ModelInfo] {
    match provider {
        ProviderId::OpenAi => OPENAI_MODELS,
        ProviderId::Google => GOOGLE_MODELS,
        ProviderId::Anthropic => ANTHROPIC_MODELS,
        ProviderId::Baidu => BAIDU_MODELS,
        ProviderId::Zhipu => ZHIPU_MODELS,
        ProviderId::Moonshot => MOONSHOT_MODELS,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialStatus {
    NotConfigured,
    Configured,
    InvalidFormat,
}

/// Shape check of a stored credential. Nothing is sent to the provider.
pub fn credential_status(provider: ProviderId, api_key: &str) -> CredentialStatus {
    let key = api_key.trim();
    if key.is_empty() {
        return CredentialStatus::NotConfigured;
    }

    let well_formed = match provider {
        ProviderId::OpenAi | ProviderId::Anthropic => key.starts_with("sk-") && key.len() > 20,
        ProviderId::Google => key.len() > 20,
        ProviderId::Baidu => split_key_pair(key).is_some(),
        ProviderId::Zhipu | ProviderId::Moonshot => true,
    };

    if well_formed {
        CredentialStatus::Configured
    } else {
        CredentialStatus::InvalidFormat
    }
}
