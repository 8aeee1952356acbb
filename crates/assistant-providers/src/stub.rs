use assistant_core::{AssistantError, ConversationTurn, NormalizedResult, Result, Settings};
use async_trait::async_trait;
use tracing::warn;

use crate::{ProviderAdapter, ProviderId};

/// Placeholder for a declared provider without a working backend.
///
/// Every call fails with [`AssistantError::NotImplemented`] and never
/// touches the network.
pub struct UnimplementedAdapter {
    provider: ProviderId,
}

impl UnimplementedAdapter {
    pub fn new(provider: ProviderId) -> Self {
        Self { provider }
    }

    pub fn google() -> Self {
        Self::new(ProviderId::Google)
    }
}

#[async_trait]
impl ProviderAdapter for UnimplementedAdapter {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn invoke(
        &self,
        _query: &str,
        _page_content: &str,
        _turns: &[ConversationTurn],
        _settings: &Settings,
    ) -> Result<NormalizedResult> {
        warn!("Query routed to unimplemented provider {}", self.provider);
        Err(AssistantError::NotImplemented(self.provider.to_string()))
    }
}
