use assistant_core::{AssistantError, Result};
use std::collections::HashMap;
use std::sync::Arc;

use crate::anthropic::AnthropicAdapter;
use crate::baidu::BaiduAdapter;
use crate::openai_compat::ChatCompletionsAdapter;
use crate::stub::UnimplementedAdapter;
use crate::transport::HttpTransport;
use crate::{ProviderAdapter, ProviderId};

/// Maps provider ids to their adapters.
///
/// Populated once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every declared provider, all sharing `transport`.
    pub fn with_default_adapters(transport: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::new();

        registry.register(ChatCompletionsAdapter::openai(transport.clone()));
        registry.register(ChatCompletionsAdapter::zhipu(transport.clone()));
        registry.register(ChatCompletionsAdapter::moonshot(transport.clone()));
        registry.register(AnthropicAdapter::new(transport.clone()));
        registry.register(BaiduAdapter::new(transport));
        registry.register(UnimplementedAdapter::google());

        registry
    }

    /// Adds or replaces the adapter for its provider.
    pub fn register(&mut self, adapter: impl ProviderAdapter + 'static) {
        self.adapters.insert(adapter.provider(), Arc::new(adapter));
    }

    pub fn resolve(&self, provider_id: &str) -> Result<Arc<dyn ProviderAdapter>> {
        let id: ProviderId = provider_id.parse()?;
        self.adapters
            .get(&id)
            .cloned()
            .ok_or_else(|| AssistantError::UnknownProvider(provider_id.to_string()))
    }

    /// Registered provider ids in declaration order.
    pub fn providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.adapters.contains_key(id))
            .collect()
    }
}
