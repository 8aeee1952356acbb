use assistant_config::SettingsStore;
use assistant_conversation::{ConversationStore, KeyValueStore};
use assistant_core::{AssistantError, NormalizedResult, QueryRequest, Result, Settings};
use assistant_providers::{credential_status, AdapterRegistry, CredentialStatus, ProviderId};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::protocol::{ContextId, Push, Request, Response};

/// Persisted key of the page UI visibility flag.
pub const VISIBILITY_KEY: &str = "sidebarEnabled";

/// Outbound side of the broker as seen by the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Push to one specific context.
    async fn notify(&self, context: ContextId, push: Push) -> Result<()>;

    /// Push to the currently active UI context only. A no-op when none is active.
    async fn notify_active(&self, push: Push) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub credential: CredentialStatus,
    pub provider: String,
    pub model: String,
}

/// Background-context logic behind every dispatch action.
pub struct Orchestrator {
    settings: Arc<dyn SettingsStore>,
    registry: AdapterRegistry,
    history: Arc<ConversationStore>,
    flags: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        registry: AdapterRegistry,
        history: Arc<ConversationStore>,
        flags: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            registry,
            history,
            flags,
            notifier,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Runs one query end to end.
    ///
    /// The credential and provider are checked before any network call. On
    /// success the conversation is persisted in the background and the answer
    /// is pushed to `origin`; neither can turn a success into a failure.
    #[instrument(skip_all, fields(origin = %origin, provider = %settings.provider_id))]
    pub async fn handle_query(
        &self,
        origin: ContextId,
        request: &QueryRequest,
        settings: &Settings,
    ) -> Result<NormalizedResult> {
        if !settings.has_credential() {
            warn!("Query rejected: no API key configured");
            return Err(AssistantError::MissingCredential);
        }

        let adapter = self.registry.resolve(&settings.provider_id)?;
        debug!("Dispatching query with {} prior turns", request.turns.len());

        let result = adapter
            .invoke(&request.query, &request.page_content, &request.turns, settings)
            .await?;
        info!("Query answered by {}", result.provider_id);

        let history = Arc::clone(&self.history);
        let url = request.url.clone();
        let title = request.title.clone();
        let turns = request.completed_turns(&result.text);
        let write = tokio::spawn(async move {
            if let Err(e) = history.upsert(&url, &title, turns).await {
                error!("Failed to persist conversation for {}: {}", url, e);
            }
        });
        {
            let mut background = self.background.lock().await;
            background.retain(|task| !task.is_finished());
            background.push(write);
        }

        if let Err(e) = self
            .notifier
            .notify(origin, Push::ResponseReady(result.clone()))
            .await
        {
            warn!("Could not push response to {}: {}", origin, e);
        }

        Ok(result)
    }

    /// Waits for every background conversation write started so far.
    pub async fn flush(&self) {
        let pending = std::mem::take(&mut *self.background.lock().await);
        for task in pending {
            if let Err(e) = task.await {
                warn!("Background write did not complete: {}", e);
            }
        }
    }

    /// Flips the visibility flag and tells the active UI context about it.
    #[instrument(skip(self))]
    pub async fn toggle_visibility(&self) -> Result<bool> {
        let current = self
            .flags
            .get(VISIBILITY_KEY)
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        let enabled = !current;

        self.flags.set(VISIBILITY_KEY, Value::Bool(enabled)).await?;
        info!("Page UI visibility set to {}", enabled);

        if let Err(e) = self
            .notifier
            .notify_active(Push::VisibilityChanged { enabled })
            .await
        {
            warn!("Could not notify active context: {}", e);
        }
        Ok(enabled)
    }

    /// First-run setup: stores default settings and enables the page UI.
    ///
    /// Returns `false` without touching anything when settings already exist.
    pub async fn initialize_defaults(&self) -> Result<bool> {
        if self.settings.try_load().await?.is_some() {
            debug!("Settings present, skipping defaults");
            return Ok(false);
        }

        self.settings.save(&Settings::default()).await?;
        self.flags.set(VISIBILITY_KEY, Value::Bool(true)).await?;
        info!("Installed default settings");
        Ok(true)
    }

    pub async fn status(&self) -> Result<Status> {
        let settings = self.settings.load().await?;
        let credential = match settings.provider_id.parse::<ProviderId>() {
            Ok(provider) => credential_status(provider, &settings.api_key),
            Err(_) if !settings.has_credential() => CredentialStatus::NotConfigured,
            Err(_) => CredentialStatus::InvalidFormat,
        };
        Ok(Status {
            credential,
            provider: settings.provider_id,
            model: settings.model_id,
        })
    }

    /// Answers one dispatch request. Failures become `Response::Error`.
    pub async fn dispatch(&self, origin: ContextId, request: Request) -> Response {
        let action = request.action();
        let outcome = match request {
            Request::GetSettings => self.settings.load().await.map(|s| Response::Settings(s.redacted())),
            Request::ToggleVisibility => self
                .toggle_visibility()
                .await
                .map(|enabled| Response::Visibility { enabled }),
            Request::Query(query) => match self.settings.load().await {
                Ok(settings) => self
                    .handle_query(origin, &query, &settings)
                    .await
                    .map(Response::Answer),
                Err(e) => Err(e),
            },
            Request::SaveConversation { url, title, turns } => self
                .history
                .upsert(&url, &title, turns)
                .await
                .map(|_| Response::success()),
            Request::ListHistory { limit: Some(n) } => self.history.recent(n).await.map(Response::History),
            Request::ListHistory { limit: None } => self.history.list().await.map(Response::History),
            Request::ClearHistory => self.history.clear().await.map(|_| Response::success()),
            Request::GetStatus => self.status().await.map(|status| Response::Status {
                credential: status.credential,
                provider: status.provider,
                model: status.model,
            }),
        };

        outcome.unwrap_or_else(|e| {
            debug!("{} failed: {}", action, e);
            Response::error(e)
        })
    }
}
