use assistant_core::{AssistantError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::endpoint::ContextEndpoint;
use crate::orchestrator::{Notifier, Orchestrator};
use crate::protocol::{ContextId, ContextKind, Delivery, Inbound, Push, Reply};

struct ContextHandle {
    kind: ContextKind,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// Connected UI contexts and which of them is active.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<ContextId, ContextHandle>>,
    active: RwLock<Option<ContextId>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, id: ContextId, kind: ContextKind, sender: mpsc::UnboundedSender<Delivery>) {
        self.contexts
            .write()
            .await
            .insert(id, ContextHandle { kind, sender });
        debug!("Context {} ({:?}) connected", id, kind);
    }

    pub async fn unregister(&self, id: ContextId) {
        self.contexts.write().await.remove(&id);
        let mut active = self.active.write().await;
        if *active == Some(id) {
            *active = None;
        }
        debug!("Context {} disconnected", id);
    }

    /// Marks `id` as the active page context. Only page contexts can be active.
    pub async fn activate(&self, id: ContextId) -> Result<()> {
        match self.contexts.read().await.get(&id) {
            Some(handle) if handle.kind == ContextKind::Page => {}
            Some(_) => return Err(AssistantError::Broker(format!("Context {} is not a page context", id))),
            None => return Err(AssistantError::Broker(format!("Unknown context {}", id))),
        }
        *self.active.write().await = Some(id);
        Ok(())
    }

    pub async fn active(&self) -> Option<ContextId> {
        *self.active.read().await
    }

    pub async fn deliver(&self, id: ContextId, delivery: Delivery) -> Result<()> {
        let contexts = self.contexts.read().await;
        let handle = contexts
            .get(&id)
            .ok_or_else(|| AssistantError::Broker(format!("Context {} is gone", id)))?;
        handle
            .sender
            .send(delivery)
            .map_err(|_| AssistantError::Broker(format!("Context {} stopped listening", id)))
    }
}

#[async_trait]
impl Notifier for ContextRegistry {
    async fn notify(&self, context: ContextId, push: Push) -> Result<()> {
        self.deliver(context, Delivery::Push(push)).await
    }

    async fn notify_active(&self, push: Push) -> Result<()> {
        match self.active().await {
            Some(id) => self.deliver(id, Delivery::Push(push)).await,
            None => {
                debug!("No active context to notify");
                Ok(())
            }
        }
    }
}

/// The background context: accepts envelopes from every connected context
/// and answers each one on its own task, so a slow query never holds up a
/// toggle or a history read.
pub struct Broker {
    orchestrator: Arc<Orchestrator>,
    contexts: Arc<ContextRegistry>,
    inbox: mpsc::UnboundedSender<Inbound>,
    worker: JoinHandle<()>,
}

impl Broker {
    /// Starts the dispatch loop. `contexts` must be the same registry the
    /// orchestrator notifies through.
    ///
    /// Departures are applied inline, so a request sent after a context went
    /// away never sees that context as connected or active.
    pub fn spawn(orchestrator: Arc<Orchestrator>, contexts: Arc<ContextRegistry>) -> Self {
        let (inbox, mut inbound) = mpsc::unbounded_channel::<Inbound>();
        let loop_contexts = Arc::clone(&contexts);
        let loop_orchestrator = Arc::clone(&orchestrator);

        let worker = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let envelope = match message {
                    Inbound::Departed(id) => {
                        loop_contexts.unregister(id).await;
                        continue;
                    }
                    Inbound::Request(envelope) => envelope,
                };

                let orchestrator = Arc::clone(&loop_orchestrator);
                let contexts = Arc::clone(&loop_contexts);
                tokio::spawn(async move {
                    debug!(
                        "Handling {} {} from {}",
                        envelope.request.action(),
                        envelope.correlation_id,
                        envelope.origin
                    );
                    let response = orchestrator.dispatch(envelope.origin, envelope.request).await;
                    let reply = Reply {
                        correlation_id: envelope.correlation_id,
                        response,
                    };
                    if let Err(e) = contexts.deliver(envelope.origin, Delivery::Reply(reply)).await {
                        warn!("Reply {} undeliverable: {}", envelope.correlation_id, e);
                    }
                });
            }
            info!("Broker inbox closed");
        });

        Self {
            orchestrator,
            contexts,
            inbox,
            worker,
        }
    }

    /// Connects a new UI context. Dropping the returned endpoint disconnects it.
    pub async fn connect(&self, kind: ContextKind) -> ContextEndpoint {
        let id = ContextId::new();
        let (sender, deliveries) = mpsc::unbounded_channel();
        self.contexts.register(id, kind, sender).await;
        ContextEndpoint::new(id, self.inbox.clone(), deliveries)
    }

    pub async fn activate(&self, id: ContextId) -> Result<()> {
        self.contexts.activate(id).await
    }

    /// Stops accepting requests once background writes have landed.
    pub async fn shutdown(self) {
        self.orchestrator.flush().await;
        info!("Broker shut down");
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
