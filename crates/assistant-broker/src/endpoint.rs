use assistant_conversation::ConversationRecord;
use assistant_core::{AssistantError, ConversationTurn, NormalizedResult, QueryRequest, Result, Settings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::orchestrator::Status;
use crate::protocol::{ContextId, Delivery, Envelope, Inbound, Push, Request, Response};

type PendingReplies = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Response>>>>;

/// A UI context's connection to the background context.
///
/// Every request gets a fresh correlation id and a pending slot; the reader
/// task resolves exactly that slot when the matching reply arrives, in
/// whatever order replies come back. Dropping the endpoint disconnects the
/// context from the broker.
pub struct ContextEndpoint {
    id: ContextId,
    outbound: mpsc::UnboundedSender<Inbound>,
    pending: PendingReplies,
    pushes: mpsc::UnboundedReceiver<Push>,
    reader: JoinHandle<()>,
}

impl ContextEndpoint {
    pub(crate) fn new(
        id: ContextId,
        outbound: mpsc::UnboundedSender<Inbound>,
        mut deliveries: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (push_tx, pushes) = mpsc::unbounded_channel();

        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                match delivery {
                    Delivery::Reply(reply) => {
                        let waiter = reader_pending.lock().await.remove(&reply.correlation_id);
                        match waiter {
                            Some(tx) => {
                                // The requester may have given up; nothing to do then.
                                let _ = tx.send(reply.response);
                            }
                            None => warn!("Dropping reply for unknown correlation id {}", reply.correlation_id),
                        }
                    }
                    Delivery::Push(push) => {
                        if push_tx.send(push).is_err() {
                            debug!("Push receiver gone for {}", id);
                        }
                    }
                }
            }
        });

        Self {
            id,
            outbound,
            pending,
            pushes,
            reader,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Sends `request` and waits for its correlated reply.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation_id, tx);

        let envelope = Envelope {
            correlation_id,
            origin: self.id,
            request,
        };
        if self.outbound.send(Inbound::Request(envelope)).is_err() {
            self.pending.lock().await.remove(&correlation_id);
            return Err(AssistantError::Broker("Background context is not running".into()));
        }

        rx.await
            .map_err(|_| AssistantError::Broker("Reply channel closed before a response arrived".into()))
    }

    /// Next unsolicited notification, `None` once the broker side is gone.
    pub async fn next_push(&mut self) -> Option<Push> {
        self.pushes.recv().await
    }

    /// Non-blocking variant of [`next_push`](Self::next_push).
    pub fn try_next_push(&mut self) -> Option<Push> {
        self.pushes.try_recv().ok()
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        match self.request(Request::GetSettings).await? {
            Response::Settings(settings) => Ok(settings),
            other => unexpected(other),
        }
    }

    pub async fn toggle_visibility(&self) -> Result<bool> {
        match self.request(Request::ToggleVisibility).await? {
            Response::Visibility { enabled } => Ok(enabled),
            other => unexpected(other),
        }
    }

    pub async fn query(&self, request: QueryRequest) -> Result<NormalizedResult> {
        match self.request(Request::Query(request)).await? {
            Response::Answer(result) => Ok(result),
            other => unexpected(other),
        }
    }

    pub async fn save_conversation(&self, url: &str, title: &str, turns: Vec<ConversationTurn>) -> Result<()> {
        let request = Request::SaveConversation {
            url: url.to_string(),
            title: title.to_string(),
            turns,
        };
        match self.request(request).await? {
            Response::Success { .. } => Ok(()),
            other => unexpected(other),
        }
    }

    pub async fn list_history(&self, limit: Option<usize>) -> Result<Vec<ConversationRecord>> {
        match self.request(Request::ListHistory { limit }).await? {
            Response::History(records) => Ok(records),
            other => unexpected(other),
        }
    }

    pub async fn clear_history(&self) -> Result<()> {
        match self.request(Request::ClearHistory).await? {
            Response::Success { .. } => Ok(()),
            other => unexpected(other),
        }
    }

    pub async fn status(&self) -> Result<Status> {
        match self.request(Request::GetStatus).await? {
            Response::Status {
                credential,
                provider,
                model,
            } => Ok(Status {
                credential,
                provider,
                model,
            }),
            other => unexpected(other),
        }
    }
}

impl Drop for ContextEndpoint {
    fn drop(&mut self) {
        self.reader.abort();
        if self.outbound.send(Inbound::Departed(self.id)).is_err() {
            debug!("Broker already gone when {} disconnected", self.id);
        }
    }
}

fn unexpected<T>(response: Response) -> Result<T> {
    match response {
        Response::Error { error } => Err(AssistantError::Remote(error)),
        other => Err(AssistantError::Broker(format!("Unexpected response: {:?}", other))),
    }
}
