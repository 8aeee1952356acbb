//! Messages exchanged between UI contexts and the background context.

use assistant_conversation::ConversationRecord;
use assistant_core::{ConversationTurn, NormalizedResult, QueryRequest, Settings};
use assistant_providers::CredentialStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a connected context is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextKind {
    /// A page-embedded UI surface.
    Page,
    /// The toolbar control surface.
    Control,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Request {
    GetSettings,
    ToggleVisibility,
    Query(QueryRequest),
    SaveConversation {
        url: String,
        #[serde(default)]
        title: String,
        turns: Vec<ConversationTurn>,
    },
    ListHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    ClearHistory,
    GetStatus,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::GetSettings => "get-settings",
            Request::ToggleVisibility => "toggle-visibility",
            Request::Query(_) => "query",
            Request::SaveConversation { .. } => "save-conversation",
            Request::ListHistory { .. } => "list-history",
            Request::ClearHistory => "clear-history",
            Request::GetStatus => "get-status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "kebab-case")]
pub enum Response {
    Settings(Settings),
    Visibility { enabled: bool },
    Answer(NormalizedResult),
    Success { success: bool },
    History(Vec<ConversationRecord>),
    Status {
        credential: CredentialStatus,
        provider: String,
        model: String,
    },
    Error { error: String },
}

impl Response {
    pub fn success() -> Self {
        Response::Success { success: true }
    }

    pub fn error(error: impl fmt::Display) -> Self {
        Response::Error {
            error: error.to_string(),
        }
    }
}

/// Unsolicited notifications from the background context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Push {
    ResponseReady(NormalizedResult),
    VisibilityChanged { enabled: bool },
}

/// A request on its way to the background context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub correlation_id: Uuid,
    pub origin: ContextId,
    pub request: Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub correlation_id: Uuid,
    pub response: Response,
}

/// Traffic from UI contexts into the background context, in send order.
#[derive(Debug)]
pub(crate) enum Inbound {
    Request(Envelope),
    Departed(ContextId),
}

/// Anything the background context sends to a UI context.
#[derive(Debug, Clone)]
pub enum Delivery {
    Reply(Reply),
    Push(Push),
}
