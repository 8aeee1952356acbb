pub mod broker;
pub mod endpoint;
pub mod orchestrator;
pub mod protocol;
pub mod session;

pub use broker::{Broker, ContextRegistry};
pub use endpoint::ContextEndpoint;
pub use orchestrator::{Notifier, Orchestrator, Status, VISIBILITY_KEY};
pub use protocol::{ContextId, ContextKind, Delivery, Envelope, Push, Reply, Request, Response};
pub use session::{ContentExtractor, PageSession, PageSnapshot, MAX_PAGE_CHARS};
