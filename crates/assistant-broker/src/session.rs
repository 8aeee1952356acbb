use assistant_core::{ConversationTurn, NormalizedResult, QueryRequest, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::endpoint::ContextEndpoint;
use crate::protocol::Push;

/// Page text beyond this many characters is cut off.
pub const MAX_PAGE_CHARS: usize = 8000;

const TRUNCATION_MARKER: &str = "... (content truncated)";

/// Readable text of one page, normalized for prompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub title: String,
    pub text: String,
}

impl PageSnapshot {
    pub fn new(title: impl Into<String>, text: &str) -> Self {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let text = match collapsed.char_indices().nth(MAX_PAGE_CHARS) {
            Some((cut, _)) => format!("{}{}", &collapsed[..cut], TRUNCATION_MARKER),
            None => collapsed,
        };
        Self {
            title: title.into(),
            text,
        }
    }

    /// The form embedded in the system message.
    pub fn render(&self) -> String {
        format!("Title: {}\n\nContent:\n{}", self.title, self.text)
    }
}

/// Produces the snapshot of whatever page a UI context is attached to.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self) -> Result<PageSnapshot>;
}

/// Conversation state of one page UI context.
///
/// `ask` borrows the session mutably, so a session never has two queries in
/// flight at once.
pub struct PageSession {
    endpoint: ContextEndpoint,
    url: String,
    snapshot: PageSnapshot,
    turns: Vec<ConversationTurn>,
}

impl PageSession {
    pub fn new(endpoint: ContextEndpoint, url: impl Into<String>, snapshot: PageSnapshot) -> Self {
        Self {
            endpoint,
            url: url.into(),
            snapshot,
            turns: Vec::new(),
        }
    }

    pub async fn from_extractor(
        endpoint: ContextEndpoint,
        url: impl Into<String>,
        extractor: &dyn ContentExtractor,
    ) -> Result<Self> {
        let snapshot = extractor.extract().await?;
        Ok(Self::new(endpoint, url, snapshot))
    }

    /// Continues a conversation that was stored earlier.
    pub fn with_turns(mut self, turns: Vec<ConversationTurn>) -> Self {
        self.turns = turns;
        self
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn endpoint(&self) -> &ContextEndpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut ContextEndpoint {
        &mut self.endpoint
    }

    /// Asks about the page. The question and answer join the conversation
    /// only when the query succeeds.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn ask(&mut self, query: &str) -> Result<NormalizedResult> {
        let request = QueryRequest::new(query, self.snapshot.render())
            .with_turns(self.turns.clone())
            .with_page(self.url.clone(), self.snapshot.title.clone());

        let result = self.endpoint.query(request).await?;
        self.turns.push(ConversationTurn::user(query));
        self.turns.push(ConversationTurn::assistant(result.text.clone()));
        debug!("Conversation now has {} turns", self.turns.len());
        Ok(result)
    }

    /// Notifications received so far, oldest first. Each successful `ask`
    /// leaves a `response-ready` push behind.
    pub fn take_pushes(&mut self) -> Vec<Push> {
        std::iter::from_fn(|| self.endpoint.try_next_push()).collect()
    }

    /// Forgets the in-memory conversation. Stored history is left alone.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_collapses_whitespace() {
        let snapshot = PageSnapshot::new("Demo", "  Hello,\n\n\tworld   again ");
        assert_eq!(snapshot.text, "Hello, world again");
        assert_eq!(snapshot.render(), "Title: Demo\n\nContent:\nHello, world again");
    }

    #[test]
    fn test_snapshot_truncates_long_pages() {
        let long = "é".repeat(MAX_PAGE_CHARS + 10);
        let snapshot = PageSnapshot::new("Long", &long);

        assert!(snapshot.text.ends_with(TRUNCATION_MARKER));
        let kept = snapshot.text.trim_end_matches(TRUNCATION_MARKER);
        assert_eq!(kept.chars().count(), MAX_PAGE_CHARS);
    }

    #[test]
    fn test_snapshot_at_limit_is_untouched() {
        let exact = "a".repeat(MAX_PAGE_CHARS);
        assert_eq!(PageSnapshot::new("t", &exact).text, exact);
    }
}
