use assistant_broker::{
    Broker, ContextKind, ContextRegistry, Orchestrator, PageSession, PageSnapshot, Push, VISIBILITY_KEY,
};
use assistant_config::MemorySettingsStore;
use assistant_conversation::{ConversationStore, KeyValueStore, MemoryStore};
use assistant_core::{AssistantError, ConversationTurn, Result, Settings};
use assistant_providers::{AdapterRegistry, HttpRequest, HttpResponse, HttpTransport, ProviderId, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn answering(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, _request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError("unexpected call".into()))
    }
}

/// Key-value store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<()> {
        Err(AssistantError::Storage("disk full".into()))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(AssistantError::Storage("disk full".into()))
    }
}

struct Harness {
    broker: Broker,
    history: Arc<ConversationStore>,
    flags: Arc<MemoryStore>,
    transport: Arc<ScriptedTransport>,
}

fn harness(settings: Settings, responses: Vec<HttpResponse>, history_backend: Arc<dyn KeyValueStore>) -> Harness {
    let transport = ScriptedTransport::answering(responses);
    let contexts = Arc::new(ContextRegistry::new());
    let history = Arc::new(ConversationStore::new(history_backend));
    let flags = Arc::new(MemoryStore::new());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(MemorySettingsStore::new(settings)),
        AdapterRegistry::with_default_adapters(transport.clone()),
        history.clone(),
        flags.clone(),
        contexts.clone(),
    ));

    Harness {
        broker: Broker::spawn(orchestrator, contexts),
        history,
        flags,
        transport,
    }
}

fn openai_settings(key: &str) -> Settings {
    Settings {
        provider_id: "openai".into(),
        model_id: "gpt-3.5-turbo".into(),
        api_key: key.into(),
        ..Settings::default()
    }
}

fn completion(text: &str) -> HttpResponse {
    HttpResponse::new(200, json!({"choices": [{"message": {"content": text}}]}).to_string())
}

async fn wait_for_history(history: &ConversationStore, expected: usize) {
    for _ in 0..100 {
        if history.list().await.unwrap().len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("history never reached {expected} records");
}

#[tokio::test]
async fn test_query_round_trip_persists_and_pushes() {
    let h = harness(
        openai_settings("sk-test-key"),
        vec![completion("It is about Rust.")],
        Arc::new(MemoryStore::new()),
    );
    let endpoint = h.broker.connect(ContextKind::Page).await;
    let mut session = PageSession::new(
        endpoint,
        "https://rust.test/",
        PageSnapshot::new("Rust", "A language empowering everyone."),
    );

    let result = session.ask("What is this page about?").await.unwrap();

    assert_eq!(result.text, "It is about Rust.");
    assert_eq!(result.provider_id, "openai");
    assert_eq!(session.turns().len(), 2);
    assert_eq!(
        session.endpoint_mut().next_push().await,
        Some(Push::ResponseReady(result.clone()))
    );

    wait_for_history(&h.history, 1).await;
    let record = h.history.get("https://rust.test/").await.unwrap().unwrap();
    assert_eq!(record.title, "Rust");
    assert_eq!(
        record.turns,
        vec![
            ConversationTurn::user("What is this page about?"),
            ConversationTurn::assistant("It is about Rust."),
        ]
    );
}

#[tokio::test]
async fn test_follow_up_carries_previous_turns() {
    let h = harness(
        openai_settings("sk-test-key"),
        vec![completion("first"), completion("second")],
        Arc::new(MemoryStore::new()),
    );
    let endpoint = h.broker.connect(ContextKind::Page).await;
    let mut session = PageSession::new(endpoint, "https://x.test/", PageSnapshot::new("X", "x"));

    session.ask("one?").await.unwrap();
    session.ask("two?").await.unwrap();

    assert_eq!(session.turns().len(), 4);
    h.broker.shutdown().await;

    let record = h.history.get("https://x.test/").await.unwrap().unwrap();
    assert_eq!(record.turns.len(), 4);
    assert_eq!(record.turns[2], ConversationTurn::user("two?"));
}

#[tokio::test]
async fn test_session_pushes_are_drained() {
    let h = harness(
        openai_settings("sk-test-key"),
        vec![completion("first"), completion("second")],
        Arc::new(MemoryStore::new()),
    );
    let endpoint = h.broker.connect(ContextKind::Page).await;
    let mut session = PageSession::new(endpoint, "https://x.test/", PageSnapshot::new("X", "x"));

    let first = session.ask("one?").await.unwrap();
    let second = session.ask("two?").await.unwrap();

    assert_eq!(
        session.take_pushes(),
        vec![Push::ResponseReady(first), Push::ResponseReady(second)]
    );
    assert!(session.take_pushes().is_empty());
}

#[tokio::test]
async fn test_missing_key_fails_for_every_provider_without_network() {
    for provider in ProviderId::ALL {
        let settings = Settings {
            provider_id: provider.as_str().into(),
            api_key: "   ".into(),
            ..Settings::default()
        };
        let h = harness(settings, Vec::new(), Arc::new(MemoryStore::new()));
        let endpoint = h.broker.connect(ContextKind::Page).await;
        let mut session = PageSession::new(endpoint, "https://p.test/", PageSnapshot::new("P", "p"));

        let err = session.ask("q").await.unwrap_err();

        assert_eq!(err.to_string(), AssistantError::MissingCredential.to_string());
        assert_eq!(h.transport.calls(), 0, "{provider} touched the network");
        assert!(session.turns().is_empty());
    }
}

#[tokio::test]
async fn test_unknown_provider_is_reported() {
    let settings = Settings {
        provider_id: "mistral".into(),
        api_key: "key".into(),
        ..Settings::default()
    };
    let h = harness(settings, Vec::new(), Arc::new(MemoryStore::new()));
    let endpoint = h.broker.connect(ContextKind::Page).await;

    let err = endpoint
        .query(assistant_core::QueryRequest::new("q", "p"))
        .await
        .unwrap_err();

    assert!(matches!(err, AssistantError::Remote(ref m) if m.contains("mistral")));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_provider_error_reaches_the_page() {
    let h = harness(
        openai_settings("sk-bad"),
        vec![HttpResponse::new(401, r#"{"error":{"message":"invalid key"}}"#)],
        Arc::new(MemoryStore::new()),
    );
    let endpoint = h.broker.connect(ContextKind::Page).await;
    let mut session = PageSession::new(endpoint, "https://p.test/", PageSnapshot::new("P", "p"));

    let err = session.ask("q").await.unwrap_err();

    assert_eq!(err.to_string(), "invalid key");
    assert!(session.turns().is_empty());
    assert!(h.history.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_does_not_fail_the_query() {
    let h = harness(openai_settings("sk-test-key"), vec![completion("fine")], Arc::new(BrokenStore));
    let endpoint = h.broker.connect(ContextKind::Page).await;
    let mut session = PageSession::new(endpoint, "https://p.test/", PageSnapshot::new("P", "p"));

    let result = session.ask("q").await.unwrap();
    assert_eq!(result.text, "fine");
}

#[tokio::test]
async fn test_toggle_twice_notifies_only_the_active_page() {
    let h = harness(openai_settings(""), Vec::new(), Arc::new(MemoryStore::new()));
    let mut active = h.broker.connect(ContextKind::Page).await;
    let mut inactive = h.broker.connect(ContextKind::Page).await;
    let control = h.broker.connect(ContextKind::Control).await;
    h.broker.activate(active.id()).await.unwrap();

    assert!(control.toggle_visibility().await.unwrap());
    assert_eq!(active.next_push().await, Some(Push::VisibilityChanged { enabled: true }));

    assert!(!control.toggle_visibility().await.unwrap());
    assert_eq!(active.next_push().await, Some(Push::VisibilityChanged { enabled: false }));

    assert_eq!(active.try_next_push(), None);
    assert_eq!(inactive.try_next_push(), None);
    assert_eq!(h.flags.get(VISIBILITY_KEY).await.unwrap(), Some(Value::Bool(false)));
}

#[tokio::test]
async fn test_history_actions_over_the_broker() {
    let h = harness(openai_settings(""), Vec::new(), Arc::new(MemoryStore::new()));
    let control = h.broker.connect(ContextKind::Control).await;

    for i in 0..7 {
        control
            .save_conversation(&format!("https://h.test/{i}"), "H", vec![ConversationTurn::user("q")])
            .await
            .unwrap();
    }

    assert_eq!(control.list_history(Some(5)).await.unwrap().len(), 5);
    assert_eq!(control.list_history(None).await.unwrap().len(), 7);

    control.clear_history().await.unwrap();
    assert!(control.list_history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_and_settings_over_the_broker() {
    let h = harness(
        openai_settings("sk-0123456789abcdefghijkl"),
        Vec::new(),
        Arc::new(MemoryStore::new()),
    );
    let control = h.broker.connect(ContextKind::Control).await;

    let status = control.status().await.unwrap();
    assert_eq!(status.credential, assistant_providers::CredentialStatus::Configured);
    assert_eq!(status.model, "gpt-3.5-turbo");

    let settings = control.get_settings().await.unwrap();
    assert_eq!(settings.provider_id, "openai");
    assert_ne!(settings.api_key, "sk-0123456789abcdefghijkl");
}
