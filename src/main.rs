use anyhow::{Context, Result};
use assistant_broker::{
    Broker, ContentExtractor, ContextKind, ContextRegistry, Orchestrator, PageSession, PageSnapshot, Push,
};
use assistant_config::{AssistantConfig, FileSettingsStore};
use assistant_conversation::{ConversationStore, JsonFileStore};
use assistant_core::AssistantError;
use assistant_providers::{supported_models, AdapterRegistry, CredentialStatus, ProviderId, ReqwestTransport};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "page-assistant")]
#[command(about = "Ask questions about a web page using your chat provider of choice", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.page-assistant/config.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct PageArgs {
    /// File holding the page's readable text
    #[arg(short, long, value_name = "FILE")]
    page: PathBuf,

    /// Page URL, used as the history key (defaults to a file:// URL)
    #[arg(short, long)]
    url: Option<String>,

    /// Page title (defaults to the file name)
    #[arg(short, long)]
    title: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question about a page
    Ask {
        #[command(flatten)]
        page: PageArgs,

        /// The question
        question: String,
    },

    /// Interactive conversation about a page
    Chat {
        #[command(flatten)]
        page: PageArgs,

        /// Continue the stored conversation for this page
        #[arg(short, long, action = clap::ArgAction::SetTrue)]
        resume: bool,
    },

    /// Show stored conversations, most recent first
    History {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete all stored conversations
    ClearHistory,

    /// Toggle the page UI on or off
    Toggle,

    /// Show provider, model and API key status
    Status,

    /// Show current settings (API key redacted)
    Settings,

    /// List selectable models
    Models {
        /// Only this provider
        provider: Option<String>,
    },
}

/// Reads page text from a local file.
struct FileExtractor {
    path: PathBuf,
    title: Option<String>,
}

#[async_trait]
impl ContentExtractor for FileExtractor {
    async fn extract(&self) -> assistant_core::Result<PageSnapshot> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let title = self.title.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Ok(PageSnapshot::new(title, &text))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let command = match cli.command {
        Commands::Models { provider } => return list_models(provider.as_deref()),
        other => other,
    };

    let config_path = cli.config.unwrap_or_else(AssistantConfig::default_config_path);
    let broker = start_broker(&config_path).await?;

    match command {
        Commands::Ask { page, question } => ask(&broker, page, &question).await?,
        Commands::Chat { page, resume } => chat(&broker, page, resume).await?,
        Commands::History { limit } => show_history(&broker, limit).await?,
        Commands::ClearHistory => {
            let control = broker.connect(ContextKind::Control).await;
            control.clear_history().await?;
            println!("Conversation history cleared.");
        }
        Commands::Toggle => toggle(&broker).await?,
        Commands::Status => show_status(&broker).await?,
        Commands::Settings => show_settings(&broker).await?,
        Commands::Models { provider } => list_models(provider.as_deref())?,
    }

    broker.shutdown().await;
    Ok(())
}

async fn start_broker(config_path: &Path) -> Result<Broker> {
    let config = if config_path.exists() {
        info!("Loading configuration from: {:?}", config_path);
        AssistantConfig::from_yaml(config_path)?
    } else {
        info!("Using default configuration");
        AssistantConfig::default()
    };

    let storage = Arc::new(JsonFileStore::new(&config.paths.data_dir));
    debug!("Data directory: {:?}", storage.base_dir());

    let contexts = Arc::new(ContextRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(FileSettingsStore::new(config_path)),
        AdapterRegistry::with_default_adapters(Arc::new(ReqwestTransport::new())),
        Arc::new(ConversationStore::new(storage.clone())),
        storage,
        contexts.clone(),
    ));

    if orchestrator.initialize_defaults().await? {
        println!("Wrote default settings to {}", config_path.display());
        println!("Add your API key there before asking questions.\n");
    }

    Ok(Broker::spawn(orchestrator, contexts))
}

async fn open_session(broker: &Broker, page: PageArgs) -> Result<PageSession> {
    let url = match page.url {
        Some(url) => url,
        None => {
            let absolute = std::fs::canonicalize(&page.page)
                .with_context(|| format!("Cannot read page file {}", page.page.display()))?;
            format!("file://{}", absolute.display())
        }
    };
    let extractor = FileExtractor {
        path: page.page,
        title: page.title,
    };

    let endpoint = broker.connect(ContextKind::Page).await;
    broker.activate(endpoint.id()).await?;
    Ok(PageSession::from_extractor(endpoint, url, &extractor).await?)
}

async fn ask(broker: &Broker, page: PageArgs, question: &str) -> Result<()> {
    let mut session = open_session(broker, page).await?;
    let result = session.ask(question).await?;
    println!("{}", result.text);
    Ok(())
}

async fn chat(broker: &Broker, page: PageArgs, resume: bool) -> Result<()> {
    let mut session = open_session(broker, page).await?;

    if resume {
        let stored = session
            .endpoint()
            .list_history(None)
            .await?
            .into_iter()
            .find(|record| record.url == session.url());
        if let Some(record) = stored {
            println!("Resuming {} earlier messages.", record.turns.len());
            session = session.with_turns(record.turns);
        }
    }

    println!("Page Assistant: {}", session.url());
    println!("Type 'exit' or 'quit' to end, 'reset' to start over");
    println!("═══════════════════════════════════════\n");

    loop {
        print!("You> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }
        if input.eq_ignore_ascii_case("reset") {
            session.reset();
            println!("Conversation cleared.\n");
            continue;
        }

        match session.ask(input).await {
            Ok(result) => println!("\nAssistant> {}\n", result.text),
            Err(e @ AssistantError::Remote(_)) => println!("\nError: {}\n", e),
            Err(e) => return Err(e.into()),
        }

        for push in session.take_pushes() {
            match push {
                Push::VisibilityChanged { enabled } => {
                    println!("(page UI {})\n", if enabled { "enabled" } else { "disabled" })
                }
                Push::ResponseReady(_) => {}
            }
        }
    }

    Ok(())
}

async fn show_history(broker: &Broker, limit: Option<usize>) -> Result<()> {
    let control = broker.connect(ContextKind::Control).await;
    let records = control.list_history(limit).await?;

    if records.is_empty() {
        println!("No stored conversations.");
        return Ok(());
    }

    for record in records {
        println!("{}  {}", record.last_updated.format("%Y-%m-%d %H:%M"), record.title);
        println!("    {}", record.url);
        if let Some(preview) = record.preview() {
            println!("    > {}", preview);
        }
    }
    Ok(())
}

async fn toggle(broker: &Broker) -> Result<()> {
    let control = broker.connect(ContextKind::Control).await;
    let enabled = control.toggle_visibility().await?;
    println!("Page UI {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

async fn show_status(broker: &Broker) -> Result<()> {
    let control = broker.connect(ContextKind::Control).await;
    let status = control.status().await?;

    let credential = match status.credential {
        CredentialStatus::NotConfigured => "not configured",
        CredentialStatus::Configured => "configured",
        CredentialStatus::InvalidFormat => "invalid format",
    };
    println!("Provider: {}", status.provider);
    println!("Model:    {}", status.model);
    println!("API key:  {}", credential);
    Ok(())
}

async fn show_settings(broker: &Broker) -> Result<()> {
    let control = broker.connect(ContextKind::Control).await;
    let settings = control.get_settings().await?;

    println!("provider_id: {}", settings.provider_id);
    println!("model_id:    {}", settings.model_id);
    println!("api_key:     {}", settings.api_key);
    println!("max_tokens:  {}", settings.max_tokens);
    println!("temperature: {}", settings.temperature);
    Ok(())
}

fn list_models(provider: Option<&str>) -> Result<()> {
    let providers = match provider {
        Some(id) => vec![id.parse::<ProviderId>()?],
        None => ProviderId::ALL.to_vec(),
    };

    for provider in providers {
        println!("{}", provider);
        for model in supported_models(provider) {
            println!("  {:<20} {}", model.id, model.label);
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}
