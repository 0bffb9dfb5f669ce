mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eoka::StealthConfig;
use tracing::info;
use webpilot_agent::tools::ToolRegistry;
use webpilot_orchestrator::ReplayEngine;
use webpilot_types::{
    Automation, Conversation, Error as EngineError, JwtAuthVerifier, ModelClient, ModelTurn,
    Result as EngineResult, StdoutSink, ToolSchema,
};

use crate::config::ServerConfig;
use crate::error::{Error, Result};

#[derive(Parser)]
#[command(name = "webpilot-tools", about = "Browser agent orchestration engine")]
struct Cli {
    /// Log verbosity: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the WebSocket session supervisor (`/agent` and `/automation`).
    Serve {
        /// Override the configured bind address (host:port).
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Replay a saved automation trace against a fresh local browser,
    /// printing each emitted event as a JSON line to stdout.
    Replay {
        /// Path to a JSON-serialized Automation.
        automation_path: PathBuf,
        #[arg(long, default_value_t = true)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Serve { bind } => serve(bind).await,
        Command::Replay { automation_path, headless } => replay(automation_path, headless).await,
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(bind_override: Option<std::net::SocketAddr>) -> Result<()> {
    let mut settings = ServerConfig::from_env()?;
    if let Some(bind) = bind_override {
        settings.bind = bind;
    }

    let auth: Arc<dyn webpilot_types::AuthVerifier> =
        Arc::new(JwtAuthVerifier::new(settings.jwt_secret.as_bytes()));
    let store_factory: Arc<dyn webpilot_supervisor::StoreFactory> =
        Arc::new(webpilot_supervisor::InMemoryStoreFactory);
    let model: Arc<dyn ModelClient> = build_model_client(&settings);

    let router = webpilot_supervisor::build_router_with_config(
        auth,
        store_factory,
        model,
        settings.supervisor_config(),
    );

    info!(bind = %settings.bind, "starting webpilot-tools supervisor");
    let listener = tokio::net::TcpListener::bind(settings.bind).await.map_err(Error::Io)?;
    axum::serve(listener, router).await.map_err(Error::Io)?;
    Ok(())
}

async fn replay(automation_path: PathBuf, headless: bool) -> Result<()> {
    let raw = std::fs::read_to_string(&automation_path)?;
    let automation: Automation = serde_json::from_str(&raw)?;

    let settings = ServerConfig::load().ok();
    let model: Arc<dyn ModelClient> = settings
        .as_ref()
        .map(build_model_client)
        .unwrap_or_else(|| Arc::new(UnconfiguredModelClient));

    let tools = Arc::new(ToolRegistry::new(model.clone()));
    let sink = Arc::new(StdoutSink);
    let engine = ReplayEngine::new(tools, Some(model), sink);

    let browser = eoka::Browser::launch_with_config(StealthConfig {
        headless,
        ..Default::default()
    })
    .await
    .map_err(webpilot_orchestrator::Error::Browser)?;
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(webpilot_orchestrator::Error::Browser)?;
    let page = tokio::sync::Mutex::new(page);

    info!(automation_id = %automation.id, "replaying automation");
    let outcome = engine.run(&automation, &page).await;
    let _ = browser.close().await;

    match outcome {
        Ok(message) => {
            println!("{message}");
            Ok(())
        }
        Err(e) => Err(Error::Engine(e)),
    }
}

fn build_model_client(settings: &ServerConfig) -> Arc<dyn ModelClient> {
    match &settings.model {
        Some(m) => Arc::new(webpilot_orchestrator::HttpModelClient::new(
            m.base_url.clone(),
            m.api_key.clone(),
            m.model.clone(),
        )),
        None => Arc::new(UnconfiguredModelClient),
    }
}

/// Stands in for `ModelClient` when no endpoint is configured. The
/// `replay` subcommand can still run commands that never touch the
/// model (everything except CAPTCHA solving and the optional closing
/// summary); this only errors if one of those paths is actually hit.
struct UnconfiguredModelClient;

#[async_trait::async_trait]
impl ModelClient for UnconfiguredModelClient {
    async fn next_action(&self, _: &Conversation, _: &[ToolSchema]) -> EngineResult<ModelTurn> {
        Err(EngineError::Model("no model endpoint configured (set WEBPILOT_MODEL_BASE_URL)".into()))
    }

    async fn describe_images(&self, _: &[Vec<u8>], _: &str) -> EngineResult<String> {
        Err(EngineError::Model("no model endpoint configured (set WEBPILOT_MODEL_BASE_URL)".into()))
    }
}
