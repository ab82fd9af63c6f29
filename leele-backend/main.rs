mod agents;
mod api;
mod client;
mod config;
mod flows;
mod llm;
mod sse;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::Request;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::agents::catalog;
use crate::agents::memory_repository::InMemoryAgentRepository;
use crate::agents::repository::AgentRepository;
use crate::flows::agent::AgentExecutor;
use crate::llm::openai::OpenAiProvider;
use crate::llm::{Completion, CompletionProvider, GenerationSettings};

#[derive(Parser)]
#[command(name = "leele", about = "Multi-step LLM agents over server-sent events")]
enum Cli {
    /// Start the HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
    /// Send one prompt to a running server and print the streamed reply
    Ask {
        prompt: String,
        /// Agent id, e.g. `creative-writer`
        #[arg(long, default_value = "agent")]
        agent: String,
        /// Server URL to connect to
        #[arg(long, default_value = "http://localhost:8081")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // No subcommand means serve; --help and --version still parse.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 { Cli::Serve } else { Cli::parse() };

    match cli {
        Cli::Serve => run_server().await,
        Cli::Ask {
            prompt,
            agent,
            server,
        } => {
            client::ask(&server, &agent, &prompt).await?;
            Ok(())
        }
    }
}

async fn run_server() -> Result<(), Box<dyn Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("leele=info,tower_http=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            send_default_pii: true,
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    let http_client = Arc::new(
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.provider.timeout)
            .build()
            .context("failed to build HTTP client")?,
    );

    let provider: Arc<dyn CompletionProvider> = Arc::new(OpenAiProvider::new(
        http_client,
        config.provider.base_url.clone(),
        config.provider.api_key.clone(),
    ));
    let completion = Completion::new(
        provider,
        GenerationSettings {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_tokens: Some(config.provider.max_tokens),
        },
    );

    let agents = catalog::build(&completion).context("failed to build agent catalog")?;
    let agent_repo: Arc<dyn AgentRepository> = Arc::new(InMemoryAgentRepository::new(agents));
    tracing::info!(
        agents = agent_repo.list().await.len(),
        model = %config.provider.model,
        "agent catalog ready"
    );

    let app_state = api::AppState {
        agent_repo,
        executor: AgentExecutor::new(config.sse_buffer),
    };

    let app = api::create_app(app_state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
