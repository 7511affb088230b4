//! imagen-server - HTTP front for a single-slot image generation service.

use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use imagen_server::cli::Cli;
use imagen_server::config::{self, Config};
use imagen_server::context::{EngineContext, EngineMode};
use imagen_server::error::StartupError;
use imagen_server::http;
use imagen_server::model::{detect_provider, resolve_model};
use imagen_server::output::OutputStore;
use imagen_server::service::GenerationService;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    // Layers: file < environment < flags
    let config_path = config::discover_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path).map_err(StartupError::Config)?;
    config.apply_env().map_err(StartupError::Config)?;
    cli.apply_to(&mut config);
    config.validate().map_err(StartupError::Config)?;

    let model = resolve_model(&config.engine.model);
    let provider = detect_provider(&model).map_err(StartupError::InvalidArgument)?;
    info!(model = %model, provider = provider.name(), "Resolved model (from '{}')", config.engine.model);

    let store = Arc::new(OutputStore::new(&config.generation.output_dir));
    store.ensure_dir()?;
    info!(output_dir = %store.dir().display(), "Output directory ready");

    match &config.generation.default_prompt {
        Some(prompt) => info!("Empty prompts fall back to {prompt:?}"),
        None => info!("Empty prompts are rejected (no DEFAULT_PROMPT configured)"),
    }

    let mode = EngineMode::from_env();
    info!(?mode, "Engine mode");
    let (ctx, recording) = EngineContext::for_mode(&mode, provider, &config)?;

    let listener =
        TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;

    let service = Arc::new(GenerationService::start(
        ctx.into_engine(),
        store,
        model,
        config.generation.policy(),
    ));

    info!("Listening on {}", listener.local_addr()?);
    let served = http::serve(listener, Arc::clone(&service), shutdown_signal()).await;

    info!("Shutting down; draining queued requests");
    service.shutdown().await;

    if let Some(session) = recording {
        match session.finish() {
            Ok(path) => info!("Cassette saved: {}", path.display()),
            Err(e) => warn!("Failed to save cassette: {e}"),
        }
    }

    served.map_err(StartupError::Io)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
