//! summary-speaker: summarize text with Gemini and turn text into speech.

mod api;
mod audio_store;
mod config;
mod results_log;
mod retention;
mod speech;
mod summarizer;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "summary-speaker", about = "Text summarization and speech service")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for generated audio (overrides audio.dir)
    #[arg(long)]
    audio_dir: Option<PathBuf>,

    /// Include error details in 500 responses
    #[arg(long)]
    debug: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy HTTP client internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("summary-speaker starting");

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env: {e}");
        }
    }

    // Load config, CLI flags win
    let mut config = config::Config::load(args.config.as_deref());
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.audio_dir {
        config.audio.dir = dir;
    }
    config.server.debug |= args.debug;

    // Missing credentials are fatal
    let api_key = config
        .summarizer
        .resolve_api_key(std::env::var(config::API_KEY_ENV).ok())?;

    let store = audio_store::AudioStore::open(&config.audio.dir)?;
    info!("Audio directory: {}", store.dir().display());

    let summarizer = Arc::new(summarizer::GeminiSummarizer::new(&config.summarizer, api_key)?);
    let speech = Arc::new(speech::GoogleTts::new(&config.speech)?);
    let results_log = config.results_log_path().map(results_log::ResultsLog::new);
    if let Some(log) = &results_log {
        info!("Appending results to {}", log.path().display());
    }

    let download_prefix = audio_store::sanitize_filename(&config.audio.download_prefix)
        .unwrap_or_else(|| "speech_audio".into());

    // Sweeper lives as long as the server
    let shutdown = CancellationToken::new();
    let sweeper = retention::RetentionSweeper::new(store.dir(), &config.retention)
        .spawn(shutdown.clone());

    let state = api::AppState {
        summarizer,
        speech,
        store,
        results_log,
        download_prefix,
        debug: config.server.debug,
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr} (debug={})", config.server.debug);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Retention sweeper ended abnormally: {e}");
    }
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, cancelling `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
