use anyhow::{Context, Result};
use clap::Parser;
use speech_worker::config::LoggingConfig;
use speech_worker::{
    CommandDecoder, CommandPostProcessor, Config, DecoderPipeline, PostProcessor, Supervisor,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Worker that serves speech recognition requests for a coordinating server
#[derive(Debug, Parser)]
#[command(name = "speech-worker", version)]
struct Args {
    /// Server<-->worker websocket URI
    #[arg(short, long, default_value = "ws://localhost:8888/worker/ws/speech")]
    uri: String,

    /// Worker configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    conf: Option<PathBuf>,
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(logging.ansi)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = match &args.conf {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    init_logging(&cfg.logging);
    info!("Starting up worker");
    info!("Coordinator: {}", args.uri);
    info!("Result mode: {:?}", cfg.result_mode());
    info!("Silence timeout: {}s", cfg.silence_timeout);

    let command = cfg
        .decoder
        .command
        .clone()
        .context("No recognizer configured (decoder.command)")?;
    let decoder = Arc::new(CommandDecoder::new(command, cfg.result_mode()));
    info!("Decoder: {}", decoder.name());

    let post_processor = match &cfg.post_processor {
        Some(command) => {
            let post_processor = CommandPostProcessor::spawn(command)?;
            info!("Post-processor: {}", post_processor.command());
            Some(Arc::new(post_processor) as Arc<dyn PostProcessor>)
        }
        None => None,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current request");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
    });

    let supervisor = Supervisor::new(
        args.uri,
        cfg.session_config(),
        cfg.reconnect_delay(),
        decoder,
        post_processor,
        shutdown_rx,
    );

    let sessions = supervisor.run().await?;
    info!("Worker stopped after {} sessions", sessions);

    Ok(())
}
