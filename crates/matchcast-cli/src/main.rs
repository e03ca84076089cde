//! matchcast — thin CLI entry point: parse flags, build a `Config`, wire the
//! engine, run until a shutdown signal arrives.
//!
//! Flag parsing is intentionally minimal — the engine crate does the real
//! work, this binary just builds a `Config` and wires it together.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use matchcast_core::Config;
use matchcast_engine::history::{HistorySink, JsonlHistoryStore};
use matchcast_engine::mixer::Mixer;
use matchcast_engine::orchestrator::Orchestrator;
use matchcast_engine::queue::EventQueue;
use matchcast_engine::tts::TtsFetcher;
use matchcast_engine::stream_client::StreamClient;

/// Live-commentary audio engine: streaming events in, synthesized and
/// mixed speech out.
#[derive(Parser, Debug)]
#[command(name = "matchcast", version)]
struct Args {
    /// Base URL of the upstream commentary API.
    #[arg(long)]
    api_base_url: Option<String>,

    /// Match id to commentate on.
    #[arg(long)]
    match_id: Option<String>,

    /// Bearer token for the push-channel connection.
    #[arg(long)]
    ws_auth_token: Option<String>,

    /// API key for the TTS provider.
    #[arg(long)]
    tts_api_key: Option<String>,

    /// Voice id to request from the TTS provider.
    #[arg(long)]
    tts_voice_id: Option<String>,

    /// Path to the ambience WAV asset.
    #[arg(long)]
    ambience_path: Option<String>,

    /// Path to the runtime checkpoint file.
    #[arg(long)]
    state_path: Option<String>,

    /// Directory audio history clips are written to.
    #[arg(long)]
    audio_history_dir: Option<String>,

    /// Persist mixed audio + a JSONL history row per spoken event.
    #[arg(long)]
    save_audio: bool,
}

/// Merge CLI flags over `Config::default()`, then overlay any set
/// `MATCHCAST_*` environment variable, then validate.
fn build_config(args: Args) -> Result<Config, matchcast_core::ConfigError> {
    let mut config = Config::default();

    if let Some(v) = args.api_base_url.or_else(|| std::env::var("MATCHCAST_API_BASE_URL").ok()) {
        config.api_base_url = v;
    }
    config.match_id = args.match_id.or_else(|| std::env::var("MATCHCAST_MATCH_ID").ok());
    config.ws_auth_token = args
        .ws_auth_token
        .or_else(|| std::env::var("MATCHCAST_WS_AUTH_TOKEN").ok());
    config.tts_api_key = args
        .tts_api_key
        .or_else(|| std::env::var("MATCHCAST_TTS_API_KEY").ok());
    if let Some(v) = args.tts_voice_id.or_else(|| std::env::var("MATCHCAST_TTS_VOICE_ID").ok()) {
        config.tts_voice_id = v;
    }
    if let Some(v) = args.ambience_path.or_else(|| std::env::var("MATCHCAST_AMBIENCE_PATH").ok()) {
        config.ambience_path = v;
    }
    if let Some(v) = args.state_path.or_else(|| std::env::var("MATCHCAST_STATE_PATH").ok()) {
        config.state_path = v;
    }
    if let Some(v) = args
        .audio_history_dir
        .or_else(|| std::env::var("MATCHCAST_AUDIO_HISTORY_DIR").ok())
    {
        config.audio_history_dir = v;
    }
    config.save_audio = args.save_audio || std::env::var("MATCHCAST_SAVE_AUDIO").is_ok();

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match build_config(args) {
        Ok(c) => c,
        Err(e) => {
            error!("fatal: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(code) = run(config).await {
        std::process::exit(code);
    }
}

async fn run(config: Config) -> Result<(), i32> {
    let shutdown = CancellationToken::new();

    let queue = Arc::new(EventQueue::load(
        PathBuf::from(&config.state_path),
        config.dedup_capacity,
    ));

    let mixer = Mixer::new(&config);
    let _mixer_handle = mixer.start(&config).map_err(|e| {
        error!("fatal: failed to open audio device: {e}");
        2
    })?;

    let fetcher = TtsFetcher::new(&config);

    let history = if config.save_audio {
        let store: Arc<dyn matchcast_engine::history::HistoryStore> =
            Arc::new(JsonlHistoryStore::new(std::path::Path::new(&config.audio_history_dir)));
        Some(HistorySink::spawn(
            PathBuf::from(&config.audio_history_dir),
            store,
            config.history_channel_capacity,
        ))
    } else {
        None
    };

    let mut orchestrator = Orchestrator::new(queue.clone(), mixer.clone(), fetcher, history, config.sample_rate);

    let (stream_client, mut status_rx) = StreamClient::new(config.clone(), queue.clone());
    let stream_shutdown = shutdown.clone();
    let stream_task = tokio::spawn(async move { stream_client.run(stream_shutdown).await });

    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            info!("stream status: {:?}", *status_rx.borrow());
        }
    });

    let orchestrator_shutdown = shutdown.clone();
    let orchestrator_task = tokio::spawn(async move {
        orchestrator.run(orchestrator_shutdown).await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for shutdown signal: {e}"),
    }

    shutdown.cancel();
    mixer.stop();
    queue.close().await;

    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), stream_task).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), orchestrator_task).await;

    Ok(())
}
