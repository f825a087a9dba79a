//! cardforge-ai - flashcard media generation
//!
//! Subcommands:
//! - `build`: generate image + audio (+ mnemonic) per card and export an Anki deck
//! - `mnemonic`: one realtime session for a single word, saved as WAV
//! - `serve`: HTTP REST + SSE surface for a UI

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use cardforge_common::cards::parse_cards;
use cardforge_common::config::{self as common_config, TomlConfig};
use cardforge_common::events::EventBus;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardforge_ai::config::{
    build_config_from, client_options_from, realtime_config_from, resolve_api_key, BuildOverrides,
};
use cardforge_ai::realtime::mnemonic::REALTIME_SAMPLE_RATE;
use cardforge_ai::realtime::{pcm16_to_wav, RealtimeMnemonicGenerator, RealtimeSession};
use cardforge_ai::services::OpenAiClient;
use cardforge_ai::workflow::BuildPipeline;
use cardforge_ai::AppState;

const DEFAULT_PORT: u16 = 5790;

/// Command-line arguments for cardforge-ai
#[derive(Parser, Debug)]
#[command(name = "cardforge-ai")]
#[command(about = "Generate illustrated, spoken Anki flashcards")]
#[command(version)]
struct Args {
    /// Config file (default: <config_dir>/cardforge/cardforge.toml)
    #[arg(short, long, global = true, env = "CARDFORGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a deck from a phrase<TAB>translation file
    Build {
        /// Input TSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Export folder (receives <runId>.tsv and media/)
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Label prefixed to the generated run id
        #[arg(long)]
        run_label: Option<String>,

        /// Resume an earlier run id (existing media is reused)
        #[arg(long)]
        run_id: Option<String>,

        /// Generate a spoken mnemonic per card
        #[arg(long)]
        mnemonics: bool,

        /// Cards generated concurrently per group
        #[arg(long)]
        group_size: Option<usize>,

        /// Regenerate media that already exists
        #[arg(long)]
        overwrite: bool,

        /// Style appended to every image prompt
        #[arg(long)]
        style: Option<String>,
    },

    /// Generate one spoken mnemonic
    Mnemonic {
        /// Word or phrase to build the mnemonic for
        #[arg(short, long)]
        word: String,

        /// Output WAV file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Run the HTTP/SSE service
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "CARDFORGE_PORT")]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(ref path) => path.clone(),
        None => common_config::config_file_path()?,
    };
    let toml_config = common_config::load_toml_config(&config_path)?;

    init_tracing(&toml_config)?;
    info!(
        "cardforge-ai {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config: {}", config_path.display());

    match args.command {
        Command::Build {
            input,
            export,
            run_label,
            run_id,
            mnemonics,
            group_size,
            overwrite,
            style,
        } => {
            let overrides = BuildOverrides {
                run_label,
                run_id,
                export_folder: export,
                include_mnemonics: mnemonics.then_some(true),
                group_size,
                overwrite_existing_media: overwrite.then_some(true),
                global_image_style: style,
                ..Default::default()
            };
            run_build(&toml_config, &input, &overrides).await
        }
        Command::Mnemonic { word, out } => run_mnemonic(&toml_config, &word, &out).await,
        Command::Serve { port } => {
            let port = port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
            run_server(toml_config, port).await
        }
    }
}

/// `RUST_LOG` wins over `logging.level`; `logging.file` replaces stderr output
fn init_tracing(toml_config: &TomlConfig) -> Result<()> {
    let level = &toml_config.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cardforge_ai={level},cardforge_common={level},tower_http=info"
        ))
    });

    let (stderr_layer, file_layer) = match toml_config.logging.file {
        Some(ref path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (
                None,
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                ),
            )
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn run_build(
    toml_config: &TomlConfig,
    input: &Path,
    overrides: &BuildOverrides,
) -> Result<()> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let cards = parse_cards(&text);
    if cards.is_empty() {
        anyhow::bail!(
            "No cards in {}: expected phrase<TAB>translation lines",
            input.display()
        );
    }

    let api_key = resolve_api_key(toml_config)?;
    let config = Arc::new(build_config_from(toml_config, overrides));
    let run_id = config.resolve_run_id(chrono::Utc::now());

    let client = OpenAiClient::new(api_key.clone(), client_options_from(toml_config))?;
    let mut pipeline = BuildPipeline::new(config.clone(), Arc::new(client));
    if config.include_mnemonics {
        pipeline = pipeline.with_mnemonics(Arc::new(RealtimeMnemonicGenerator::new(
            api_key,
            realtime_config_from(toml_config),
        )));
    }

    info!(
        run_id = %run_id,
        cards = cards.len(),
        export = %config.export_folder.display(),
        "Starting build"
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, finishing in-flight requests and stopping");
            ctrl_c_cancel.cancel();
        }
    });

    let report = pipeline.run(&run_id, &cards, &cancel).await?;

    println!("{}", report.progress.status_text);
    if let Some(ref deck) = report.deck_path {
        println!("Deck: {} ({} rows)", deck.display(), report.exported_rows);
    }
    if let Some(ref err) = report.export_error {
        println!("Export failed: {}", err);
    }
    Ok(())
}

async fn run_mnemonic(toml_config: &TomlConfig, word: &str, out: &Path) -> Result<()> {
    let api_key = resolve_api_key(toml_config)?;
    let session = RealtimeSession::new(api_key, realtime_config_from(toml_config));

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    let output = session
        .run(word, &cancel)
        .await
        .context("Mnemonic session failed")?;

    let wav = pcm16_to_wav(&output.audio_pcm, REALTIME_SAMPLE_RATE)?;
    tokio::fs::write(out, &wav)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    if !output.text.is_empty() {
        println!("{}", output.text);
    }
    println!("Saved {} ({} bytes)", out.display(), wav.len());
    Ok(())
}

async fn run_server(toml_config: TomlConfig, port: u16) -> Result<()> {
    let api_key = resolve_api_key(&toml_config)?;
    let client = OpenAiClient::new(api_key.clone(), client_options_from(&toml_config))?;
    let mnemonics = RealtimeMnemonicGenerator::new(api_key, realtime_config_from(&toml_config));

    let event_bus = EventBus::new(256);
    let state = AppState::new(event_bus, Arc::new(client), toml_config)
        .with_mnemonics(Arc::new(mnemonics));

    let app = cardforge_ai::build_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
