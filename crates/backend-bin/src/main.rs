use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wordrush_backend_lib::{
    config::Settings,
    coordinator::spawn_sweeper,
    store::MemoryStore,
    words::{FileLexicon, Lexicon},
    ws_router, AppState,
};

/// Wordrush coordination server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the word list path from the config
    #[arg(long)]
    word_list: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)
        .with_context(|| format!("loading settings from {}", args.config))?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    if let Some(word_list) = args.word_list {
        settings.word_list = Some(word_list);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let words: Arc<dyn Lexicon> = match &settings.word_list {
        Some(path) => {
            let lexicon = FileLexicon::load(path)
                .with_context(|| format!("loading word list from {}", path.display()))?;
            info!(words = lexicon.len(), path = %path.display(), "word list loaded");
            Arc::new(lexicon)
        },
        None => {
            warn!("no word list configured, every guess will be rejected as unknown");
            Arc::new(FileLexicon::from_words(Vec::<String>::new()))
        },
    };

    // Single-instance mode ships with the in-memory store; a
    // multi-instance deployment swaps in a networked SharedStore.
    let store = Arc::new(MemoryStore::new());

    let state = Arc::new(AppState::new(store, words, settings.clone()));
    spawn_sweeper(Arc::clone(&state.coordinator));

    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
