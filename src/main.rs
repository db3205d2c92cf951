use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use feedsync::config::Config;
use feedsync::display::article_line;
use feedsync::feed::{parse_feed, Article, FeedError};
use feedsync::server;
use feedsync::session::{FeedEngine, LoadOutcome, LoadState, SessionEvent, TokioScheduler};
use feedsync::util::strip_control_chars;

const DEFAULT_LINE_WIDTH: usize = 100;

/// Terminal width from `$COLUMNS`, falling back to 100 columns.
fn line_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|c| c.trim().parse::<usize>().ok())
        .filter(|&w| w >= 20)
        .unwrap_or(DEFAULT_LINE_WIDTH)
}

/// Get the default config path (~/.config/feedsync/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedsync")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "RSS/Atom ingestion with caching relay and live sync")]
struct Args {
    /// Config file (default: ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (/relay and /feed)
    Serve,
    /// Load a feed, then keep polling for new posts and backfilling old ones
    Watch {
        url: String,
        /// Older pages to load up front, before background backfill starts
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Fetch and parse a feed once, printing it as JSON
    Fetch { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match args.command {
        Command::Serve => serve(&config).await,
        Command::Watch { url, pages } => watch(&config, &url, pages).await,
        Command::Fetch { url } => fetch(&config, &url).await,
    }
}

async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(config.server_state().context("Failed to build HTTP client")?);
    let cache = Arc::clone(state.loader.cache());

    // Expired pages are otherwise only dropped when read again
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let evicted = cache.evict_expired();
            if evicted > 0 {
                tracing::debug!(evicted, remaining = cache.len(), "Swept expired cache entries");
            }
        }
    });

    server::serve(config.listen_addr, state, shutdown_signal())
        .await
        .with_context(|| format!("Server on {} failed", config.listen_addr))?;
    sweeper.abort();

    println!("Goodbye!");
    Ok(())
}

async fn fetch(config: &Config, url: &str) -> Result<()> {
    let fetcher = config.session_fetcher().context("Failed to build HTTP client")?;
    let body = fetcher.fetch(url).await.map_err(explain)?;
    let page = parse_feed(&body.bytes, &body.final_url).map_err(explain)?;

    // serde_json escapes control characters, so feed text is safe to print
    let json = serde_json::to_string_pretty(&page).context("Failed to serialize feed")?;
    println!("{json}");
    Ok(())
}

async fn watch(config: &Config, url: &str, extra_pages: usize) -> Result<()> {
    let fetcher = config.session_fetcher().context("Failed to build HTTP client")?;
    let loader = config.loader(fetcher);

    // Create event channel for session updates
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(32);
    let engine = FeedEngine::with_scheduler(
        loader,
        config.sync_settings(),
        Arc::new(TokioScheduler),
        Some(event_tx),
    );

    engine.load_feed(url).await.map_err(explain)?;
    for _ in 0..extra_pages {
        if engine.load_more().await.map_err(explain)? == LoadOutcome::Skipped {
            break;
        }
    }

    let snapshot = engine.snapshot();
    if let Some(channel) = snapshot.channel() {
        println!("{}", strip_control_chars(&channel.title));
    }
    print_articles(snapshot.articles());

    engine.start_polling();
    engine.start_backfill();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(event) = event_rx.recv() => match event {
                SessionEvent::NewArticles { count, .. } => {
                    println!("-- {count} new --");
                    let snapshot = engine.snapshot();
                    print_articles(&snapshot.articles()[..count.min(snapshot.articles().len())]);
                }
                SessionEvent::PageAppended { added, has_more, .. } => {
                    let snapshot = engine.snapshot();
                    let start = snapshot.articles().len().saturating_sub(added);
                    print_articles(&snapshot.articles()[start..]);
                    if !has_more {
                        tracing::info!(articles = snapshot.articles().len(), "Backlog exhausted");
                        engine.stop_backfill();
                    }
                }
                SessionEvent::FirstPageLoaded { .. } => {}
            },
        }
    }

    engine.stop_polling();
    engine.stop_backfill();
    if let LoadState::Failed(msg) = engine.snapshot().state() {
        eprintln!("Last load failed: {msg}");
    }
    println!("Goodbye!");
    Ok(())
}

fn print_articles(articles: &[Article]) {
    let now = chrono::Utc::now();
    let width = line_width();
    for article in articles {
        println!("{}", article_line(article, width, now));
    }
}

fn explain(err: FeedError) -> anyhow::Error {
    anyhow::anyhow!("{err}\n{}", err.user_guidance())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received");
}
