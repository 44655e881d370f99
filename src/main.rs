use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use rssward::config::Config;
use rssward::jobs::{self, ArticlePurgeJob, OrphanPurgeJob, PurgeLoop, RefreshScheduler};
use rssward::refresh::{build_client, FeedRefresher};
use rssward::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/rssward/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("rssward");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "rssward", about = "RSS/Atom feed refresh daemon")]
struct Args {
    /// Config file (default: ~/.config/rssward/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding the config file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.database.or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            }
            config_dir.join("rssward.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another instance of rssward appears to be running. Please close it and try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };
    tracing::info!(path = %db_path.display(), "Opened database");

    let client = build_client(&config).context("Failed to build HTTP client")?;
    let refresher = FeedRefresher::new(db.clone(), client, config.max_feed_size_bytes);

    let (trigger, shutdown) = jobs::shutdown::channel();

    let refresh = tokio::spawn(
        RefreshScheduler::new(
            db.clone(),
            refresher,
            Duration::from_secs(config.refresh_startup_delay_secs),
        )
        .run(shutdown.clone()),
    );
    let orphan_purge = tokio::spawn(
        PurgeLoop::new(
            db.clone(),
            OrphanPurgeJob,
            Duration::from_secs(config.orphan_purge_startup_delay_secs),
        )
        .run(shutdown.clone()),
    );
    let article_purge = tokio::spawn(
        PurgeLoop::new(
            db.clone(),
            ArticlePurgeJob::new(config.article_retention_cap),
            Duration::from_secs(config.article_purge_startup_delay_secs),
        )
        .run(shutdown),
    );

    wait_for_signal().await?;
    trigger.trigger();

    let (refresh, orphan_purge, article_purge) = tokio::join!(refresh, orphan_purge, article_purge);
    for (name, result) in [
        ("feed refresh", refresh),
        ("orphan purge", orphan_purge),
        ("article purge", article_purge),
    ] {
        if let Err(e) = result {
            tracing::error!(job = name, error = %e, "Job task ended abnormally");
        }
    }

    tracing::info!("Stopped");
    Ok(())
}
