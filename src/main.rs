use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use plex_watcher::storage::ConfigStore;
use plex_watcher::utils::{config, logging};
use plex_watcher::WatcherService;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Plex Watcher - targeted media library rescans",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch folders and rescan changed items until interrupted
    Watch {
        /// Media server URL (overrides the saved one)
        #[arg(long)]
        server: Option<String>,
        /// Media server token
        #[arg(long)]
        token: Option<String>,
        /// Folder to watch, relative to MEDIA_ROOT or absolute (repeatable)
        #[arg(long = "path")]
        paths: Vec<PathBuf>,
        /// Quiet period in seconds before rescanning
        #[arg(long, alias = "interval")]
        cooldown: Option<u64>,
    },
    /// Rescan the given folders right away
    Scan {
        #[arg(index = 1, required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Check that the media server answers
    Test {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the saved configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = config::load_settings()?;
    logging::init_tracing(&settings);

    match args.command {
        Commands::Watch {
            server,
            token,
            paths,
            cooldown,
        } => watch(settings, server, token, paths, cooldown).await,
        Commands::Scan {
            paths,
            server,
            token,
        } => {
            let (server, token) = credentials(&settings, server, token).await?;
            let service = WatcherService::with_defaults(settings);
            let report = service.scan_paths_with(&server, &token, &paths).await?;
            for path in &report.scanned {
                println!("scanned {}", path);
            }
            for failure in &report.errors {
                eprintln!("failed {}: {}", failure.path, failure.message);
            }
            if !report.is_success() {
                bail!("{} of {} paths failed", report.errors.len(), paths.len());
            }
            Ok(())
        }
        Commands::Test { server, token } => {
            let (server, token) = credentials(&settings, server, token).await?;
            let service = WatcherService::with_defaults(settings);
            if service.test_connection(&server, &token).await {
                println!("Connected to {}", server);
                Ok(())
            } else {
                bail!("could not connect to {}", server)
            }
        }
        Commands::Status => {
            let store = ConfigStore::new(settings.config_path.clone());
            match store.load().await? {
                Some(mut record) => {
                    if record.credential.is_some() {
                        record.credential = Some("********".to_string());
                    }
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => println!("No saved configuration at {}", store.path().display()),
            }
            Ok(())
        }
    }
}

async fn watch(
    settings: config::Settings,
    server: Option<String>,
    token: Option<String>,
    paths: Vec<PathBuf>,
    cooldown: Option<u64>,
) -> Result<()> {
    info!("Starting Plex Watcher v{}", env!("CARGO_PKG_VERSION"));
    info!("Media root: {}", settings.media_root.display());

    let service = WatcherService::with_defaults(settings);
    service
        .restore()
        .await
        .context("failed to restore saved configuration")?;

    for path in &paths {
        service.add_path(path)?;
    }

    if server.is_some() || token.is_some() || cooldown.is_some() {
        let cooldown = cooldown.unwrap_or(service.get_status().cooldown_seconds);
        let (server, token) = credentials(service.settings(), server, token).await?;
        service.configure(&server, &token, cooldown).await?;
    }

    service.start().await?;
    info!(
        "Rescans fire after {} of quiet",
        humantime::format_duration(Duration::from_secs(service.get_status().cooldown_seconds))
    );

    shutdown_signal().await;
    service.stop().await;
    info!("Plex Watcher stopped gracefully");
    Ok(())
}

/// Command-line values first, then the saved record.
async fn credentials(
    settings: &config::Settings,
    server: Option<String>,
    token: Option<String>,
) -> Result<(String, String)> {
    let saved = ConfigStore::new(settings.config_path.clone()).load().await?;
    let server = server.or_else(|| saved.as_ref().and_then(|r| r.remote_endpoint.clone()));
    let token = token.or_else(|| saved.as_ref().and_then(|r| r.credential.clone()));
    match (server, token) {
        (Some(server), Some(token)) => Ok((server, token)),
        _ => bail!("no media server configured; pass --server and --token"),
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
