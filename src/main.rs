// ABOUTME: Entry point for the plydata maintenance CLI.
// ABOUTME: Parses arguments, initializes tracing, and runs store health checks and stats.

use std::fs;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use plydata_service::{DataLayer, LoadSource, ServiceConfig};
use plydata_store::{RecordStore, list_backups, lock};

#[derive(Parser)]
#[command(
    name = "plydata",
    about = "Maintenance CLI for plydata record stores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every store and report whether backup recovery was needed.
    Check,
    /// Print store sizes, backup counts, lock holders, and cache stats.
    Stats,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plydata=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = ServiceConfig::from_env()?;
    let data = DataLayer::open(&config)?;

    match cli.command {
        Commands::Check => check(&data),
        Commands::Stats => stats(&data),
    }
}

/// Load both stores and report provenance. Exits non-zero when any store
/// needed backup recovery or came up empty after corruption.
fn check(data: &DataLayer) -> anyhow::Result<bool> {
    let mut healthy = true;

    for store in [data.user_store(), data.server_store()] {
        let loaded = store.load()?;
        println!(
            "{}: {} records ({:?})",
            store.path().display(),
            loaded.document.len(),
            loaded.source
        );

        match loaded.source {
            LoadSource::Primary | LoadSource::Missing => {}
            LoadSource::Backup => {
                tracing::warn!("{} was recovered from a backup", store.path().display());
                healthy = false;
            }
            LoadSource::AllBackupsInvalid => {
                tracing::error!("{} lost all data to corruption", store.path().display());
                healthy = false;
            }
        }
    }

    Ok(healthy)
}

fn stats(data: &DataLayer) -> anyhow::Result<bool> {
    for store in [data.user_store(), data.server_store()] {
        print_store_stats(store)?;
    }

    let cache = data.cache_stats();
    println!("cache: {}", serde_json::to_string_pretty(&cache)?);
    Ok(true)
}

fn print_store_stats(store: &RecordStore) -> anyhow::Result<()> {
    let size = match fs::metadata(store.path()) {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    let backups = list_backups(store.path())?.len();

    println!(
        "{}: {} bytes, {} backups",
        store.path().display(),
        size,
        backups
    );

    if let Some(info) = lock::read_info(store.path())? {
        println!(
            "  locked by pid {} since {}",
            info.pid,
            info.acquired_at.to_rfc3339()
        );
    }

    Ok(())
}
