pub mod cli;
pub mod config;
pub mod downloader;
pub mod ledger;
pub mod logging;

use std::process::ExitCode;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use cli::{Cli, Command};
use config::{read_config, Config, ConfigError};
use downloader::backends::YtDlpProcessor;
use downloader::extractors::FlatPlaylistExtractor;
use downloader::tools::YtDlp;
use downloader::{DownloadError, Runner};
use ledger::{Ledger, LedgerEntry, LedgerError};

/// Errors that stop the program before or outside a sync batch.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("yt-dlp is not usable: {0}")]
    Tool(#[source] DownloadError),

    #[error("No entry {site}/{id} in the ledger")]
    UnknownEntry { site: String, id: String },

    #[error("Error writing output: {0}")]
    Output(#[from] serde_json::Error),
}

pub async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let command = cli.action();
    let config = load_config(&cli, matches!(command, Command::Sync { .. })).await?;

    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| config.global.database.clone());
    tracing::debug!(database = %database.display(), "Opening ledger");
    let ledger = Ledger::open(&database).await?;
    ledger.initialize().await?;

    let result = match command {
        Command::Sync { only } => sync(&config, &ledger, &only).await,
        Command::Retry { site, id, group } => {
            let row = ledger.request_retry(group.as_deref(), &site, &id).await?;
            tracing::info!(site = %row.source_site, id = %row.external_id, "Retry requested");
            Ok(ExitCode::SUCCESS)
        }
        Command::History { site, id, json } => history(&ledger, &site, &id, json).await,
    };

    ledger.close().await;
    result
}

/// The config file is required for `sync`; the other commands only need
/// the database path and fall back to defaults when the file is absent.
async fn load_config(cli: &Cli, required: bool) -> Result<Config, AppError> {
    if !required && !cli.config.exists() {
        tracing::debug!(config = %cli.config.display(), "No config file, using defaults");
        return Ok(Config::default());
    }
    Ok(read_config(&cli.config).await?)
}

async fn sync(config: &Config, ledger: &Ledger, only: &[String]) -> Result<ExitCode, AppError> {
    let tool = YtDlp::locate(config.global.ytdlp_path.as_deref())
        .with_proxy(config.global.proxy.clone());
    let version = tool.version().await.map_err(AppError::Tool)?;
    tracing::info!(path = %tool.path().display(), %version, "Using yt-dlp");

    let extractor = FlatPlaylistExtractor::new(tool.clone(), config.global.resolve_timeout);
    let processor = YtDlpProcessor::new(tool);

    let summary = Runner::new(config, ledger, &extractor, &processor)
        .run(only)
        .await;

    let failed = summary.failed_sources();
    if failed.is_empty() {
        tracing::info!(sources = summary.outcomes.len(), "All sources synced");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(failed = ?failed, "Some sources failed");
        Ok(ExitCode::FAILURE)
    }
}

async fn history(ledger: &Ledger, site: &str, id: &str, json: bool) -> Result<ExitCode, AppError> {
    let rows = ledger.history(site, id).await?;
    if rows.is_empty() {
        return Err(AppError::UnknownEntry {
            site: site.to_string(),
            id: id.to_string(),
        });
    }

    if json {
        let values: Vec<_> = rows.iter().map(history_json).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        for row in &rows {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                row.seq,
                format_timestamp(row),
                row.state.as_str(),
                row.group.as_deref().unwrap_or("-"),
                row.caption.as_deref().unwrap_or("-"),
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn format_timestamp(row: &LedgerEntry) -> String {
    row.timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| row.timestamp.unix_timestamp().to_string())
}

fn history_json(row: &LedgerEntry) -> serde_json::Value {
    serde_json::json!({
        "seq": row.seq,
        "id": row.external_id,
        "site": row.source_site,
        "group": row.group,
        "caption": row.caption,
        "state": row.state.as_str(),
        "timestamp": format_timestamp(row),
    })
}
