// Error types for the sync pipeline

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Failure reported by an extraction or processing gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// The remote side did not answer in time
    #[error("Network timeout: the remote site is not responding")]
    NetworkTimeout,

    /// The site refused the request (429, bot detection, etc.)
    #[error("Request blocked by the remote site: {0}")]
    Blocked(String),

    /// The item no longer exists or is private
    #[error("Media unavailable: {0}")]
    Unavailable(String),

    /// yt-dlp not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// URL not understood by any extractor
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Child process exceeded its time budget and was killed
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Classify raw yt-dlp stderr
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429") || lower.contains("too many requests") || lower.contains("blocked") {
            return Self::Blocked(first_error_line(&s));
        }

        if lower.contains("unavailable") || lower.contains("private video") || lower.contains("has been removed") {
            return Self::Unavailable(first_error_line(&s));
        }

        if lower.contains("unsupported url") || lower.contains("invalid url") || lower.contains("is not a valid url") {
            return Self::InvalidUrl(first_error_line(&s));
        }

        if lower.contains("json") {
            return Self::ParseError(s);
        }

        Self::Unknown(first_error_line(&s))
    }
}

/// yt-dlp prints warnings before the actual error; keep the line that matters.
fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr.lines().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or("")
        .to_string()
}

/// Fatal error for one configured source.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Unsupported url: {url}")]
    UnsupportedSource { url: String },

    #[error("No source named '{name}' in the configuration")]
    UnknownSource { name: String },

    #[error("Too many failures in source '{name}': {failed} of {total} entries failed")]
    TooManyFailures {
        name: String,
        failed: usize,
        total: usize,
    },

    #[error("Could not resolve {url}: {error}")]
    Extraction {
        url: String,
        #[source]
        error: DownloadError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Could not prepare output directory {}: {error}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}
