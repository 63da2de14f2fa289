use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::DownloadError;
use super::utils::run_output_with_timeout;

const BINARY_NAME: &str = "yt-dlp";

/// A located yt-dlp executable plus the arguments every invocation shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlp {
    path: PathBuf,
    proxy: Option<String>,
}

impl YtDlp {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            proxy: None,
        }
    }

    /// Use the configured binary if given, otherwise search the usual
    /// install locations and `PATH`.
    pub fn locate(configured: Option<&Path>) -> Self {
        match configured {
            Some(path) => Self::new(path),
            None => Self::new(find_ytdlp()),
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arguments prepended to every command line.
    pub fn common_args(&self) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string(), "--no-progress".to_string()];
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args
    }

    /// Ask the binary for its version; fails if it cannot be executed.
    pub async fn version(&self) -> Result<String, DownloadError> {
        let output = run_output_with_timeout(
            &self.path,
            &["--version".to_string()],
            None,
            Duration::from_secs(30),
        )
        .await?;

        if !output.status.success() {
            return Err(DownloadError::ToolNotFound(format!(
                "{} --version exited with {}",
                self.path.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn find_ytdlp() -> PathBuf {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac, pip --user installs
        "/usr/bin/yt-dlp",          // System installation
    ];

    for path in common_paths {
        if Path::new(path).exists() {
            return PathBuf::from(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let local = home.join(".local/bin").join(BINARY_NAME);
        if local.exists() {
            return local;
        }
    }

    // Hope it's in PATH
    PathBuf::from(BINARY_NAME)
}
