// Flat-playlist extractor - uses the native `yt-dlp` binary
//
// `--flat-playlist` makes yt-dlp list a playlist's entries without visiting
// each one, which is the shallow resolution the sync loop needs.

use std::time::Duration;

use async_trait::async_trait;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::ResolvedNode;
use crate::downloader::tools::YtDlp;
use crate::downloader::traits::ExtractionGateway;
use crate::downloader::utils::run_output_with_timeout;

/// Resolves source URLs with `yt-dlp --flat-playlist --dump-single-json`
pub struct FlatPlaylistExtractor {
    tool: YtDlp,
    timeout: Duration,
}

impl FlatPlaylistExtractor {
    pub fn new(tool: YtDlp, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = self.tool.common_args();
        args.extend([
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--yes-playlist".to_string(),
            "--ignore-no-formats-error".to_string(),
        ]);
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn parse_json(stdout: &[u8]) -> Result<ResolvedNode, DownloadError> {
        let json_str = String::from_utf8_lossy(stdout);
        let json: serde_json::Value = serde_json::from_str(json_str.trim())
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        Ok(ResolvedNode::from_json(&json))
    }
}

#[async_trait]
impl ExtractionGateway for FlatPlaylistExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp-flat-playlist"
    }

    async fn resolve_shallow(&self, url: &str) -> Result<ResolvedNode, DownloadError> {
        let args = self.build_args(url);
        tracing::debug!(
            command = %format!("{} {}", self.tool.path().display(), args.join(" ")),
            "Resolving source"
        );

        let output = run_output_with_timeout(self.tool.path(), &args, None, self.timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::from(stderr.to_string()));
        }

        Self::parse_json(&output.stdout)
    }
}
