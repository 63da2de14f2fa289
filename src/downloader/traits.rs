// Gateway traits for the external media tool

use std::path::Path;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{Entry, PipelineOptions, ResolvedNode};

/// Resolves a source URL into entries without downloading anything.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    /// Name of the gateway (for logging)
    fn name(&self) -> &'static str;

    /// Describe what `url` points to. Redirects are returned as-is, the
    /// caller decides whether to follow them.
    async fn resolve_shallow(&self, url: &str) -> Result<ResolvedNode, DownloadError>;
}

/// Downloads and post-processes a single entry.
#[async_trait]
pub trait ProcessingGateway: Send + Sync {
    /// Name of the gateway (for logging)
    fn name(&self) -> &'static str;

    /// Fetch `entry` and run the post-processing pipeline. Every file is
    /// written below `output_dir`.
    async fn process(
        &self,
        entry: &Entry,
        output_dir: &Path,
        options: &PipelineOptions,
    ) -> Result<(), DownloadError>;
}
