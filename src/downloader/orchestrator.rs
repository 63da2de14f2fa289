// Sync task: one configured source, from URL to ledger rows

use std::path::{Path, PathBuf};

use crate::config::SourceConfig;
use crate::ledger::{EntryState, Ledger, LedgerError};

use super::errors::{DownloadError, SyncError};
use super::extractors::diagnose;
use super::models::{Entry, PipelineOptions, ResolvedNode};
use super::traits::{ExtractionGateway, ProcessingGateway};
use super::utils::expand_home;

/// Counters for one finished source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Failures above a quarter of all entries abort the source.
    pub fn exceeds_failure_threshold(&self) -> bool {
        self.failed * 4 > self.total
    }
}

pub struct SyncTask<'a> {
    name: &'a str,
    source: &'a SourceConfig,
    default_output_dir: &'a str,
    ledger: &'a Ledger,
    extractor: &'a dyn ExtractionGateway,
    processor: &'a dyn ProcessingGateway,
}

impl<'a> SyncTask<'a> {
    pub fn new(
        name: &'a str,
        source: &'a SourceConfig,
        default_output_dir: &'a str,
        ledger: &'a Ledger,
        extractor: &'a dyn ExtractionGateway,
        processor: &'a dyn ProcessingGateway,
    ) -> Self {
        Self {
            name,
            source,
            default_output_dir,
            ledger,
            extractor,
            processor,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        expand_home(
            self.source
                .output_dir
                .as_deref()
                .unwrap_or(self.default_output_dir),
        )
    }

    /// Process every entry of the source.
    ///
    /// Per-entry failures are logged, recorded and counted; they only
    /// surface as [`SyncError::TooManyFailures`] once every entry has been
    /// attempted.
    pub async fn run(&self, pipeline: &PipelineOptions) -> Result<SyncReport, SyncError> {
        let out_dir = self.prepare_output_dir().await?;

        let entries = self.resolve_entries().await?;
        tracing::info!(
            source = self.name,
            entries = entries.len(),
            output_dir = %out_dir.display(),
            "Syncing source"
        );

        let mut report = SyncReport {
            total: entries.len(),
            ..SyncReport::default()
        };

        for entry in &entries {
            match self.sync_entry(entry, &out_dir, pipeline).await? {
                EntryOutcome::Skipped => report.skipped += 1,
                EntryOutcome::Succeeded => report.succeeded += 1,
                EntryOutcome::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            source = self.name,
            total = report.total,
            skipped = report.skipped,
            succeeded = report.succeeded,
            failed = report.failed,
            "Source finished"
        );

        if report.exceeds_failure_threshold() {
            return Err(SyncError::TooManyFailures {
                name: self.name.to_string(),
                failed: report.failed,
                total: report.total,
            });
        }
        Ok(report)
    }

    /// Create the output directory and return its absolute path, so the
    /// processing gateway never has to interpret a relative one.
    async fn prepare_output_dir(&self) -> Result<PathBuf, SyncError> {
        let dir = self.output_dir();
        let io_error = |error| SyncError::OutputDir {
            path: dir.clone(),
            error,
        };
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;
        tokio::fs::canonicalize(&dir).await.map_err(io_error)
    }

    /// Resolve the source URL, following at most one redirect.
    async fn resolve_entries(&self) -> Result<Vec<Entry>, SyncError> {
        let url = self.source.url.as_str();
        let mut node = self.resolve(url).await?;

        if let ResolvedNode::Redirect { url: target } = node {
            tracing::debug!(source = self.name, from = url, to = %target, "Following redirect");
            node = self.resolve(&target).await?;
        }

        match node {
            ResolvedNode::Collection { entries, .. } => Ok(entries),
            other => {
                tracing::error!(source = self.name, url, node = ?other, "Entries not found");
                Err(SyncError::UnsupportedSource {
                    url: url.to_string(),
                })
            }
        }
    }

    async fn resolve(&self, url: &str) -> Result<ResolvedNode, SyncError> {
        self.extractor
            .resolve_shallow(url)
            .await
            .map_err(|error| SyncError::Extraction {
                url: url.to_string(),
                error,
            })
    }

    async fn sync_entry(
        &self,
        entry: &Entry,
        out_dir: &Path,
        pipeline: &PipelineOptions,
    ) -> Result<EntryOutcome, SyncError> {
        let previous = match self.ledger.lookup(entry).await {
            Ok(previous) => previous,
            Err(LedgerError::Identity(error)) => {
                tracing::warn!(source = self.name, url = %entry.url, %error, "Cannot identify entry");
                return Ok(EntryOutcome::Failed);
            }
            Err(error) => return Err(error.into()),
        };

        if let Some(row) = &previous {
            if row.state != EntryState::RetryRequested {
                tracing::debug!(
                    source = self.name,
                    site = %row.source_site,
                    id = %row.external_id,
                    state = row.state.as_str(),
                    "Already handled, skipping"
                );
                return Ok(EntryOutcome::Skipped);
            }
        }

        match self.processor.process(entry, out_dir, pipeline).await {
            Ok(()) => {
                let row = self.ledger.record(self.name, entry, EntryState::Succeeded).await?;
                tracing::info!(
                    source = self.name,
                    site = %row.source_site,
                    id = %row.external_id,
                    caption = row.caption.as_deref().unwrap_or(""),
                    "Entry archived"
                );
                Ok(EntryOutcome::Succeeded)
            }
            Err(error) => {
                self.report_failure(entry, &error);
                self.ledger.record(self.name, entry, EntryState::Failed).await?;
                Ok(EntryOutcome::Failed)
            }
        }
    }

    fn report_failure(&self, entry: &Entry, error: &DownloadError) {
        let reason = diagnose(error);
        tracing::warn!(
            source = self.name,
            site = %entry.site_key,
            url = %entry.url,
            gateway = self.processor.name(),
            %reason,
            transient = reason.is_transient(),
            %error,
            "Entry processing failed"
        );
    }
}

enum EntryOutcome {
    Skipped,
    Succeeded,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Serves canned nodes keyed by URL
    struct FakeExtractor {
        nodes: HashMap<String, ResolvedNode>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeExtractor {
        fn new(nodes: Vec<(&str, ResolvedNode)>) -> Self {
            Self {
                nodes: nodes.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExtractionGateway for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn resolve_shallow(&self, url: &str) -> Result<ResolvedNode, DownloadError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.nodes
                .get(url)
                .cloned()
                .ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))
        }
    }

    /// Fails for ids in `failing`, succeeds otherwise, remembers what it saw
    #[derive(Default)]
    struct FakeProcessor {
        failing: HashSet<String>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeProcessor {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|s| s.to_string()).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessingGateway for FakeProcessor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn process(
            &self,
            entry: &Entry,
            _output_dir: &Path,
            _options: &PipelineOptions,
        ) -> Result<(), DownloadError> {
            let id = entry.id.clone().unwrap_or_default();
            self.seen.lock().unwrap().push(id.clone());
            if self.failing.contains(&id) {
                Err(DownloadError::Unavailable(format!("ERROR: {}: Video unavailable", id)))
            } else {
                Ok(())
            }
        }
    }

    const URL: &str = "https://www.youtube.com/playlist?list=PLdemo";

    fn entry(id: &str) -> Entry {
        Entry::new("Youtube", format!("https://www.youtube.com/watch?v={}", id))
            .with_id(id)
            .with_title(format!("Title {}", id))
    }

    fn playlist(ids: &[&str]) -> ResolvedNode {
        ResolvedNode::Collection {
            title: Some("demo".to_string()),
            entries: ids.iter().map(|id| entry(id)).collect(),
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        ledger: Ledger,
        source: SourceConfig,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let ledger = Ledger::in_memory().await.unwrap();
            ledger.initialize().await.unwrap();
            let source = SourceConfig {
                url: URL.to_string(),
                output_dir: Some(dir.path().join("demo").to_string_lossy().to_string()),
            };
            Self { dir, ledger, source }
        }

        async fn run(
            &self,
            extractor: &FakeExtractor,
            processor: &FakeProcessor,
        ) -> Result<SyncReport, SyncError> {
            let default_dir = self.dir.path().to_string_lossy().to_string();
            SyncTask::new("demo", &self.source, &default_dir, &self.ledger, extractor, processor)
                .run(&PipelineOptions::default())
                .await
        }
    }

    #[tokio::test]
    async fn test_threshold_boundary_one_of_four() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![(URL, playlist(&["a", "b", "c", "d"]))]);
        let processor = FakeProcessor::failing(&["b"]);

        let report = fx.run(&extractor, &processor).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                total: 4,
                skipped: 0,
                succeeded: 3,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn test_threshold_boundary_two_of_four() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![(URL, playlist(&["a", "b", "c", "d"]))]);
        let processor = FakeProcessor::failing(&["b", "c"]);

        let err = fx.run(&extractor, &processor).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::TooManyFailures { failed: 2, total: 4, .. }
        ));
        // Every entry was attempted before aborting
        assert_eq!(processor.seen(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_empty_source_never_trips() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![(URL, playlist(&[]))]);
        let processor = FakeProcessor::default();

        let report = fx.run(&extractor, &processor).await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert!(fx.dir.path().join("demo").is_dir());
    }

    #[tokio::test]
    async fn test_succeeded_and_failed_are_skipped() {
        let fx = Fixture::new().await;
        fx.ledger.record("demo", &entry("a"), EntryState::Succeeded).await.unwrap();
        fx.ledger.record("demo", &entry("b"), EntryState::Failed).await.unwrap();

        let extractor = FakeExtractor::new(vec![(URL, playlist(&["a", "b", "c"]))]);
        let processor = FakeProcessor::default();

        let report = fx.run(&extractor, &processor).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(processor.seen(), vec!["c"]);
        assert_eq!(fx.ledger.history("Youtube", "a").await.unwrap().len(), 1);
        assert_eq!(fx.ledger.history("Youtube", "b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![(URL, playlist(&["a", "b", "c", "d", "e"]))]);

        let first = FakeProcessor::failing(&["e"]);
        fx.run(&extractor, &first).await.unwrap();
        assert_eq!(fx.ledger.len().await.unwrap(), 5);

        let second = FakeProcessor::default();
        let report = fx.run(&extractor, &second).await.unwrap();
        assert_eq!(report.skipped, 5);
        assert!(second.seen().is_empty());
        assert_eq!(fx.ledger.len().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_retry_requested_is_processed_once() {
        let fx = Fixture::new().await;
        fx.ledger.record("demo", &entry("a"), EntryState::Failed).await.unwrap();
        fx.ledger.request_retry(None, "Youtube", "a").await.unwrap();

        let extractor = FakeExtractor::new(vec![(URL, playlist(&["a"]))]);
        let processor = FakeProcessor::default();
        fx.run(&extractor, &processor).await.unwrap();
        assert_eq!(processor.seen(), vec!["a"]);

        let rows = fx.ledger.history("Youtube", "a").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].state, EntryState::Succeeded);

        // The new SUCCEEDED row makes the next run skip it again
        let again = FakeProcessor::default();
        fx.run(&extractor, &again).await.unwrap();
        assert!(again.seen().is_empty());
    }

    #[tokio::test]
    async fn test_single_redirect_is_followed() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![
            (
                URL,
                ResolvedNode::Redirect {
                    url: "https://www.youtube.com/playlist?list=PLreal".to_string(),
                },
            ),
            ("https://www.youtube.com/playlist?list=PLreal", playlist(&["a"])),
        ]);
        let processor = FakeProcessor::default();

        let report = fx.run(&extractor, &processor).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(extractor.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_chain_is_unsupported() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![
            (URL, ResolvedNode::Redirect { url: "hop-1".to_string() }),
            ("hop-1", ResolvedNode::Redirect { url: "hop-2".to_string() }),
            ("hop-2", playlist(&["a"])),
        ]);
        let processor = FakeProcessor::default();

        let err = fx.run(&extractor, &processor).await.unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedSource { ref url } if url == URL));
        assert_eq!(*extractor.calls.lock().unwrap(), vec![URL, "hop-1"]);
        assert!(processor.seen().is_empty());
    }

    #[tokio::test]
    async fn test_single_video_is_unsupported() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![(URL, ResolvedNode::Other { kind: "video".to_string() })]);
        let err = fx.run(&extractor, &FakeProcessor::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedSource { .. }));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_fatal() {
        let fx = Fixture::new().await;
        let extractor = FakeExtractor::new(vec![]);
        let err = fx.run(&extractor, &FakeProcessor::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_unidentifiable_entry_counts_as_failure() {
        let fx = Fixture::new().await;
        let anonymous = Entry::new("Youtube", "https://www.youtube.com/watch?v=nope");
        let mut entries: Vec<Entry> = ["a", "b", "c", "d"].iter().map(|id| entry(id)).collect();
        entries.push(anonymous);
        let extractor = FakeExtractor::new(vec![(URL, ResolvedNode::Collection { title: None, entries })]);
        let processor = FakeProcessor::default();

        let report = fx.run(&extractor, &processor).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 4);
        assert_eq!(processor.seen().len(), 4);
        assert_eq!(fx.ledger.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_working_directory_is_untouched() {
        let fx = Fixture::new().await;
        let before = std::env::current_dir().unwrap();

        let ok = FakeExtractor::new(vec![(URL, playlist(&["a"]))]);
        fx.run(&ok, &FakeProcessor::default()).await.unwrap();
        assert_eq!(std::env::current_dir().unwrap(), before);

        let unsupported = FakeExtractor::new(vec![(URL, ResolvedNode::Other { kind: "video".to_string() })]);
        fx.run(&unsupported, &FakeProcessor::default()).await.unwrap_err();
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_threshold_arithmetic() {
        let report = |total, failed| SyncReport {
            total,
            failed,
            ..SyncReport::default()
        };
        assert!(!report(4, 1).exceeds_failure_threshold());
        assert!(report(4, 2).exceeds_failure_threshold());
        assert!(!report(0, 0).exceeds_failure_threshold());
        assert!(report(5, 2).exceeds_failure_threshold());
        assert!(!report(8, 2).exceeds_failure_threshold());
        assert!(report(1, 1).exceeds_failure_threshold());
    }
}
