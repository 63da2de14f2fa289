// Runner: every configured source, one after another

use std::time::Duration;

use crate::config::Config;
use crate::ledger::Ledger;

use super::errors::SyncError;
use super::orchestrator::{SyncReport, SyncTask};
use super::traits::{ExtractionGateway, ProcessingGateway};

/// Outcome of one source within a batch.
#[derive(Debug)]
pub struct SourceOutcome {
    pub name: String,
    pub result: Result<SyncReport, SyncError>,
}

/// Outcomes of a whole batch, in the order the sources ran.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<SourceOutcome>,
}

impl RunSummary {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.name.as_str())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }
}

pub struct Runner<'a> {
    config: &'a Config,
    ledger: &'a Ledger,
    extractor: &'a dyn ExtractionGateway,
    processor: &'a dyn ProcessingGateway,
    cooldown: Duration,
}

impl<'a> Runner<'a> {
    pub fn new(
        config: &'a Config,
        ledger: &'a Ledger,
        extractor: &'a dyn ExtractionGateway,
        processor: &'a dyn ProcessingGateway,
    ) -> Self {
        Self {
            config,
            ledger,
            extractor,
            processor,
            cooldown: config.global.cooldown,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sync every source, or only those named in `only` when it is non-empty.
    ///
    /// A fatal error in one source is logged and the batch moves on; sources
    /// are independent of each other. Names in `only` that match no source
    /// are reported as [`SyncError::UnknownSource`] outcomes.
    pub async fn run(&self, only: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        for name in only {
            if self.config.source(name).is_none() {
                tracing::warn!(source = name.as_str(), "No such source in the configuration");
                summary.outcomes.push(SourceOutcome {
                    name: name.clone(),
                    result: Err(SyncError::UnknownSource { name: name.clone() }),
                });
            }
        }

        let selected: Vec<_> = self
            .config
            .sources
            .iter()
            .filter(|(name, _)| only.is_empty() || only.contains(name))
            .collect();

        tracing::info!(
            sources = selected.len(),
            extractor = self.extractor.name(),
            processor = self.processor.name(),
            "Starting batch"
        );

        for (index, (name, source)) in selected.iter().enumerate() {
            if index > 0 && !self.cooldown.is_zero() {
                tracing::debug!(seconds = self.cooldown.as_secs(), "Cooling down");
                tokio::time::sleep(self.cooldown).await;
            }

            let task = SyncTask::new(
                name,
                source,
                &self.config.global.output_dir,
                self.ledger,
                self.extractor,
                self.processor,
            );
            let result = task.run(&self.config.pipeline).await;
            if let Err(error) = &result {
                tracing::error!(source = name.as_str(), %error, "Source failed");
            }

            summary.outcomes.push(SourceOutcome {
                name: name.clone(),
                result,
            });
        }

        summary
    }
}
