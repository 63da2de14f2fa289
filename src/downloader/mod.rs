// Downloader module - sync loop plus the yt-dlp gateways it drives

pub mod backends;
pub mod errors;
pub mod extractors;
pub mod models;
pub mod orchestrator;
pub mod runner;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{DownloadError, SyncError};
pub use models::{Entry, PipelineOptions, ResolvedNode};
pub use orchestrator::{SyncReport, SyncTask};
pub use runner::{RunSummary, Runner, SourceOutcome};
pub use traits::{ExtractionGateway, ProcessingGateway};
