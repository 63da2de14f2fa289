// Extraction side of the yt-dlp integration
//
// - cli: shallow playlist resolution with the native `yt-dlp` binary
// - diagnostics: names the likely cause of a failed entry for the logs

mod cli;
mod diagnostics;

pub use cli::FlatPlaylistExtractor;
pub use diagnostics::{diagnose, diagnose_message, FailureReason};
