// Failure diagnostics - names the likely cause of a failed entry
//
// Used to annotate per-entry failure logs so an operator can tell a deleted
// video from a throttled connection without reading raw yt-dlp output.

use std::fmt;

use crate::downloader::errors::DownloadError;

/// Likely cause of a per-entry failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Deleted, private or otherwise gone for good
    Unavailable,

    /// Login, membership or age verification required
    AuthRequired,

    /// Geographic restriction
    GeoBlocked,

    /// 429, bot detection, captcha
    RateLimited,

    /// Network stall or our own per-entry timeout
    Timeout,

    /// DRM, purchase or rental
    Protected,

    /// yt-dlp itself could not run
    ToolMissing,

    /// ffmpeg step failed after the download
    Postprocessing,

    Unknown,
}

impl FailureReason {
    /// Whether an operator retry later has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Unknown)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unavailable => "media unavailable",
            Self::AuthRequired => "login required",
            Self::GeoBlocked => "geographic restriction",
            Self::RateLimited => "rate limited",
            Self::Timeout => "timed out",
            Self::Protected => "DRM or paid content",
            Self::ToolMissing => "yt-dlp not runnable",
            Self::Postprocessing => "post-processing failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Classify a gateway error
pub fn diagnose(error: &DownloadError) -> FailureReason {
    match error {
        DownloadError::NetworkTimeout | DownloadError::TimedOut(_) => FailureReason::Timeout,
        DownloadError::ToolNotFound(_) => FailureReason::ToolMissing,
        DownloadError::Blocked(msg) => match diagnose_message(msg) {
            FailureReason::Unknown => FailureReason::RateLimited,
            reason => reason,
        },
        DownloadError::Unavailable(msg) => match diagnose_message(msg) {
            FailureReason::Unknown => FailureReason::Unavailable,
            reason => reason,
        },
        other => diagnose_message(&other.to_string()),
    }
}

/// Classify a raw error message, most specific patterns first
pub fn diagnose_message(error: &str) -> FailureReason {
    let lower = error.to_lowercase();

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("requires purchase")
        || lower.contains("rental")
        || lower.contains("requires payment")
    {
        return FailureReason::Protected;
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("sign in to confirm your age")
        || lower.contains("login required")
        || lower.contains("account credentials")
        || lower.contains("premium members")
    {
        return FailureReason::AuthRequired;
    }

    if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("has been deleted")
        || lower.contains("404")
    {
        return FailureReason::Unavailable;
    }

    if lower.contains("not available in your country") || lower.contains("geo restrict") {
        return FailureReason::GeoBlocked;
    }

    if lower.contains("429")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
        || lower.contains("captcha")
        || lower.contains("confirm you're not a bot")
    {
        return FailureReason::RateLimited;
    }

    if lower.contains("postprocessing") || lower.contains("ffmpeg") || lower.contains("ffprobe") {
        return FailureReason::Postprocessing;
    }

    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("connection reset") {
        return FailureReason::Timeout;
    }

    FailureReason::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_video() {
        let reason = diagnose_message("ERROR: [youtube] abc: Private video. Sign in if you've been granted access");
        assert_eq!(reason, FailureReason::Unavailable);
        assert!(!reason.is_transient());
    }

    #[test]
    fn test_members_only() {
        assert_eq!(
            diagnose_message("ERROR: Join this channel to get access to members-only content"),
            FailureReason::AuthRequired
        );
    }

    #[test]
    fn test_postprocessing() {
        assert_eq!(
            diagnose_message("ERROR: Postprocessing: audio conversion failed: Error opening output files"),
            FailureReason::Postprocessing
        );
    }

    #[test]
    fn test_geo() {
        assert_eq!(
            diagnose_message("ERROR: [niconico] sm9: This video is not available in your country"),
            FailureReason::GeoBlocked
        );
    }

    #[test]
    fn test_missing_output_file_is_postprocessing() {
        let err = DownloadError::from(
            "ERROR: Postprocessing: Error opening output files: No such file or directory".to_string(),
        );
        let reason = diagnose(&err);
        assert_eq!(reason, FailureReason::Postprocessing);
        assert_ne!(reason, FailureReason::ToolMissing);
    }

    #[test]
    fn test_error_variants() {
        assert_eq!(
            diagnose(&DownloadError::TimedOut(std::time::Duration::from_secs(3600))),
            FailureReason::Timeout
        );
        assert_eq!(
            diagnose(&DownloadError::ToolNotFound("yt-dlp".to_string())),
            FailureReason::ToolMissing
        );
        assert_eq!(
            diagnose(&DownloadError::Blocked("HTTP Error 429".to_string())),
            FailureReason::RateLimited
        );
        assert_eq!(
            diagnose(&DownloadError::Unavailable("gone".to_string())),
            FailureReason::Unavailable
        );
        assert!(FailureReason::Timeout.is_transient());
    }
}
