use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{Entry, PipelineOptions};
use crate::downloader::tools::YtDlp;
use crate::downloader::traits::ProcessingGateway;
use crate::downloader::utils::run_output_with_timeout;

/// Downloads one entry, extracts its audio and tags it
pub struct YtDlpProcessor {
    tool: YtDlp,
}

impl YtDlpProcessor {
    pub fn new(tool: YtDlp) -> Self {
        Self { tool }
    }

    fn build_args(&self, entry: &Entry, output_dir: &Path, options: &PipelineOptions) -> Vec<String> {
        let mut args = self.tool.common_args();
        args.extend([
            "--no-playlist".to_string(),
            "--no-overwrites".to_string(),
            "-P".to_string(),
            output_dir.to_string_lossy().to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            options.audio_format.clone(),
        ]);

        if !options.postprocessor_args.is_empty() {
            args.push("--postprocessor-args".to_string());
            args.push(options.postprocessor_args.join(" "));
        }
        if options.add_metadata {
            args.push("--add-metadata".to_string());
        }
        if options.embed_thumbnail {
            args.push("--write-thumbnail".to_string());
            args.push("--embed-thumbnail".to_string());
        }
        if options.use_netrc {
            args.push("--netrc".to_string());
        }
        args.extend(options.extra_args.iter().cloned());

        args.push("--".to_string());
        args.push(entry.url.clone());
        args
    }
}

/// Files reported by yt-dlp, in the order it wrote them.
///
/// Lines look like:
/// [download] Destination: Artist - Title [abc].webm
/// [ExtractAudio] Destination: Artist - Title [abc].m4a
/// [download] Artist - Title [abc].m4a has already been downloaded
fn written_files(stdout: &str) -> Vec<String> {
    lazy_static::lazy_static! {
        static ref DEST_RE: Regex = Regex::new(r"^\[(\w+)\]\s+Destination:\s+(.+)$").unwrap();
        static ref ALREADY_RE: Regex = Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded").unwrap();
    }

    stdout
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            DEST_RE
                .captures(line)
                .and_then(|caps| caps.get(2))
                .or_else(|| ALREADY_RE.captures(line).and_then(|caps| caps.get(1)))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

#[async_trait]
impl ProcessingGateway for YtDlpProcessor {
    fn name(&self) -> &'static str {
        "yt-dlp-audio"
    }

    async fn process(
        &self,
        entry: &Entry,
        output_dir: &Path,
        options: &PipelineOptions,
    ) -> Result<(), DownloadError> {
        let args = self.build_args(entry, output_dir, options);
        tracing::debug!(
            command = %format!("{} {}", self.tool.path().display(), args.join(" ")),
            "Processing entry"
        );

        let output = run_output_with_timeout(
            self.tool.path(),
            &args,
            Some(output_dir),
            options.entry_timeout,
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::from(stderr.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        for file in written_files(&stdout) {
            tracing::debug!(file = %file, "yt-dlp wrote file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry() -> Entry {
        Entry::new("Youtube", "https://www.youtube.com/watch?v=abc")
            .with_id("abc")
            .with_title("Song")
    }

    #[test]
    fn test_default_pipeline_args() {
        let processor = YtDlpProcessor::new(YtDlp::new("yt-dlp"));
        let args = processor.build_args(&entry(), &PathBuf::from("/music/demo"), &PipelineOptions::default());

        let joined = args.join(" ");
        assert!(joined.contains("-P /music/demo"));
        assert!(joined.contains("-x --audio-format m4a"));
        assert!(joined.contains("--postprocessor-args -vn -b:a 264k -strict -2"));
        assert!(joined.contains("--add-metadata"));
        assert!(joined.contains("--write-thumbnail --embed-thumbnail"));
        assert!(joined.contains("--netrc"));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_disabled_steps_are_omitted() {
        let processor = YtDlpProcessor::new(YtDlp::new("yt-dlp"));
        let options = PipelineOptions {
            add_metadata: false,
            embed_thumbnail: false,
            use_netrc: false,
            postprocessor_args: Vec::new(),
            extra_args: vec!["--limit-rate".to_string(), "2M".to_string()],
            ..PipelineOptions::default()
        };
        let args = processor.build_args(&entry(), &PathBuf::from("out"), &options);

        assert!(!args.contains(&"--add-metadata".to_string()));
        assert!(!args.contains(&"--embed-thumbnail".to_string()));
        assert!(!args.contains(&"--netrc".to_string()));
        assert!(!args.contains(&"--postprocessor-args".to_string()));
        let rate = args.iter().position(|a| a == "--limit-rate").unwrap();
        assert_eq!(args[rate + 1], "2M");
    }

    #[test]
    fn test_written_files() {
        let stdout = "[youtube] abc: Downloading webpage\n\
                      [download] Destination: Song [abc].webm\n\
                      [ExtractAudio] Destination: Song [abc].m4a\n\
                      [download] Other [def].m4a has already been downloaded\n";
        assert_eq!(
            written_files(stdout),
            vec!["Song [abc].webm", "Song [abc].m4a", "Other [def].m4a"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_carries_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let processor = YtDlpProcessor::new(YtDlp::new(&script));
        let err = processor
            .process(&entry(), dir.path(), &PipelineOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DownloadError::Unavailable("ERROR: [youtube] abc: Video unavailable".to_string())
        );
    }
}
