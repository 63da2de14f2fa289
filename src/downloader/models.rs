// Common data models for the sync pipeline

use std::time::Duration;

/// Site key used when yt-dlp reports neither `ie_key` nor `extractor_key`.
pub const GENERIC_SITE_KEY: &str = "Generic";

/// One processable item discovered inside a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Extractor key reported by yt-dlp (`Youtube`, `Niconico`, ...)
    pub site_key: String,
    /// Site-assigned identifier, when the site supplies one
    pub id: Option<String>,
    pub title: Option<String>,
    /// URL handed back to the processing gateway
    pub url: String,
}

impl Entry {
    pub fn new(site_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            id: None,
            title: None,
            url: url.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Build an entry from one element of yt-dlp's flat `entries` array.
    ///
    /// Returns `None` when the element carries nothing yt-dlp could be
    /// pointed at again.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let text = |key: &str| {
            json[key]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };

        let site_key = text("ie_key")
            .or_else(|| text("extractor_key"))
            .unwrap_or_else(|| GENERIC_SITE_KEY.to_string());
        let id = text("id");
        let url = text("url")
            .or_else(|| text("webpage_url"))
            .or_else(|| id.clone())?;

        Some(Self {
            site_key,
            id,
            title: text("title"),
            url,
        })
    }
}

/// What a source URL points to, before anything is downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedNode {
    /// Points at another URL that has to be resolved again
    Redirect { url: String },
    /// Carries a finite sequence of entries
    Collection {
        title: Option<String>,
        entries: Vec<Entry>,
    },
    /// Anything else (a single video, an unknown `_type`)
    Other { kind: String },
}

impl ResolvedNode {
    /// Interpret yt-dlp `--dump-single-json` output.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let kind = json["_type"].as_str().unwrap_or("video");

        if matches!(kind, "url" | "url_transparent") {
            if let Some(url) = json["url"].as_str() {
                return Self::Redirect {
                    url: url.to_string(),
                };
            }
        }

        match json["entries"].as_array() {
            Some(items) => Self::Collection {
                title: json["title"].as_str().map(|s| s.to_string()),
                entries: items
                    .iter()
                    .filter(|item| !item.is_null())
                    .filter_map(|item| {
                        let entry = Entry::from_json(item);
                        if entry.is_none() {
                            tracing::warn!(item = %item, "Dropping playlist item without a usable url");
                        }
                        entry
                    })
                    .collect(),
            },
            None => Self::Other {
                kind: kind.to_string(),
            },
        }
    }
}

/// Post-processing pipeline shared by every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Target audio codec for `--audio-format`
    pub audio_format: String,
    /// Arguments forwarded to ffmpeg via `--postprocessor-args`
    pub postprocessor_args: Vec<String>,
    pub add_metadata: bool,
    /// Write the thumbnail and embed it into the audio file
    pub embed_thumbnail: bool,
    /// Read site credentials from `~/.netrc`
    pub use_netrc: bool,
    /// Raw yt-dlp arguments appended before the URL
    pub extra_args: Vec<String>,
    /// Upper bound for one entry's download and post-processing
    pub entry_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            audio_format: "m4a".to_string(),
            postprocessor_args: ["-vn", "-b:a", "264k", "-strict", "-2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            add_metadata: true,
            embed_thumbnail: true,
            use_netrc: true,
            extra_args: Vec::new(),
            entry_timeout: Duration::from_secs(3600),
        }
    }
}
