//! Configuration file loading.
//!
//! The file is TOML. An optional `[global]` table holds process-wide
//! settings; every other top-level table is a source, synced in the order it
//! appears in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::downloader::models::PipelineOptions;

pub const GLOBAL_SECTION: &str = "global";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error reading config file {}: {error}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Error parsing config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid section [{section}]: {reason}")]
    InvalidSection { section: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGlobal {
    output_dir: Option<String>,
    database: Option<String>,
    cooldown_secs: Option<u64>,
    entry_timeout_secs: Option<u64>,
    resolve_timeout_secs: Option<u64>,
    ytdlp_path: Option<String>,
    proxy: Option<String>,
    audio_format: Option<String>,
    postprocessor_args: Option<String>,
    add_metadata: Option<bool>,
    embed_thumbnail: Option<bool>,
    use_netrc: Option<bool>,
    extra_args: Option<Vec<String>>,
}

/// One configured source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub url: String,
    /// Overrides [`GlobalConfig::output_dir`]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Default output directory, `~` allowed
    pub output_dir: String,
    pub database: PathBuf,
    /// Pause between two sources
    pub cooldown: Duration,
    pub resolve_timeout: Duration,
    pub ytdlp_path: Option<PathBuf>,
    pub proxy: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            output_dir: ".".to_string(),
            database: PathBuf::from("database.sqlite3"),
            cooldown: Duration::from_secs(10),
            resolve_timeout: Duration::from_secs(300),
            ytdlp_path: None,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub pipeline: PipelineOptions,
    /// Sources in file order
    pub sources: Vec<(String, SourceConfig)>,
}

impl Config {
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources
            .iter()
            .find(|(source_name, _)| source_name == name)
            .map(|(_, source)| source)
    }
}

pub async fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
    parse_config(&toml_str)
}

pub fn parse_config(toml_str: &str) -> Result<Config, ConfigError> {
    let table: toml::Table = toml::from_str(toml_str)?;

    let mut config = Config::default();
    for (name, value) in table {
        if !value.is_table() {
            return Err(ConfigError::InvalidSection {
                section: name,
                reason: "expected a table".to_string(),
            });
        }

        if name == GLOBAL_SECTION {
            let global: TomlGlobal = value.try_into().map_err(|e: toml::de::Error| {
                ConfigError::InvalidSection {
                    section: GLOBAL_SECTION.to_string(),
                    reason: e.message().to_string(),
                }
            })?;
            apply_global(&mut config, global);
        } else {
            let source: SourceConfig = value.try_into().map_err(|e: toml::de::Error| {
                ConfigError::InvalidSection {
                    section: name.clone(),
                    reason: e.message().to_string(),
                }
            })?;
            config.sources.push((name, source));
        }
    }

    Ok(config)
}

fn apply_global(config: &mut Config, global: TomlGlobal) {
    let defaults = GlobalConfig::default();
    config.global = GlobalConfig {
        output_dir: global.output_dir.unwrap_or(defaults.output_dir),
        database: global.database.map(PathBuf::from).unwrap_or(defaults.database),
        cooldown: global
            .cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.cooldown),
        resolve_timeout: global
            .resolve_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.resolve_timeout),
        ytdlp_path: global.ytdlp_path.map(PathBuf::from),
        proxy: global.proxy,
    };

    let pipeline = &mut config.pipeline;
    if let Some(format) = global.audio_format {
        pipeline.audio_format = format;
    }
    if let Some(args) = global.postprocessor_args {
        pipeline.postprocessor_args = args.split_whitespace().map(|s| s.to_string()).collect();
    }
    if let Some(enabled) = global.add_metadata {
        pipeline.add_metadata = enabled;
    }
    if let Some(enabled) = global.embed_thumbnail {
        pipeline.embed_thumbnail = enabled;
    }
    if let Some(enabled) = global.use_netrc {
        pipeline.use_netrc = enabled;
    }
    if let Some(args) = global.extra_args {
        pipeline.extra_args = args;
    }
    if let Some(secs) = global.entry_timeout_secs {
        pipeline.entry_timeout = Duration::from_secs(secs);
    }
}
