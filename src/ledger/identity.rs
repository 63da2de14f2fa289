//! Per-site identity derivation.
//!
//! Each extractor backend names its items differently. Some hand out a stable
//! id and title, others only a URL. The registry maps a site key to a pure
//! function turning an [`Entry`] into the `(id, caption)` pair the ledger is
//! keyed on.

use std::collections::HashMap;

use thiserror::Error;

use crate::downloader::models::Entry;

/// Ledger key for one physical media item plus a display caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub external_id: String,
    pub source_site: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("entry from '{site}' has no id")]
    MissingId { site: String },

    #[error("cannot derive an id from url '{url}' ({site})")]
    UnusableUrl { site: String, url: String },
}

/// Derivation function for one site. Must not depend on anything but the entry.
pub type IdentityRule = fn(&Entry) -> Result<Identity, IdentityError>;

/// Strategy map from site key to [`IdentityRule`].
#[derive(Clone)]
pub struct IdentityRegistry {
    rules: HashMap<String, IdentityRule>,
    fallback: IdentityRule,
}

impl IdentityRegistry {
    /// Registry with no site-specific rules; every site uses `fallback`.
    pub fn empty(fallback: IdentityRule) -> Self {
        Self {
            rules: HashMap::new(),
            fallback,
        }
    }

    /// Add or replace the rule for `site_key`.
    pub fn register(&mut self, site_key: impl Into<String>, rule: IdentityRule) -> &mut Self {
        self.rules.insert(site_key.into(), rule);
        self
    }

    pub fn derive(&self, entry: &Entry) -> Result<Identity, IdentityError> {
        let rule = self.rules.get(&entry.site_key).unwrap_or(&self.fallback);
        rule(entry)
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        let mut registry = Self::empty(native_id);
        registry
            .register("Youtube", native_id)
            .register("Niconico", url_path_id);
        registry
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sites: Vec<&String> = self.rules.keys().collect();
        sites.sort();
        f.debug_struct("IdentityRegistry").field("sites", &sites).finish()
    }
}

/// The site's own id, with the title as caption.
pub fn native_id(entry: &Entry) -> Result<Identity, IdentityError> {
    let id = entry
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| IdentityError::MissingId {
            site: entry.site_key.clone(),
        })?;

    Ok(Identity {
        external_id: id.to_string(),
        source_site: entry.site_key.clone(),
        caption: entry.title.clone().unwrap_or_else(|| id.to_string()),
    })
}

/// Last path segment of the URL (`sm9` in `https://www.nicovideo.jp/watch/sm9`),
/// used as both id and caption.
pub fn url_path_id(entry: &Entry) -> Result<Identity, IdentityError> {
    let segment = match url::Url::parse(&entry.url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string()),
        // Bare ids or relative paths
        Err(_) => entry
            .url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.split('/').filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string()),
    };

    let id = segment.ok_or_else(|| IdentityError::UnusableUrl {
        site: entry.site_key.clone(),
        url: entry.url.clone(),
    })?;

    Ok(Identity {
        external_id: id.clone(),
        source_site: entry.site_key.clone(),
        caption: id,
    })
}
