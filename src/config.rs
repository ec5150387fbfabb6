//! Import configuration.
//!
//! The core has no CLI surface; the host collects these fields (from
//! arguments, JSON, or TOML via serde) and hands the object to
//! [`crate::import::import`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnomedError};
use crate::lang::Language;

/// Everything the importer needs to turn an RF2 source tree into a cache file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Root of the RF2 snapshot tree.
    pub source: PathBuf,
    /// Directory the cache file is written to. Empty = platform data dir.
    #[serde(default)]
    pub dest: PathBuf,
    /// Edition module SCTID, e.g. "900000000000207008" for the International
    /// edition.
    pub edition: String,
    /// Release date, YYYYMMDD.
    pub version: String,
    /// Edition URI, e.g. "http://snomed.info/sct/900000000000207008".
    pub uri: String,
    /// Default language as a BCP-47 tag, e.g. "en" or "en-US".
    pub language: String,
    /// Replace an existing cache file for the same edition/version.
    #[serde(default)]
    pub overwrite: bool,
    /// Build the word/stem indexes. Disabling trades text search for
    /// import speed; everything else still works.
    #[serde(default = "default_true")]
    pub create_indexes: bool,
}

fn default_true() -> bool {
    true
}

impl ImportConfig {
    /// Validate the configuration before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if !self.source.exists() {
            return Err(SnomedError::BadConfig(format!(
                "source directory does not exist: {}",
                self.source.display()
            )));
        }
        if self.edition.is_empty() || !self.edition.chars().all(|c| c.is_ascii_digit()) {
            return Err(SnomedError::BadConfig(format!(
                "edition must be an SCTID, got '{}'",
                self.edition
            )));
        }
        if self.version.len() != 8 || !self.version.chars().all(|c| c.is_ascii_digit()) {
            return Err(SnomedError::BadConfig(format!(
                "version must be YYYYMMDD, got '{}'",
                self.version
            )));
        }
        if self.uri.is_empty() {
            return Err(SnomedError::BadConfig("uri must not be empty".to_string()));
        }
        // Unknown primary subtags import fine but stem with the English
        // stemmer; reject only the unparseable.
        if Language::from_tag(&self.language).is_none() {
            return Err(SnomedError::BadConfig(format!(
                "language must be a BCP-47 tag, got '{}'",
                self.language
            )));
        }
        Ok(())
    }

    /// The default language parsed from the configured BCP-47 tag.
    pub fn default_language(&self) -> Language {
        Language::from_tag(&self.language).unwrap_or(Language::En)
    }

    /// Directory the cache file lands in: `dest`, or the platform-local data
    /// directory when `dest` is empty.
    pub fn dest_dir(&self) -> PathBuf {
        if self.dest.as_os_str().is_empty() {
            let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
            base.join("snomed-cache")
        } else {
            self.dest.clone()
        }
    }

    /// Full path of the cache file for this (edition, version) pair.
    pub fn cache_path(&self) -> PathBuf {
        self.dest_dir()
            .join(format!("{}_{}.cache", self.edition, self.version))
    }

    /// The versioned URI recorded inside the cache.
    pub fn version_uri(&self) -> String {
        format!("{}/version/{}", self.uri.trim_end_matches('/'), self.version)
    }
}

/// Convenience for tests and hosts: a config pointing at `source` with the
/// International edition defaults.
pub fn international_defaults(source: &Path, dest: &Path) -> ImportConfig {
    ImportConfig {
        source: source.to_path_buf(),
        dest: dest.to_path_buf(),
        edition: "900000000000207008".to_string(),
        version: "20240201".to_string(),
        uri: "http://snomed.info/sct/900000000000207008".to_string(),
        language: "en".to_string(),
        overwrite: true,
        create_indexes: true,
    }
}
