//! Manuscript metadata (`umb.toml`) and remote fetch settings.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use toml::value::Datetime;

use crate::error::{Result, UmbError};

pub const DEFAULT_DOI_BASE_URL: &str = "https://doi.org";
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 50;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for remote lookups.
///
/// Every field can be overridden from the environment so that tests and
/// mirrors can point the tool elsewhere.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub doi_base_url: String,
    pub requests_per_second: u32,
    pub max_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            doi_base_url: DEFAULT_DOI_BASE_URL.to_string(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            max_delay: DEFAULT_MAX_DELAY,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("umb/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    /// Defaults overridden by `UMB_DOI_BASE_URL`, `UMB_REQUESTS_PER_SECOND`,
    /// `UMB_MAX_DELAY_MS` and `UMB_API_TIMEOUT_SECS`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("UMB_DOI_BASE_URL") {
            config.doi_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(rate) = env_number("UMB_REQUESTS_PER_SECOND") {
            config.requests_per_second = rate as u32;
        }
        if let Some(ms) = env_number("UMB_MAX_DELAY_MS") {
            config.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_number("UMB_API_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manuscript {
    pub title: String,
    pub date: Datetime,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en_US".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funders: Vec<String>,
    #[serde(default)]
    pub corresponding: bool,
}

/// Contents of `umb.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub umb: ToolInfo,
    pub manuscript: Manuscript,
    pub authors: Vec<Author>,
    /// Distinct affiliations in first-seen order; the index of an affiliation
    /// in the document is its position here plus one.
    #[serde(skip)]
    affiliations: Vec<String>,
}

impl Metadata {
    pub fn new(umb: ToolInfo, manuscript: Manuscript, authors: Vec<Author>) -> Self {
        let mut metadata = Self {
            umb,
            manuscript,
            authors,
            affiliations: Vec::new(),
        };
        metadata.index_affiliations();
        metadata
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut metadata: Metadata = toml::from_str(content)?;
        metadata.index_affiliations();
        Ok(metadata)
    }

    pub fn read_toml(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(UmbError::io(path))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    fn index_affiliations(&mut self) {
        let mut seen = Vec::new();
        for affiliation in self.authors.iter().flat_map(|a| &a.affiliations) {
            if !seen.contains(affiliation) {
                seen.push(affiliation.clone());
            }
        }
        self.affiliations = seen;
    }

    pub fn affiliations(&self) -> &[String] {
        &self.affiliations
    }

    /// One-based index of an affiliation, stable for the lifetime of this metadata.
    pub fn affiliation_index(&self, affiliation: &str) -> Option<usize> {
        self.affiliations
            .iter()
            .position(|a| a == affiliation)
            .map(|i| i + 1)
    }
}
