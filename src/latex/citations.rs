//! Resolution of citation keys against the citation cache, the manual
//! references file, and the DOI metadata service.

use log::info;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{FetchError, ReferenceKind, Result, UmbError};
use crate::fetch::Fetcher;
use crate::latex::{BibEntry, Bibliography};

/// Sigil marking a key for DOI lookup, as in `\cite{@10.1103/PhysRev.47.777}`.
pub const DOI_SIGIL: char = '@';
/// Scheme marking a key for DOI lookup, as in `\cite{doi:10.1103/PhysRev.47.777}`.
pub const DOI_SCHEME: &str = "doi:";

/// A citation key as written in the manuscript.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CitationKey {
    /// Resolved from the manual references or the cache only.
    Plain(String),
    /// Holds the DOI with its markers stripped; fetched when not cached.
    Doi(String),
}

impl CitationKey {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (sigil, rest) = match raw.strip_prefix(DOI_SIGIL) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, raw),
        };
        match rest.strip_prefix(DOI_SCHEME) {
            Some(doi) => CitationKey::Doi(doi.trim().to_string()),
            None if sigil => CitationKey::Doi(rest.to_string()),
            None => CitationKey::Plain(rest.to_string()),
        }
    }

    /// The key handed to the document compiler, without any DOI marker.
    pub fn cite_key(&self) -> &str {
        match self {
            CitationKey::Plain(key) | CitationKey::Doi(key) => key,
        }
    }

    pub fn is_doi(&self) -> bool {
        matches!(self, CitationKey::Doi(_))
    }
}

/// Outcome of resolving every observed key against local sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: Bibliography,
    /// Stripped DOIs absent from both the cache and the manual references.
    pub to_fetch: BTreeSet<String>,
}

pub struct CitationReconciler {
    cache_path: PathBuf,
    cache: Bibliography,
    manual: Bibliography,
    unique_keys: BTreeSet<String>,
}

impl CitationReconciler {
    /// Load the citation cache and the manual references. Either file may be absent.
    pub fn new(cache_path: &Path, manual_path: &Path) -> Result<Self> {
        let cache = Bibliography::read_file(cache_path)?;
        let manual = Bibliography::read_file(manual_path)?;
        info!("Loaded {} cached citation(s)", cache.len() + manual.len());
        Ok(Self::from_parts(cache_path, cache, manual))
    }

    pub fn from_parts(cache_path: &Path, cache: Bibliography, manual: Bibliography) -> Self {
        Self {
            cache_path: cache_path.to_path_buf(),
            cache,
            manual,
            unique_keys: BTreeSet::new(),
        }
    }

    /// Record keys seen in a section.
    pub fn observe<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys.extend(keys.into_iter().map(Into::into));
    }

    pub fn cache(&self) -> &Bibliography {
        &self.cache
    }

    /// Look up every observed key without touching the network.
    ///
    /// | key   | order                              | if absent        |
    /// |-------|------------------------------------|------------------|
    /// | plain | manual, then cache                 | missing (fatal)  |
    /// | DOI   | cache, then manual (stripped form) | queued for fetch |
    ///
    /// Plain keys are looked up first. When the same DOI is cited both plain
    /// and marked, the record found for the plain key is kept.
    pub fn resolve(&self) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let mut missing = Vec::new();

        let keys: BTreeSet<CitationKey> =
            self.unique_keys.iter().map(|raw| CitationKey::parse(raw)).collect();
        for key in keys {
            match key {
                CitationKey::Plain(key) => {
                    match self.manual.get(&key).or_else(|| self.cache.get(&key)) {
                        Some(entry) => resolution.resolved.insert(entry.clone()),
                        None => missing.push(key),
                    }
                }
                CitationKey::Doi(doi) => {
                    if resolution.resolved.contains(&doi) {
                        continue;
                    }
                    match self.cache.get(&doi).or_else(|| self.manual.get(&doi)) {
                        Some(entry) => resolution.resolved.insert(entry.clone()),
                        None => {
                            resolution.to_fetch.insert(doi);
                        }
                    }
                }
            }
        }

        if !missing.is_empty() {
            return Err(UmbError::MissingReference {
                kind: ReferenceKind::Citation,
                keys: missing,
            });
        }
        Ok(resolution)
    }

    /// Resolve every observed key, fetching unknown DOIs, and return the
    /// bibliography for this build. Newly fetched records are added to the
    /// cache file.
    pub fn reconcile(&mut self, fetcher: &mut Fetcher) -> Result<Bibliography> {
        info!("Found {} citation(s) in manuscript", self.unique_keys.len());
        let Resolution { resolved, to_fetch } = self.resolve()?;
        if to_fetch.is_empty() {
            return Ok(resolved);
        }

        info!("Fetching {} reference(s)", to_fetch.len());
        let mut fetched = Vec::with_capacity(to_fetch.len());
        for doi in &to_fetch {
            fetched.push(fetch_doi_reference(fetcher, doi)?);
        }

        self.cache = self.cache.merge(fetched.iter().cloned());
        self.cache.write_file(&self.cache_path)?;
        info!("Cached {} new reference(s) in {:?}", fetched.len(), self.cache_path);

        Ok(resolved.merge(fetched))
    }
}

/// Fetch the BibTeX record for a DOI, filed under the DOI itself.
pub fn fetch_doi_reference(fetcher: &mut Fetcher, doi: &str) -> Result<BibEntry> {
    let url = format!("{}/{}", fetcher.config().doi_base_url, doi);
    let body = fetcher.fetch(doi, &url, Some("application/x-bibtex"))?;
    let text = String::from_utf8_lossy(&body);

    let malformed = || UmbError::FetchFailure {
        target: doi.to_string(),
        source: FetchError::MalformedRecord,
    };
    let records = Bibliography::parse_bibtex(&text, doi).map_err(|_| malformed())?;
    let entry = records.iter().next().cloned().ok_or_else(malformed)?;
    Ok(entry.with_key(doi))
}
