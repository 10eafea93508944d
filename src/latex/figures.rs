//! Resolution of figure references to files in the build directory.
//!
//! A reference is either the path of an image under `content/images` or a
//! URL. URLs are downloaded once into the cache directory and recorded in
//! `figures_cache.json` so later builds reuse them.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

use crate::error::{FetchError, ReferenceKind, Result, UmbError};
use crate::fetch::Fetcher;
use crate::latex::parser::find_content_images;

/// Directory of figures inside the build output, and prefix of every alias.
pub const IMAGES_DIR: &str = "images";
pub const FIGURES_CACHE_FILE: &str = "figures_cache.json";

/// Hosts that serve an HTML page unless asked for the raw file.
const RAW_CONTENT_HOSTS: &[&str] = &["github.com"];

/// A figure reference and where its bytes live.
///
/// Two specs are the same figure when both aliases match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureSpec {
    pub old_alias: String,
    pub new_alias: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

impl FigureSpec {
    fn identity(&self) -> (&str, &str) {
        (&self.old_alias, &self.new_alias)
    }
}

impl PartialEq for FigureSpec {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for FigureSpec {}

impl Hash for FigureSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for FigureSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FigureSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

/// Set of resolved figures, deduplicated by identity and ordered by old alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiguresCache {
    figures: Vec<FigureSpec>,
}

impl FiguresCache {
    pub fn new<I: IntoIterator<Item = FigureSpec>>(figures: I) -> Self {
        Self::default().merge(figures)
    }

    pub fn figures(&self) -> &[FigureSpec] {
        &self.figures
    }

    pub fn len(&self) -> usize {
        self.figures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.figures.is_empty()
    }

    /// Union of `self` and `incoming`. A figure already present is replaced by
    /// the incoming spec with the same identity, so a refreshed download
    /// updates its record; nothing is ever dropped.
    pub fn merge<I: IntoIterator<Item = FigureSpec>>(&self, incoming: I) -> FiguresCache {
        let mut by_identity: BTreeMap<(String, String), FigureSpec> = self
            .figures
            .iter()
            .map(|f| ((f.old_alias.clone(), f.new_alias.clone()), f.clone()))
            .collect();
        for figure in incoming {
            by_identity.insert((figure.old_alias.clone(), figure.new_alias.clone()), figure);
        }
        FiguresCache {
            figures: by_identity.into_values().collect(),
        }
    }

    /// The figure recorded for a reference, preferring one with a local file.
    pub fn lookup(&self, old_alias: &str) -> Option<&FigureSpec> {
        let mut matches = self.figures.iter().filter(|f| f.old_alias == old_alias);
        let first = matches.next()?;
        if first.local_path.is_some() {
            return Some(first);
        }
        matches.find(|f| f.local_path.is_some()).or(Some(first))
    }

    /// Read a cache file. A file that does not exist yet is an empty cache.
    pub fn read_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(UmbError::io(path))?;
        let raw: FiguresCache = serde_json::from_str(&content)?;
        Ok(Self::new(raw.figures))
    }

    /// Replace the file at `path` with this cache in one step.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(UmbError::io(dir))?;
        let content = serde_json::to_string_pretty(self)?;
        writeln!(file, "{}", content).map_err(UmbError::io(file.path()))?;
        file.persist(path).map_err(|e| UmbError::io(path)(e.error))?;
        Ok(())
    }
}

fn parse_web_url(key: &str) -> Option<Url> {
    Url::parse(key)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

/// Whether a figure reference is a downloadable URL.
pub fn is_url(key: &str) -> bool {
    parse_web_url(key).is_some()
}

/// File name of a reference: the last segment of a URL path, or the file
/// name of a local path.
pub fn figure_file_name(key: &str) -> Result<String> {
    let name = match parse_web_url(key) {
        Some(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        None => Path::new(key)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
    };
    name.filter(|n| !n.is_empty())
        .ok_or_else(|| UmbError::InvalidFigureKey(key.to_string()))
}

/// Name of the downloaded copy of a URL figure: `<host>[_<port>]-<file name>`.
/// Figures sharing a file name on different hosts do not overwrite each other.
pub fn download_file_name(url: &str) -> Result<String> {
    let file_name = figure_file_name(url)?;
    let parsed = parse_web_url(url).ok_or_else(|| UmbError::InvalidFigureKey(url.to_string()))?;
    let host = parsed.host_str().unwrap_or_default().replace(':', "_");
    Ok(match parsed.port() {
        Some(port) => format!("{}_{}-{}", host, port, file_name),
        None => format!("{}-{}", host, file_name),
    })
}

/// Build-relative alias of a reference: `images/<file name>`.
pub fn figure_alias(key: &str) -> Result<String> {
    Ok(format!("{}/{}", IMAGES_DIR, figure_file_name(key)?))
}

/// URL to request for a figure. Code hosting pages are asked for raw bytes.
pub fn raw_content_url(url: &str) -> String {
    match parse_web_url(url) {
        Some(mut parsed) if parsed.host_str().is_some_and(|h| RAW_CONTENT_HOSTS.contains(&h)) => {
            parsed.query_pairs_mut().append_pair("raw", "true");
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// Download a figure into `dest`.
pub fn fetch_url_figure(fetcher: &mut Fetcher, url: &str, dest: &Path) -> Result<()> {
    let bytes = fetcher.fetch(url, &raw_content_url(url), None)?;
    let store = |e| UmbError::FetchFailure {
        target: url.to_string(),
        source: FetchError::Store(e),
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(store)?;
    }
    fs::write(dest, bytes).map_err(store)
}

/// What a reconciliation will do, worked out before anything is copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FigurePlan {
    /// Local file to copy and the alias it is copied to.
    pub copies: Vec<(PathBuf, String)>,
    pub downloads: Vec<FigureSpec>,
}

pub struct FigureReconciler {
    cache_json_path: PathBuf,
    download_dir: PathBuf,
    cache: FiguresCache,
    local: FiguresCache,
    reference_to_alias: BTreeMap<String, String>,
}

impl FigureReconciler {
    /// Load the figures cache from `cache_dir` and list the images under `images_dir`.
    pub fn new(cache_dir: &Path, images_dir: &Path) -> Result<Self> {
        let download_dir = cache_dir.join(IMAGES_DIR);
        fs::create_dir_all(&download_dir).map_err(UmbError::io(&download_dir))?;
        let cache = FiguresCache::read_json(&cache_dir.join(FIGURES_CACHE_FILE))?;
        let local = find_content_images(images_dir)?;
        info!("Loaded {} cached figure(s)", cache.len() + local.len());
        Ok(Self::from_parts(
            cache_dir.join(FIGURES_CACHE_FILE),
            download_dir,
            cache,
            local,
        ))
    }

    pub fn from_parts(
        cache_json_path: PathBuf,
        download_dir: PathBuf,
        cache: FiguresCache,
        local: FiguresCache,
    ) -> Self {
        Self {
            cache_json_path,
            download_dir,
            cache,
            local,
            reference_to_alias: BTreeMap::new(),
        }
    }

    /// Record references seen in a section, deriving each one's alias.
    pub fn observe<I, S>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for key in keys {
            let key = key.into();
            let alias = figure_alias(&key)?;
            if let Some((other, _)) = self
                .reference_to_alias
                .iter()
                .find(|(reference, existing)| **existing == alias && **reference != key)
            {
                warn!("Figures '{}' and '{}' both map to {}", other, key, alias);
            }
            self.reference_to_alias.insert(key, alias);
        }
        Ok(())
    }

    pub fn reference_to_alias(&self) -> &BTreeMap<String, String> {
        &self.reference_to_alias
    }

    pub fn cache(&self) -> &FiguresCache {
        &self.cache
    }

    fn lookup(&self, reference: &str) -> Option<&FigureSpec> {
        self.local
            .lookup(reference)
            .or_else(|| self.cache.lookup(reference))
    }

    fn download_spec(&self, reference: &str, alias: &str, url: &str) -> Result<FigureSpec> {
        Ok(FigureSpec {
            old_alias: reference.to_string(),
            new_alias: alias.to_string(),
            url: Some(url.to_string()),
            local_path: Some(self.download_dir.join(download_file_name(url)?)),
        })
    }

    /// Decide, for every observed reference, whether it is copied from a
    /// local file or downloaded. Fails listing every unresolvable reference.
    pub fn plan(&self) -> Result<FigurePlan> {
        let mut plan = FigurePlan::default();
        let mut missing = Vec::new();

        for (reference, alias) in &self.reference_to_alias {
            match self.lookup(reference) {
                Some(figure) => match (&figure.local_path, &figure.url) {
                    (Some(path), _) if path.exists() => plan.copies.push((path.clone(), alias.clone())),
                    (Some(_), Some(url)) => plan.downloads.push(self.download_spec(reference, alias, url)?),
                    _ => missing.push(reference.clone()),
                },
                None if is_url(reference) => {
                    plan.downloads.push(self.download_spec(reference, alias, reference)?)
                }
                None => missing.push(reference.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(UmbError::MissingReference {
                kind: ReferenceKind::Figure,
                keys: missing,
            });
        }
        Ok(plan)
    }

    /// Place every observed figure in `build_dir` under its alias, downloading
    /// and caching the ones not available locally.
    pub fn reconcile(&mut self, build_dir: &Path, fetcher: &mut Fetcher) -> Result<()> {
        info!("Found {} figure(s) in manuscript", self.reference_to_alias.len());
        let plan = self.plan()?;

        for (source, alias) in &plan.copies {
            copy_into(build_dir, source, alias)?;
        }

        if plan.downloads.is_empty() {
            return Ok(());
        }

        info!("Fetching {} figure(s)", plan.downloads.len());
        for figure in &plan.downloads {
            if let (Some(url), Some(dest)) = (&figure.url, &figure.local_path) {
                fetch_url_figure(fetcher, url, dest)?;
            }
        }

        self.cache = self.cache.merge(plan.downloads.iter().cloned());
        self.cache.write_json(&self.cache_json_path)?;
        info!("Cached {} new figure(s) in {:?}", plan.downloads.len(), self.cache_json_path);

        for figure in &plan.downloads {
            if let Some(dest) = &figure.local_path {
                copy_into(build_dir, dest, &figure.new_alias)?;
            }
        }
        Ok(())
    }
}

fn copy_into(build_dir: &Path, source: &Path, alias: &str) -> Result<()> {
    let target = build_dir.join(alias);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(UmbError::io(parent))?;
    }
    fs::copy(source, &target).map_err(UmbError::io(source))?;
    Ok(())
}
