use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Which kind of symbolic reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Citation,
    Figure,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Citation => write!(f, "citation"),
            ReferenceKind::Figure => write!(f, "figure"),
        }
    }
}

/// Failure talking to a remote source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("response is not a BibTeX record")]
    MalformedRecord,

    #[error("could not store fetched content: {0}")]
    Store(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum UmbError {
    #[error("invalid \\{macro_name} on line {line}: {reason}")]
    InvalidMarkupNode {
        macro_name: String,
        reason: String,
        line: usize,
    },

    #[error("missing {kind} reference(s): {}", .keys.join(", "))]
    MissingReference {
        kind: ReferenceKind,
        keys: Vec<String>,
    },

    #[error("rate limit exceeded while requesting {key}")]
    RateLimitExceeded { key: String },

    #[error("failed to fetch {target}: {source}")]
    FetchFailure {
        target: String,
        #[source]
        source: FetchError,
    },

    #[error("unexpected template slots {found:?}, expected [\"@metadata\", \"@abstract\", \"@main\", \"@supplement\"]")]
    TemplateMismatch { found: Vec<String> },

    #[error("invalid figure reference '{0}': no file name to alias")]
    InvalidFigureKey(String),

    #[error("{0} is not a umb project (expected umb.toml, content/ and .umb/)")]
    NotAProject(PathBuf),

    #[error("no numbered section files found in {0}")]
    NoSectionFiles(PathBuf),

    #[error("invalid BibTeX in {source_name}: {reason}")]
    InvalidBibTeX { source_name: String, reason: String },

    #[error("invalid manuscript metadata: {0}")]
    Metadata(#[from] toml::de::Error),

    #[error("could not serialize manuscript metadata: {0}")]
    MetadataWrite(#[from] toml::ser::Error),

    #[error("invalid figures cache: {0}")]
    FiguresCache(#[from] serde_json::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UmbError {
    /// Adapter for `map_err` that attaches the offending path to an I/O error.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> UmbError {
        let path = path.as_ref().to_path_buf();
        move |source| UmbError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, UmbError>;
