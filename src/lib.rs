//! Assemble a multi-file LaTeX manuscript into a single buildable document.
//!
//! Section files under `content/` are scanned for citation keys and figure
//! references. Citations are resolved against a cache, a manual references
//! file and the DOI metadata service; figures against local images, a cache
//! of downloads and their URLs. The processed sections, merged bibliography,
//! figures and filled template land in `build/`.

pub mod config;
pub mod error;
pub mod fetch;
pub mod latex;
pub mod manuscript;

pub use config::{FetchConfig, Metadata};
pub use error::{Result, UmbError};
pub use fetch::{Fetcher, RateLimiter};
pub use manuscript::{build_manuscript, BuildSummary};
