pub mod bibliography;
pub mod citations;
pub mod figures;
pub mod nodes;
pub mod parser;
pub mod scanner;
pub mod template;

use once_cell::sync::Lazy;
use regex::Regex;

pub use bibliography::{BibEntry, BibEntryBuilder, Bibliography};
pub use citations::{CitationKey, CitationReconciler};
pub use figures::{figure_alias, FigureReconciler, FigureSpec, FiguresCache};
pub use nodes::{parse_latex, LatexNode};
pub use scanner::{rewrite_references, scan_nodes, SectionReferences};
pub use template::MainTemplate;

/// Macros whose mandatory argument is a comma-separated list of citation keys.
pub const CITATION_MACROS: &[&str] = &[
    "cite",
    "citep",
    "citet",
    "citealp",
    "citeauthor",
    "citeyear",
    "nocite",
];

// Commonly used regex patterns compiled once
pub(crate) static SLOT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@[a-z]+$").expect("Invalid template slot regex pattern")
});
pub(crate) static SECTION_FILE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+).*\.tex$").expect("Invalid section file regex pattern")
});
