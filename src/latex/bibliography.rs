//! Bibliography records and their BibTeX files.
//!
//! Reading goes through `biblatex`, which expands `@string` abbreviations and
//! month macros. Records are kept as field name to BibTeX value text and
//! written back in a fixed layout, one field per line.

use biblatex::{Chunk, Chunks};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{Result, UmbError};

/// One bibliographic record, filed under `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub key: String,
    pub entry_type: String,
    pub fields: BTreeMap<String, String>,
}

pub struct BibEntryBuilder {
    key: String,
    entry_type: String,
    fields: BTreeMap<String, String>,
}

impl BibEntryBuilder {
    pub fn new(key: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry_type: entry_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn build(self) -> BibEntry {
        BibEntry {
            key: self.key,
            entry_type: self.entry_type,
            fields: self.fields,
        }
    }
}

impl BibEntry {
    pub fn builder(key: impl Into<String>, entry_type: impl Into<String>) -> BibEntryBuilder {
        BibEntryBuilder::new(key, entry_type)
    }

    pub fn get(&self, field: &str) -> Option<&String> {
        self.fields.get(field)
    }

    /// Return the same record filed under another key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    fn from_biblatex(entry: &biblatex::Entry) -> Self {
        let entry_type = entry.entry_type.to_string().to_lowercase();
        let mut builder = Self::builder(entry.key.clone(), entry_type);
        for (name, chunks) in &entry.fields {
            let name = name.to_lowercase();
            let value = chunks_to_bibtex(&name, chunks);
            builder = builder.field(name, value);
        }
        builder.build()
    }
}

/// Fields read as raw text, which are written back as they were read.
const VERBATIM_FIELDS: &[&str] = &["doi", "eprint", "file", "pdf", "url"];

/// BibTeX text of a parsed field value, without the outer delimiters.
/// Brace-protected parts keep their braces.
fn chunks_to_bibtex(name: &str, chunks: &Chunks) -> String {
    if let [single] = chunks.as_slice() {
        if let Chunk::Verbatim(text) = &single.v {
            if VERBATIM_FIELDS.contains(&name) {
                return text.clone();
            }
        }
    }
    let mut value = String::new();
    for chunk in chunks {
        match &chunk.v {
            Chunk::Normal(text) => value.push_str(text),
            Chunk::Verbatim(text) => {
                value.push('{');
                value.push_str(text);
                value.push('}');
            }
            Chunk::Math(text) => {
                value.push('$');
                value.push_str(text);
                value.push('$');
            }
        }
    }
    value
}

impl fmt::Display for BibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@{}{{{},", self.entry_type, self.key)?;
        for (field, value) in &self.fields {
            writeln!(f, "  {} = {{{}}},", field, value)?;
        }
        write!(f, "}}")
    }
}

/// Bibliography collection, keyed and ordered by citation key.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Bibliography {
    entries: BTreeMap<String, BibEntry>,
}

impl fmt::Debug for Bibliography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bibliography")
            .field("entries_count", &self.entries.len())
            .field("entries", &self.entries)
            .finish()
    }
}

impl fmt::Display for Bibliography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.entries.values() {
            writeln!(f, "{}\n", entry)?;
        }
        Ok(())
    }
}

impl FromIterator<BibEntry> for Bibliography {
    fn from_iter<I: IntoIterator<Item = BibEntry>>(iter: I) -> Self {
        let mut bibliography = Self::new();
        for entry in iter {
            bibliography.insert(entry);
        }
        bibliography
    }
}

impl Bibliography {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entry: BibEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BibEntry> {
        self.entries.values()
    }

    /// Union of `self` and `incoming`. Entries already present are kept as
    /// they are, so the result never loses or rewrites an existing record.
    pub fn merge<I>(&self, incoming: I) -> Bibliography
    where
        I: IntoIterator<Item = BibEntry>,
    {
        let mut merged = self.clone();
        for entry in incoming {
            merged.entries.entry(entry.key.clone()).or_insert(entry);
        }
        merged
    }

    /// Parse BibTeX source. Text outside entries, `@comment` and `@preamble`
    /// are ignored; `@string` abbreviations are expanded in place.
    pub fn parse_bibtex(content: &str, source_name: &str) -> Result<Self> {
        let parsed =
            biblatex::Bibliography::parse(content).map_err(|e| UmbError::InvalidBibTeX {
                source_name: source_name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parsed.iter().map(BibEntry::from_biblatex).collect())
    }

    /// Read a BibTeX file. A file that does not exist yet is an empty bibliography.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No bibliography at {:?}, starting empty", path);
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(UmbError::io(path))?;
        Self::parse_bibtex(&content, &path.display().to_string())
    }

    /// Replace the file at `path` with this bibliography in one step.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(UmbError::io(dir))?;
        file.write_all(self.to_string().as_bytes())
            .map_err(UmbError::io(file.path()))?;
        file.persist(path).map_err(|e| UmbError::io(path)(e.error))?;
        Ok(())
    }
}
