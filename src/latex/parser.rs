use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, UmbError};
use crate::latex::figures::FigureSpec;
use crate::latex::{FiguresCache, SECTION_FILE_REGEX};

pub const CONFIG_FILE: &str = "umb.toml";
pub const CONTENT_DIR: &str = "content";
pub const CACHE_DIR: &str = ".umb";
pub const BUILD_DIR: &str = "build";
pub const ASSETS_DIR: &str = "assets";
pub const ABSTRACT_FILE: &str = "abstract.tex";
pub const SUPPLEMENT_FILE: &str = "supplement.tex";
pub const IMPORTS_FILE: &str = "imports.tex";
pub const MANUAL_REFERENCES_FILE: &str = "manual_references.bib";
pub const CITATIONS_CACHE_FILE: &str = "citations_cache.bib";

/// Check if a directory is a umb project
pub fn is_umb_project(root: &Path) -> bool {
    root.join(CONFIG_FILE).is_file() && root.join(CONTENT_DIR).is_dir() && root.join(CACHE_DIR).is_dir()
}

/// Section files of a manuscript, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManuscriptFiles {
    pub abstract_file: Option<PathBuf>,
    /// Numbered sections, e.g. `1.introduction.tex`.
    pub sections: Vec<PathBuf>,
    pub supplement: Option<PathBuf>,
}

impl ManuscriptFiles {
    /// Abstract, numbered sections, then supplement.
    pub fn ordered(&self) -> Vec<&Path> {
        self.abstract_file
            .iter()
            .chain(self.sections.iter())
            .chain(self.supplement.iter())
            .map(PathBuf::as_path)
            .collect()
    }

    pub fn has_supplement(&self) -> bool {
        self.supplement.is_some()
    }
}

/// Sort key of a numbered section file name: its numeric prefix, then the name.
pub fn section_order(file_name: &str) -> Option<(u64, String)> {
    let captures = SECTION_FILE_REGEX.captures(file_name)?;
    let number = captures
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(u64::MAX);
    Some((number, file_name.to_string()))
}

/// Find the section files in the content directory
pub fn find_manuscript_files(content_dir: &Path) -> Result<ManuscriptFiles> {
    let mut numbered: Vec<((u64, String), PathBuf)> = WalkDir::new(content_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((section_order(&name)?, entry.path().to_path_buf()))
        })
        .collect();

    if numbered.is_empty() {
        return Err(UmbError::NoSectionFiles(content_dir.to_path_buf()));
    }
    numbered.sort();

    let optional = |name: &str| {
        let path = content_dir.join(name);
        path.is_file().then_some(path)
    };

    Ok(ManuscriptFiles {
        abstract_file: optional(ABSTRACT_FILE),
        sections: numbered.into_iter().map(|(_, path)| path).collect(),
        supplement: optional(SUPPLEMENT_FILE),
    })
}

/// List every image under `images_dir` as an already-resolved figure whose
/// aliases are its path relative to `images_dir`.
pub fn find_content_images(images_dir: &Path) -> Result<FiguresCache> {
    if !images_dir.is_dir() {
        debug!("No content images directory at {:?}", images_dir);
        return Ok(FiguresCache::default());
    }

    let mut figures = Vec::new();
    for entry in WalkDir::new(images_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(images_dir).to_path_buf();
            UmbError::Io {
                source: e.into(),
                path,
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(images_dir) else {
            continue;
        };
        let alias = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        figures.push(FigureSpec {
            old_alias: alias.clone(),
            new_alias: alias,
            url: None,
            local_path: Some(entry.path().to_path_buf()),
        });
    }
    Ok(FiguresCache::new(figures))
}
