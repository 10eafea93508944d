//! Build orchestration: scan every section, reconcile citations and figures,
//! write the processed sections and fill the document template.

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Metadata;
use crate::error::{Result, UmbError};
use crate::fetch::Fetcher;
use crate::latex::parser::{
    find_manuscript_files, is_umb_project, ASSETS_DIR, BUILD_DIR, CACHE_DIR, CITATIONS_CACHE_FILE,
    CONFIG_FILE, CONTENT_DIR, IMPORTS_FILE, MANUAL_REFERENCES_FILE,
};
use crate::latex::figures::IMAGES_DIR;
use crate::latex::{
    parse_latex, rewrite_references, scan_nodes, CitationReconciler, FigureReconciler, LatexNode,
    MainTemplate, SectionReferences,
};

pub const REFERENCES_FILE: &str = "references.bib";
pub const MAIN_FILE: &str = "main.tex";

/// One manuscript source file and the references it contains.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    raw_content: String,
    nodes: Vec<LatexNode>,
    references: SectionReferences,
}

impl Section {
    pub fn from_source(name: impl Into<String>, raw_content: impl Into<String>) -> Result<Self> {
        let raw_content = raw_content.into();
        let nodes = parse_latex(&raw_content);
        let references = scan_nodes(&nodes)?;
        Ok(Self {
            name: name.into(),
            raw_content,
            nodes,
            references,
        })
    }

    pub fn read_tex(path: &Path) -> Result<Self> {
        let raw_content = fs::read_to_string(path).map_err(UmbError::io(path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_source(name, raw_content)
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn references(&self) -> &SectionReferences {
        &self.references
    }

    /// The section text as it should appear in the build directory.
    pub fn process(&self, figure_aliases: &BTreeMap<String, String>) -> Result<String> {
        rewrite_references(&self.raw_content, &self.nodes, figure_aliases)
    }
}

/// Empty `build/`, recreate `build/images` and copy every file in `assets/` into it.
pub fn setup_build_directory(root: &Path) -> Result<PathBuf> {
    let build_dir = root.join(BUILD_DIR);
    fs::create_dir_all(&build_dir).map_err(UmbError::io(&build_dir))?;
    for entry in fs::read_dir(&build_dir).map_err(UmbError::io(&build_dir))? {
        let path = entry.map_err(UmbError::io(&build_dir))?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).map_err(UmbError::io(&path))?;
        } else {
            fs::remove_file(&path).map_err(UmbError::io(&path))?;
        }
    }

    let images_dir = build_dir.join(IMAGES_DIR);
    fs::create_dir(&images_dir).map_err(UmbError::io(&images_dir))?;

    let assets_dir = root.join(ASSETS_DIR);
    if assets_dir.is_dir() {
        for entry in fs::read_dir(&assets_dir).map_err(UmbError::io(&assets_dir))? {
            let path = entry.map_err(UmbError::io(&assets_dir))?.path();
            if let (true, Some(name)) = (path.is_file(), path.file_name()) {
                fs::copy(&path, build_dir.join(name)).map_err(UmbError::io(&path))?;
            }
        }
    }
    Ok(build_dir)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub sections: usize,
    pub references: usize,
    pub figures: usize,
    pub main_file: PathBuf,
}

/// Build the manuscript rooted at `root` with the bundled template.
pub fn build_manuscript(root: &Path, fetcher: &mut Fetcher) -> Result<BuildSummary> {
    build_manuscript_with_template(root, &MainTemplate::default(), fetcher)
}

/// Build the manuscript rooted at `root` into `root/build`.
///
/// 1. Find the section files in `content`.
/// 2. Scan every section for citation keys and figure references.
/// 3. Reconcile citations and write `build/references.bib`.
/// 4. Reconcile figures into `build/images`.
/// 5. Write the processed sections and `build/main.tex`.
pub fn build_manuscript_with_template(
    root: &Path,
    template: &MainTemplate,
    fetcher: &mut Fetcher,
) -> Result<BuildSummary> {
    if !is_umb_project(root) {
        return Err(UmbError::NotAProject(root.to_path_buf()));
    }
    template.check_slots()?;

    let content_dir = root.join(CONTENT_DIR);
    let cache_dir = root.join(CACHE_DIR);
    let files = find_manuscript_files(&content_dir)?;
    let metadata = Metadata::read_toml(&root.join(CONFIG_FILE))?;

    let mut citations = CitationReconciler::new(
        &cache_dir.join(CITATIONS_CACHE_FILE),
        &content_dir.join(MANUAL_REFERENCES_FILE),
    )?;
    let mut figures = FigureReconciler::new(&cache_dir, &content_dir.join(IMAGES_DIR))?;

    let mut sections = Vec::new();
    for path in files.ordered() {
        debug!("Scanning {:?}", path);
        let section = Section::read_tex(path)?;
        citations.observe(section.references().citation_keys.iter().cloned());
        figures.observe(section.references().figure_keys.iter().cloned())?;
        sections.push(section);
    }

    let build_dir = setup_build_directory(root)?;

    let bibliography = citations.reconcile(fetcher)?;
    let references_path = build_dir.join(REFERENCES_FILE);
    bibliography.write_file(&references_path)?;

    figures.reconcile(&build_dir, fetcher)?;

    for section in &sections {
        let output_path = build_dir.join(&section.name);
        let processed = section.process(figures.reference_to_alias())?;
        fs::write(&output_path, processed).map_err(UmbError::io(&output_path))?;
    }

    let imports = content_dir.join(IMPORTS_FILE);
    let imports_target = build_dir.join(IMPORTS_FILE);
    if imports.is_file() {
        fs::copy(&imports, &imports_target).map_err(UmbError::io(&imports))?;
    } else {
        fs::write(&imports_target, "").map_err(UmbError::io(&imports_target))?;
    }

    let section_names: Vec<String> = files
        .sections
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    let main_file = build_dir.join(MAIN_FILE);
    template.write(&main_file, &metadata, &section_names, files.has_supplement())?;

    info!("Manuscript written to {:?}", main_file);
    Ok(BuildSummary {
        sections: sections.len(),
        references: bibliography.len(),
        figures: figures.reference_to_alias().len(),
        main_file,
    })
}
