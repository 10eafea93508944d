//! The document root template.
//!
//! Templating is deliberately crude: the template holds exactly four slot
//! lines, `@metadata`, `@abstract`, `@main` and `@supplement`, in that order,
//! and each is replaced once with generated LaTeX. Everything else is copied
//! through untouched.

use std::fs;
use std::path::Path;

use crate::config::{Author, Metadata};
use crate::error::{Result, UmbError};
use crate::latex::parser::{ABSTRACT_FILE, SUPPLEMENT_FILE};
use crate::latex::SLOT_REGEX;

pub const EXPECTED_SLOTS: [&str; 4] = ["@metadata", "@abstract", "@main", "@supplement"];

/// Template shipped with the tool.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/main.tex");

#[derive(Debug, Clone)]
pub struct MainTemplate {
    raw_content: String,
    slots: Vec<String>,
}

impl MainTemplate {
    pub fn new(raw_content: impl Into<String>) -> Self {
        let raw_content = raw_content.into();
        let slots = Self::parse_slots(&raw_content);
        Self { raw_content, slots }
    }

    pub fn read_tex(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(UmbError::io(path))?;
        Ok(Self::new(content))
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// Every line that consists solely of `@` followed by lowercase letters.
    pub fn parse_slots(content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| SLOT_REGEX.is_match(line))
            .map(str::to_string)
            .collect()
    }

    /// Fails unless the slots are exactly the four expected ones, in order.
    pub fn check_slots(&self) -> Result<()> {
        if self.slots != EXPECTED_SLOTS {
            return Err(UmbError::TemplateMismatch {
                found: self.slots.clone(),
            });
        }
        Ok(())
    }

    pub fn format_metadata(metadata: &Metadata) -> String {
        let mut output = format!("\\title{{{}}}\n\n", metadata.manuscript.title);
        output.push_str(&format!("\\date{{{}}}\n\n", metadata.manuscript.date));
        output.push_str("\\renewcommand\\Authfont{\\bfseries}\n");
        output.push_str("\\setlength{\\affilsep}{0em}\n");
        output.push_str("\\newbox{\\orcid}\\sbox{\\orcid}{\\includegraphics[scale=0.06]{orcid.pdf}}\n\n");

        for author in &metadata.authors {
            output.push_str(&Self::format_author(author, metadata));
            output.push('\n');
        }
        output.push('\n');

        for (i, affiliation) in metadata.affiliations().iter().enumerate() {
            output.push_str(&format!("\\affil[{}]{{{}}}\n", i + 1, affiliation));
        }
        output
    }

    pub fn format_author(author: &Author, metadata: &Metadata) -> String {
        let mut output = String::from("\\author");
        if !author.affiliations.is_empty() {
            let indices: Vec<String> = author
                .affiliations
                .iter()
                .filter_map(|a| metadata.affiliation_index(a))
                .map(|i| i.to_string())
                .collect();
            output.push_str(&format!("[{}]", indices.join(",")));
        }

        output.push('{');
        if let Some(orcid) = &author.orcid {
            output.push_str(&format!("{{\\href{{https://orcid.org/{}}}", orcid));
            output.push_str("{\\usebox{\\orcid}\\hspace{1mm}}");
        }
        output.push_str(&author.name.replace(' ', "~"));
        if author.corresponding {
            match &author.email {
                Some(email) => output.push_str(&format!(
                    "\\thanks{{\\texttt{{Correspondence may be addressed to {}}}}}",
                    email
                )),
                None => output.push_str("\\thanks{\\texttt{Corresponding author}}"),
            }
        }
        output.push('}');
        if author.orcid.is_some() {
            output.push('}');
        }
        output
    }

    /// One `\input` per numbered section, in the order given.
    pub fn format_main<S: AsRef<str>>(section_files: &[S]) -> String {
        section_files
            .iter()
            .map(|name| format!("\\input{{{}}}\n", name.as_ref()))
            .collect()
    }

    pub fn format_supplement(has_supplement: bool) -> String {
        if has_supplement {
            format!("\\section*{{Supplementary Materials}}\n\\input{{{}}}", SUPPLEMENT_FILE)
        } else {
            String::new()
        }
    }

    /// Fill every slot. `section_files` are the build file names of the
    /// numbered sections.
    pub fn render<S: AsRef<str>>(
        &self,
        metadata: &Metadata,
        section_files: &[S],
        has_supplement: bool,
    ) -> Result<String> {
        self.check_slots()?;

        let replacements = [
            Self::format_metadata(metadata),
            format!("\\input{{{}}}", ABSTRACT_FILE),
            Self::format_main(section_files),
            Self::format_supplement(has_supplement),
        ];

        let mut filled = [false; EXPECTED_SLOTS.len()];
        let mut output = String::with_capacity(self.raw_content.len());
        for line in self.raw_content.split_inclusive('\n') {
            let slot = EXPECTED_SLOTS
                .iter()
                .position(|marker| line.trim() == *marker)
                .filter(|&i| !filled[i]);
            match slot {
                Some(i) => {
                    filled[i] = true;
                    output.push_str(&line.replacen(EXPECTED_SLOTS[i], &replacements[i], 1));
                }
                None => output.push_str(line),
            }
        }
        Ok(output)
    }

    /// Render and write the filled template to `path`.
    pub fn write<S: AsRef<str>>(
        &self,
        path: &Path,
        metadata: &Metadata,
        section_files: &[S],
        has_supplement: bool,
    ) -> Result<()> {
        let content = self.render(metadata, section_files, has_supplement)?;
        fs::write(path, content).map_err(UmbError::io(path))
    }
}

impl Default for MainTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}
