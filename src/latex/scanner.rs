//! Extraction of citation keys and figure references from a markup tree.
//!
//! Only citation macros and figure environments are interpreted. Scanning is
//! read-only; rewriting produces a new string by splicing replacements into
//! the original source at the byte ranges recorded in the tree.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::error::{Result, UmbError};
use crate::latex::citations::CitationKey;
use crate::latex::nodes::{EnvironmentNode, GroupNode, LatexNode, MacroArg, MacroNode};
use crate::latex::CITATION_MACROS;

/// Symbolic references found in one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionReferences {
    pub citation_keys: BTreeSet<String>,
    pub figure_keys: BTreeSet<String>,
}

fn is_citation_macro(name: &str) -> bool {
    CITATION_MACROS.contains(&name)
}

fn is_figure_environment(name: &str) -> bool {
    matches!(name, "figure" | "figure*")
}

fn invalid(node: &MacroNode, reason: impl Into<String>) -> UmbError {
    UmbError::InvalidMarkupNode {
        macro_name: node.name.clone(),
        reason: reason.into(),
        line: node.line,
    }
}

/// The mandatory `{...}` argument of a macro with a known argument spec.
fn key_group(node: &MacroNode) -> Result<&GroupNode> {
    let args = node
        .args
        .as_ref()
        .ok_or_else(|| invalid(node, "macro has no arguments"))?;

    let Some(idx) = args.argspec.find('{') else {
        return Err(invalid(node, format!("argspec '{}' has no mandatory argument", args.argspec)));
    };
    if args.argspec.chars().count() != args.args.len() {
        return Err(invalid(
            node,
            format!("argspec '{}' does not match {} parsed argument(s)", args.argspec, args.args.len()),
        ));
    }

    match &args.args[idx] {
        Some(MacroArg::Group(group)) => Ok(group),
        _ => Err(invalid(node, "missing {...} argument")),
    }
}

/// The single character run inside the mandatory argument.
fn key_chars(node: &MacroNode) -> Result<(&str, Range<usize>)> {
    let group = key_group(node)?;
    match group.nodes.as_slice() {
        [LatexNode::Chars(chars)] => Ok((chars.chars.as_str(), chars.span.clone())),
        nodes => Err(invalid(
            node,
            format!("expected a single text argument, found {} node(s)", nodes.len()),
        )),
    }
}

/// Extract the set of citation keys from a citation macro.
///
/// `\cite{abc, def}` yields `{"abc", "def"}`. Keys are trimmed and empty
/// pieces left by stray commas are dropped.
pub fn extract_citation_keys(node: &MacroNode) -> Result<BTreeSet<String>> {
    if !is_citation_macro(&node.name) {
        return Err(invalid(node, "not a citation macro"));
    }
    let (chars, _) = key_chars(node)?;
    Ok(chars
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect())
}

/// Extract the path or URL of an `\includegraphics`, verbatim.
pub fn extract_includegraphics_key(node: &MacroNode) -> Result<String> {
    if node.name != "includegraphics" {
        return Err(invalid(node, "not an includegraphics macro"));
    }
    let (chars, _) = key_chars(node)?;
    Ok(chars.to_string())
}

/// All `\includegraphics` directly inside a figure or any nested subfigure.
fn figure_includes(env: &EnvironmentNode) -> Vec<&MacroNode> {
    let mut includes = Vec::new();
    let mut pending: Vec<&EnvironmentNode> = vec![env];
    while let Some(env) = pending.pop() {
        for node in &env.nodes {
            match node {
                LatexNode::Environment(sub) if sub.name == "subfigure" => pending.push(sub),
                LatexNode::Macro(m) if m.name == "includegraphics" => includes.push(m),
                _ => {}
            }
        }
    }
    includes
}

/// Extract the union of image references in a figure environment, including
/// those nested in subfigures.
pub fn extract_figure_keys(env: &EnvironmentNode) -> Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    for include in figure_includes(env) {
        keys.insert(extract_includegraphics_key(include)?);
    }
    Ok(keys)
}

enum Site<'a> {
    Citation(&'a MacroNode),
    Figure(&'a EnvironmentNode),
}

/// Visit every citation macro and figure environment in document order.
fn for_each_site<'a>(
    nodes: &'a [LatexNode],
    mut visit: impl FnMut(Site<'a>) -> Result<()>,
) -> Result<()> {
    let mut pending: Vec<&'a LatexNode> = nodes.iter().rev().collect();
    while let Some(node) = pending.pop() {
        match node {
            LatexNode::Macro(m) if is_citation_macro(&m.name) => visit(Site::Citation(m))?,
            LatexNode::Macro(_) | LatexNode::Chars(_) | LatexNode::Comment(_) => {}
            LatexNode::Group(group) => pending.extend(group.nodes.iter().rev()),
            LatexNode::Environment(env) => {
                if is_figure_environment(&env.name) {
                    visit(Site::Figure(env))?;
                }
                pending.extend(env.nodes.iter().rev());
                for arg in env.args.args.iter().rev().flatten() {
                    if let MacroArg::Group(group) = arg {
                        pending.extend(group.nodes.iter().rev());
                    }
                }
            }
        }
    }
    Ok(())
}

/// Collect every citation key and figure reference in a section's tree.
pub fn scan_nodes(nodes: &[LatexNode]) -> Result<SectionReferences> {
    let mut references = SectionReferences::default();
    for_each_site(nodes, |site| {
        match site {
            Site::Citation(node) => references.citation_keys.extend(extract_citation_keys(node)?),
            Site::Figure(env) => references.figure_keys.extend(extract_figure_keys(env)?),
        }
        Ok(())
    })?;
    Ok(references)
}

/// Rewrite one citation key list, keeping the original separators and spacing.
fn rewrite_key_list(chars: &str) -> String {
    chars
        .split(',')
        .map(|piece| {
            let key = piece.trim();
            if key.is_empty() {
                return piece.to_string();
            }
            let start = piece.len() - piece.trim_start().len();
            let end = start + key.len();
            format!("{}{}{}", &piece[..start], CitationKey::parse(key).cite_key(), &piece[end..])
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Produce the processed section text: DOI markers are stripped from citation
/// keys and figure references are replaced by their build aliases.
///
/// References without an entry in `figure_aliases` are left untouched.
pub fn rewrite_references(
    source: &str,
    nodes: &[LatexNode],
    figure_aliases: &BTreeMap<String, String>,
) -> Result<String> {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for_each_site(nodes, |site| {
        match site {
            Site::Citation(node) => {
                let (chars, span) = key_chars(node)?;
                let rewritten = rewrite_key_list(chars);
                if rewritten != chars {
                    edits.push((span, rewritten));
                }
            }
            Site::Figure(env) => {
                for include in figure_includes(env) {
                    let (chars, span) = key_chars(include)?;
                    if let Some(alias) = figure_aliases.get(chars) {
                        edits.push((span, alias.clone()));
                    }
                }
            }
        }
        Ok(())
    })?;

    edits.sort_by_key(|(span, _)| span.start);
    let mut output = String::with_capacity(source.len());
    let mut last_end = 0;
    for (span, replacement) in edits {
        output.push_str(&source[last_end..span.start]);
        output.push_str(&replacement);
        last_end = span.end;
    }
    output.push_str(&source[last_end..]);
    Ok(output)
}
