//! A small LaTeX markup tree.
//!
//! Only enough structure is recovered to find macro arguments and environment
//! bodies; everything else is kept as verbatim character runs. Every node
//! records the byte range it covers in the source so that callers can rewrite
//! the original text in place without re-serialising the tree.

use std::ops::Range;

use crate::latex::CITATION_MACROS;

/// Environments whose body is never interpreted.
const VERBATIM_ENVIRONMENTS: &[&str] = &["verbatim", "verbatim*", "lstlisting", "comment", "minted"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatexNode {
    Chars(CharsNode),
    Comment(CharsNode),
    Group(GroupNode),
    Macro(MacroNode),
    Environment(EnvironmentNode),
}

impl LatexNode {
    pub fn span(&self) -> Range<usize> {
        match self {
            LatexNode::Chars(n) | LatexNode::Comment(n) => n.span.clone(),
            LatexNode::Group(n) => n.span.clone(),
            LatexNode::Macro(n) => n.span.clone(),
            LatexNode::Environment(n) => n.span.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharsNode {
    pub chars: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Brace,
    Bracket,
}

/// A `{...}` or `[...]` group. The span includes the delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNode {
    pub delimiter: Delimiter,
    pub nodes: Vec<LatexNode>,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroArg {
    Star,
    Group(GroupNode),
}

/// Parsed arguments of a macro or environment with a known argument spec.
///
/// `argspec` uses one character per argument: `*` for an optional star, `[`
/// for an optional bracket group and `{` for a mandatory brace group. Each
/// slot of `args` lines up with a character of `argspec` and is `None` when the
/// argument was not present in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroArgs {
    pub argspec: String,
    pub args: Vec<Option<MacroArg>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroNode {
    pub name: String,
    /// `None` for macros without a known argument spec; their trailing groups
    /// are siblings in the tree.
    pub args: Option<MacroArgs>,
    pub span: Range<usize>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentNode {
    pub name: String,
    pub args: MacroArgs,
    pub nodes: Vec<LatexNode>,
    pub span: Range<usize>,
}

fn macro_argspec(name: &str) -> Option<&'static str> {
    if CITATION_MACROS.contains(&name) {
        return Some("*[[{");
    }
    match name {
        "includegraphics" => Some("*[[{"),
        _ => None,
    }
}

fn environment_argspec(name: &str) -> &'static str {
    match name {
        "figure" | "figure*" => "[",
        "subfigure" => "[[{",
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stop {
    Eof,
    Brace,
    Bracket,
    End(String),
}

/// Parse LaTeX source into a list of top-level nodes.
///
/// Parsing never fails: unbalanced delimiters are kept as characters and
/// unterminated groups or environments run to the end of input.
pub fn parse_latex(source: &str) -> Vec<LatexNode> {
    LatexParser::new(source).parse()
}

pub struct LatexParser<'a> {
    source: &'a str,
    pos: usize,
    /// Line number of `line_offset`, advanced as nodes are created.
    line: usize,
    line_offset: usize,
}

impl<'a> LatexParser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            line_offset: 0,
        }
    }

    pub fn parse(mut self) -> Vec<LatexNode> {
        self.parse_nodes(&Stop::Eof)
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.pos).copied()
    }

    /// Line of `offset`, counted from the previous call. A macro is built
    /// after its arguments, so the offset may also move back by one node.
    fn line_at(&mut self, offset: usize) -> usize {
        if offset >= self.line_offset {
            self.line += self.source[self.line_offset..offset].matches('\n').count();
        } else {
            self.line -= self.source[offset..self.line_offset].matches('\n').count();
        }
        self.line_offset = offset;
        self.line
    }

    fn parse_nodes(&mut self, stop: &Stop) -> Vec<LatexNode> {
        let mut nodes = Vec::new();
        while let Some(byte) = self.peek() {
            match byte {
                b'%' => nodes.push(self.parse_comment()),
                b'{' => {
                    let group = self.parse_group(Delimiter::Brace);
                    nodes.push(LatexNode::Group(group));
                }
                b'}' if *stop == Stop::Brace => {
                    self.pos += 1;
                    return nodes;
                }
                b']' if *stop == Stop::Bracket => {
                    self.pos += 1;
                    return nodes;
                }
                b'}' => {
                    // Stray closing brace, kept verbatim.
                    nodes.push(LatexNode::Chars(CharsNode {
                        chars: "}".to_string(),
                        span: self.pos..self.pos + 1,
                    }));
                    self.pos += 1;
                }
                b'\\' => {
                    let start = self.pos;
                    let name = self.parse_macro_name();
                    match name.as_str() {
                        "begin" => nodes.push(self.parse_environment(start)),
                        "end" => {
                            let env_name = self.parse_environment_name();
                            if let (Stop::End(expected), Some(found)) = (stop, env_name.as_deref()) {
                                if expected == found {
                                    return nodes;
                                }
                            }
                            nodes.push(LatexNode::Macro(MacroNode {
                                name,
                                args: None,
                                span: start..self.pos,
                                line: self.line_at(start),
                            }));
                        }
                        _ => {
                            let args = macro_argspec(&name).map(|spec| self.parse_args(spec));
                            nodes.push(LatexNode::Macro(MacroNode {
                                name,
                                args,
                                span: start..self.pos,
                                line: self.line_at(start),
                            }));
                        }
                    }
                }
                _ => nodes.push(self.parse_chars(stop)),
            }
        }
        nodes
    }

    fn parse_comment(&mut self) -> LatexNode {
        let start = self.pos;
        let end = self.source[start..]
            .find('\n')
            .map_or(self.source.len(), |i| start + i + 1);
        self.pos = end;
        LatexNode::Comment(CharsNode {
            chars: self.source[start..end].to_string(),
            span: start..end,
        })
    }

    fn parse_chars(&mut self, stop: &Stop) -> LatexNode {
        let start = self.pos;
        let bytes = self.source.as_bytes();
        while let Some(&byte) = bytes.get(self.pos) {
            let special = matches!(byte, b'%' | b'{' | b'}' | b'\\')
                || (byte == b']' && *stop == Stop::Bracket);
            if special {
                break;
            }
            self.pos += 1;
        }
        LatexNode::Chars(CharsNode {
            chars: self.source[start..self.pos].to_string(),
            span: start..self.pos,
        })
    }

    fn parse_group(&mut self, delimiter: Delimiter) -> GroupNode {
        let start = self.pos;
        self.pos += 1;
        let stop = match delimiter {
            Delimiter::Brace => Stop::Brace,
            Delimiter::Bracket => Stop::Bracket,
        };
        let nodes = self.parse_nodes(&stop);
        GroupNode {
            delimiter,
            nodes,
            span: start..self.pos,
        }
    }

    /// Consume `\name` and return `name`. Control symbols like `\%` yield a
    /// single-character name.
    fn parse_macro_name(&mut self) -> String {
        self.pos += 1;
        let rest = &self.source[self.pos..];
        let letters = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(rest.len(), |(i, _)| i);
        if letters > 0 {
            self.pos += letters;
            return rest[..letters].to_string();
        }
        match rest.chars().next() {
            Some(c) => {
                self.pos += c.len_utf8();
                c.to_string()
            }
            None => String::new(),
        }
    }

    /// Position of the next non-blank byte, without crossing a paragraph break.
    fn skip_blank(&self) -> usize {
        let bytes = self.source.as_bytes();
        let mut pos = self.pos;
        let mut newlines = 0;
        while let Some(&byte) = bytes.get(pos) {
            match byte {
                b' ' | b'\t' | b'\r' => pos += 1,
                b'\n' if newlines == 0 => {
                    newlines += 1;
                    pos += 1;
                }
                _ => break,
            }
        }
        pos
    }

    fn parse_args(&mut self, spec: &str) -> MacroArgs {
        let mut args = Vec::with_capacity(spec.len());
        for kind in spec.chars() {
            let next = self.skip_blank();
            let byte = self.source.as_bytes().get(next).copied();
            let arg = match (kind, byte) {
                ('*', Some(b'*')) => {
                    self.pos = next + 1;
                    Some(MacroArg::Star)
                }
                ('[', Some(b'[')) => {
                    self.pos = next;
                    Some(MacroArg::Group(self.parse_group(Delimiter::Bracket)))
                }
                ('{', Some(b'{')) => {
                    self.pos = next;
                    Some(MacroArg::Group(self.parse_group(Delimiter::Brace)))
                }
                _ => None,
            };
            args.push(arg);
        }
        MacroArgs {
            argspec: spec.to_string(),
            args,
        }
    }

    /// Read the `{name}` following `\begin` or `\end`.
    fn parse_environment_name(&mut self) -> Option<String> {
        let next = self.skip_blank();
        if self.source.as_bytes().get(next) != Some(&b'{') {
            return None;
        }
        let close = self.source[next..].find('}')?;
        let name = self.source[next + 1..next + close].trim().to_string();
        self.pos = next + close + 1;
        Some(name)
    }

    fn parse_environment(&mut self, start: usize) -> LatexNode {
        let Some(name) = self.parse_environment_name() else {
            return LatexNode::Macro(MacroNode {
                name: "begin".to_string(),
                args: None,
                span: start..self.pos,
                line: self.line_at(start),
            });
        };
        let args = self.parse_args(environment_argspec(&name));

        let nodes = if VERBATIM_ENVIRONMENTS.contains(&name.as_str()) {
            let body_start = self.pos;
            let terminator = format!("\\end{{{}}}", name);
            let (body_end, resume) = match self.source[body_start..].find(&terminator) {
                Some(i) => (body_start + i, body_start + i + terminator.len()),
                None => (self.source.len(), self.source.len()),
            };
            self.pos = resume;
            vec![LatexNode::Chars(CharsNode {
                chars: self.source[body_start..body_end].to_string(),
                span: body_start..body_end,
            })]
        } else {
            self.parse_nodes(&Stop::End(name.clone()))
        };

        LatexNode::Environment(EnvironmentNode {
            name,
            args,
            nodes,
            span: start..self.pos,
        })
    }
}
