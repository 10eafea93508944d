use std::collections::{BTreeMap, BTreeSet};

use umb::error::UmbError;
use umb::latex::nodes::{EnvironmentNode, MacroArg, MacroArgs, MacroNode};
use umb::latex::scanner::{extract_citation_keys, extract_figure_keys, extract_includegraphics_key};
use umb::latex::{parse_latex, rewrite_references, scan_nodes, LatexNode};

fn first_macro(source: &str) -> MacroNode {
    match parse_latex(source).into_iter().next() {
        Some(LatexNode::Macro(node)) => node,
        other => panic!("expected a macro, got {:?}", other),
    }
}

fn first_environment(source: &str) -> EnvironmentNode {
    match parse_latex(source).into_iter().next() {
        Some(LatexNode::Environment(env)) => env,
        other => panic!("expected an environment, got {:?}", other),
    }
}

fn keys(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_extract_citation_keys() {
    let node = first_macro(r"\cite{abc123}");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["abc123"]));

    let node = first_macro(r"\cite{abc123, def456}");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["abc123", "def456"]));

    let node = first_macro("\\cite{ abc123 ,\n  def456 }");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["abc123", "def456"]));
}

#[test]
fn test_extract_citation_keys_deduplicates_and_drops_empty() {
    let node = first_macro(r"\cite{a, b, a,, }");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["a", "b"]));
}

#[test]
fn test_extract_doi_citation_keys_verbatim() {
    let node = first_macro(r"\cite{@doi:10.1103/PhysRev.47.777, @doi:10.1002/andp.19053220607}");
    assert_eq!(
        extract_citation_keys(&node).unwrap(),
        keys(&["@doi:10.1103/PhysRev.47.777", "@doi:10.1002/andp.19053220607"])
    );
}

#[test]
fn test_citation_macro_variants() {
    let node = first_macro(r"\citep[see][p.~4]{smith2020, jones2021}");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["smith2020", "jones2021"]));

    let node = first_macro(r"\citet*{smith2020}");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["smith2020"]));

    let node = first_macro(r"\nocite{hidden}");
    assert_eq!(extract_citation_keys(&node).unwrap(), keys(&["hidden"]));
}

#[test]
fn test_citation_without_argument_is_invalid() {
    let node = first_macro("\\cite and nothing else");
    match extract_citation_keys(&node) {
        Err(UmbError::InvalidMarkupNode { macro_name, line, .. }) => {
            assert_eq!(macro_name, "cite");
            assert_eq!(line, 1);
        }
        other => panic!("expected InvalidMarkupNode, got {:?}", other),
    }
}

#[test]
fn test_citation_with_nested_markup_is_invalid() {
    let node = first_macro(r"\cite{a\textbf{b}}");
    assert!(matches!(
        extract_citation_keys(&node),
        Err(UmbError::InvalidMarkupNode { .. })
    ));

    let node = first_macro(r"\cite{}");
    assert!(matches!(
        extract_citation_keys(&node),
        Err(UmbError::InvalidMarkupNode { .. })
    ));
}

#[test]
fn test_citation_with_mismatched_argspec_is_invalid() {
    let mut node = first_macro(r"\cite{abc}");
    node.args = Some(MacroArgs {
        argspec: "*[[{".to_string(),
        args: vec![None, Some(MacroArg::Star)],
    });
    assert!(matches!(
        extract_citation_keys(&node),
        Err(UmbError::InvalidMarkupNode { .. })
    ));

    node.args = None;
    assert!(matches!(
        extract_citation_keys(&node),
        Err(UmbError::InvalidMarkupNode { .. })
    ));
}

#[test]
fn test_extract_includegraphics_key() {
    let node = first_macro(r"\includegraphics[width=\textwidth]{myfig.png}");
    assert_eq!(extract_includegraphics_key(&node).unwrap(), "myfig.png");

    let node = first_macro(r"\includegraphics{https://example.com/a/b/fig1.png}");
    assert_eq!(
        extract_includegraphics_key(&node).unwrap(),
        "https://example.com/a/b/fig1.png"
    );

    let node = first_macro(r"\includegraphics");
    assert!(matches!(
        extract_includegraphics_key(&node),
        Err(UmbError::InvalidMarkupNode { .. })
    ));
}

#[test]
fn test_extract_figure_keys_with_subfigures() {
    let env = first_environment(
        r"\begin{figure}
    \centering
    \begin{subfigure}[b]{0.45\textwidth}
        \includegraphics[width=\textwidth]{myfig.png}
    \end{subfigure}
    \begin{subfigure}[b]{0.45\textwidth}
        \includegraphics[width=\textwidth]{myfig2.png}
    \end{subfigure}
    \caption{Two panels}
\end{figure}",
    );
    assert_eq!(extract_figure_keys(&env).unwrap(), keys(&["myfig.png", "myfig2.png"]));
}

#[test]
fn test_extract_figure_keys_nested_and_repeated() {
    let env = first_environment(
        r"\begin{figure*}[t]
\includegraphics{top.png}
\begin{subfigure}{0.5\textwidth}
  \begin{subfigure}{\textwidth}\includegraphics{top.png}\end{subfigure}
  \includegraphics{inner.png}
\end{subfigure}
\end{figure*}",
    );
    assert_eq!(extract_figure_keys(&env).unwrap(), keys(&["inner.png", "top.png"]));
}

#[test]
fn test_scan_nodes_skips_comments_and_verbatim() {
    let source = r"Intro \citep{visible}.
% \cite{commented}
\begin{verbatim}
\cite{verbatim}
\end{verbatim}
\includegraphics{outside.png}
\begin{figure}
  \includegraphics{inside.png}
  \caption{Results from \cite{@10.1/x}}
\end{figure}
";
    let references = scan_nodes(&parse_latex(source)).unwrap();
    assert_eq!(references.citation_keys, keys(&["@10.1/x", "visible"]));
    assert_eq!(references.figure_keys, keys(&["inside.png"]));
}

#[test]
fn test_scan_nodes_reports_line_of_malformed_citation() {
    let source = "First line.\n\\textit{see \\cite[p. 3]}\n";
    match scan_nodes(&parse_latex(source)) {
        Err(UmbError::InvalidMarkupNode { macro_name, line, .. }) => {
            assert_eq!(macro_name, "cite");
            assert_eq!(line, 2);
        }
        other => panic!("expected InvalidMarkupNode, got {:?}", other),
    }
}

#[test]
fn test_line_numbers_in_long_document() {
    let mut source = String::new();
    for i in 0..2000 {
        match i % 4 {
            0 => source.push_str("% a comment\n"),
            1 => source.push_str("\\section{Part \\emph{one}}\n"),
            2 => source.push_str("\\begin{verbatim}\\cite\\end{verbatim}\n"),
            _ => source.push_str(&format!("Text \\cite{{key{}}}.\n", i)),
        }
    }
    source.push_str("\\textbf{see \\cite[p. 3]}\n");

    let nodes = parse_latex(&source);
    let lines: Vec<usize> = nodes
        .iter()
        .filter_map(|node| match node {
            LatexNode::Macro(node) if node.name == "cite" => Some(node.line),
            _ => None,
        })
        .take(2)
        .collect();
    assert_eq!(lines, vec![4, 8]);

    match scan_nodes(&nodes) {
        Err(UmbError::InvalidMarkupNode { macro_name, line, .. }) => {
            assert_eq!(macro_name, "cite");
            assert_eq!(line, 2001);
        }
        other => panic!("expected InvalidMarkupNode, got {:?}", other),
    }
}

#[test]
fn test_rewrite_strips_doi_markers() {
    let source = r"See \cite{@doi:10.1/x, plain} and \citet{ doi:10.2/y }. Literal @doi:10.1/x stays.";
    let nodes = parse_latex(source);
    let rewritten = rewrite_references(source, &nodes, &BTreeMap::new()).unwrap();
    assert_eq!(
        rewritten,
        r"See \cite{10.1/x, plain} and \citet{ 10.2/y }. Literal @doi:10.1/x stays."
    );
}

#[test]
fn test_rewrite_replaces_figure_references() {
    let source = r"\begin{figure}
\includegraphics[width=\textwidth]{https://example.com/a/fig1.png}
\includegraphics{plots/out.png}
\end{figure}
\includegraphics{plots/out.png}
";
    let aliases: BTreeMap<String, String> = [
        ("https://example.com/a/fig1.png", "images/fig1.png"),
        ("plots/out.png", "images/out.png"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let rewritten = rewrite_references(source, &parse_latex(source), &aliases).unwrap();
    assert_eq!(
        rewritten,
        r"\begin{figure}
\includegraphics[width=\textwidth]{images/fig1.png}
\includegraphics{images/out.png}
\end{figure}
\includegraphics{plots/out.png}
"
    );
}

#[test]
fn test_rewrite_without_references_is_identity() {
    let source = "No references here, just {braces} and \\emph{text}.\n";
    let rewritten = rewrite_references(source, &parse_latex(source), &BTreeMap::new()).unwrap();
    assert_eq!(rewritten, source);
}
