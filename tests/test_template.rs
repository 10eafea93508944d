use tempfile::tempdir;
use umb::config::Metadata;
use umb::error::UmbError;
use umb::latex::template::{DEFAULT_TEMPLATE, EXPECTED_SLOTS};
use umb::latex::MainTemplate;

const METADATA: &str = r#"
[umb]
version = "0.1.0"

[manuscript]
title = "A Study of Things"
date = 2024-01-15

[[authors]]
name = "Jane Doe"
orcid = "0000-0000-0000-0000"
email = "x@y.z"
affiliations = ["Dept A"]
corresponding = true
"#;

const SHARED_AFFILIATIONS: &str = r#"
[umb]
version = "0.1.0"

[manuscript]
title = "Shared"
date = 2024-01-15

[[authors]]
name = "Ann Lee"
affiliations = ["Dept A", "Dept B"]

[[authors]]
name = "Bo Chen"
affiliations = ["Dept B", "Dept C"]
corresponding = true
"#;

#[test]
fn test_default_template_slots() {
    let template = MainTemplate::default();
    assert_eq!(template.slots(), EXPECTED_SLOTS);
    assert!(template.check_slots().is_ok());
}

#[test]
fn test_parse_slots_ignores_inline_markers() {
    let content = "% mention of @main in a comment\n  @metadata  \ntext @abstract\n@Main\n@main\n";
    assert_eq!(MainTemplate::parse_slots(content), vec!["@metadata", "@main"]);
}

#[test]
fn test_template_mismatch() {
    let reordered = MainTemplate::new("@metadata\n@main\n@abstract\n@supplement\n");
    match reordered.check_slots() {
        Err(UmbError::TemplateMismatch { found }) => {
            assert_eq!(found, vec!["@metadata", "@main", "@abstract", "@supplement"]);
        }
        other => panic!("expected TemplateMismatch, got {:?}", other),
    }

    let missing = MainTemplate::new("@metadata\n@abstract\n@main\n");
    assert!(matches!(missing.check_slots(), Err(UmbError::TemplateMismatch { .. })));

    let extra = MainTemplate::new("@metadata\n@abstract\n@main\n@supplement\n@appendix\n");
    let metadata = Metadata::from_toml_str(METADATA).unwrap();
    assert!(matches!(
        extra.render(&metadata, &["1.intro.tex"], false),
        Err(UmbError::TemplateMismatch { .. })
    ));
}

#[test]
fn test_format_author_with_orcid_and_email() {
    let metadata = Metadata::from_toml_str(METADATA).unwrap();
    assert_eq!(metadata.affiliation_index("Dept A"), Some(1));

    let author = MainTemplate::format_author(&metadata.authors[0], &metadata);
    assert_eq!(
        author,
        r"\author[1]{{\href{https://orcid.org/0000-0000-0000-0000}{\usebox{\orcid}\hspace{1mm}}Jane~Doe\thanks{\texttt{Correspondence may be addressed to x@y.z}}}}"
    );

    let block = MainTemplate::format_metadata(&metadata);
    assert!(block.contains(r"\title{A Study of Things}"));
    assert!(block.contains(r"\date{2024-01-15}"));
    assert!(block.contains(r"\affil[1]{Dept A}"));
}

#[test]
fn test_format_author_shared_affiliations() {
    let metadata = Metadata::from_toml_str(SHARED_AFFILIATIONS).unwrap();
    assert_eq!(metadata.affiliations(), ["Dept A", "Dept B", "Dept C"]);

    assert_eq!(
        MainTemplate::format_author(&metadata.authors[0], &metadata),
        r"\author[1,2]{Ann~Lee}"
    );
    assert_eq!(
        MainTemplate::format_author(&metadata.authors[1], &metadata),
        r"\author[2,3]{Bo~Chen\thanks{\texttt{Corresponding author}}}"
    );

    let block = MainTemplate::format_metadata(&metadata);
    assert!(block.contains("\\affil[1]{Dept A}\n\\affil[2]{Dept B}\n\\affil[3]{Dept C}\n"));
}

#[test]
fn test_render_main_without_supplement() {
    let metadata = Metadata::from_toml_str(METADATA).unwrap();
    let rendered = MainTemplate::default()
        .render(&metadata, &["1.intro.tex", "2.results.tex"], false)
        .unwrap();

    assert!(rendered.contains("\\input{1.intro.tex}\n\\input{2.results.tex}\n"));
    assert_eq!(rendered.matches("\\input{1.intro.tex}").count(), 1);
    assert!(rendered.contains(r"\input{abstract.tex}"));
    assert!(!rendered.contains("Supplementary Materials"));
    assert!(MainTemplate::parse_slots(&rendered).is_empty());
}

#[test]
fn test_render_with_supplement_keeps_surrounding_text() {
    let metadata = Metadata::from_toml_str(METADATA).unwrap();
    let template = MainTemplate::new("before\n@metadata\n@abstract\n  @main\n@supplement\nafter\n");
    let rendered = template.render(&metadata, &["1.intro.tex"], true).unwrap();

    assert!(rendered.starts_with("before\n\\title{A Study of Things}"));
    assert!(rendered.contains("\\input{abstract.tex}\n  \\input{1.intro.tex}\n"));
    assert!(rendered.contains("\\section*{Supplementary Materials}\n\\input{supplement.tex}\nafter\n"));
}

#[test]
fn test_write_and_read_template() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("template.tex");
    std::fs::write(&source, DEFAULT_TEMPLATE).unwrap();
    let template = MainTemplate::read_tex(&source).unwrap();

    let metadata = Metadata::from_toml_str(METADATA).unwrap();
    let output = dir.path().join("main.tex");
    template.write(&output, &metadata, &["1.intro.tex"], false).unwrap();
    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains(r"\begin{document}"));
    assert!(written.contains(r"\input{1.intro.tex}"));
}
