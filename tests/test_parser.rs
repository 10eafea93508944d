use std::fs::{self, File};
use tempfile::tempdir;
use umb::error::UmbError;
use umb::latex::parser::{find_content_images, find_manuscript_files, is_umb_project, section_order};

#[test]
fn test_is_umb_project() {
    let dir = tempdir().unwrap();
    assert!(!is_umb_project(dir.path()));

    File::create(dir.path().join("umb.toml")).unwrap();
    fs::create_dir(dir.path().join("content")).unwrap();
    assert!(!is_umb_project(dir.path()));

    fs::create_dir(dir.path().join(".umb")).unwrap();
    assert!(is_umb_project(dir.path()));
}

#[test]
fn test_section_order() {
    assert_eq!(section_order("1.intro.tex"), Some((1, "1.intro.tex".to_string())));
    assert_eq!(section_order("10-methods.tex"), Some((10, "10-methods.tex".to_string())));
    assert_eq!(section_order("abstract.tex"), None);
    assert_eq!(section_order("1.notes.txt"), None);
}

#[test]
fn test_find_manuscript_files() {
    let dir = tempdir().unwrap();
    for name in ["2.results.tex", "10.appendix.tex", "1.intro.tex", "notes.tex", "imports.tex"] {
        File::create(dir.path().join(name)).unwrap();
    }

    let files = find_manuscript_files(dir.path()).unwrap();
    let names: Vec<_> = files
        .sections
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["1.intro.tex", "2.results.tex", "10.appendix.tex"]);
    assert!(files.abstract_file.is_none());
    assert!(!files.has_supplement());
    assert_eq!(files.ordered().len(), 3);
}

#[test]
fn test_find_manuscript_files_with_abstract_and_supplement() {
    let dir = tempdir().unwrap();
    for name in ["1.intro.tex", "abstract.tex", "supplement.tex"] {
        File::create(dir.path().join(name)).unwrap();
    }

    let files = find_manuscript_files(dir.path()).unwrap();
    let ordered: Vec<_> = files
        .ordered()
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(ordered, vec!["abstract.tex", "1.intro.tex", "supplement.tex"]);
    assert_eq!(files.sections.len(), 1);
    assert!(files.has_supplement());
}

#[test]
fn test_find_manuscript_files_without_sections() {
    let dir = tempdir().unwrap();
    File::create(dir.path().join("abstract.tex")).unwrap();

    let result = find_manuscript_files(dir.path());
    assert!(matches!(result, Err(UmbError::NoSectionFiles(_))));
}

#[test]
fn test_find_content_images() {
    let dir = tempdir().unwrap();
    File::create(dir.path().join("myfig.png")).unwrap();
    fs::create_dir(dir.path().join("plots")).unwrap();
    File::create(dir.path().join("plots").join("out.png")).unwrap();

    let images = find_content_images(dir.path()).unwrap();
    let aliases: Vec<_> = images.figures().iter().map(|f| f.old_alias.as_str()).collect();
    assert_eq!(aliases, vec!["myfig.png", "plots/out.png"]);

    let plot = &images.figures()[1];
    assert_eq!(plot.new_alias, "plots/out.png");
    assert!(plot.url.is_none());
    assert_eq!(plot.local_path.as_deref(), Some(dir.path().join("plots").join("out.png").as_path()));
}

#[test]
fn test_find_content_images_missing_directory() {
    let dir = tempdir().unwrap();
    let images = find_content_images(&dir.path().join("images")).unwrap();
    assert!(images.is_empty());
}
