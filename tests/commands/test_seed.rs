//! Tests for seed command

use wiki_rag::commands::seed::{SeedFile, DemoSet};

#[test]
fn test_seed_demo_sets_parse() {
    assert_eq!(SeedFile::demo(DemoSet::Projects).unwrap().flatten().len(), 3);
    assert_eq!(SeedFile::demo(DemoSet::Mission).unwrap().flatten().len(), 7);
}

#[test]
fn test_seed_children_follow_parent() {
    let pages = SeedFile::parse(
        r#"
pages:
  - path: a
    title: A
    content: a
    children:
      - path: a/b
        title: B
        content: b
        children:
          - path: a/b/c
            title: C
            content: c
  - path: d
    title: D
    content: d
"#,
    )
    .unwrap()
    .flatten();

    let paths: Vec<&str> = pages.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, vec!["a", "a/b", "a/b/c", "d"]);
    assert!(pages.iter().all(|p| p.is_published && !p.is_private));
}

#[test]
fn test_seed_missing_title_is_rejected() {
    let result = SeedFile::parse("pages:\n  - path: a\n    content: text\n");
    assert!(result.is_err());
}
