mod common;

use idiff_rs::diff::DiffResult;
use idiff_rs::differs::{history, DiffOptions, DifferKind};
use tempfile::TempDir;

#[test]
fn test_history_diff_reports_unique_entries() {
    let dir = TempDir::new().unwrap();
    let image1 = common::image_at(dir.path(), &["FROM x", "RUN a"], &[]);
    let image2 = common::image_at(dir.path(), &["FROM x", "RUN b"], &[]);

    let diff = history::diff(&image1, &image2);
    assert_eq!(diff.deletions, vec!["RUN a"]);
    assert_eq!(diff.additions, vec!["RUN b"]);
}

#[test]
fn test_history_order_is_matcher_order() {
    let dir = TempDir::new().unwrap();
    let image1 = common::image_at(dir.path(), &["FROM x"], &[]);
    let image2 = common::image_at(dir.path(), &["FROM x", "RUN z", "RUN a", "RUN m"], &[]);

    let diff = history::diff(&image1, &image2);
    assert_eq!(diff.additions, vec!["RUN z", "RUN a", "RUN m"]);
    assert!(diff.deletions.is_empty());
}

#[test]
fn test_identical_history_is_empty() {
    let dir = TempDir::new().unwrap();
    let image = common::image_at(dir.path(), &["FROM x", "RUN a"], &[]);

    let result = DifferKind::History
        .run(&image, &image, &DiffOptions::default())
        .unwrap();
    assert!(matches!(result, DiffResult::History(_)));
    assert!(result.is_empty());
}

#[test]
fn test_history_does_not_need_a_filesystem() {
    let image1 = common::image_at(std::path::Path::new("/nonexistent/a"), &["RUN a"], &[]);
    let image2 = common::image_at(std::path::Path::new("/nonexistent/b"), &["RUN b"], &[]);

    let result = DifferKind::History
        .run(&image1, &image2, &DiffOptions::default())
        .unwrap();
    assert_eq!(result.stats().added, 1);
    assert_eq!(result.stats().removed, 1);
}
