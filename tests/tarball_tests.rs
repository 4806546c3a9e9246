mod common;

use idiff_rs::acquire::{acquire, AcquireOptions};
use idiff_rs::error::AcquireError;
use idiff_rs::image::Diagnostic;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn source(path: &Path) -> String {
    path.display().to_string()
}

fn scratch_options(scratch: &Path) -> AcquireOptions {
    AcquireOptions {
        scratch_dir: Some(scratch.to_path_buf()),
        ..Default::default()
    }
}

fn leftovers(scratch: &Path) -> Vec<PathBuf> {
    fs::read_dir(scratch)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[tokio::test]
async fn test_saved_image_metadata_and_layers() {
    let dir = TempDir::new().unwrap();
    let archive = common::saved_image(
        dir.path(),
        "app.tar",
        &["FROM x", "RUN pip install six"],
        &["PATH=/usr/bin", "PYTHONPATH=/app/lib"],
        &[
            common::layer(&[("etc/motd", "one"), ("etc/hosts", "127.0.0.1")]),
            common::layer(&[("etc/motd", "two"), ("app/main.py", "print()")]),
        ],
    );

    let image = acquire(&source(&archive), &AcquireOptions::default())
        .await
        .unwrap();
    assert_eq!(image.history(), vec!["FROM x", "RUN pip install six"]);
    assert_eq!(image.env_var("PYTHONPATH"), Some("/app/lib"));
    assert!(image.diagnostics().is_empty());

    let root = image.root();
    assert_eq!(fs::read_to_string(root.join("etc/motd")).unwrap(), "two");
    assert!(root.join("etc/hosts").is_file());
    assert!(root.join("app/main.py").is_file());
    assert!(!root.join("manifest.json").exists());
}

#[tokio::test]
async fn test_whiteouts_remove_lower_files() {
    let dir = TempDir::new().unwrap();
    let archive = common::saved_image(
        dir.path(),
        "wh.tar",
        &[],
        &[],
        &[
            common::layer(&[
                ("etc/secret", "x"),
                ("var/cache/a", "1"),
                ("var/cache/b", "2"),
            ]),
            common::layer(&[("etc/.wh.secret", ""), ("var/cache/.wh..wh..opq", "")]),
        ],
    );

    let image = acquire(&source(&archive), &AcquireOptions::default())
        .await
        .unwrap();
    let root = image.root();
    assert!(!root.join("etc/secret").exists());
    assert!(!root.join("etc/.wh.secret").exists());
    assert!(root.join("var/cache").is_dir());
    assert_eq!(fs::read_dir(root.join("var/cache")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_ambiguous_config_uses_first_candidate() {
    let dir = TempDir::new().unwrap();
    let config_b = common::config_json(&["RUN b"], &[]);
    let config_a = common::config_json(&["RUN a"], &[]);
    let archive = common::flat_archive(
        dir.path(),
        "flat.tar",
        &[
            ("bbb.json", config_b.as_str()),
            ("aaa.json", config_a.as_str()),
            ("etc/hostname", "flat"),
        ],
    );

    let image = acquire(&source(&archive), &AcquireOptions::default())
        .await
        .unwrap();
    assert_eq!(image.history(), vec!["RUN a"]);
    assert!(matches!(
        image.diagnostics(),
        [Diagnostic::AmbiguousConfig { chosen, .. }] if chosen == "aaa.json"
    ));
    assert!(image.root().join("etc/hostname").is_file());
}

#[tokio::test]
async fn test_rootfs_archive_without_config() {
    let dir = TempDir::new().unwrap();
    let archive = common::flat_archive(dir.path(), "rootfs.tar", &[("bin/sh", "#!")]);

    let image = acquire(&source(&archive), &AcquireOptions::default())
        .await
        .unwrap();
    assert!(image.history().is_empty());
    assert!(matches!(
        image.diagnostics(),
        [Diagnostic::MissingConfig { .. }]
    ));
    assert!(image.root().join("bin/sh").is_file());
}

#[tokio::test]
async fn test_gzipped_archive() {
    let dir = TempDir::new().unwrap();
    let plain = common::layer(&[("etc/issue", "gz")]);
    let path = dir.path().join("rootfs.tar.gz");
    let mut encoder = flate2::write::GzEncoder::new(
        fs::File::create(&path).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(&plain).unwrap();
    encoder.finish().unwrap();

    let image = acquire(&source(&path), &AcquireOptions::default())
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(image.root().join("etc/issue")).unwrap(), "gz");
}

#[tokio::test]
async fn test_workdir_removed_on_drop() {
    let dir = TempDir::new().unwrap();
    let archive = common::flat_archive(dir.path(), "drop.tar", &[("a", "1")]);

    let image = acquire(&source(&archive), &AcquireOptions::default())
        .await
        .unwrap();
    let root = image.root().to_path_buf();
    assert!(root.exists());
    drop(image);
    assert!(!root.exists());
}

#[tokio::test]
async fn test_missing_archive_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.tar");

    let err = acquire(&source(&missing), &AcquireOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::Io { .. }));
}

#[tokio::test]
async fn test_unresolvable_source() {
    let err = acquire("not an image", &AcquireOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::UnresolvedSource { .. }));
}

#[tokio::test]
async fn test_whiteouts_do_not_follow_symlinks() {
    let dir = TempDir::new().unwrap();
    let outside = dir.path().join("outside");
    common::write_tree(&outside, &[("victim", "keep"), ("other", "keep")]);
    let archive = common::saved_image(
        dir.path(),
        "escape.tar",
        &["RUN a"],
        &[],
        &[
            common::symlink_layer("escape", &outside),
            common::layer(&[("escape/.wh.victim", "")]),
            common::layer(&[("escape/.wh..wh..opq", "")]),
        ],
    );

    let image = acquire(&source(&archive), &AcquireOptions::default())
        .await
        .unwrap();
    assert!(outside.join("victim").is_file());
    assert!(outside.join("other").is_file());
    let link = fs::symlink_metadata(image.root().join("escape")).unwrap();
    assert!(link.file_type().is_symlink());
}

#[tokio::test]
async fn test_scratch_dir_holds_live_images_only() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let options = scratch_options(scratch.path());
    let archive = common::flat_archive(dir.path(), "ok.tar", &[("etc/motd", "hi")]);

    let image = acquire(&source(&archive), &options).await.unwrap();
    let live = leftovers(scratch.path());
    assert_eq!(live.len(), 1);
    assert!(live[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("idiff-"));
    drop(image);
    assert!(leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_failed_acquisitions_leave_no_scratch_dirs() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let options = scratch_options(scratch.path());

    let corrupt_layer = common::saved_image(
        dir.path(),
        "corrupt.tar",
        &["RUN a"],
        &[],
        &[b"\x1f\x8bnot really gzip".to_vec()],
    );
    let bad_config = common::flat_archive(
        dir.path(),
        "config.tar",
        &[("config.json", "{not json"), ("etc/motd", "x")],
    );
    let missing = dir.path().join("missing.tar");

    for archive in [corrupt_layer, bad_config, missing] {
        let result = acquire(&source(&archive), &options).await;
        assert!(result.is_err(), "{} should fail", archive.display());
    }
    assert!(leftovers(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_traversal_entries_are_rejected() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let options = scratch_options(scratch.path());

    let flat = dir.path().join("flat.tar");
    fs::write(&flat, common::raw_entry_layer("../evil", "x")).unwrap();
    let layered = common::saved_image(
        dir.path(),
        "layered.tar",
        &["RUN a"],
        &[],
        &[common::raw_entry_layer("../../evil", "x")],
    );

    for archive in [flat, layered] {
        let err = acquire(&source(&archive), &options).await.unwrap_err();
        assert!(matches!(err, AcquireError::PathTraversal { .. }), "{}", err);
    }
    assert!(leftovers(scratch.path()).is_empty());
    assert!(!dir.path().join("evil").exists());
}
