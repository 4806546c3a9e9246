//! Classification of image source strings.
//!
//! A source is checked against three predicates in a fixed priority order:
//! local image id, registry reference, tar archive. The first predicate that
//! accepts the string decides the backend.

use crate::error::AcquireError;
use oci_distribution::Reference;

/// Where an image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Image id known to the local daemon (12 characters).
    LocalId,
    /// Reference of the form `repo/name[:tag]` resolved against a registry.
    Registry,
    /// Saved image or root filesystem archive on disk.
    Tar,
}

const TAR_SUFFIXES: [&str; 3] = [".tar", ".tar.gz", ".tgz"];

const SOURCE_CHECKS: [(SourceKind, fn(&str) -> bool); 3] = [
    (SourceKind::LocalId, is_local_id),
    (SourceKind::Registry, is_registry_reference),
    (SourceKind::Tar, is_tar_archive),
];

/// Resolves a source string to the backend that can acquire it.
pub fn classify(source: &str) -> Result<SourceKind, AcquireError> {
    SOURCE_CHECKS
        .iter()
        .find(|(_, check)| check(source))
        .map(|(kind, _)| *kind)
        .ok_or_else(|| AcquireError::unresolved(source))
}

pub fn is_local_id(source: &str) -> bool {
    source.len() == 12
        && source
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

pub fn is_registry_reference(source: &str) -> bool {
    let Some((_, name)) = source.rsplit_once('/') else {
        return false;
    };
    if name.is_empty() || is_tar_archive(source) {
        return false;
    }
    source.parse::<Reference>().is_ok()
}

pub fn is_tar_archive(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    TAR_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id() {
        assert!(is_local_id("0123456789ab"));
        assert!(!is_local_id("0123456789a"));
        assert!(!is_local_id("0123456789ABC"));
        assert!(!is_local_id("0123456789A!"));
    }

    #[test]
    fn test_registry_reference() {
        assert!(is_registry_reference("gcr.io/google-appengine/python"));
        assert!(is_registry_reference("library/ubuntu:22.04"));
        assert!(!is_registry_reference("ubuntu"));
        assert!(!is_registry_reference("images/base.tar"));
        assert!(!is_registry_reference("library/"));
    }

    #[test]
    fn test_tar_archive() {
        assert!(is_tar_archive("image.tar"));
        assert!(is_tar_archive("/tmp/Image.TAR.GZ"));
        assert!(is_tar_archive("rootfs.tgz"));
        assert!(!is_tar_archive("image.zip"));
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(classify("0123456789ab").unwrap(), SourceKind::LocalId);
        assert_eq!(classify("gcr.io/project/app:1.0").unwrap(), SourceKind::Registry);
        assert_eq!(classify("build/app.tar").unwrap(), SourceKind::Tar);
    }

    #[test]
    fn test_classify_unresolved() {
        let err = classify("not an image").unwrap_err();
        assert!(matches!(err, AcquireError::UnresolvedSource { .. }));
    }
}
