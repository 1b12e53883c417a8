//! Container access and payload extraction for Parcel.
//!
//! This crate provides the storage layer: the `Container` abstraction over the
//! outer zip bundle (`ZipContainer`), the memoizing `BundleReader` that locates
//! and parses the embedded manifest, `ExtractLayout` for extraction-root paths,
//! and the `Extractor`, which verifies a previously extracted payload against its
//! checksum marker and otherwise performs a clean-slate extraction followed by
//! permission restoration.

pub mod container;
pub mod extract;
pub mod layout;
pub mod modes;
pub mod reader;

pub use container::{read_entry, Container, ZipContainer, MANIFEST_ENTRY};
pub use extract::{
    check_extraction, resolve_package_file, ExtractionOutcome, ExtractionStatus, Extractor,
};
pub use layout::{ExtractLayout, CHECKSUM_MARKER};
pub use modes::{safe_join, ModeApplier};
pub use reader::{BundleReader, OpenBundle};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` inside it is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("no manifest found: container has no '{0}' entry")]
    NoManifestFound(String),
    #[error(transparent)]
    Manifest(#[from] parcel_schema::ManifestError),
    #[error("container entry not found: {0}")]
    EntryNotFound(String),
    #[error("short read on '{entry}': expected {expected} bytes, got {actual}")]
    ShortRead {
        entry: String,
        expected: u64,
        actual: u64,
    },
    #[error("archive entry escapes the extraction root: {0}")]
    UnsafeEntryPath(String),
    #[error("invalid package id for an extraction root: '{0}'")]
    InvalidPackageId(String),
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("package '{package}' has no payload for architecture '{arch}'")]
    ArchitectureUnsupported { package: String, arch: String },
    #[error("failed to apply mode {mode} to {path}: {reason}")]
    PermissionApplyFailed {
        path: String,
        mode: String,
        reason: String,
    },
    #[error("bundle has no open container")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_no_manifest() {
        let e = StoreError::NoManifestFound(MANIFEST_ENTRY.to_owned());
        assert!(e.to_string().contains("no manifest found"));
        assert!(e.to_string().contains("assets/otlauncher.json"));
    }

    #[test]
    fn store_error_display_short_read() {
        let e = StoreError::ShortRead {
            entry: "assets/a.zip".to_owned(),
            expected: 10,
            actual: 4,
        };
        let msg = e.to_string();
        assert!(msg.contains("assets/a.zip"));
        assert!(msg.contains("10"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn store_error_display_architecture_unsupported() {
        let e = StoreError::ArchitectureUnsupported {
            package: "explorer".to_owned(),
            arch: "mips".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("explorer"));
        assert!(msg.contains("mips"));
    }

    #[test]
    fn store_error_manifest_is_transparent() {
        let e = StoreError::from(parcel_schema::ManifestError::UnsupportedVersion(
            "2.0".to_owned(),
        ));
        assert!(e.to_string().starts_with("unsupported manifest version"));
    }

    #[test]
    fn store_error_display_permission() {
        let e = StoreError::PermissionApplyFailed {
            path: "/x/node".to_owned(),
            mode: "0755".to_owned(),
            reason: "chmod exited with 1".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("0755"));
        assert!(msg.contains("/x/node"));
    }
}
