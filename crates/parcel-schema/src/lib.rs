//! Bundle manifest model and parsing for Parcel.
//!
//! This crate defines the schema layer: the in-memory `Manifest` (packages,
//! per-architecture payload files, and per-file permission modes) and the
//! parser that builds it from the versioned JSON descriptor shipped inside a
//! bundle (`parse_manifest_str`).

pub mod manifest;
pub mod types;

pub use manifest::{
    parse_manifest_slice, parse_manifest_str, FileMode, Manifest, ManifestError, Package,
    PackageFile, MANIFEST_VERSION,
};
pub use types::{ArchTag, Checksum, PackageId};
