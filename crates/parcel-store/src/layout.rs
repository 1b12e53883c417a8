use crate::StoreError;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Name of the checksum marker written at the root of every extraction.
pub const CHECKSUM_MARKER: &str = "MD5SUM";

/// Directory layout under the extraction base.
///
/// Each package is materialized at `<base>/<package-id>`. The per-package lock
/// lives next to the root, never inside it, so a clean-slate re-extraction
/// cannot delete a lock that is being held.
#[derive(Debug, Clone)]
pub struct ExtractLayout {
    base: PathBuf,
}

impl ExtractLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[inline]
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn package_root(&self, package_id: &str) -> Result<PathBuf, StoreError> {
        validate_package_id(package_id)?;
        Ok(self.base.join(package_id))
    }

    pub fn lock_file(&self, package_id: &str) -> Result<PathBuf, StoreError> {
        validate_package_id(package_id)?;
        Ok(self.base.join(format!(".{package_id}.lock")))
    }

    #[inline]
    pub fn marker_path(root: &Path) -> PathBuf {
        root.join(CHECKSUM_MARKER)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base)?;
        Ok(())
    }
}

/// A package id must name exactly one directory below the base.
fn validate_package_id(id: &str) -> Result<(), StoreError> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !id.contains(['/', '\\']) => Ok(()),
        _ => Err(StoreError::InvalidPackageId(id.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = ExtractLayout::new("/data/local/tmp");
        assert_eq!(layout.base(), Path::new("/data/local/tmp"));
        assert_eq!(
            layout.package_root("binder-explorer").unwrap(),
            PathBuf::from("/data/local/tmp/binder-explorer")
        );
        assert_eq!(
            layout.lock_file("binder-explorer").unwrap(),
            PathBuf::from("/data/local/tmp/.binder-explorer.lock")
        );
        assert_eq!(
            ExtractLayout::marker_path(Path::new("/data/local/tmp/x")),
            PathBuf::from("/data/local/tmp/x/MD5SUM")
        );
    }

    #[test]
    fn rejects_ids_that_escape_the_base() {
        let layout = ExtractLayout::new("/base");
        for bad in ["", ".", "..", "../etc", "a/b", "/abs", "a\\b"] {
            assert!(
                matches!(
                    layout.package_root(bad),
                    Err(StoreError::InvalidPackageId(_))
                ),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn initialize_creates_base() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ExtractLayout::new(dir.path().join("nested").join("base"));
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        assert!(layout.base().is_dir());
    }
}
