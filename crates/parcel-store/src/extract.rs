use crate::container::Container;
use crate::layout::ExtractLayout;
use crate::modes::{safe_join, ModeApplier};
use crate::reader::OpenBundle;
use crate::{fsync_dir, StoreError};
use parcel_schema::{Manifest, PackageFile};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::ZipArchive;

/// State of an extraction root relative to a payload's checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Valid,
    Stale { recorded: String },
    MarkerMissing,
    RootMissing,
}

impl ExtractionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// The marker matched; nothing was touched.
    AlreadyValid,
    Extracted { files: usize, directories: usize },
}

/// Look up the payload for (`package_id`, `arch`). There is no fallback
/// architecture.
pub fn resolve_package_file<'m>(
    manifest: &'m Manifest,
    package_id: &str,
    arch: &str,
) -> Result<&'m PackageFile, StoreError> {
    let package = manifest
        .package(package_id)
        .ok_or_else(|| StoreError::PackageNotFound(package_id.to_owned()))?;
    package
        .file_for_arch(arch)
        .ok_or_else(|| StoreError::ArchitectureUnsupported {
            package: package_id.to_owned(),
            arch: arch.to_owned(),
        })
}

/// Compare the checksum marker at `root` with the payload's checksum.
/// Never fails: an unreadable marker counts as missing.
pub fn check_extraction(root: &Path, file: &PackageFile) -> ExtractionStatus {
    if !root.is_dir() {
        debug!("extraction root {} not found", root.display());
        return ExtractionStatus::RootMissing;
    }
    let marker = ExtractLayout::marker_path(root);
    match fs::read_to_string(&marker) {
        Ok(content) => {
            let recorded = content.trim();
            if recorded == file.checksum.as_str().trim() {
                ExtractionStatus::Valid
            } else {
                ExtractionStatus::Stale {
                    recorded: recorded.to_owned(),
                }
            }
        }
        Err(e) => {
            debug!("no usable checksum marker at {}: {e}", marker.display());
            ExtractionStatus::MarkerMissing
        }
    }
}

/// Checksum-guarded, clean-slate payload extraction.
pub struct Extractor {
    modes: Box<dyn ModeApplier>,
}

impl Extractor {
    pub fn new(modes: Box<dyn ModeApplier>) -> Self {
        Self { modes }
    }

    /// Make `root` hold the payload for (`package_id`, `arch`).
    ///
    /// A root whose marker matches the payload checksum is left alone.
    /// Otherwise the nested payload archive is spooled out of the bundle and
    /// opened, the root is deleted and recreated, the payload is unpacked into
    /// it entry by entry, the declared modes are applied, and the marker is
    /// written last. An interruption before the marker is written leaves the
    /// root invalid, so the next call extracts again.
    pub fn ensure_extracted(
        &self,
        bundle: &mut OpenBundle<'_>,
        package_id: &str,
        arch: &str,
        root: &Path,
    ) -> Result<ExtractionOutcome, StoreError> {
        let file = resolve_package_file(bundle.manifest, package_id, arch)?;

        match check_extraction(root, file) {
            ExtractionStatus::Valid => {
                debug!("{} is up to date ({})", root.display(), file.checksum);
                return Ok(ExtractionOutcome::AlreadyValid);
            }
            ExtractionStatus::Stale { recorded } => {
                info!(
                    "checksum changed for {package_id} ({recorded} -> {}), re-extracting",
                    file.checksum
                );
            }
            ExtractionStatus::MarkerMissing | ExtractionStatus::RootMissing => {}
        }

        info!(
            "extracting {} ({arch}) to {}",
            file.container_entry_path,
            root.display()
        );
        let mut payload = open_payload(&mut *bundle.container, &file.container_entry_path)?;
        reset_root(root)?;
        let (files, directories) = unpack_payload(&mut payload, root)?;
        self.apply_modes(root, file)?;
        write_marker(root, file.checksum.as_str().trim())?;

        info!("extracted {files} file(s), {directories} dir(s) for {package_id}");
        Ok(ExtractionOutcome::Extracted { files, directories })
    }

    fn apply_modes(&self, root: &Path, file: &PackageFile) -> Result<(), StoreError> {
        for entry in &file.file_modes {
            let failed = |path: String, reason: String| StoreError::PermissionApplyFailed {
                path,
                mode: entry.mode.clone(),
                reason,
            };

            let target = safe_join(root, &entry.relative_path).ok_or_else(|| {
                failed(
                    entry.relative_path.clone(),
                    "path escapes the extraction root".to_owned(),
                )
            })?;
            if target.symlink_metadata().is_err() {
                return Err(failed(
                    target.display().to_string(),
                    "no such file in the extracted payload".to_owned(),
                ));
            }

            debug!("setting mode of {} to {}", target.display(), entry.mode);
            self.modes
                .apply_mode(&target, &entry.mode)
                .map_err(|e| failed(target.display().to_string(), e.to_string()))?;
        }
        Ok(())
    }
}

fn reset_root(root: &Path) -> Result<(), StoreError> {
    match root.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(root)?,
        Ok(_) => fs::remove_file(root)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(root)?;
    Ok(())
}

/// Copy the nested archive at `entry` into an anonymous temp file and open
/// it. Payload entries may carry their sizes in trailing data descriptors,
/// so they are read through the central directory rather than as a stream.
fn open_payload(
    container: &mut dyn Container,
    entry: &str,
) -> Result<ZipArchive<File>, StoreError> {
    if !container.has_entry(entry) {
        return Err(StoreError::EntryNotFound(entry.to_owned()));
    }
    let mut spool = tempfile::tempfile()?;
    let copied = io::copy(&mut container.open_entry(entry)?, &mut spool)?;
    debug!("spooled {entry} ({copied} bytes)");
    spool.rewind()?;
    Ok(ZipArchive::new(spool)?)
}

/// Unpack `payload` into `root` in archive order. Parents are created per
/// entry, so directory entries may appear before or after the files they
/// contain.
fn unpack_payload(
    payload: &mut ZipArchive<File>,
    root: &Path,
) -> Result<(usize, usize), StoreError> {
    let mut files = 0;
    let mut directories = 0;
    for index in 0..payload.len() {
        let mut item = payload.by_index(index)?;
        let target = item
            .enclosed_name()
            .map(|rel| root.join(rel))
            .ok_or_else(|| StoreError::UnsafeEntryPath(item.name().to_owned()))?;

        if item.is_dir() {
            debug!("creating {}", target.display());
            fs::create_dir_all(&target)?;
            directories += 1;
        } else {
            debug!("extracting {}", target.display());
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut item, &mut out)?;
            out.flush()?;
            files += 1;
        }
    }
    Ok((files, directories))
}

fn write_marker(root: &Path, checksum: &str) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(root)?;
    tmp.write_all(checksum.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(ExtractLayout::marker_path(root))
        .map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(root)?;
    Ok(())
}
