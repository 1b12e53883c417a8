use crate::container::{read_entry, Container, ZipContainer, MANIFEST_ENTRY};
use crate::StoreError;
use parcel_schema::{parse_manifest_slice, Manifest};
use std::path::Path;
use tracing::debug;

/// Loads the manifest of a bundle and keeps its container open for extraction.
///
/// The manifest is parsed on first access and cached; later calls return the
/// cached value without touching the container again. Dropping the reader (or
/// calling [`close`](Self::close)) releases the container handle.
pub struct BundleReader {
    origin: String,
    container: Option<Box<dyn Container>>,
    document: Option<Vec<u8>>,
    manifest: Option<Manifest>,
}

/// A parsed manifest together with the container its payloads are streamed from.
pub struct OpenBundle<'a> {
    pub manifest: &'a Manifest,
    pub container: &'a mut dyn Container,
}

impl BundleReader {
    /// Reader over a standalone manifest document. It has no container, so it
    /// can be listed and inspected but not extracted.
    pub fn from_json(json: impl Into<String>) -> Self {
        Self {
            origin: "<inline>".to_owned(),
            container: None,
            document: Some(json.into().into_bytes()),
            manifest: None,
        }
    }

    /// Open a bundle file and read its embedded manifest document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!("opening bundle {}", path.display());
        let container = ZipContainer::open(path)?;
        Self::from_container(Box::new(container), path.display().to_string())
    }

    /// Wrap an already opened container. Fails with
    /// [`StoreError::NoManifestFound`] when the manifest entry is absent.
    pub fn from_container(
        mut container: Box<dyn Container>,
        origin: impl Into<String>,
    ) -> Result<Self, StoreError> {
        if !container.has_entry(MANIFEST_ENTRY) {
            return Err(StoreError::NoManifestFound(MANIFEST_ENTRY.to_owned()));
        }
        let document = read_entry(container.as_mut(), MANIFEST_ENTRY)?;
        Ok(Self {
            origin: origin.into(),
            container: Some(container),
            document: Some(document),
            manifest: None,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn has_container(&self) -> bool {
        self.container.is_some()
    }

    pub fn manifest(&mut self) -> Result<&Manifest, StoreError> {
        self.ensure_parsed()?;
        self.manifest.as_ref().ok_or(StoreError::Closed)
    }

    /// Borrow the manifest and the container together for extraction.
    pub fn bundle(&mut self) -> Result<OpenBundle<'_>, StoreError> {
        self.ensure_parsed()?;
        let manifest = self.manifest.as_ref().ok_or(StoreError::Closed)?;
        let container = self.container.as_deref_mut().ok_or(StoreError::Closed)?;
        Ok(OpenBundle {
            manifest,
            container,
        })
    }

    /// Release the container and drop the cached manifest.
    pub fn close(&mut self) {
        if self.container.take().is_some() {
            debug!("closed bundle {}", self.origin);
        }
        self.document = None;
        self.manifest = None;
    }

    fn ensure_parsed(&mut self) -> Result<(), StoreError> {
        if self.manifest.is_some() {
            return Ok(());
        }
        let document = self.document.as_deref().ok_or(StoreError::Closed)?;
        let manifest = parse_manifest_slice(document)?;
        debug!(
            "parsed manifest from {}: {} package(s)",
            self.origin,
            manifest.packages.len()
        );
        self.manifest = Some(manifest);
        self.document = None;
        Ok(())
    }
}
