use crate::StoreError;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Fixed location of the bundle manifest inside the outer container.
pub const MANIFEST_ENTRY: &str = "assets/otlauncher.json";

/// Random-access view of an archive's named entries.
///
/// Reading an entry through [`read_entry`] yields the full declared length or
/// fails with [`StoreError::ShortRead`]; it never truncates silently.
pub trait Container {
    fn has_entry(&self, path: &str) -> bool;

    /// Declared (uncompressed) size of an entry.
    fn entry_size(&mut self, path: &str) -> Result<u64, StoreError>;

    /// Stream an entry's bytes. The stream borrows the container until dropped.
    fn open_entry(&mut self, path: &str) -> Result<Box<dyn Read + '_>, StoreError>;
}

/// [`Container`] backed by a seekable zip archive.
pub struct ZipContainer<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl ZipContainer<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ZipContainer<R> {
    pub fn new(reader: R) -> Result<Self, StoreError> {
        Ok(Self {
            archive: ZipArchive::new(reader)?,
        })
    }
}

fn entry_error(path: &str, err: ZipError) -> StoreError {
    match err {
        ZipError::FileNotFound => StoreError::EntryNotFound(path.to_owned()),
        other => StoreError::Archive(other),
    }
}

impl<R: Read + Seek> Container for ZipContainer<R> {
    fn has_entry(&self, path: &str) -> bool {
        self.archive.file_names().any(|name| name == path)
    }

    fn entry_size(&mut self, path: &str) -> Result<u64, StoreError> {
        let entry = self
            .archive
            .by_name(path)
            .map_err(|e| entry_error(path, e))?;
        Ok(entry.size())
    }

    fn open_entry(&mut self, path: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        let entry = self
            .archive
            .by_name(path)
            .map_err(|e| entry_error(path, e))?;
        Ok(Box::new(entry))
    }
}

/// Upper bound on the buffer reserved up front; declared sizes are untrusted.
const INITIAL_READ_CAPACITY: u64 = 64 * 1024;

/// Read a whole entry, looping until its declared size has been consumed.
/// The buffer grows with the bytes actually read, never with the declared size.
pub fn read_entry<C: Container + ?Sized>(
    container: &mut C,
    path: &str,
) -> Result<Vec<u8>, StoreError> {
    let expected = container.entry_size(path)?;
    let stream = container.open_entry(path)?;
    let capacity = usize::try_from(expected.min(INITIAL_READ_CAPACITY)).unwrap_or_default();
    let mut buf = Vec::with_capacity(capacity);
    stream.take(expected).read_to_end(&mut buf)?;

    let actual = buf.len() as u64;
    if actual < expected {
        return Err(StoreError::ShortRead {
            entry: path.to_owned(),
            expected,
            actual,
        });
    }
    Ok(buf)
}
