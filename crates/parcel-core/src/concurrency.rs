use crate::CoreError;
use fs2::FileExt;
use parcel_runtime::CancelToken;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive advisory lock guarding one package's extraction root.
///
/// Held across the validity check and any re-extraction so that two launches
/// of the same package cannot interleave delete/recreate sequences.
pub struct ExtractionLock {
    lock_file: File,
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl ExtractionLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Lock(format!("{}: {e}", lock_path.display())))?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for ExtractionLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Route Ctrl-C to `token`. A second Ctrl-C exits immediately.
pub fn install_signal_handler(token: CancelToken) {
    let _ = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(1);
        }
        token.cancel();
        eprintln!("\ninterrupt received, stopping application...");
    });
}
