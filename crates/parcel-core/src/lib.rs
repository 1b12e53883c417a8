//! Launch orchestration for Parcel bundles.
//!
//! This crate ties manifest parsing, extraction, and the runtime layer together
//! into the `Launcher`: resolving the requested (or default) package, detecting
//! the host architecture, extracting the payload under a per-package file lock,
//! and running the package command with the companion service around it. It
//! also owns `LaunchConfig` and the Ctrl-C handling that cancels a running child.

pub mod concurrency;
pub mod config;
pub mod launcher;

pub use concurrency::{install_signal_handler, ExtractionLock};
pub use config::{CompanionConfig, ConfigOverrides, LaunchConfig};
pub use launcher::{Launcher, PackageSummary, PreparedPackage, VerifyReport};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] parcel_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] parcel_runtime::RuntimeError),
    #[error("no default application to run")]
    NoDefaultPackage,
    #[error("application {0} not found")]
    PackageNotFound(String),
    #[error("unsupported host architecture: {0}")]
    UnsupportedArchitecture(String),
    #[error("interrupted while waiting for the application: {0}")]
    ChildProcessInterrupted(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("lock error: {0}")]
    Lock(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_messages() {
        assert_eq!(
            CoreError::NoDefaultPackage.to_string(),
            "no default application to run"
        );
        assert_eq!(
            CoreError::PackageNotFound("x".to_owned()).to_string(),
            "application x not found"
        );
    }

    #[test]
    fn store_errors_convert() {
        let e: CoreError = parcel_store::StoreError::Closed.into();
        assert!(matches!(e, CoreError::Store(_)));
    }
}
