//! Host-facing execution layer for Parcel.
//!
//! This crate implements everything that talks to the host system: mapping the
//! machine architecture onto manifest tags, applying permission modes through the
//! host's `chmod`, the pluggable `CompanionService` trait (Android `pm`/`am`,
//! no-op and mock implementations), and spawning the package command as a child
//! process that can be cancelled or timed out.

pub mod arch;
pub mod companion;
pub mod mock;
pub mod modes;
pub mod prereq;
pub mod process;

pub use arch::{classify_arch, host_architecture, supported_arch, SUPPORTED_ARCHITECTURES};
pub use companion::{select_companion, AndroidCompanion, CompanionService, NoopCompanion};
pub use mock::MockCompanion;
pub use modes::ChmodTool;
pub use prereq::{find_command, find_in_dirs, find_in_search_path};
pub use process::{
    resolve_program, run_to_completion, split_command, CancelToken, ExitOutcome, LaunchSpec,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("invalid command line: {0}")]
    InvalidCommand(String),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("interrupted while waiting for child process: {0}")]
    Interrupted(String),
    #[error("companion service unavailable: {0}")]
    CompanionUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_display() {
        let e = RuntimeError::CommandNotFound("chmod".to_owned());
        assert_eq!(e.to_string(), "command not found: chmod");

        let e = RuntimeError::InvalidCommand("unterminated quote".to_owned());
        assert!(e.to_string().contains("unterminated quote"));
    }
}
