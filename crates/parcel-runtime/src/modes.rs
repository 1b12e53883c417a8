use crate::prereq::{find_command, find_in_search_path};
use parcel_store::ModeApplier;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Applies modes by running the host's `chmod`, located on the search path at
/// every call. Any mode syntax the host `chmod` accepts is valid.
#[derive(Debug, Clone, Default)]
pub struct ChmodTool {
    search_path: Option<OsString>,
}

impl ChmodTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search `path` instead of the process `PATH`.
    pub fn with_search_path(path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(path.into()),
        }
    }

    fn locate(&self) -> io::Result<std::path::PathBuf> {
        let found = match &self.search_path {
            Some(path) => find_in_search_path("chmod", path),
            None => find_command("chmod"),
        };
        found.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "could not find an executable 'chmod' on the search path",
            )
        })
    }
}

impl ModeApplier for ChmodTool {
    fn name(&self) -> &'static str {
        "chmod"
    }

    fn apply_mode(&self, path: &Path, mode: &str) -> io::Result<()> {
        let chmod = self.locate()?;
        debug!("{} {mode} {}", chmod.display(), path.display());
        let output = Command::new(&chmod).arg(mode).arg(path).output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::other(format!(
            "{} exited with {}: {}",
            chmod.display(),
            output.status,
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn applies_octal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("node");
        fs::write(&file, "bin").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

        ChmodTool::new().apply_mode(&file, "0755").unwrap();
        assert_eq!(mode_of(&file), 0o755);
    }

    #[test]
    fn applies_symbolic_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script");
        fs::write(&file, "").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

        ChmodTool::new().apply_mode(&file, "u+x").unwrap();
        assert_eq!(mode_of(&file), 0o700);
    }

    #[test]
    fn rejected_mode_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("node");
        fs::write(&file, "").unwrap();
        assert!(ChmodTool::new().apply_mode(&file, "not-a-mode").is_err());
    }

    #[test]
    fn missing_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ChmodTool::new()
            .apply_mode(&dir.path().join("absent"), "0755")
            .is_err());
    }

    #[test]
    fn missing_chmod_is_not_found() {
        let empty = tempfile::tempdir().unwrap();
        let tool = ChmodTool::with_search_path(empty.path());
        let file = empty.path().join("f");
        fs::write(&file, "").unwrap();
        let err = tool.apply_mode(&file, "0755").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
