use std::env;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Locate an executable `name` in the directories of the current `PATH`.
pub fn find_command(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    find_in_search_path(name, &path)
}

/// Locate an executable `name` in a `PATH`-style list of directories.
pub fn find_in_search_path(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    find_in_dirs(name, env::split_paths(search_path))
}

/// First `dir/name` that is a regular file with an execute bit set.
pub fn find_in_dirs<I>(name: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    dirs.into_iter()
        .map(|dir| dir.as_ref().join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
