use std::path::{Component, Path, PathBuf};

/// Applies a permission-mode string to a path using the host's native mechanism.
pub trait ModeApplier {
    fn name(&self) -> &str;

    fn apply_mode(&self, path: &Path, mode: &str) -> std::io::Result<()>;
}

/// Join a manifest-relative path onto `root`, refusing anything that would
/// resolve outside of it (absolute paths, `..`, drive prefixes, empty paths).
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(joined)
}
