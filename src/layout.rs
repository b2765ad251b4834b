//! On-disk layout of cloned repositories and downloaded release assets

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Validate a remote-supplied name for use as exactly one path component
pub fn safe_component(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." {
        bail!("Refusing to use {:?} as a path component", name);
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        bail!("Refusing path component with a separator: {:?}", name);
    }
    Ok(name)
}

/// `<base>/<name>`, the working copy of a repository
pub fn repo_directory(base: &Path, name: &str) -> Result<PathBuf> {
    Ok(base.join(safe_component(name)?))
}

/// A working copy counts as cloned once its `.git` metadata exists
pub fn is_already_cloned(path: &Path) -> bool {
    path.is_dir() && path.join(".git").exists()
}

/// `<base>/<repo>/<tag>/<asset>`
pub fn asset_path(base: &Path, repo: &str, tag: &str, asset: &str) -> Result<PathBuf> {
    Ok(base
        .join(safe_component(repo)?)
        .join(safe_component(tag)?)
        .join(safe_component(asset)?))
}
