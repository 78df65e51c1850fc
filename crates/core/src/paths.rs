//! Logical name to on-disk path mapping.
//!
//! Blob names are client-supplied, slash-separated keys. This module is
//! the only place that turns them into filesystem paths, and it confines
//! every resolved path to the data root: absolute fragments are treated
//! as root-relative, `..` is rejected outright, and the reserved entry
//! names `current` and `lock` can never be addressed as version ids.

use std::path::{Component, Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Name of the symlink designating the live version of a blob.
pub const CURRENT_LINK: &str = "current";

/// Name of the advisory lock file inside a blob directory.
pub const LOCK_FILE: &str = "lock";

/// Resolve a logical blob name (plus an optional leaf such as a version
/// id, [`CURRENT_LINK`] or [`LOCK_FILE`]) to a path under `root`.
///
/// A leading `/` on the name is tolerated and interpreted relative to the
/// root, matching the names emitted by the tree walk. An empty name is
/// rejected: the root itself is not a blob.
pub fn resolve(root: &Path, name: &str, leaf: Option<&str>) -> StoreResult<PathBuf> {
    let mut rel = PathBuf::new();
    push_fragment(&mut rel, name)?;
    if rel.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath);
    }
    if let Some(leaf) = leaf {
        push_fragment(&mut rel, leaf)?;
    }
    Ok(root.join(rel))
}

/// Check that a client-supplied version id is a plain file name and not
/// one of the reserved entries.
pub fn validate_vid(vid: &str) -> StoreResult<()> {
    if vid.is_empty() || vid == CURRENT_LINK || vid == LOCK_FILE {
        return Err(StoreError::InvalidPath);
    }
    let mut components = Path::new(vid).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::InvalidPath),
    }
}

fn push_fragment(out: &mut PathBuf, fragment: &str) -> StoreResult<()> {
    for component in Path::new(fragment).components() {
        match component {
            Component::Normal(part) => out.push(part),
            // "." adds nothing; a leading "/" anchors at the data root.
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(StoreError::InvalidPath);
            }
        }
    }
    Ok(())
}
