//! Versioned blob storage under a single data root.
//!
//! Every blob is a directory of immutable version files plus a `current`
//! symlink naming the live version. Writes never modify a version in
//! place: each write streams into a freshly named file and then swaps the
//! `current` link, so readers observe either the old or the new live
//! version, never a torn file. An optional `lock` file (see
//! [`crate::lock`]) carries the Terraform-compatible advisory lock.
//!
//! On-disk layout under the data root:
//!
//! ```text
//! <root>/<name>/<vid_1>
//! <root>/<name>/<vid_2>
//! <root>/<name>/current   -> symlink to <vid_k>
//! <root>/<name>/lock      (present only while locked)
//! ```
//!
//! Version ids are RFC 3339 UTC timestamps with nanosecond precision,
//! fixed-width so lexical order matches creation order. A process-local
//! monotonic guard keeps rapid successive writes distinct and ordered.
//!
//! The store holds no in-process locks. Concurrency correctness rides on
//! POSIX atomicity of `symlink`, `unlink` and exclusive create, plus the
//! advisory lock protocol clients are expected to follow.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::paths::{self, CURRENT_LINK, LOCK_FILE};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// One entry of a directory walk or a version history listing.
///
/// For walk results `name` is the blob path relative to the data root
/// with a leading `/` and `locked` reports the advisory lock. For
/// history listings `name` is the version id and `locked` is overloaded
/// to mean "is the live version".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub locked: bool,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

/// Filesystem-backed versioned datastore rooted at a single directory.
///
/// The struct is cheap to share behind an `Arc`; all state lives on
/// disk except the monotonic version-id guard.
#[derive(Debug)]
pub struct Datastore {
    root: PathBuf,
    last_vid_nanos: AtomicI64,
}

impl Datastore {
    /// Create a datastore rooted at `root`. The directory itself is not
    /// created until the first write needs it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_vid_nanos: AtomicI64::new(0),
        }
    }

    /// The data root this store operates under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh version id that sorts after every id previously
    /// handed out by this process, even when the clock stands still.
    fn next_vid(&self) -> String {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .expect("system clock outside the representable range");
        let mut prev = self.last_vid_nanos.load(Ordering::Relaxed);
        let nanos = loop {
            let candidate = now.max(prev + 1);
            match self.last_vid_nanos.compare_exchange(
                prev,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(actual) => prev = actual,
            }
        };
        DateTime::from_timestamp_nanos(nanos)
            .format("%Y-%m-%dT%H:%M:%S%.9fZ")
            .to_string()
    }

    /// Retarget the `current` symlink of `name` at the sibling version
    /// `vid`. The old link is removed first; readers hitting the gap see
    /// the blob as missing, which they already must handle.
    fn set_current(&self, name: &str, vid: &str) -> StoreResult<()> {
        let link = paths::resolve(&self.root, name, Some(CURRENT_LINK))?;
        debug!(name, target = vid, "retargeting current");
        match fs::symlink_metadata(&link) {
            Ok(_) => fs::remove_file(&link)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::os::unix::fs::symlink(vid, &link)?;
        Ok(())
    }

    /// Store a new version of `name` from `input` and make it live.
    ///
    /// When `expected_md5` is given the stream is hashed while it is
    /// written; a mismatch removes the nascent version and returns
    /// [`StoreError::InvalidHash`] with `current` untouched. A non-empty
    /// `lock_id` is checked against the stored advisory lock first; an
    /// empty `lock_id` skips the check entirely.
    ///
    /// Returns the id of the newly created version.
    pub fn write(
        &self,
        name: &str,
        mut input: impl Read,
        expected_md5: Option<&[u8]>,
        lock_id: &str,
    ) -> StoreResult<String> {
        debug!(name, lock_id, "write");
        let vid = self.next_vid();
        let path = paths::resolve(&self.root, name, Some(&vid))?;
        if !lock_id.is_empty() {
            self.lock_check(name, lock_id)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&path)?;
        let mut hasher = expected_md5.map(|_| Md5::new());
        let copied: StoreResult<()> = (|| {
            let mut buf = [0u8; COPY_BUF_SIZE];
            loop {
                let n = input.read(&mut buf)?;
                if n == 0 {
                    return Ok(());
                }
                file.write_all(&buf[..n])?;
                if let Some(hasher) = hasher.as_mut() {
                    hasher.update(&buf[..n]);
                }
            }
        })();
        drop(file);
        if let Err(e) = copied {
            // Interrupted writes must not leave a partial version behind.
            if let Err(rm) = fs::remove_file(&path) {
                warn!(name, %vid, error = %rm, "cannot remove partial version");
            }
            return Err(e);
        }

        if let (Some(expected), Some(hasher)) = (expected_md5, hasher) {
            let digest = hasher.finalize();
            if digest.as_slice() != expected {
                warn!(name, %vid, "hash mismatch");
                if let Err(rm) = fs::remove_file(&path) {
                    warn!(name, %vid, error = %rm, "cannot remove rejected version");
                }
                return Err(StoreError::InvalidHash);
            }
        }

        self.set_current(name, &vid)?;
        Ok(vid)
    }

    /// Copy the live version of `name` into `out`.
    pub fn read(&self, name: &str, out: &mut impl Write) -> StoreResult<()> {
        debug!(name, "read");
        let path = paths::resolve(&self.root, name, Some(CURRENT_LINK))?;
        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                debug!(name, error = %e, "no live version");
                return Err(StoreError::NotFound);
            }
        };
        io::copy(&mut file, out)?;
        Ok(())
    }

    /// Remove the `current` pointer of `name`, making the blob
    /// unavailable. Historical versions stay on disk for a later
    /// rollback or prune.
    pub fn delete(&self, name: &str) -> StoreResult<()> {
        debug!(name, "delete");
        let path = paths::resolve(&self.root, name, Some(CURRENT_LINK))?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Depth-first walk over every blob under the data root.
    ///
    /// The visitor receives one [`FileEntry`] per directory containing a
    /// `current` symlink; `name` carries a leading `/`. Returning `false`
    /// skips the remainder of that blob's subtree. Dangling `current`
    /// links are logged and skipped.
    pub fn walk(&self, mut visit: impl FnMut(FileEntry) -> bool) -> StoreResult<()> {
        debug!(root = %self.root.display(), "walk");
        let mut iter = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = iter.next() {
            let entry = match entry {
                Ok(entry) => entry,
                // A root that does not exist yet is an empty store.
                Err(e) if e.depth() == 0 => {
                    debug!(error = %e, "walk root missing");
                    return Ok(());
                }
                Err(e) => return Err(io::Error::from(e).into()),
            };
            if !entry.file_type().is_symlink()
                || entry.file_name() != std::ffi::OsStr::new(CURRENT_LINK)
            {
                continue;
            }
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "dangling current link");
                    continue;
                }
            };
            let dir = entry.path().parent().unwrap_or(&self.root);
            let rel = dir.strip_prefix(&self.root).unwrap_or(Path::new(""));
            let item = FileEntry {
                name: format!("/{}", rel.display()),
                locked: dir.join(LOCK_FILE).exists(),
                timestamp: meta.modified()?.into(),
                size: meta.len(),
            };
            if !visit(item) {
                iter.skip_current_dir();
            }
        }
        Ok(())
    }

    /// List every stored version of `name`, newest first.
    ///
    /// `locked` marks the live version; with no `current` link (for
    /// example after a delete) the versions are still listed and none is
    /// marked live. A missing directory yields an empty list, not an
    /// error.
    pub fn history(&self, name: &str) -> Vec<FileEntry> {
        debug!(name, "history");
        let mut entries = Vec::new();
        let Ok(link) = paths::resolve(&self.root, name, Some(CURRENT_LINK)) else {
            return entries;
        };
        let live = match fs::read_link(&link) {
            Ok(target) => Some(target.to_string_lossy().into_owned()),
            Err(e) => {
                debug!(name, error = %e, "no current link");
                None
            }
        };
        let Ok(dir) = paths::resolve(&self.root, name, None) else {
            return entries;
        };
        let reader = match fs::read_dir(&dir) {
            Ok(reader) => reader,
            Err(e) => {
                debug!(name, error = %e, "cannot list blob directory");
                return entries;
            }
        };
        for dirent in reader.flatten() {
            let vid = dirent.file_name().to_string_lossy().into_owned();
            if vid == LOCK_FILE || vid == CURRENT_LINK {
                continue;
            }
            let is_file = dirent.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let Ok(meta) = dirent.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            entries.push(FileEntry {
                locked: live.as_deref() == Some(vid.as_str()),
                name: vid,
                timestamp: modified.into(),
                size: meta.len(),
            });
        }
        // Newest first; ids tie-break equal timestamps since they are
        // themselves ordered by creation.
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.name.cmp(&a.name))
        });
        entries
    }

    /// Open a specific stored version of `name` for reading.
    pub fn read_history(&self, name: &str, vid: &str) -> StoreResult<fs::File> {
        debug!(name, vid, "read history");
        paths::validate_vid(vid)?;
        let path = paths::resolve(&self.root, name, Some(vid))?;
        match fs::File::open(&path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Point `current` back at the existing version `vid`. The version
    /// file is reused as-is, not copied.
    pub fn rollback(&self, name: &str, vid: &str) -> StoreResult<()> {
        debug!(name, vid, "rollback");
        paths::validate_vid(vid)?;
        let path = paths::resolve(&self.root, name, Some(vid))?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            _ => {
                warn!(name, vid, "rollback target not found");
                return Err(StoreError::NotFound);
            }
        }
        self.set_current(name, vid)
    }

    /// Remove old versions of `name`, keeping the `keep` newest entries.
    /// The live version is never removed, even with `keep = 0`. With
    /// `dry_run` the removals are logged but not performed.
    pub fn prune(&self, name: &str, keep: usize, dry_run: bool) -> StoreResult<()> {
        let entries = self.history(name);
        debug!(name, entries = entries.len(), keep, "prune");
        if entries.len() <= keep {
            return Ok(());
        }
        for entry in &entries[keep..] {
            if entry.locked {
                debug!(name, vid = %entry.name, "skip live version");
                continue;
            }
            let path = paths::resolve(&self.root, name, Some(&entry.name))?;
            info!(name, vid = %entry.name, dry_run, "removing version");
            if !dry_run {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Walk the whole tree and prune every discovered blob. Per-blob
    /// failures are logged and do not abort the sweep.
    pub fn prune_all(&self, keep: usize, dry_run: bool) -> StoreResult<()> {
        let mut names = Vec::new();
        self.walk(|entry| {
            names.push(entry.name);
            true
        })?;
        for name in names {
            if let Err(e) = self.prune(&name, keep, dry_run) {
                warn!(%name, error = %e, "prune failed");
            }
        }
        Ok(())
    }
}
