//! Terraform-compatible advisory locking.
//!
//! A blob is locked exactly while a `lock` file exists in its directory.
//! The file holds the client's lock JSON byte-for-byte; only the string
//! `ID` field participates in policy, the rest (Operation, Who, Version,
//! Created, Path, Info) is preserved verbatim for display. Acquisition
//! is race-free through exclusive create.

use std::fs;
use std::io::{self, Write};

use tracing::{debug, warn};

use crate::datastore::Datastore;
use crate::error::{StoreError, StoreResult};
use crate::paths::{self, LOCK_FILE};

/// Extract the string `ID` field from a lock payload, if the payload
/// parses as a JSON object carrying one.
pub fn lock_payload_id(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("ID")?.as_str().map(str::to_owned)
}

impl Datastore {
    /// Acquire the advisory lock on `name`, storing `payload` verbatim.
    /// Fails with [`StoreError::Locked`] if a lock is already held.
    pub fn lock(&self, name: &str, payload: &[u8]) -> StoreResult<()> {
        debug!(name, "lock");
        let path = paths::resolve(self.root(), name, Some(LOCK_FILE))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(name, "lock already held");
                return Err(StoreError::Locked);
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(payload)?;
        Ok(())
    }

    /// Return the stored lock payload, or [`StoreError::Unlocked`] when
    /// no lock is held.
    pub fn lock_read(&self, name: &str) -> StoreResult<Vec<u8>> {
        debug!(name, "lock read");
        let path = paths::resolve(self.root(), name, Some(LOCK_FILE))?;
        fs::read(&path).map_err(|_| StoreError::Unlocked)
    }

    /// Check whether a writer presenting `lock_id` may proceed.
    ///
    /// An unlocked blob accepts any writer. A held lock demands an exact
    /// byte-for-byte `ID` match; a stored payload whose `ID` cannot be
    /// read can never match.
    pub fn lock_check(&self, name: &str, lock_id: &str) -> StoreResult<()> {
        let stored = match self.lock_read(name) {
            Ok(stored) => stored,
            Err(_) => return Ok(()),
        };
        match lock_payload_id(&stored) {
            Some(id) if id == lock_id => Ok(()),
            other => {
                debug!(name, lock_id, stored_id = ?other, "lock id mismatch");
                Err(StoreError::Locked)
            }
        }
    }

    /// Release the advisory lock on `name`.
    ///
    /// When `payload` carries a readable `ID` it must match the stored
    /// lock's `ID`; a mismatch (or a stored lock without a readable
    /// `ID`) fails with [`StoreError::Locked`]. An empty or unparseable
    /// payload releases unconditionally. Unlocking an unlocked blob
    /// fails with [`StoreError::Unlocked`].
    pub fn unlock(&self, name: &str, payload: &[u8]) -> StoreResult<()> {
        debug!(name, "unlock");
        let path = paths::resolve(self.root(), name, Some(LOCK_FILE))?;
        if let Some(incoming) = lock_payload_id(payload) {
            let stored = match fs::read(&path) {
                Ok(stored) => stored,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(StoreError::Unlocked)
                }
                Err(e) => return Err(e.into()),
            };
            match lock_payload_id(&stored) {
                Some(stored_id) if stored_id == incoming => {}
                _ => {
                    warn!(name, "unlock id mismatch");
                    return Err(StoreError::Locked);
                }
            }
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::Unlocked),
            Err(e) => Err(e.into()),
        }
    }
}
