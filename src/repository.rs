//! Durable mapping from secret name to encrypted blob
//!
//! The whole record set lives in memory and is mirrored to a single JSON
//! file. Every mutation rewrites the entire file through a temporary file
//! that is fsynced and atomically renamed over the target, so a reader never
//! observes a half-written file.
//!
//! Access from threads of one process is serialized by a mutex held across
//! the in-memory update and the disk write. There is no cross-process
//! locking: two processes mutating the same file race and the last writer
//! wins.

use crate::blob::EncryptedBlob;
use crate::error::{ErrorCategory, ErrorKind, KisError, Result};
use crate::secure_fs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// One stored secret. Only the encrypted form of the payload is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub name: String,
    pub encrypted: EncryptedBlob,
}

type Records = BTreeMap<String, SecretRecord>;

#[derive(Debug)]
pub struct SecretRepository {
    path: PathBuf,
    records: Mutex<Records>,
}

impl SecretRepository {
    /// Load the repository stored at `path`.
    ///
    /// A missing or 0-byte file is an empty repository. A file that exists
    /// but does not parse is reported as `CorruptRepository`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path)?;
        debug!(path = %path.display(), count = records.len(), "opened secret repository");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the record for `name` and persist.
    pub fn save(&self, name: &str, blob: EncryptedBlob) -> Result<()> {
        let mut records = self.lock()?;
        let mut updated = records.clone();
        updated.insert(
            name.to_owned(),
            SecretRecord {
                name: name.to_owned(),
                encrypted: blob,
            },
        );
        self.commit(&mut records, updated)
    }

    pub fn get(&self, name: &str) -> Result<EncryptedBlob> {
        let records = self.lock()?;
        records
            .get(name)
            .map(|record| record.encrypted.clone())
            .ok_or_else(|| not_found(name))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(name))
    }

    /// Names of all stored secrets.
    pub fn list(&self) -> Result<BTreeSet<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Remove the record for `name` and persist.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut records = self.lock()?;
        if !records.contains_key(name) {
            return Err(not_found(name));
        }
        let mut updated = records.clone();
        updated.remove(name);
        self.commit(&mut records, updated)
    }

    /// Forget every record and remove the durable file.
    pub fn clear_all(&self) -> Result<()> {
        let mut records = self.lock()?;
        secure_fs::remove_file_if_exists(&self.path)?;
        records.clear();
        debug!(path = %self.path.display(), "cleared secret repository");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>> {
        self.records.lock().map_err(|_| {
            KisError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "secret repository lock poisoned",
            )
        })
    }

    /// Persist `updated` and, only once it is on disk, install it in memory.
    fn commit(&self, current: &mut MutexGuard<'_, Records>, updated: Records) -> Result<()> {
        persist_records(&self.path, &updated)?;
        **current = updated;
        Ok(())
    }
}

fn not_found(name: &str) -> KisError {
    KisError::with_kind(
        ErrorCategory::User,
        ErrorKind::NotFound,
        format!("secret not found: {}", name),
    )
}

fn load_records(path: &Path) -> Result<Records> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Records::new()),
        Err(e) => {
            return Err(KisError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PersistenceFailed,
                format!("failed to read from {}", path.display()),
                e,
            ));
        }
    };

    if data.is_empty() {
        return Ok(Records::new());
    }

    serde_json::from_slice(&data).map_err(|e| {
        KisError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::CorruptRepository,
            format!("secrets file {} is corrupt", path.display()),
            e,
        )
    })
}

/// Atomically replace the file at `path` with the serialized records
/// (tempfile + fsync + rename), readable by the owner only.
fn persist_records(path: &Path, records: &Records) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(records).map_err(|e| {
        KisError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to serialize secrets",
            e,
        )
    })?;

    secure_fs::write_file_atomic(path, &encoded)?;
    debug!(path = %path.display(), count = records.len(), "persisted secret repository");
    Ok(())
}
