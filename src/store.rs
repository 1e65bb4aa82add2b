//! One JSON record file per resource ID, plus the lock file guarding it.

use crate::error::{IpamError, Result};
use crate::lock::{FileLock, LockMode};
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const RECORD_MODE: u32 = 0o644;

/// Durable mapping from resource ID to a record of type `R`.
///
/// The store keeps no state beyond the filesystem. It does not lock on its own: callers
/// hold the guard from [`RecordStore::lock`] around every load/save sequence.
#[derive(Debug)]
pub struct RecordStore<R> {
    root: PathBuf,
    namespace: &'static str,
    _record: PhantomData<fn() -> R>,
}

impl<R> RecordStore<R>
where
    R: Serialize + DeserializeOwned,
{
    /// `namespace` prefixes every file name so that stores sharing a root never collide.
    pub fn new(root: impl Into<PathBuf>, namespace: &'static str) -> Self {
        Self {
            root: root.into(),
            namespace,
            _record: PhantomData,
        }
    }

    /// Takes the lock for `id`, creating the data directory and the lock file as needed.
    /// This happens even when no record exists for `id`, so a read of an unknown ID leaves a
    /// lock file behind; lock files are never removed.
    pub fn lock(&self, id: &str, mode: LockMode) -> Result<FileLock> {
        let path = self.lock_path(id)?;
        fs::create_dir_all(&self.root).map_err(|e| IpamError::io(&self.root, e))?;
        FileLock::acquire(&path, mode)
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        let path = self.record_path(id)?;
        path.try_exists().map_err(|e| IpamError::io(path, e))
    }

    pub fn load(&self, id: &str) -> Result<R> {
        let path = self.record_path(id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IpamError::not_found(self.namespace, id));
            }
            Err(e) => return Err(IpamError::io(path, e)),
        };

        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        serde_json::from_slice(&bytes).map_err(|e| IpamError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Replaces the record for `id`. The new contents are written to a temporary file in the
    /// same directory and renamed into place, so a crash leaves either the old or the new
    /// record.
    pub fn save(&self, id: &str, record: &R) -> Result<()> {
        let path = self.record_path(id)?;
        let mut bytes = serde_json::to_vec_pretty(record).map_err(|e| IpamError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        bytes.push(b'\n');

        fs::create_dir_all(&self.root).map_err(|e| IpamError::io(&self.root, e))?;
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| IpamError::io(&self.root, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .and_then(|()| {
                tmp.as_file()
                    .set_permissions(fs::Permissions::from_mode(RECORD_MODE))
            })
            .map_err(|e| IpamError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| IpamError::io(&path, e.error))?;

        debug!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(IpamError::not_found(self.namespace, id))
            }
            Err(e) => Err(IpamError::io(path, e)),
        }
    }

    pub fn record_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("{}-{}.json", self.namespace, id)))
    }

    fn lock_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(format!("{}-{}.lock", self.namespace, id)))
    }
}

/// IDs become part of a file name and must not be able to leave the data directory.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(IpamError::InvalidArgument("ID must not be empty".to_string()));
    }
    if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(IpamError::InvalidArgument(format!(
            "ID '{}' must not contain path separators",
            id.escape_default()
        )));
    }
    Ok(())
}
