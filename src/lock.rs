//! Advisory cross-process locks built on `flock(2)`.
//!
//! A lock is held for as long as its [`FileLock`] guard lives. Locks taken through
//! separately opened files conflict with each other even inside one process, so threads
//! and processes are serialized the same way.

use crate::error::{IpamError, Result};
use log::debug;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of shared holders, no exclusive holder.
    Shared,
    /// A single holder.
    Exclusive,
}

impl LockMode {
    fn blocking(self) -> FlockArg {
        match self {
            LockMode::Shared => FlockArg::LockShared,
            LockMode::Exclusive => FlockArg::LockExclusive,
        }
    }

    fn nonblocking(self) -> FlockArg {
        match self {
            LockMode::Shared => FlockArg::LockSharedNonblock,
            LockMode::Exclusive => FlockArg::LockExclusiveNonblock,
        }
    }
}

/// Dropping the guard unlocks; [`FileLock::release`] does the same but reports failure.
pub struct FileLock {
    lock: Flock<File>,
    path: PathBuf,
    mode: LockMode,
}

impl FileLock {
    /// Blocks until the lock at `path` is granted in `mode`. The lock file is created if
    /// missing; its contents are never read.
    pub fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        let mut file = open_lock_file(path)?;
        debug!("Acquiring {:?} lock on {}", mode, path.display());

        let lock = loop {
            match Flock::lock(file, mode.blocking()) {
                Ok(lock) => break lock,
                Err((returned, Errno::EINTR)) => file = returned,
                Err((_, errno)) => return Err(lock_failure(path, errno)),
            }
        };

        debug!("Acquired {:?} lock on {}", mode, path.display());
        Ok(Self {
            lock,
            path: path.to_path_buf(),
            mode,
        })
    }

    /// Like [`FileLock::acquire`] but returns `None` instead of waiting when the lock is held
    /// in a conflicting mode.
    pub fn try_acquire(path: &Path, mode: LockMode) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;

        match Flock::lock(file, mode.nonblocking()) {
            Ok(lock) => Ok(Some(Self {
                lock,
                path: path.to_path_buf(),
                mode,
            })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(lock_failure(path, errno)),
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Releases the lock, reporting a failure to unlock.
    pub fn release(self) -> Result<()> {
        let FileLock { lock, path, mode } = self;
        debug!("Releasing {:?} lock on {}", mode, path.display());
        lock.unlock()
            .map(drop)
            .map_err(|(_, errno)| lock_failure(&path, errno))
    }
}

impl fmt::Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| IpamError::LockFailure {
            path: path.to_path_buf(),
            source,
        })
}

fn lock_failure(path: &Path, errno: Errno) -> IpamError {
    IpamError::LockFailure {
        path: path.to_path_buf(),
        source: errno.into(),
    }
}
