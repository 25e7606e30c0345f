//! Lock file management with advisory locking.
//!
//! On Unix the lock is an `flock` held on a per-repository file for the life
//! of the [`LockHandle`]; the JSON record inside only names the holder. A
//! record found when the `flock` is free was left by a run that no longer
//! holds it and is reclaimed. Other platforms fall back to exclusive creation
//! with age-based staleness.

use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

/// Contents of a lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Process holding the lock
    pub pid: u32,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
    /// Repository identity the lock guards
    pub repo_id: String,
}

impl LockRecord {
    fn current(repo_id: &str) -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            repo_id: repo_id.to_string(),
        }
    }
}

/// File name of the lock for a repository identity
pub fn lock_file_name(repo_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(repo_id.as_bytes()));
    format!("release-sync-{}.lock", &digest[..16])
}

/// Hands out per-repository locks from a lock directory
#[derive(Debug, Clone)]
pub struct LockManager {
    lock_dir: PathBuf,
}

impl LockManager {
    /// Manager storing lock files in `lock_dir`
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    /// Lock file path for a repository identity
    pub fn lock_path(&self, repo_id: &str) -> PathBuf {
        self.lock_dir.join(lock_file_name(repo_id))
    }

    /// Take the lock for `repo_id`, failing fast when a live run holds it
    #[cfg(unix)]
    pub fn acquire(&self, repo_id: &str) -> Result<LockHandle> {
        let path = self.lock_path(repo_id);
        fs::create_dir_all(&self.lock_dir).map_err(|e| acquire_failed(&path, e))?;

        // The holder unlinks the file on release; if that happened between our
        // open and our flock, the inode we locked is orphaned and we go again.
        for _ in 0..3 {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| acquire_failed(&path, e))?;

            let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(locked) => locked,
                Err((_, nix::errno::Errno::EWOULDBLOCK)) => {
                    let holder_pid = read_record(&path).map(|record| record.pid);
                    log::debug!("Lock {} is held by {:?}", path.display(), holder_pid);
                    return Err(LockError::AlreadyRunning {
                        repo_id: repo_id.to_string(),
                        holder_pid,
                    }
                    .into());
                }
                Err((_, errno)) => {
                    return Err(LockError::AcquireFailed {
                        path,
                        reason: format!("flock error: {}", errno),
                    }
                    .into());
                }
            };

            if !still_linked(&locked, &path) {
                log::debug!("Lock file {} was replaced while locking, retrying", path.display());
                continue;
            }

            if let Some(previous) = parse_record(&mut locked) {
                if process_alive(previous.pid) && previous.pid != std::process::id() {
                    log::warn!(
                        "Reclaiming lock record from PID {} (alive but not holding the lock)",
                        previous.pid
                    );
                } else {
                    log::warn!(
                        "Reclaiming stale lock left by PID {} at {}",
                        previous.pid,
                        previous.acquired_at
                    );
                }
            }

            write_record(&mut locked, &LockRecord::current(repo_id))
                .map_err(|e| acquire_failed(&path, e))?;
            log::info!("Acquired release lock {}", path.display());

            return Ok(LockHandle {
                path,
                file: Some(locked),
            });
        }

        Err(LockError::AcquireFailed {
            path,
            reason: "lock file kept changing underneath us".to_string(),
        }
        .into())
    }

    /// Take the lock for `repo_id`, failing fast when a live run holds it
    #[cfg(not(unix))]
    pub fn acquire(&self, repo_id: &str) -> Result<LockHandle> {
        let path = self.lock_path(repo_id);
        fs::create_dir_all(&self.lock_dir).map_err(|e| acquire_failed(&path, e))?;

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write_record(&mut file, &LockRecord::current(repo_id))
                        .map_err(|e| acquire_failed(&path, e))?;
                    log::info!("Acquired release lock {}", path.display());
                    return Ok(LockHandle { path, held: true });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let record = read_record(&path);
                    let stale = match &record {
                        Some(record) => Utc::now() - record.acquired_at > STALE_AFTER,
                        None => true,
                    };
                    if !stale {
                        return Err(LockError::AlreadyRunning {
                            repo_id: repo_id.to_string(),
                            holder_pid: record.map(|r| r.pid),
                        }
                        .into());
                    }
                    log::warn!("Reclaiming stale lock {}", path.display());
                    fs::remove_file(&path).map_err(|e| acquire_failed(&path, e))?;
                }
                Err(e) => return Err(acquire_failed(&path, e)),
            }
        }

        Err(LockError::AcquireFailed {
            path,
            reason: "stale lock could not be reclaimed".to_string(),
        }
        .into())
    }
}

#[cfg(not(unix))]
const STALE_AFTER: chrono::TimeDelta = chrono::TimeDelta::hours(1);

/// A held lock; released on drop
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    #[cfg(unix)]
    file: Option<Flock<File>>,
    #[cfg(not(unix))]
    held: bool,
}

impl LockHandle {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle still holds the lock
    pub fn is_held(&self) -> bool {
        #[cfg(unix)]
        {
            self.file.is_some()
        }
        #[cfg(not(unix))]
        {
            self.held
        }
    }

    /// Release the lock. Calling this more than once is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if !self.is_held() {
            return Ok(());
        }

        // Unlink while still holding the lock so nobody can lock the old inode
        // and believe they own the repository.
        let removed = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };

        #[cfg(unix)]
        {
            self.file = None;
        }
        #[cfg(not(unix))]
        {
            self.held = false;
        }

        log::debug!("Released release lock {}", self.path.display());
        removed.map_err(Into::into)
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

fn acquire_failed(path: &Path, error: std::io::Error) -> crate::error::ReleaseError {
    LockError::AcquireFailed {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
    .into()
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn parse_record(file: &mut File) -> Option<LockRecord> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}

fn write_record(file: &mut File, record: &LockRecord) -> std::io::Result<()> {
    let json = serde_json::to_string(record)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.sync_all()
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

/// Signal-0 probe: the process exists (even if owned by another user)
#[cfg(unix)]
pub(crate) fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
