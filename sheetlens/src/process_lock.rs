//! Process-level lock serializing sheetlens-sync runs.
//!
//! Two syncs against the same database would race on the report collection,
//! so `sheetlens-sync` holds an advisory OS file lock (flock) for its whole
//! lifetime. The lock file is scoped to the database path.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const SYNC_LOCK_FILE: &str = "sheetlens-sync.lock";

/// Guard held by sheetlens-sync; released on drop.
pub struct SyncProcessGuard {
    _sync_lock: ProcessLock,
}

/// Acquire the sync lock for `db_path`, failing if another sync holds it.
pub fn acquire_sync_guard(db_path: &Path) -> Result<SyncProcessGuard> {
    match try_acquire_lock(SYNC_LOCK_FILE, db_path)? {
        Some(lock) => Ok(SyncProcessGuard { _sync_lock: lock }),
        None => anyhow::bail!(
            "another sheetlens-sync is already running against {}",
            db_path.display()
        ),
    }
}

struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

fn try_acquire_lock(filename: &str, db_path: &Path) -> Result<Option<ProcessLock>> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create runtime lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(filename, db_path));
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            // Owner info for debugging
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();

            Ok(Some(ProcessLock { file, path }))
        }
        Err(e) if is_lock_busy(&e) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("sheetlens");
    dir
}

fn scoped_lock_filename(base_filename: &str, db_path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    db_path.to_string_lossy().hash(&mut hasher);
    format!("{base_filename}.{:016x}", hasher.finish())
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("sheetlens process locks currently require Unix (macOS/Linux)");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_guard_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data.db");

        let guard = acquire_sync_guard(&db_path).unwrap();
        assert!(acquire_sync_guard(&db_path).is_err());

        drop(guard);
        assert!(acquire_sync_guard(&db_path).is_ok());
    }

    #[test]
    fn test_lock_scoped_per_database() {
        let a = scoped_lock_filename(SYNC_LOCK_FILE, Path::new("/tmp/a.db"));
        let b = scoped_lock_filename(SYNC_LOCK_FILE, Path::new("/tmp/b.db"));
        assert_ne!(a, b);
        assert!(a.starts_with("sheetlens-sync.lock."));
    }
}
