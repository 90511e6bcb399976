//! Advisory lock keeping one driver per working directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::error::PipelineError;

/// Held for the duration of a run; the lock file is removed on drop
#[derive(Debug)]
pub struct WorkdirLock {
    path: PathBuf,
}

impl WorkdirLock {
    /// Create the lock file exclusively. A lock left behind by a process that
    /// no longer exists is reclaimed; otherwise fails with
    /// [`PipelineError::WorkdirBusy`].
    pub fn acquire(path: &Path) -> Result<Self, PipelineError> {
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = match create_exclusive(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => match stale_owner(path) {
                Some(pid) => {
                    warn!("Reclaiming lock {path:?} left by exited process {pid}");
                    fs::remove_file(path).map_err(io_err)?;
                    create_exclusive(path).map_err(|e| match e.kind() {
                        ErrorKind::AlreadyExists => PipelineError::WorkdirBusy(path.to_path_buf()),
                        _ => io_err(e),
                    })?
                }
                None => return Err(PipelineError::WorkdirBusy(path.to_path_buf())),
            },
            Err(e) => return Err(io_err(e)),
        };
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;

        Ok(WorkdirLock {
            path: path.to_path_buf(),
        })
    }
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// PID recorded in an existing lock file, if that process is gone
fn stale_owner(path: &Path) -> Option<u32> {
    let pid = fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()?;
    (!process_alive(pid)).then_some(pid)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// No cheap liveness check elsewhere; never reclaim.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {:?}: {e}", self.path);
        }
    }
}
