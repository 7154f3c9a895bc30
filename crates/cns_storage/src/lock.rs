use cns_core::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const LOCK_FILE: &str = ".cns.lock";
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Exclusive claim on a data directory for the length of one run.
/// The lock file is removed when the guard drops.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

#[derive(Debug)]
enum Holder {
    Process(u32),
    Dead(u32),
    Unreadable,
}

impl RunLock {
    /// Waits up to `timeout` for the lock. A lock left behind by a process
    /// that is no longer alive is reclaimed.
    pub async fn acquire(data_dir: &Path, timeout: Duration) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|e| Error::storage(data_dir, e))?;
        let path = data_dir.join(LOCK_FILE);
        let started = Instant::now();

        loop {
            let holder = match Self::try_acquire(&path)? {
                Ok(lock) => return Ok(lock),
                Err(holder) => holder,
            };

            match holder {
                Holder::Dead(pid) => {
                    warn!("🧹 Removing stale run lock left by pid {}", pid);
                    if let Err(e) = fs::remove_file(&path) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            return Err(Error::storage(&path, e));
                        }
                    }
                    continue;
                }
                Holder::Process(pid) if started.elapsed() >= timeout => {
                    return Err(Error::storage(
                        &path,
                        format!("another run is in progress (pid {}); gave up after {:?}", pid, timeout),
                    ));
                }
                Holder::Unreadable if started.elapsed() >= timeout => {
                    return Err(Error::storage(
                        &path,
                        "could not acquire run lock; remove the lock file if no run is active",
                    ));
                }
                other => debug!("Run lock busy ({:?}), waiting", other),
            }
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    fn try_acquire(path: &Path) -> Result<std::result::Result<Self, Holder>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id()).map_err(|e| Error::storage(path, e))?;
                Ok(Ok(Self { path: path.to_path_buf() }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = match fs::read_to_string(path) {
                    Ok(content) => match content.trim().parse::<u32>() {
                        Ok(pid) if is_process_running(pid) => Holder::Process(pid),
                        Ok(pid) => Holder::Dead(pid),
                        Err(_) => Holder::Unreadable,
                    },
                    Err(_) => Holder::Unreadable,
                };
                Ok(Err(holder))
            }
            Err(e) => Err(Error::storage(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
