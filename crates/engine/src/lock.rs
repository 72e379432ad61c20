use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use common::{Config, Error, Result};

/// Cross-process mutual exclusion for order execution, one lock file per
/// (exchange, symbol) in a shared directory.
///
/// Exclusion comes from an OS advisory lock on the open file, so a holder
/// keeps it for as long as it lives and a crashed holder releases it with
/// its file handle. The file itself is never removed.
#[derive(Debug, Clone)]
pub struct ExecutionLock {
    dir: PathBuf,
}

/// Held lock. Released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            debug!(path = %self.path.display(), error = %e, "Failed to clear execution lock file");
        }
        match self.file.unlock() {
            Ok(()) => debug!(path = %self.path.display(), "Execution lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to release execution lock"),
        }
    }
}

impl ExecutionLock {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.lock_dir.clone())
    }

    fn path(&self, exchange: &str, symbol: &str) -> PathBuf {
        let digest = Sha256::digest(format!("{exchange}:{symbol}").as_bytes());
        self.dir.join(format!("{}.lock", hex::encode(digest)))
    }

    fn open(&self, exchange: &str, symbol: &str) -> Result<(File, PathBuf)> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(exchange, symbol);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok((file, path))
    }

    /// Take the lock without waiting. Fails with `LockContention` if another
    /// execution holds it.
    pub fn try_acquire(&self, exchange: &str, symbol: &str) -> Result<LockGuard> {
        let (file, path) = self.open(exchange, symbol)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(Error::LockContention {
                    exchange: exchange.to_string(),
                    symbol: symbol.to_string(),
                })
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        let mut guard = LockGuard { file, path };
        guard.file.set_len(0)?;
        writeln!(guard.file, "{}", std::process::id())?;
        writeln!(guard.file, "{}", Utc::now().to_rfc3339())?;
        debug!(exchange, symbol, path = %guard.path.display(), "Execution lock acquired");
        Ok(guard)
    }

    /// Whether some execution currently owns the lock.
    pub fn is_held(&self, exchange: &str, symbol: &str) -> bool {
        let Ok((file, _)) = self.open(exchange, symbol) else {
            return false;
        };
        match file.try_lock() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Error(_)) => false,
        }
    }
}
