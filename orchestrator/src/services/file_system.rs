//! Run directory management
//!
//! Every run gets its own root under the configured base directory; each
//! instance gets `<root>/<role><n>/{data,apps,tmp}` plus a log file path.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::error::{OrchestratorError, OrchestratorResult};
use shared::{process_debug, process_warn, ProcessId};

/// Removal attempts before cleanup is reported as failed
pub const REMOVE_ATTEMPTS: u32 = 5;

const REMOVE_PAUSE: Duration = Duration::from_millis(200);

/// Directories of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDirs {
    pub root: PathBuf,
    pub data: PathBuf,
    pub apps: PathBuf,
    pub tmp: PathBuf,
    pub log_file: PathBuf,
}

impl InstanceDirs {
    pub fn under(run_root: &Path, name: &str) -> Self {
        let root = run_root.join(name);
        Self {
            data: root.join("data"),
            apps: root.join("apps"),
            tmp: root.join("tmp"),
            log_file: root.join("log"),
            root,
        }
    }
}

/// File system service for run directories
#[derive(Debug, Clone)]
pub struct RunDirectories {
    base_dir: PathBuf,
    remove_attempts: u32,
    remove_pause: Duration,
}

impl RunDirectories {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            remove_attempts: REMOVE_ATTEMPTS,
            remove_pause: REMOVE_PAUSE,
        }
    }

    /// Configure removal retries (fluent API)
    pub fn with_remove_retries(mut self, attempts: u32, pause: Duration) -> Self {
        self.remove_attempts = attempts.max(1);
        self.remove_pause = pause;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh, uniquely named run root
    pub async fn create_run_root(&self) -> OrchestratorResult<PathBuf> {
        let root = self.base_dir.join(format!("run-{}", uuid::Uuid::new_v4().simple()));
        self.create_exclusive(&root).await?;
        Ok(root)
    }

    /// Create `path`, failing if it already exists
    pub async fn create_exclusive(&self, path: &Path) -> OrchestratorResult<()> {
        if fs::try_exists(path).await? {
            return Err(OrchestratorError::DirectoryCollision { path: path.to_path_buf() });
        }
        fs::create_dir_all(path).await?;
        process_debug!(ProcessId::current(), "📁 Created run directory: {}", path.display());
        Ok(())
    }

    /// Create an instance's directories; existing ones are reused
    pub async fn create_instance_dirs(&self, run_root: &Path, name: &str) -> OrchestratorResult<InstanceDirs> {
        let dirs = InstanceDirs::under(run_root, name);
        for dir in [&dirs.data, &dirs.apps, &dirs.tmp] {
            fs::create_dir_all(dir).await?;
        }
        Ok(dirs)
    }

    /// Remove a directory tree, retrying while files are still held open
    pub async fn remove(&self, path: &Path) -> OrchestratorResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fs::remove_dir_all(path).await {
                Ok(()) => {
                    process_debug!(ProcessId::current(), "🧹 Removed {}", path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) if attempt < self.remove_attempts => {
                    process_warn!(
                        ProcessId::current(),
                        "⚠️ Failed to remove {} (attempt {}/{}): {}",
                        path.display(),
                        attempt,
                        self.remove_attempts,
                        e
                    );
                    tokio::time::sleep(self.remove_pause).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
