//! Process presence checks and the detached helper launcher used by the watchdog.

use crate::errors::{PrinterError, Result};
use crate::shell::CommandRunner;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// True when a process with exactly this image name is running.
    async fn is_running(&self, image_name: &str) -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
pub trait HelperLauncher: Send + Sync {
    /// Starts the helper without waiting for it; returns its pid.
    fn launch(&self) -> Result<u32>;
}

/// `tasklist`-backed probe.
pub struct TasklistProbe {
    runner: Arc<dyn CommandRunner>,
}

impl TasklistProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ProcessProbe for TasklistProbe {
    async fn is_running(&self, image_name: &str) -> Result<bool> {
        let image_name = image_name.trim();
        if image_name.is_empty() {
            return Err(PrinterError::Validation("process name is required".to_string()));
        }

        let args = vec![
            "/FI".to_string(),
            format!("IMAGENAME eq {}", image_name),
            "/FO".to_string(),
            "CSV".to_string(),
            "/NH".to_string(),
        ];
        let output = self.runner.run("tasklist", &args).await.map_err(|e| {
            error!("tasklist could not be started: {}", e);
            PrinterError::Process(format!("tasklist: {}", e))
        })?;

        if !output.success {
            return Err(PrinterError::Process(format!(
                "tasklist exited with {:?}: {}",
                output.code,
                output.trimmed()
            )));
        }

        let running = tasklist_contains(&output.combined, image_name);
        debug!("{} running: {}", image_name, running);
        Ok(running)
    }
}

/// Matches the first CSV column of each row exactly, ignoring case.
///
/// A miss prints an informational line instead of a row, which never parses as a
/// quoted image name.
pub fn tasklist_contains(output: &str, image_name: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('"') else {
            return false;
        };
        rest.split('"')
            .next()
            .map_or(false, |first| first.eq_ignore_ascii_case(image_name))
    })
}

/// Launches an executable that lives next to the running binary.
pub struct ExecutableLauncher {
    path: PathBuf,
}

impl ExecutableLauncher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves `file_name` in the directory of the current executable.
    pub fn beside_current_exe(file_name: &str) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| PrinterError::Process(format!("{} has no parent directory", exe.display())))?;
        Ok(Self::new(dir.join(file_name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HelperLauncher for ExecutableLauncher {
    fn launch(&self) -> Result<u32> {
        if !self.path.is_file() {
            error!("Helper not found at {}", self.path.display());
            return Err(PrinterError::Process(format!(
                "helper not found: {}",
                self.path.display()
            )));
        }

        let child = std::process::Command::new(&self.path).spawn().map_err(|e| {
            error!("Failed to start {}: {}", self.path.display(), e);
            PrinterError::Process(format!("failed to start {}: {}", self.path.display(), e))
        })?;

        let pid = child.id();
        // Dropping the handle detaches; the helper outlives this call.
        drop(child);
        info!("Started {} in background (pid {})", self.path.display(), pid);
        Ok(pid)
    }
}
