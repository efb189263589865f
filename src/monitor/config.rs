use crate::errors::{PrinterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_PUSHPLUS_URL: &str = "http://www.pushplus.plus/send";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

fn default_pushplus_url() -> String {
    DEFAULT_PUSHPLUS_URL.to_string()
}

/// Contents of `monitor.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default)]
    pub push_plus_token: String,
    #[serde(default = "default_pushplus_url")]
    pub push_plus_url: String,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    pub name: String,
    /// Six fields, seconds first.
    #[serde(default)]
    pub cron: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub curl: String,
    /// When set, the curl command is read from this file instead of `curl`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script_file: String,
    /// Request timeout and slow-response alert threshold.
    #[serde(default)]
    pub timeout_ms: i64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_executed: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub name: String,
    pub cron: String,
    pub enabled: bool,
    pub last_executed: String,
    pub last_status: String,
    pub last_error: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            push_plus_token: String::new(),
            push_plus_url: default_pushplus_url(),
            tasks: Vec::new(),
        }
    }
}

impl TaskConfig {
    pub fn curl_command(&self) -> Result<String> {
        if self.script_file.trim().is_empty() {
            return Ok(self.curl.clone());
        }
        std::fs::read_to_string(&self.script_file).map_err(|e| {
            PrinterError::Monitor(format!("read script file '{}': {}", self.script_file, e))
        })
    }

    /// Non-positive timeouts mean one second.
    pub fn timeout(&self) -> Duration {
        effective_timeout(self.timeout_ms)
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            name: self.name.clone(),
            cron: self.cron.clone(),
            enabled: self.enabled,
            last_executed: self.last_executed.clone(),
            last_status: self.last_status.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

pub fn effective_timeout(timeout_ms: i64) -> Duration {
    if timeout_ms <= 0 {
        Duration::from_secs(1)
    } else {
        Duration::from_millis(timeout_ms as u64)
    }
}

impl MonitorConfig {
    /// A missing file yields an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No monitor config at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| PrinterError::Monitor(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Monitor config written to {}", path.display());
        Ok(())
    }

    pub fn add_task(&mut self, task: TaskConfig) -> Result<()> {
        if task.name.trim().is_empty() {
            return Err(PrinterError::Validation("task name is required".to_string()));
        }
        if self.get_task(&task.name).is_some() {
            return Err(PrinterError::Monitor(format!("task '{}' already exists", task.name)));
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn remove_task(&mut self, name: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.name != name);
        self.tasks.len() != before
    }

    pub fn get_task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Records the outcome of a run. A success clears the previous error.
    pub fn update_status(&mut self, name: &str, status: &str, error: &str, executed_at: &str) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.name == name) {
            task.last_status = status.to_string();
            task.last_error = error.to_string();
            task.last_executed = executed_at.to_string();
        }
    }
}
