use super::config::{MonitorConfig, TaskConfig, TaskStatus, STATUS_FAILED, STATUS_SUCCESS};
use super::curl::{parse_curl, ParsedRequest};
use super::executor::{ExecutionResult, Executor};
use crate::errors::{PrinterError, Result};
use chrono::Local;
use cron::Schedule;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MAX_LOGGED_BODY: usize = 500;

/// Runs enabled monitor tasks on their cron schedules and keeps `monitor.json` current.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: RwLock<MonitorConfig>,
    config_path: PathBuf,
    executor: Executor,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: MonitorConfig, config_path: impl Into<PathBuf>) -> Self {
        let executor = Executor::new();
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                config_path: config_path.into(),
                executor,
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn load(config_path: impl Into<PathBuf>) -> Result<Self> {
        let path = config_path.into();
        let config = MonitorConfig::load(&path)?;
        Ok(Self::new(config, path))
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    pub async fn config(&self) -> MonitorConfig {
        self.inner.config.read().await.clone()
    }

    /// Replaces and persists the whole configuration without rescheduling.
    pub async fn save_config(&self, config: MonitorConfig) -> Result<()> {
        let mut current = self.inner.config.write().await;
        config.save(&self.inner.config_path)?;
        *current = config;
        Ok(())
    }

    /// (Re)schedules every enabled task with a cron expression. Returns how many were scheduled.
    pub async fn start(&self) -> usize {
        self.abort_all();
        let tasks = self.inner.config.read().await.tasks.clone();

        let mut scheduled = HashMap::new();
        for task in tasks.iter().filter(|t| t.enabled && !t.cron.trim().is_empty()) {
            match prepare(task) {
                Ok((schedule, request)) => {
                    info!("Scheduled task '{}' with cron: {}", task.name, task.cron);
                    let handle = spawn_task(
                        Arc::clone(&self.inner),
                        task.name.clone(),
                        schedule,
                        request,
                        task.timeout_ms,
                    );
                    scheduled.insert(task.name.clone(), handle);
                }
                Err(e) => error!("Failed to schedule task '{}': {}", task.name, e),
            }
        }

        let count = scheduled.len();
        *self.jobs() = scheduled;
        info!("Scheduler started with {} tasks", count);
        count
    }

    pub fn stop(&self) {
        self.abort_all();
        info!("Scheduler stopped");
    }

    pub fn scheduled_count(&self) -> usize {
        self.jobs().values().filter(|h| !h.is_finished()).count()
    }

    /// Re-reads the configuration file and restarts every task.
    pub async fn reload(&self) -> Result<usize> {
        let config = MonitorConfig::load(&self.inner.config_path)
            .map_err(|e| PrinterError::Monitor(format!("reload config failed: {}", e)))?;
        *self.inner.config.write().await = config;
        Ok(self.start().await)
    }

    pub async fn add_task(&self, task: TaskConfig) -> Result<()> {
        self.modify(|config| config.add_task(task)).await?;
        self.start().await;
        Ok(())
    }

    pub async fn remove_task(&self, name: &str) -> Result<()> {
        self.modify(|config| {
            if config.remove_task(name) {
                Ok(())
            } else {
                Err(PrinterError::Monitor(format!("task '{}' not found", name)))
            }
        })
        .await?;
        self.start().await;
        Ok(())
    }

    pub async fn update_task(&self, task: TaskConfig) -> Result<()> {
        self.modify(|config| {
            config.remove_task(&task.name);
            config.add_task(task)
        })
        .await?;
        self.start().await;
        Ok(())
    }

    pub async fn status(&self) -> BTreeMap<String, TaskStatus> {
        self.inner
            .config
            .read()
            .await
            .tasks
            .iter()
            .map(|t| (t.name.clone(), t.status()))
            .collect()
    }

    /// Runs a task immediately, outside its schedule.
    pub async fn run_task(&self, name: &str) -> Result<ExecutionResult> {
        let task = self
            .inner
            .config
            .read()
            .await
            .get_task(name)
            .cloned()
            .ok_or_else(|| PrinterError::Monitor(format!("task '{}' not found", name)))?;
        let request = parse_curl(&task.curl_command()?)?;
        Ok(self.inner.execute_task(&task.name, &request, task.timeout_ms).await)
    }

    /// Applies `change` to a copy, persists it, then swaps it in.
    async fn modify<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut MonitorConfig) -> Result<()>,
    {
        let mut config = self.inner.config.write().await;
        let mut updated = config.clone();
        change(&mut updated)?;
        updated
            .save(&self.inner.config_path)
            .map_err(|e| PrinterError::Monitor(format!("save config failed: {}", e)))?;
        *config = updated;
        Ok(())
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.inner.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn abort_all(&self) {
        for (name, handle) in self.jobs().drain() {
            debug!("Unscheduling task '{}'", name);
            handle.abort();
        }
    }
}

fn prepare(task: &TaskConfig) -> Result<(Schedule, ParsedRequest)> {
    let schedule = Schedule::from_str(task.cron.trim())
        .map_err(|e| PrinterError::Monitor(format!("invalid cron '{}': {}", task.cron, e)))?;
    let request = parse_curl(&task.curl_command()?)
        .map_err(|e| PrinterError::Monitor(format!("parse curl failed: {}", e)))?;
    Ok((schedule, request))
}

fn spawn_task(
    inner: Arc<Inner>,
    name: String,
    schedule: Schedule,
    request: ParsedRequest,
    timeout_ms: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Local).next() else {
                info!("Task '{}' has no further runs", name);
                break;
            };
            let wait = (next - Local::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            inner.execute_task(&name, &request, timeout_ms).await;
        }
    })
}

impl Inner {
    async fn execute_task(&self, name: &str, request: &ParsedRequest, timeout_ms: i64) -> ExecutionResult {
        info!("Executing task '{}'", name);
        let result = self.executor.execute(request, timeout_ms).await;
        let status = if result.is_failure() { STATUS_FAILED } else { STATUS_SUCCESS };
        let executed_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let (token, push_plus_url) = {
            let mut config = self.config.write().await;
            config.update_status(name, status, &result.error_message, &executed_at);
            (config.push_plus_token.clone(), config.push_plus_url.clone())
        };

        if result.needs_alert(timeout_ms) {
            if let Err(e) = self
                .executor
                .send_alert(&push_plus_url, &token, name, &result, timeout_ms)
                .await
            {
                error!("Failed to send alert: {}", e);
            }
        }

        if result.response_body.is_empty() {
            info!(
                "Task '{}' completed - status: {}, duration: {}ms, error: {}",
                name, status, result.duration_ms, result.error_message
            );
        } else {
            info!(
                "Task '{}' completed - status: {}, HTTP {}, duration: {}ms, response: {}",
                name,
                status,
                result.status_code,
                result.duration_ms,
                truncate(&result.response_body, MAX_LOGGED_BODY)
            );
        }

        // Save what is live now; tasks may have changed while the alert was in flight.
        let config = self.config.write().await;
        if let Err(e) = config.save(&self.config_path) {
            warn!("Failed to persist status of task '{}': {}", name, e);
        }
        result
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
