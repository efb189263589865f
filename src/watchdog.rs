use crate::errors::{PrinterError, Result};
use crate::printer::PrintQueue;
use crate::process::{HelperLauncher, ProcessProbe};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Asks the host application to shut down once cleanup has finished.
#[cfg_attr(test, mockall::automock)]
pub trait ExitRequester: Send + Sync {
    fn request_exit(&self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogState {
    pub observed_running: bool,
    pub printer_paused_by_us: bool,
    pub helper_launched: bool,
    pub cleanup_done: bool,
    pub exit_allowed: bool,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do: target not running and we hold no pause, or cleanup already ran.
    Skipped,
    /// Target appeared; printer paused and helper started.
    Paused,
    WaitingForJobs,
    CleanedUp,
    /// A step failed; state is unchanged and the next tick retries.
    Failed,
}

/// Holds the printer paused while the external print tool runs, then clears the
/// jobs it produced and releases the printer.
pub struct Watchdog {
    queue: Arc<dyn PrintQueue>,
    probe: Arc<dyn ProcessProbe>,
    launcher: Arc<dyn HelperLauncher>,
    exit: Arc<dyn ExitRequester>,
    process_name: String,
    printer_name: String,
    state: Mutex<WatchdogState>,
}

impl Watchdog {
    pub fn new(
        queue: Arc<dyn PrintQueue>,
        probe: Arc<dyn ProcessProbe>,
        launcher: Arc<dyn HelperLauncher>,
        exit: Arc<dyn ExitRequester>,
        process_name: impl Into<String>,
        printer_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            probe,
            launcher,
            exit,
            process_name: process_name.into(),
            printer_name: printer_name.into(),
            state: Mutex::new(WatchdogState::default()),
        }
    }

    pub fn snapshot(&self) -> WatchdogState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self, state: WatchdogState) {
        *self.lock() = state;
    }

    /// Forgets the pause so a later start re-evaluates from scratch.
    fn release_pause(&self) {
        self.lock().printer_paused_by_us = false;
    }

    pub async fn tick(&self) -> TickOutcome {
        let mut state = self.snapshot();
        if state.cleanup_done {
            return TickOutcome::Skipped;
        }

        let running = match self.probe.is_running(&self.process_name).await {
            Ok(running) => running,
            Err(e) => {
                error!("Failed to check for {}: {}", self.process_name, e);
                return TickOutcome::Failed;
            }
        };
        if running != state.observed_running {
            debug!("{} running: {}", self.process_name, running);
            state.observed_running = running;
            self.store(state.clone());
        }

        if !running && !state.printer_paused_by_us {
            return TickOutcome::Skipped;
        }

        if let Err(e) = self.ensure_paused().await {
            error!("Failed to pause printer {}: {}", self.printer_name, e);
            return TickOutcome::Failed;
        }

        let jobs = match self.queue.list_jobs(&self.printer_name).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to list jobs on {}: {}", self.printer_name, e);
                return TickOutcome::Failed;
            }
        };

        if jobs.is_empty() {
            if running && !state.printer_paused_by_us {
                info!(
                    "{} detected, printer {} paused, waiting for jobs",
                    self.process_name, self.printer_name
                );
                state.printer_paused_by_us = true;
                if !state.helper_launched {
                    match self.launcher.launch() {
                        Ok(pid) => {
                            state.helper_launched = true;
                            info!("Helper started (pid {}), still watching the queue", pid);
                        }
                        Err(e) => error!("Failed to start helper: {}", e),
                    }
                }
                self.store(state);
                return TickOutcome::Paused;
            }
            info!("Waiting for jobs to reach {}", self.printer_name);
            return TickOutcome::WaitingForJobs;
        }

        info!("{} jobs queued on {}, removing", jobs.len(), self.printer_name);
        let removed = match self.remove_all().await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to clear {}: {}", self.printer_name, e);
                return TickOutcome::Failed;
            }
        };
        if removed == 0 {
            info!("Queue already emptied elsewhere, resuming printer");
        }

        if let Err(e) = self.queue.resume(&self.printer_name).await {
            error!("Failed to resume printer {}: {}", self.printer_name, e);
            return TickOutcome::Failed;
        }

        state.printer_paused_by_us = false;
        state.cleanup_done = true;
        state.exit_allowed = true;
        self.store(state);

        info!("Removed {} jobs, printer {} resumed, exiting", removed, self.printer_name);
        self.exit.request_exit();
        TickOutcome::CleanedUp
    }

    async fn ensure_paused(&self) -> Result<()> {
        let status = self.queue.status(&self.printer_name).await?;
        if status.is_paused {
            return Ok(());
        }
        self.queue.pause(&self.printer_name).await
    }

    /// Re-lists the queue and removes every job; a job that cannot be removed is skipped.
    async fn remove_all(&self) -> Result<usize> {
        let jobs = self.queue.list_jobs(&self.printer_name).await?;
        let mut removed = 0;
        for job in &jobs {
            match self.queue.remove_job(&self.printer_name, job.id).await {
                Ok(()) => {
                    info!("Removed job {} ({})", job.id, job.document_name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove job {}: {}", job.id, e),
            }
        }
        Ok(removed)
    }
}

enum Lifecycle {
    Stopped,
    Running {
        stop_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

/// Start/stop control over the polling loop.
pub struct WatchdogController {
    watchdog: Arc<Watchdog>,
    interval: Duration,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl WatchdogController {
    pub fn new(watchdog: Arc<Watchdog>, interval: Duration) -> Self {
        Self {
            watchdog,
            interval,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::Stopped),
        }
    }

    pub fn snapshot(&self) -> WatchdogState {
        self.watchdog.snapshot()
    }

    pub async fn is_running(&self) -> bool {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running { handle, .. } => !handle.is_finished(),
            Lifecycle::Stopped => false,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Lifecycle::Running { handle, .. } = &*lifecycle {
            if !handle.is_finished() {
                return Err(PrinterError::Process("watchdog is already running".to_string()));
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_loop(Arc::clone(&self.watchdog), self.interval, stop_rx);
        *lifecycle = Lifecycle::Running { stop_tx, handle };
        info!("Watchdog started");
        Ok(())
    }

    /// Stops the loop after its current tick and forgets any pause it was holding.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        let Lifecycle::Running { stop_tx, handle } = previous else {
            return Err(PrinterError::Process("watchdog is not running".to_string()));
        };
        if handle.is_finished() {
            return Err(PrinterError::Process("watchdog is not running".to_string()));
        }

        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            warn!("Watchdog loop ended abnormally: {}", e);
        }
        self.watchdog.release_pause();
        info!("Watchdog stopped");
        Ok(())
    }
}

fn spawn_loop(watchdog: Arc<Watchdog>, interval: Duration, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Watching for {} every {:?} (printer {})",
            watchdog.process_name, interval, watchdog.printer_name
        );

        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            if *stop_rx.borrow() {
                break;
            }
            if watchdog.tick().await == TickOutcome::CleanedUp {
                break;
            }
        }
        debug!("Watchdog loop exited");
    })
}
