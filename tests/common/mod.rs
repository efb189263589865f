// Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use fine_report_printer::config::Timings;
use fine_report_printer::errors::{PrinterError, Result};
use fine_report_printer::logging;
use fine_report_printer::models::{PrintData, PrintParams, PrintResult, Reportlet};
use fine_report_printer::orchestrator::{AutomationPayload, PrintOrchestrator};
use fine_report_printer::page_load::EmbeddedSurface;
use fine_report_printer::printer::PrintQueue;
use fine_report_printer::process::{HelperLauncher, ProcessProbe};
use fine_report_printer::status::{PrintJob, PrinterStatus, PAUSE_SENTINEL};
use fine_report_printer::watchdog::ExitRequester;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use url::Url;

pub const ENTRY_URL: &str = "http://fr.test/webroot/decision/view/report?viewlet=test_printer.cpt";
pub const PRINT_URL: &str = "http://fr.test/webroot/decision/view/report";

const SCRIPT_PREFIX: &str = "window.__xAutoPrint && window.__xAutoPrint.start(";

/// Short timings so timeout paths finish quickly.
pub fn fast_timings() -> Timings {
    Timings {
        ready_timeout: Duration::from_millis(200),
        ready_interval: Duration::from_millis(10),
        frame_load_timeout: Duration::from_millis(200),
        result_timeout: Duration::from_millis(300),
    }
}

pub fn sample_params(printer: &str) -> PrintParams {
    PrintParams {
        print_url: PRINT_URL.to_string(),
        print_type: 1,
        page_type: 0,
        is_pop_up: false,
        printer_name: printer.to_string(),
        data: PrintData {
            reportlets: vec![Reportlet {
                reportlet: "hi/his/bil/test_printer.cpt".to_string(),
                id_medpers: "672315903281201152".to_string(),
                org_na: "test clinic".to_string(),
                id_vismed: "763843129987043328".to_string(),
                document_number: "20251218000001".to_string(),
            }],
        },
        entry_url: Some(ENTRY_URL.to_string()),
    }
}

/// How the fake report page reacts.
#[derive(Debug, Clone)]
pub enum PageBehavior {
    /// Loads, runs the print and reports success with this page-side duration.
    Succeed { duration_ms: u64 },
    /// Loads, then reports a failed print.
    Fail(String),
    /// Loads but never reports a result.
    Silent,
    /// Never signals load completion.
    NeverLoads,
}

/// Stands in for the hidden webview: answers navigation with a load-complete
/// signal and script evaluation with a print result, as scripted.
pub struct ScriptedSurface {
    behavior: Mutex<PageBehavior>,
    orchestrator: OnceLock<Weak<PrintOrchestrator>>,
    navigations: Mutex<Vec<Url>>,
    scripts: Mutex<Vec<String>>,
}

impl ScriptedSurface {
    pub fn new(behavior: PageBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            orchestrator: OnceLock::new(),
            navigations: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
        })
    }

    pub fn attach(&self, orchestrator: &Arc<PrintOrchestrator>) {
        let _ = self.orchestrator.set(Arc::downgrade(orchestrator));
    }

    pub fn set_behavior(&self, behavior: PageBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn navigations(&self) -> Vec<Url> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    fn orchestrator(&self) -> Option<Arc<PrintOrchestrator>> {
        self.orchestrator.get().and_then(Weak::upgrade)
    }
}

impl EmbeddedSurface for ScriptedSurface {
    fn navigate(&self, url: &Url) -> Result<()> {
        self.navigations.lock().unwrap().push(url.clone());
        if matches!(*self.behavior.lock().unwrap(), PageBehavior::NeverLoads) {
            return Ok(());
        }
        if let Some(orchestrator) = self.orchestrator() {
            let url = url.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                orchestrator.page_loaded(&url);
            });
        }
        Ok(())
    }

    fn eval(&self, script: &str) -> Result<()> {
        self.scripts.lock().unwrap().push(script.to_string());
        let payload = payload_from_script(script)
            .ok_or_else(|| PrinterError::Surface("unexpected script".to_string()))?;

        let result = match self.behavior.lock().unwrap().clone() {
            PageBehavior::Succeed { duration_ms } => PrintResult {
                request_id: payload.request_id,
                success: true,
                error: None,
                duration_ms,
            },
            PageBehavior::Fail(message) => PrintResult {
                request_id: payload.request_id,
                success: false,
                error: Some(message),
                duration_ms: 12,
            },
            PageBehavior::Silent | PageBehavior::NeverLoads => return Ok(()),
        };

        if let Some(orchestrator) = self.orchestrator() {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                orchestrator.notify_result(result);
            });
        }
        Ok(())
    }
}

/// Extracts the payload from the script handed to the page.
pub fn payload_from_script(script: &str) -> Option<AutomationPayload> {
    let json = script.strip_prefix(SCRIPT_PREFIX)?.strip_suffix(");")?;
    serde_json::from_str(json).ok()
}

pub fn orchestrator_with(behavior: PageBehavior) -> (Arc<PrintOrchestrator>, Arc<ScriptedSurface>) {
    logging::init_test();
    let surface = ScriptedSurface::new(behavior);
    let orchestrator = Arc::new(PrintOrchestrator::new(
        surface.clone(),
        Default::default(),
        fast_timings(),
    ));
    surface.attach(&orchestrator);
    (orchestrator, surface)
}

// ============================================================================
// Watchdog fakes
// ============================================================================

/// In-memory print queue that records every call in order.
#[derive(Default)]
pub struct RecordingQueue {
    calls: Mutex<Vec<String>>,
    paused: AtomicBool,
    jobs: Mutex<Vec<PrintJob>>,
    failing_removals: Mutex<Vec<u32>>,
}

impl RecordingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn submit(&self, id: u32, document: &str) {
        self.jobs.lock().unwrap().push(PrintJob {
            id,
            computer_name: "WARD-PC".to_string(),
            printer_name: "A5".to_string(),
            document_name: document.to_string(),
            submitted_time: "2025-12-18 09:30:00".to_string(),
            job_status: "Paused".to_string(),
        });
    }

    pub fn fail_removal_of(&self, id: u32) {
        self.failing_removals.lock().unwrap().push(id);
    }

    pub fn job_ids(&self) -> Vec<u32> {
        self.jobs.lock().unwrap().iter().map(|j| j.id).collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PrintQueue for RecordingQueue {
    async fn pause(&self, printer: &str) -> Result<()> {
        self.record(format!("pause {}", printer));
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, printer: &str) -> Result<()> {
        self.record(format!("resume {}", printer));
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self, printer: &str) -> Result<PrinterStatus> {
        self.record(format!("status {}", printer));
        let (start, until) = if self.is_paused() { PAUSE_SENTINEL } else { (0, 0) };
        Ok(PrinterStatus::from_window(printer, 0, start, until))
    }

    async fn list_jobs(&self, printer: &str) -> Result<Vec<PrintJob>> {
        self.record(format!("list {}", printer));
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn remove_job(&self, printer: &str, job_id: u32) -> Result<()> {
        self.record(format!("remove {} {}", printer, job_id));
        if self.failing_removals.lock().unwrap().contains(&job_id) {
            return Err(PrinterError::command(
                "Remove-PrintJob",
                format!("job {} is locked", job_id),
            ));
        }
        self.jobs.lock().unwrap().retain(|j| j.id != job_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProbe {
    running: AtomicBool,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessProbe for FakeProbe {
    async fn is_running(&self, _image_name: &str) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct CountingLauncher {
    launches: AtomicUsize,
}

impl CountingLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl HelperLauncher for CountingLauncher {
    fn launch(&self) -> Result<u32> {
        Ok(4000 + self.launches.fetch_add(1, Ordering::SeqCst) as u32)
    }
}

#[derive(Default)]
pub struct CountingExit {
    requests: AtomicUsize,
}

impl CountingExit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ExitRequester for CountingExit {
    fn request_exit(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}
