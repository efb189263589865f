use crate::completion::CompletionChannel;
use crate::config::{PrintDefaults, Timings};
use crate::errors::{PrinterError, Result};
use crate::models::{PrintParams, PrintResult};
use crate::page_load::{EmbeddedSurface, PageLoadBridge};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Progress of a single print call, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintPhase {
    Idle,
    Validating,
    AwaitingPageLoad,
    AwaitingReady,
    Injected,
    Completed,
    TimedOut,
    Failed,
}

/// Everything the page script needs for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationPayload {
    #[serde(flatten)]
    pub params: PrintParams,
    pub request_id: String,
    pub ready_timeout_ms: u64,
    pub ready_interval_ms: u64,
    pub frame_load_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub entry_url: String,
    pub print_url: String,
}

/// Script evaluated in the loaded page to start one request.
pub fn automation_script(payload: &AutomationPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    Ok(format!(
        "window.__xAutoPrint && window.__xAutoPrint.start({});",
        json
    ))
}

/// Drives one print: load the entry page, hand the payload to the page script and
/// wait for the page to report back through [`PrintOrchestrator::notify_result`].
pub struct PrintOrchestrator {
    bridge: PageLoadBridge,
    completion: CompletionChannel,
    defaults: PrintDefaults,
    endpoints: RwLock<Endpoints>,
    timings: Timings,
    // One surface, so one print at a time.
    surface_slot: tokio::sync::Mutex<()>,
}

impl PrintOrchestrator {
    pub fn new(surface: Arc<dyn EmbeddedSurface>, defaults: PrintDefaults, timings: Timings) -> Self {
        let endpoints = Endpoints {
            entry_url: defaults.entry_url.clone(),
            print_url: defaults.print_url.clone(),
        };
        Self {
            bridge: PageLoadBridge::new(surface),
            completion: CompletionChannel::new(),
            defaults,
            endpoints: RwLock::new(endpoints),
            timings,
            surface_slot: tokio::sync::Mutex::new(()),
        }
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the configured endpoints; empty values keep the current one.
    pub fn set_endpoints(&self, entry_url: &str, print_url: &str) {
        let mut endpoints = self
            .endpoints
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !entry_url.trim().is_empty() {
            endpoints.entry_url = entry_url.trim().to_string();
        }
        if !print_url.trim().is_empty() {
            endpoints.print_url = print_url.trim().to_string();
        }
        info!("Print endpoints set: entry={} print={}", endpoints.entry_url, endpoints.print_url);
    }

    /// Suggested payload for the UI, pointing at the active endpoints.
    pub fn default_params(&self) -> PrintParams {
        let endpoints = self.endpoints();
        let mut params = self.defaults.to_params();
        params.print_url = endpoints.print_url;
        params.entry_url = Some(endpoints.entry_url);
        params
    }

    pub fn pending_count(&self) -> usize {
        self.completion.pending_count()
    }

    /// Load-complete hook for the print surface.
    pub fn page_loaded(&self, url: &Url) -> bool {
        self.bridge.page_loaded(url)
    }

    /// Result reported by the page script. Unknown or late results are dropped.
    pub fn notify_result(&self, mut result: PrintResult) -> bool {
        if result.duration_ms == 0 {
            result.duration_ms = self.timings.ready_interval.as_millis() as u64;
        }
        self.completion.notify(result)
    }

    fn prepare_payload(&self, request_id: &str, mut params: PrintParams) -> AutomationPayload {
        let endpoints = self.endpoints();
        let entry_url = params
            .entry_url
            .take()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(endpoints.entry_url);
        if params.print_url.trim().is_empty() {
            params.print_url = endpoints.print_url;
        }
        params.entry_url = Some(entry_url);

        AutomationPayload {
            params,
            request_id: request_id.to_string(),
            ready_timeout_ms: self.timings.ready_timeout.as_millis() as u64,
            ready_interval_ms: self.timings.ready_interval.as_millis() as u64,
            frame_load_timeout_ms: self.timings.frame_load_timeout.as_millis() as u64,
        }
    }

    #[tracing::instrument(skip(self, params), fields(printer = %params.printer_name))]
    pub async fn print(&self, params: PrintParams) -> Result<PrintResult> {
        let mut phase = PrintPhase::Idle;
        let mut advance = |next: PrintPhase, request_id: &str| {
            debug!("Print {} {:?} -> {:?}", request_id, phase, next);
            phase = next;
        };

        advance(PrintPhase::Validating, "-");
        if let Err(e) = params.validate() {
            warn!("Rejected print request: {}", e);
            return Err(e);
        }

        let request_id = Uuid::new_v4().to_string();
        let payload = self.prepare_payload(&request_id, params);
        let script = automation_script(&payload)?;
        let entry_url = payload.params.entry_url.clone().unwrap_or_default();
        let started = Instant::now();

        let _slot = tokio::time::timeout(self.timings.result_timeout, self.surface_slot.lock())
            .await
            .map_err(|_| {
                warn!("Print {} could not get the print surface", request_id);
                PrinterError::timeout("waiting for print surface", self.timings.result_timeout)
            })?;

        let pending = self.completion.track(&request_id)?;

        advance(PrintPhase::AwaitingPageLoad, &request_id);
        if let Err(e) = self
            .bridge
            .load_page(&entry_url, self.timings.frame_load_timeout)
            .await
        {
            advance(
                if e.is_timeout() { PrintPhase::TimedOut } else { PrintPhase::Failed },
                &request_id,
            );
            error!("Print {} aborted, entry page did not load: {}", request_id, e);
            return Err(e);
        }

        advance(PrintPhase::AwaitingReady, &request_id);
        if let Err(e) = self.bridge.surface().eval(&script) {
            advance(PrintPhase::Failed, &request_id);
            error!("Print {} could not start page automation: {}", request_id, e);
            return Err(e);
        }
        advance(PrintPhase::Injected, &request_id);

        match pending.wait(self.timings.result_timeout).await {
            Ok(result) if result.success => {
                advance(PrintPhase::Completed, &request_id);
                info!(
                    "Print {} completed on {} in {:?} (page reported {} ms)",
                    request_id,
                    payload.params.printer_name,
                    started.elapsed(),
                    result.duration_ms
                );
                Ok(result)
            }
            Ok(result) => {
                advance(PrintPhase::Failed, &request_id);
                let message = result
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "unknown printing error".to_string());
                error!("Print {} failed in page: {}", request_id, message);
                Err(PrinterError::Delegated(message))
            }
            Err(e) => {
                advance(
                    if e.is_timeout() { PrintPhase::TimedOut } else { PrintPhase::Failed },
                    &request_id,
                );
                error!("Print {} did not complete: {}", request_id, e);
                Err(e)
            }
        }
    }
}
