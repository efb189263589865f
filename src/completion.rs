//! Request/response handshake between a print call and the page that reports its result.

use crate::errors::{PrinterError, Result};
use crate::models::PrintResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Registry = Arc<Mutex<HashMap<String, oneshot::Sender<PrintResult>>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, oneshot::Sender<PrintResult>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of in-flight print requests keyed by request id.
#[derive(Clone, Default)]
pub struct CompletionChannel {
    pending: Registry,
}

impl CompletionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `request_id`. Must happen before the page can possibly report it.
    pub fn track(&self, request_id: &str) -> Result<PendingPrint> {
        let (tx, rx) = oneshot::channel();
        let mut pending = lock(&self.pending);
        if pending.contains_key(request_id) {
            return Err(PrinterError::Validation(format!(
                "request {} is already pending",
                request_id
            )));
        }
        pending.insert(request_id.to_string(), tx);
        debug!("Tracking print request {} ({} pending)", request_id, pending.len());

        Ok(PendingPrint {
            request_id: request_id.to_string(),
            rx,
            registry: Arc::clone(&self.pending),
        })
    }

    /// Delivers `result` to its waiter. Results nobody waits for are dropped.
    pub fn notify(&self, result: PrintResult) -> bool {
        if result.request_id.is_empty() {
            debug!("Dropping print result without request id");
            return false;
        }

        let sender = lock(&self.pending).remove(&result.request_id);
        match sender {
            Some(tx) => {
                let id = result.request_id.clone();
                if tx.send(result).is_err() {
                    debug!("Waiter for {} went away before delivery", id);
                    return false;
                }
                true
            }
            None => {
                debug!("No pending request {}, result dropped", result.request_id);
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Ticket for one tracked request. Dropping it untracks the request.
pub struct PendingPrint {
    request_id: String,
    rx: oneshot::Receiver<PrintResult>,
    registry: Registry,
}

impl PendingPrint {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub async fn wait(mut self, timeout: Duration) -> Result<PrintResult> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(PrinterError::Other(anyhow::anyhow!(
                "print request {} was abandoned",
                self.request_id
            ))),
            Err(_) => {
                self.untrack();
                warn!("No result for print request {} within {:?}", self.request_id, timeout);
                Err(PrinterError::timeout("print result", timeout))
            }
        }
    }

    fn untrack(&self) {
        lock(&self.registry).remove(&self.request_id);
    }
}

impl Drop for PendingPrint {
    fn drop(&mut self) {
        self.untrack();
    }
}
