//! Navigates the print surface and waits for the page to finish loading.

use crate::errors::{PrinterError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

/// Hidden browser surface hosting the report page.
pub trait EmbeddedSurface: Send + Sync {
    fn navigate(&self, url: &Url) -> Result<()>;

    /// Fire-and-forget script evaluation in the loaded page.
    fn eval(&self, script: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageReady {
    pub url: Url,
    pub elapsed: Duration,
}

struct Listener {
    generation: u64,
    tx: oneshot::Sender<Url>,
}

pub struct PageLoadBridge {
    surface: Arc<dyn EmbeddedSurface>,
    listener: Mutex<Option<Listener>>,
    generation: AtomicU64,
    last_stamp: AtomicU64,
}

impl PageLoadBridge {
    pub fn new(surface: Arc<dyn EmbeddedSurface>) -> Self {
        Self {
            surface,
            listener: Mutex::new(None),
            generation: AtomicU64::new(0),
            last_stamp: AtomicU64::new(0),
        }
    }

    pub fn surface(&self) -> &Arc<dyn EmbeddedSurface> {
        &self.surface
    }

    /// Loads `url` with a cache-busting `_t` parameter and resolves on the first
    /// load-complete signal. A newer call replaces this listener; the older waiter
    /// then fails with a surface error.
    pub async fn load_page(&self, url: &str, timeout: Duration) -> Result<PageReady> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PrinterError::Validation("page URL is required".to_string()));
        }
        let mut target = Url::parse(url)
            .map_err(|e| PrinterError::Validation(format!("invalid page URL {}: {}", url, e)))?;
        target
            .query_pairs_mut()
            .append_pair("_t", &self.next_stamp().to_string());

        let (tx, rx) = oneshot::channel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.slot().replace(Listener { generation, tx }) {
            debug!("Page load {} superseded by {}", previous.generation, generation);
        }

        let started = Instant::now();
        if let Err(e) = self.surface.navigate(&target) {
            self.detach(generation);
            warn!("Navigation to {} failed: {}", target, e);
            return Err(e);
        }
        debug!("Navigating print surface to {}", target);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(loaded)) => {
                let elapsed = started.elapsed();
                info!("Page loaded in {:?}: {}", elapsed, loaded);
                Ok(PageReady { url: loaded, elapsed })
            }
            Ok(Err(_)) => Err(PrinterError::Surface(
                "page load superseded by a newer navigation".to_string(),
            )),
            Err(_) => {
                self.detach(generation);
                warn!("Page {} did not load within {:?}", target, timeout);
                Err(PrinterError::timeout("page load", timeout))
            }
        }
    }

    /// Load-complete hook called by the surface. Only the first signal per load counts.
    pub fn page_loaded(&self, url: &Url) -> bool {
        let listener = self.slot().take();
        match listener {
            Some(listener) => listener.tx.send(url.clone()).is_ok(),
            None => {
                debug!("Ignoring load signal for {}", url);
                false
            }
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn detach(&self, generation: u64) {
        let mut slot = self.slot();
        if slot.as_ref().map_or(false, |l| l.generation == generation) {
            *slot = None;
        }
    }

    /// Epoch millis, bumped so consecutive values strictly increase.
    fn next_stamp(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut previous = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = if now > previous { now } else { previous + 1 };
            match self
                .last_stamp
                .compare_exchange(previous, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}
