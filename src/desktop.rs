//! Tauri adapters for the print surface and application exit.

use crate::errors::{PrinterError, Result};
use crate::orchestrator::PrintOrchestrator;
use crate::page_load::EmbeddedSurface;
use crate::watchdog::ExitRequester;
use std::sync::Arc;
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use tracing::{debug, info};
use url::Url;

pub const PRINT_WINDOW: &str = "print";
pub const MAIN_WINDOW: &str = "main";

const AUTOPRINT_SCRIPT: &str = include_str!("autoprint.js");

/// The hidden `print` webview window.
pub struct WebviewSurface {
    app: AppHandle,
    label: String,
}

impl WebviewSurface {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            label: PRINT_WINDOW.to_string(),
        }
    }

    fn window(&self) -> Result<WebviewWindow> {
        self.app
            .get_webview_window(&self.label)
            .ok_or_else(|| PrinterError::Surface(format!("window '{}' is not open", self.label)))
    }
}

impl EmbeddedSurface for WebviewSurface {
    fn navigate(&self, url: &Url) -> Result<()> {
        self.window()?
            .navigate(url.clone())
            .map_err(|e| PrinterError::Surface(format!("navigate to {}: {}", url, e)))
    }

    fn eval(&self, script: &str) -> Result<()> {
        self.window()?
            .eval(script)
            .map_err(|e| PrinterError::Surface(format!("eval: {}", e)))
    }
}

/// Exits the Tauri application.
pub struct AppExit {
    app: AppHandle,
}

impl AppExit {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl ExitRequester for AppExit {
    fn request_exit(&self) {
        info!("Exit requested");
        self.app.exit(0);
    }
}

/// Creates the hidden print window. Load-complete events are forwarded to the orchestrator.
pub fn open_print_window(app: &AppHandle, orchestrator: Arc<PrintOrchestrator>) -> tauri::Result<WebviewWindow> {
    let blank: Url = "about:blank"
        .parse()
        .map_err(|e: url::ParseError| tauri::Error::Anyhow(e.into()))?;

    WebviewWindowBuilder::new(app, PRINT_WINDOW, WebviewUrl::External(blank))
        .title("FineReport print")
        .visible(false)
        .initialization_script(AUTOPRINT_SCRIPT)
        .on_page_load(move |_window, payload| {
            if payload.event() == PageLoadEvent::Finished {
                debug!("Print window finished loading {}", payload.url());
                orchestrator.page_loaded(payload.url());
            }
        })
        .build()
}
