//! Prescription-slip auto printer: drives FineReport's in-page print API from a
//! hidden webview, manages the Windows print queue, and runs scheduled API checks.

pub mod completion;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod page_load;
pub mod printer;
pub mod process;
pub mod shell;
pub mod status;
pub mod watchdog;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use config::AppConfig;
pub use errors::{PrinterError, Result};
pub use models::{PrintData, PrintParams, PrintResult, Reportlet};
pub use orchestrator::PrintOrchestrator;
pub use page_load::EmbeddedSurface;
pub use printer::{PrintQueue, SpoolerQueue};
pub use watchdog::{Watchdog, WatchdogController, WatchdogState};
