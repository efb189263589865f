use crate::errors::{PrinterError, Result};
use crate::models::{PrintData, PrintParams, Reportlet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_ENTRY_URL: &str = "http://172.20.38.62:8080/webroot/decision/view/report?viewlet=hi%252Fhis%252Fbil%252Ftest_printer.cpt&ref_t=design&op=view&ref_c=093def84-95a2-4eaf-af61-61dc90a4d043";
const DEFAULT_PRINT_URL: &str = "http://172.20.38.62:8080/webroot/decision/view/report";

const DEFAULT_READY_TIMEOUT_MS: u64 = 45_000;
const DEFAULT_READY_INTERVAL_MS: u64 = 300;
const DEFAULT_FRAME_LOAD_TIMEOUT_MS: u64 = 20_000;
/// Added on top of the ready timeout when no explicit result timeout is set.
const RESULT_GRACE_MS: u64 = 15_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub print: PrintDefaults,
    pub timing: TimingConfig,
    pub watchdog: WatchdogConfig,
    pub monitor_config_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Suggested print payload offered to the UI and used as fallback endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrintDefaults {
    pub entry_url: String,
    pub print_url: String,
    pub printer_name: String,
    pub print_type: i32,
    pub page_type: i32,
    #[serde(rename = "isPopUp")]
    pub is_pop_up: bool,
    pub sample_reportlet: Reportlet,
}

/// Operational durations in milliseconds; unset values fall back to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    pub ready_timeout_ms: Option<u64>,
    pub ready_interval_ms: Option<u64>,
    pub frame_load_timeout_ms: Option<u64>,
    pub result_timeout_ms: Option<u64>,
}

/// Resolved timing values used by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    pub frame_load_timeout: Duration,
    pub result_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub process_name: String,
    pub printer_name: String,
    pub poll_interval_secs: u64,
    pub helper_name: String,
}

impl Default for PrintDefaults {
    fn default() -> Self {
        Self {
            entry_url: DEFAULT_ENTRY_URL.to_string(),
            print_url: DEFAULT_PRINT_URL.to_string(),
            printer_name: "HP LaserJet Pro P1100 plus series".to_string(),
            print_type: 1,
            page_type: 0,
            is_pop_up: false,
            sample_reportlet: Reportlet {
                reportlet: "hi/his/bil/test_printer.cpt".to_string(),
                id_medpers: "672315903281201152".to_string(),
                org_na: "南方医科大学口腔医院".to_string(),
                id_vismed: "763843129987043328".to_string(),
                document_number: "20251218000001".to_string(),
            },
        }
    }
}

impl PrintDefaults {
    pub fn to_params(&self) -> PrintParams {
        PrintParams {
            print_url: self.print_url.clone(),
            print_type: self.print_type,
            page_type: self.page_type,
            is_pop_up: self.is_pop_up,
            printer_name: self.printer_name.clone(),
            data: PrintData {
                reportlets: vec![self.sample_reportlet.clone()],
            },
            entry_url: Some(self.entry_url.clone()),
        }
    }
}

impl TimingConfig {
    pub fn resolve(&self) -> Timings {
        let ready_timeout = self.ready_timeout_ms.filter(|v| *v > 0).unwrap_or(DEFAULT_READY_TIMEOUT_MS);
        let ready_interval = self.ready_interval_ms.filter(|v| *v > 0).unwrap_or(DEFAULT_READY_INTERVAL_MS);
        let frame_load_timeout = self
            .frame_load_timeout_ms
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_FRAME_LOAD_TIMEOUT_MS);
        let result_timeout = self
            .result_timeout_ms
            .filter(|v| *v > 0)
            .unwrap_or(ready_timeout + RESULT_GRACE_MS);

        Timings {
            ready_timeout: Duration::from_millis(ready_timeout),
            ready_interval: Duration::from_millis(ready_interval),
            frame_load_timeout: Duration::from_millis(frame_load_timeout),
            result_timeout: Duration::from_millis(result_timeout),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        TimingConfig::default().resolve()
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            process_name: "FinePrint.exe".to_string(),
            printer_name: "A5".to_string(),
            poll_interval_secs: 5,
            helper_name: "fix-printer.exe".to_string(),
        }
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl AppConfig {
    /// Directory for persisted application files, per platform.
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            dirs::config_dir()
                .map(|p| p.join("FineReport Printer"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            dirs::config_dir()
                .map(|p| p.join("fine-report-printer"))
                .unwrap_or_else(|| PathBuf::from("."))
        }
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Monitor tasks live beside the executable's working directory unless overridden.
    pub fn monitor_config_path(&self) -> PathBuf {
        self.monitor_config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("monitor.json"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| PathBuf::from("logs"))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| PrinterError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Missing file means first launch; a corrupt file is reported and replaced by defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring unreadable config: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let t = Timings::default();
        assert_eq!(t.ready_timeout, Duration::from_secs(45));
        assert_eq!(t.ready_interval, Duration::from_millis(300));
        assert_eq!(t.frame_load_timeout, Duration::from_secs(20));
        assert_eq!(t.result_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_result_timeout_follows_ready_timeout() {
        let timing = TimingConfig {
            ready_timeout_ms: Some(10_000),
            ..Default::default()
        };
        assert_eq!(timing.resolve().result_timeout, Duration::from_secs(25));

        let explicit = TimingConfig {
            ready_timeout_ms: Some(10_000),
            result_timeout_ms: Some(3_000),
            ..Default::default()
        };
        assert_eq!(explicit.resolve().result_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_zero_values_use_defaults() {
        let timing = TimingConfig {
            ready_interval_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(timing.resolve().ready_interval, Duration::from_millis(300));
    }

    #[test]
    fn test_partial_json_is_filled_with_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"watchdog":{"enabled":true}}"#).unwrap();
        assert!(config.watchdog.enabled);
        assert_eq!(config.watchdog.process_name, "FinePrint.exe");
        assert_eq!(config.watchdog.printer_name, "A5");
        assert_eq!(config.print.print_type, 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.print.printer_name = "Ward-3".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or_default(&path);
        assert_eq!(loaded.print.printer_name, "Ward-3");
    }

    #[test]
    fn test_default_params_carry_sample_reportlet() {
        let params = PrintDefaults::default().to_params();
        assert!(params.validate().is_ok());
        assert_eq!(params.data.reportlets.len(), 1);
        assert_eq!(params.entry_url.as_deref(), Some(DEFAULT_ENTRY_URL));
    }
}
