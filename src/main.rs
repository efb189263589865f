// Prevents additional console window on Windows in release mode
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use fine_report_printer::config::AppConfig;
use fine_report_printer::desktop::{self, AppExit, WebviewSurface, MAIN_WINDOW};
use fine_report_printer::logging;
use fine_report_printer::models::{PrintParams, PrintResult};
use fine_report_printer::monitor::{self, MonitorConfig, ParsedRequest, Scheduler, TaskConfig, TaskStatus};
use fine_report_printer::orchestrator::PrintOrchestrator;
use fine_report_printer::printer::{PrintQueue, SpoolerQueue};
use fine_report_printer::process::{ExecutableLauncher, HelperLauncher, TasklistProbe};
use fine_report_printer::shell::SystemRunner;
use fine_report_printer::status::{PrintJob, PrinterStatus};
use fine_report_printer::watchdog::{Watchdog, WatchdogController};
use fine_report_printer::PrinterError;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tauri::menu::{Menu, MenuItem, PredefinedMenuItem};
use tauri::tray::TrayIconBuilder;
use tauri::{Manager, State};
use tauri_plugin_store::StoreExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const STORE_FILE: &str = "config.json";

/// Global application state
pub struct AppState {
    config: Arc<Mutex<AppConfig>>,
    orchestrator: Arc<PrintOrchestrator>,
    queue: Arc<SpoolerQueue>,
    watchdog: Arc<WatchdogController>,
    monitor: Scheduler,
}

// ============================================================================
// Tauri IPC Commands
// ============================================================================

/// Suggested print payload for the UI
#[tauri::command]
fn default_print_params(state: State<'_, AppState>) -> PrintParams {
    state.orchestrator.default_params()
}

/// Run one print through the hidden print window
#[tauri::command]
async fn start_print(params: PrintParams, state: State<'_, AppState>) -> Result<PrintResult, String> {
    info!("Print requested for printer: {}", params.printer_name);
    state.orchestrator.print(params).await.map_err(|e| e.to_string())
}

/// Called by the page script when a print finishes
#[tauri::command]
fn notify_print_result(result: PrintResult, state: State<'_, AppState>) {
    state.orchestrator.notify_result(result);
}

#[tauri::command]
async fn pause_printer(name: String, state: State<'_, AppState>) -> Result<(), String> {
    state.queue.pause(&name).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn resume_printer(name: String, state: State<'_, AppState>) -> Result<(), String> {
    state.queue.resume(&name).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_printer_status(name: String, state: State<'_, AppState>) -> Result<PrinterStatus, String> {
    state.queue.status(&name).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_printer_jobs(name: String, state: State<'_, AppState>) -> Result<Vec<PrintJob>, String> {
    state.queue.list_jobs(&name).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn remove_print_job(printer_name: String, job_id: u32, state: State<'_, AppState>) -> Result<(), String> {
    info!("Removing job {} from {}", job_id, printer_name);
    state
        .queue
        .remove_job(&printer_name, job_id)
        .await
        .map_err(|e| e.to_string())
}

/// Watchdog lifecycle and state
#[tauri::command]
async fn watchdog_status(state: State<'_, AppState>) -> Result<serde_json::Value, String> {
    let running = state.watchdog.is_running().await;
    let enabled = state.config.lock().await.watchdog.enabled;
    Ok(json!({
        "enabled": enabled,
        "running": running,
        "state": state.watchdog.snapshot(),
    }))
}

#[tauri::command]
async fn start_watchdog(state: State<'_, AppState>) -> Result<(), String> {
    info!("Watchdog start requested");
    state.watchdog.start().await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn stop_watchdog(state: State<'_, AppState>) -> Result<(), String> {
    info!("Watchdog stop requested");
    state.watchdog.stop().await.map_err(|e| e.to_string())
}

/// Get current configuration
#[tauri::command]
async fn get_config(state: State<'_, AppState>) -> Result<AppConfig, String> {
    let config = state.config.lock().await;
    Ok(config.clone())
}

/// Save configuration. Timing and watchdog changes apply on next launch.
#[tauri::command]
async fn save_config(config: AppConfig, app: tauri::AppHandle, state: State<'_, AppState>) -> Result<(), String> {
    let mut app_config = state.config.lock().await;
    *app_config = config.clone();

    // Save to Tauri store
    let store = app.store(STORE_FILE).map_err(|e| e.to_string())?;
    store.set("config", serde_json::to_value(&config).map_err(|e| e.to_string())?);
    store.save().map_err(|e| e.to_string())?;

    // Startup settings (log directory) are read before the store is available
    config.save(&AppConfig::default_path()).map_err(|e| e.to_string())?;

    state
        .orchestrator
        .set_endpoints(&config.print.entry_url, &config.print.print_url);

    info!("Configuration saved");
    Ok(())
}

#[tauri::command]
async fn get_monitor_config(state: State<'_, AppState>) -> Result<MonitorConfig, String> {
    Ok(state.monitor.config().await)
}

#[tauri::command]
async fn save_monitor_config(config: MonitorConfig, state: State<'_, AppState>) -> Result<(), String> {
    state.monitor.save_config(config).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn reload_monitor(state: State<'_, AppState>) -> Result<usize, String> {
    let count = state.monitor.reload().await.map_err(|e| e.to_string())?;
    info!("Monitor config reloaded ({} tasks scheduled)", count);
    Ok(count)
}

#[tauri::command]
async fn get_monitor_status(state: State<'_, AppState>) -> Result<BTreeMap<String, TaskStatus>, String> {
    Ok(state.monitor.status().await)
}

#[tauri::command]
async fn add_monitor_task(task: TaskConfig, state: State<'_, AppState>) -> Result<(), String> {
    info!("Adding monitor task: {}", task.name);
    state.monitor.add_task(task).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn remove_monitor_task(task_name: String, state: State<'_, AppState>) -> Result<(), String> {
    info!("Removing monitor task: {}", task_name);
    state.monitor.remove_task(&task_name).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn update_monitor_task(task: TaskConfig, state: State<'_, AppState>) -> Result<(), String> {
    info!("Updating monitor task: {}", task.name);
    state.monitor.update_task(task).await.map_err(|e| e.to_string())
}

#[tauri::command]
async fn test_pushplus(token: String, title: String, content: String, state: State<'_, AppState>) -> Result<(), String> {
    let push_plus_url = state.monitor.config().await.push_plus_url;
    monitor::Executor::new()
        .with_push_plus_url(push_plus_url)
        .test_pushplus(&token, &title, &content)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
fn parse_curl(curl_cmd: String) -> Result<ParsedRequest, String> {
    monitor::parse_curl(&curl_cmd).map_err(|e| e.to_string())
}

#[tauri::command]
fn show_window(app: tauri::AppHandle) {
    show_main_window(&app);
}

#[tauri::command]
fn hide_window(app: tauri::AppHandle) {
    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
        let _ = window.hide();
    }
}

#[tauri::command]
fn quit_app(app: tauri::AppHandle) {
    info!("Quit requested from UI");
    app.exit(0);
}

fn show_main_window(app: &tauri::AppHandle) {
    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
        let _ = window.show();
        let _ = window.unminimize();
        let _ = window.set_focus();
    }
}

// ============================================================================
// System Tray
// ============================================================================

fn setup_system_tray(app: &tauri::AppHandle) -> Result<(), Box<dyn std::error::Error>> {
    let show = MenuItem::with_id(app, "show", "Show Window", true, None::<&str>)?;
    let hide = MenuItem::with_id(app, "hide", "Hide Window", true, None::<&str>)?;
    let separator = PredefinedMenuItem::separator(app)?;
    let quit = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;

    let menu = Menu::with_items(app, &[&show, &hide, &separator, &quit])?;

    let mut tray = TrayIconBuilder::new()
        .menu(&menu)
        .tooltip("FineReport Printer")
        .on_menu_event(move |app, event| match event.id().as_ref() {
            "quit" => {
                info!("Quit requested from tray menu");
                app.exit(0);
            }
            "show" => show_main_window(app),
            "hide" => {
                if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
                    let _ = window.hide();
                }
            }
            _ => {}
        });
    if let Some(icon) = app.default_window_icon() {
        tray = tray.icon(icon.clone());
    }
    tray.build(app)?;

    Ok(())
}

// ============================================================================
// Background Services
// ============================================================================

fn build_state(app: &tauri::AppHandle, config: AppConfig) -> Result<AppState, PrinterError> {
    let runner = Arc::new(SystemRunner);

    let orchestrator = Arc::new(PrintOrchestrator::new(
        Arc::new(WebviewSurface::new(app.clone())),
        config.print.clone(),
        config.timing.resolve(),
    ));

    let queue = Arc::new(SpoolerQueue::new(runner.clone(), config.watchdog.printer_name.clone()));

    let launcher: Arc<dyn HelperLauncher> = match ExecutableLauncher::beside_current_exe(&config.watchdog.helper_name) {
        Ok(launcher) => {
            info!("Helper path: {}", launcher.path().display());
            Arc::new(launcher)
        }
        Err(e) => {
            warn!("Cannot resolve helper beside executable ({}), using working directory", e);
            Arc::new(ExecutableLauncher::new(&config.watchdog.helper_name))
        }
    };

    let watchdog = Arc::new(Watchdog::new(
        queue.clone(),
        Arc::new(TasklistProbe::new(runner)),
        launcher,
        Arc::new(AppExit::new(app.clone())),
        config.watchdog.process_name.clone(),
        config.watchdog.printer_name.clone(),
    ));
    let watchdog = Arc::new(WatchdogController::new(watchdog, config.watchdog.poll_interval()));

    let monitor = Scheduler::load(config.monitor_config_path())?;

    Ok(AppState {
        config: Arc::new(Mutex::new(config)),
        orchestrator,
        queue,
        watchdog,
        monitor,
    })
}

fn load_stored_config(app: &tauri::App, fallback: AppConfig) -> AppConfig {
    let store = match app.store(STORE_FILE) {
        Ok(store) => store,
        Err(e) => {
            warn!("Config store unavailable: {}", e);
            return fallback;
        }
    };
    match store.get("config") {
        Some(stored) => match serde_json::from_value::<AppConfig>(stored) {
            Ok(config) => {
                info!("Config loaded from store");
                config
            }
            Err(e) => {
                warn!("Ignoring stored config: {}", e);
                fallback
            }
        },
        None => {
            info!("No stored config found, using defaults");
            fallback
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let initial_config = AppConfig::load_or_default(&AppConfig::default_path());
    let _log_guard = logging::init(&initial_config.log_dir());

    info!("========================================");
    info!("FineReport Printer Starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("========================================");

    tauri::async_runtime::set(tokio::runtime::Handle::current());

    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            show_main_window(app);
        }))
        .plugin(tauri_plugin_store::Builder::default().build())
        .setup(move |app| {
            let config = load_stored_config(app, initial_config);
            let watchdog_enabled = config.watchdog.enabled;

            let state = build_state(app.handle(), config)?;
            desktop::open_print_window(app.handle(), state.orchestrator.clone())?;

            let watchdog = state.watchdog.clone();
            let scheduler = state.monitor.clone();
            app.manage(state);

            setup_system_tray(app.handle())?;
            info!("System tray initialized");

            tauri::async_runtime::spawn(async move {
                if watchdog_enabled {
                    if let Err(e) = watchdog.start().await {
                        error!("Failed to start watchdog: {}", e);
                    }
                } else {
                    info!("Watchdog disabled");
                }

                let scheduled = scheduler.start().await;
                info!("API monitor started ({} tasks)", scheduled);
            });

            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                if window.label() != MAIN_WINDOW {
                    return;
                }
                let exit_allowed = window
                    .try_state::<AppState>()
                    .map(|state| state.watchdog.snapshot().exit_allowed)
                    .unwrap_or(false);
                if !exit_allowed {
                    api.prevent_close();
                    let _ = window.hide();
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            default_print_params,
            start_print,
            notify_print_result,
            pause_printer,
            resume_printer,
            get_printer_status,
            get_printer_jobs,
            remove_print_job,
            watchdog_status,
            start_watchdog,
            stop_watchdog,
            get_config,
            save_config,
            get_monitor_config,
            save_monitor_config,
            reload_monitor,
            get_monitor_status,
            add_monitor_task,
            remove_monitor_task,
            update_monitor_task,
            test_pushplus,
            parse_curl,
            show_window,
            hide_window,
            quit_app,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");

    info!("FineReport Printer shutting down...");
}
