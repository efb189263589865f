//! Printer and spooler job state as reported by the Windows print cmdlets.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: i32 = 1440;

/// Availability window that marks a printer as paused by this application.
///
/// The spooler has no pause flag reachable through `Set-Printer`, so a paused queue is
/// encoded as the window 00:00..00:02. Anything that sets exactly this window for
/// another reason (an administrator, another tool) will be read back as "paused".
pub const PAUSE_SENTINEL: (i32, i32) = (0, 2);

/// Window meaning "always available".
pub const ALWAYS_AVAILABLE: (i32, i32) = (0, 0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterStatus {
    pub name: String,
    pub printer_status: i32,
    pub start_time: i32,
    pub until_time: i32,
    pub is_paused: bool,
}

impl PrinterStatus {
    /// Builds a status, deriving `is_paused` from the window rather than trusting the tool.
    pub fn from_window(name: impl Into<String>, printer_status: i32, start_time: i32, until_time: i32) -> Self {
        Self {
            name: name.into(),
            printer_status,
            start_time,
            until_time,
            is_paused: is_pause_window(start_time, until_time),
        }
    }
}

pub fn is_pause_window(start: i32, until: i32) -> bool {
    (start, until) == PAUSE_SENTINEL
}

/// Window to hand to `Set-Printer` so the printer reads back as [`PAUSE_SENTINEL`].
///
/// `Set-Printer` interprets the minutes in UTC while `Get-Printer` reports local time,
/// so the write is shifted by the local UTC offset (in minutes, east positive).
pub fn pause_window_for_offset(utc_offset_minutes: i32) -> (i32, i32) {
    let start = (PAUSE_SENTINEL.0 - utc_offset_minutes).rem_euclid(MINUTES_PER_DAY);
    let until = (start + PAUSE_SENTINEL.1 - PAUSE_SENTINEL.0).rem_euclid(MINUTES_PER_DAY);
    (start, until)
}

pub fn local_pause_window() -> (i32, i32) {
    let offset_secs = Local::now().offset().local_minus_utc();
    pause_window_for_offset(offset_secs / 60)
}

/// A job currently sitting in the spooler queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    pub id: u32,
    #[serde(default)]
    pub computer_name: String,
    #[serde(default)]
    pub printer_name: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub submitted_time: String,
    #[serde(default)]
    pub job_status: String,
}

const SUBMITTED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalizes a spooler timestamp to `YYYY-MM-DD HH:MM:SS` local time.
///
/// Accepts the already formatted value, ISO-8601, or the `/Date(ms)/` form
/// `ConvertTo-Json` emits for raw `DateTime` values. Unknown shapes pass through.
pub fn normalize_submitted_time(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if let Some(inner) = raw.strip_prefix("/Date(").and_then(|s| s.strip_suffix(")/")) {
        let millis = inner
            .split(|c: char| c == '+' || (c == '-' && !inner.starts_with('-')))
            .next()
            .and_then(|v| v.parse::<i64>().ok());
        if let Some(dt) = millis.and_then(DateTime::<Utc>::from_timestamp_millis) {
            return dt.with_timezone(&Local).format(SUBMITTED_FORMAT).to_string();
        }
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, SUBMITTED_FORMAT) {
        return dt.format(SUBMITTED_FORMAT).to_string();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format(SUBMITTED_FORMAT).to_string();
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format(SUBMITTED_FORMAT).to_string();
    }

    raw.to_string()
}
