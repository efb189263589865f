//! Printer queue driver backed by the Windows print-management cmdlets.

use crate::errors::{PrinterError, Result};
use crate::shell::{powershell_args, ps_quote, CommandRunner};
use crate::status::{self, PrintJob, PrinterStatus};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};

const POWERSHELL: &str = "powershell";

/// Forces UTF-8 output and turns non-terminating cmdlet errors into a non-zero exit.
const SCRIPT_PRELUDE: &str = "$ErrorActionPreference='Stop';\n$OutputEncoding=[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new();\n";

/// Queue operations against a named printer.
///
/// Every call spawns one external command; nothing is cached, so callers re-query
/// rather than trust state they observed earlier. No retries happen here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrintQueue: Send + Sync {
    async fn pause(&self, printer: &str) -> Result<()>;
    async fn resume(&self, printer: &str) -> Result<()>;
    async fn status(&self, printer: &str) -> Result<PrinterStatus>;
    async fn list_jobs(&self, printer: &str) -> Result<Vec<PrintJob>>;
    /// Callers treat a miss as "already gone"; the tool's error is still propagated.
    async fn remove_job(&self, printer: &str, job_id: u32) -> Result<()>;
}

pub struct SpoolerQueue {
    runner: Arc<dyn CommandRunner>,
    default_printer: String,
    utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrinterStatus {
    #[serde(default)]
    name: String,
    #[serde(default)]
    printer_status: i32,
    #[serde(default)]
    start_time: Option<i32>,
    #[serde(default)]
    until_time: Option<i32>,
}

impl SpoolerQueue {
    pub fn new(runner: Arc<dyn CommandRunner>, default_printer: impl Into<String>) -> Self {
        Self {
            runner,
            default_printer: default_printer.into(),
            utc_offset_minutes: None,
        }
    }

    /// Pins the UTC offset used to shift the pause window instead of reading the local zone.
    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }

    /// Status, listing and removal fall back to the default printer for a blank name.
    fn target_or_default<'a>(&'a self, name: &'a str) -> &'a str {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            &self.default_printer
        } else {
            trimmed
        }
    }

    fn required_target(name: &str) -> Result<&str> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(PrinterError::Validation("printer name is required".to_string()));
        }
        Ok(trimmed)
    }

    fn pause_window(&self) -> (i32, i32) {
        match self.utc_offset_minutes {
            Some(offset) => status::pause_window_for_offset(offset),
            None => status::local_pause_window(),
        }
    }

    /// Runs a PowerShell script and returns its trimmed output, or a `Command` error
    /// carrying the combined output when the script fails.
    async fn execute(&self, label: &str, script: String) -> Result<String> {
        let output = self
            .runner
            .run(POWERSHELL, &powershell_args(&script))
            .await
            .map_err(|e| {
                error!("{}: could not start PowerShell: {}", label, e);
                PrinterError::command(label, format!("could not start PowerShell: {}", e))
            })?;

        if !output.success {
            error!("{} failed (exit {:?}): {}", label, output.code, output.trimmed());
            return Err(PrinterError::command(label, output.trimmed()));
        }

        Ok(output
            .trimmed()
            .trim_start_matches('\u{feff}')
            .trim()
            .to_string())
    }
}

#[async_trait]
impl PrintQueue for SpoolerQueue {
    #[tracing::instrument(skip(self))]
    async fn pause(&self, printer: &str) -> Result<()> {
        let target = Self::required_target(printer)?;
        let (start, until) = self.pause_window();
        let label = format!("Set-Printer {}", target);
        let script = format!(
            "{}Set-Printer -Name {} -StartTime {} -UntilTime {}",
            SCRIPT_PRELUDE,
            ps_quote(target),
            start,
            until
        );

        self.execute(&label, script).await?;
        info!("Printer {} paused (window {}..{})", target, start, until);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn resume(&self, printer: &str) -> Result<()> {
        let target = Self::required_target(printer)?;
        let (start, until) = status::ALWAYS_AVAILABLE;
        let label = format!("Set-Printer {}", target);
        let script = format!(
            "{}Set-Printer -Name {} -StartTime {} -UntilTime {}",
            SCRIPT_PRELUDE,
            ps_quote(target),
            start,
            until
        );

        self.execute(&label, script).await?;
        info!("Printer {} resumed", target);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn status(&self, printer: &str) -> Result<PrinterStatus> {
        let target = self.target_or_default(printer);
        let label = format!("Get-Printer {}", target);
        let script = format!(
            "{}$p = Get-Printer -Name {};\n@{{ name = $p.Name; printerStatus = [int]$p.PrinterStatus; startTime = [int]$p.StartTime; untilTime = [int]$p.UntilTime }} | ConvertTo-Json -Depth 3",
            SCRIPT_PRELUDE,
            ps_quote(target)
        );

        let raw = self.execute(&label, script).await?;
        let status = parse_status(target, &raw).map_err(|e| {
            error!("{}: {}", label, e);
            PrinterError::command(&label, format!("unparsable output ({}): {}", e, raw))
        })?;
        debug!(
            "Printer {} status {} window {}..{} paused={}",
            status.name, status.printer_status, status.start_time, status.until_time, status.is_paused
        );
        Ok(status)
    }

    #[tracing::instrument(skip(self))]
    async fn list_jobs(&self, printer: &str) -> Result<Vec<PrintJob>> {
        let target = self.target_or_default(printer);
        let label = format!("Get-PrintJob {}", target);
        let script = format!(
            "{}$jobs = Get-PrintJob -PrinterName {} | Select-Object @{{Name='id';Expression={{$_.Id}}}}, @{{Name='computerName';Expression={{$_.ComputerName}}}}, @{{Name='printerName';Expression={{$_.PrinterName}}}}, @{{Name='documentName';Expression={{$_.DocumentName}}}}, @{{Name='submittedTime';Expression={{ if ($_.SubmittedTime) {{ $_.SubmittedTime.ToString('yyyy-MM-dd HH:mm:ss') }} else {{ '' }} }}}}, @{{Name='jobStatus';Expression={{ if ($_.JobStatus) {{ $_.JobStatus.ToString() }} else {{ '' }} }}}};\n$jobs = @($jobs);\n$jobs | ConvertTo-Json -Depth 3",
            SCRIPT_PRELUDE,
            ps_quote(target)
        );

        let raw = self.execute(&label, script).await?;
        let jobs = parse_jobs(&raw).map_err(|e| {
            error!("{}: {}", label, e);
            PrinterError::command(&label, format!("unparsable output ({}): {}", e, raw))
        })?;
        debug!("Printer {} has {} queued jobs", target, jobs.len());
        Ok(jobs)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_job(&self, printer: &str, job_id: u32) -> Result<()> {
        let target = self.target_or_default(printer);
        let label = format!("Remove-PrintJob {} #{}", target, job_id);
        let script = format!(
            "{}Remove-PrintJob -PrinterName {} -ID {}",
            SCRIPT_PRELUDE,
            ps_quote(target),
            job_id
        );

        self.execute(&label, script).await?;
        info!("Removed job {} from printer {}", job_id, target);
        Ok(())
    }
}

fn parse_status(target: &str, raw: &str) -> std::result::Result<PrinterStatus, serde_json::Error> {
    let parsed: RawPrinterStatus = serde_json::from_str(raw)?;
    let name = if parsed.name.is_empty() {
        target.to_string()
    } else {
        parsed.name
    };
    Ok(PrinterStatus::from_window(
        name,
        parsed.printer_status,
        parsed.start_time.unwrap_or(0),
        parsed.until_time.unwrap_or(0),
    ))
}

/// `ConvertTo-Json` prints nothing for an empty pipeline and unrolls a single
/// element into a bare object; both shapes are normalized to a list here.
pub fn parse_jobs(raw: &str) -> std::result::Result<Vec<PrintJob>, serde_json::Error> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "[]" || raw == "null" {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(raw)?;
    let mut jobs: Vec<PrintJob> = match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };

    for job in &mut jobs {
        job.submitted_time = status::normalize_submitted_time(&job.submitted_time);
    }
    Ok(jobs)
}
