use crate::errors::{PrinterError, Result};
use serde::{Deserialize, Serialize};

/// Payload understood by FineReport's `FR.doURLPrint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintParams {
    #[serde(default)]
    pub print_url: String,
    #[serde(default)]
    pub print_type: i32,
    #[serde(default)]
    pub page_type: i32,
    #[serde(default, rename = "isPopUp")]
    pub is_pop_up: bool,
    #[serde(default)]
    pub printer_name: String,
    #[serde(default)]
    pub data: PrintData,
    /// Page loaded into the print surface before `FR` is polled for.
    /// Falls back to the configured entry URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintData {
    #[serde(default)]
    pub reportlets: Vec<Reportlet>,
}

/// One report instance to render and print. Passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reportlet {
    pub reportlet: String,
    #[serde(default)]
    pub id_medpers: String,
    #[serde(default)]
    pub org_na: String,
    #[serde(default)]
    pub id_vismed: String,
    #[serde(default)]
    pub document_number: String,
}

impl PrintParams {
    /// Checked before any side effect of a print call.
    pub fn validate(&self) -> Result<()> {
        if self.print_url.trim().is_empty() {
            return Err(PrinterError::Validation("printUrl is required".to_string()));
        }
        if self.printer_name.trim().is_empty() {
            return Err(PrinterError::Validation("printerName is required".to_string()));
        }
        if self.data.reportlets.is_empty() {
            return Err(PrinterError::Validation(
                "at least one reportlet is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one print request, reported by the page or synthesized on timeout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResult {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, rename = "durationMs")]
    pub duration_ms: u64,
}
