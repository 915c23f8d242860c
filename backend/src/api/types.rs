//! REST API types for the web host.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::runner::RunReport;
use crate::sheet::Sheet;
use crate::strategy::Row;

/// Response sent after a sheet has been processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" or "warning" (some strategies failed)
    pub status: String,

    /// Header row of the processed sheet
    pub headers: Vec<String>,

    /// Processed rows, same order as uploaded
    pub rows: Vec<Row>,

    /// Error log lines
    pub errors: Vec<String>,

    pub summary: RunSummary,
}

/// Counters of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub rows: usize,
    pub changed: usize,
    pub error_count: usize,
    pub encoding: String,
    pub delimiter: String,
}

impl ProcessResponse {
    pub fn new(sheet: Sheet, report: RunReport) -> Self {
        let errors: Vec<String> = report
            .errors
            .lines()
            .map(str::to_string)
            .collect();

        ProcessResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if errors.is_empty() { "ready" } else { "warning" }.to_string(),
            summary: RunSummary {
                rows: report.rows,
                changed: report.changed,
                error_count: report.error_count,
                encoding: sheet.encoding,
                delimiter: sheet.delimiter.to_string(),
            },
            headers: sheet.headers,
            rows: sheet.rows,
            errors,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "headers": [],
        "rows": [],
        "errors": [error],
        "summary": {
            "rows": 0,
            "changed": 0,
            "errorCount": 1
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Sheet {
        Sheet::from_bytes(b"Api URL,api:temp\nhttps://x.test,21\n").unwrap()
    }

    #[test]
    fn test_ready_response() {
        let report = RunReport {
            rows: 1,
            changed: 1,
            error_count: 0,
            errors: String::new(),
        };
        let response = ProcessResponse::new(sheet(), report);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], "ready");
        assert_eq!(value["headers"][1], "api:temp");
        assert_eq!(value["rows"][0][1], "21");
        assert_eq!(value["summary"]["changed"], 1);
        assert_eq!(value["errors"], json!([]));
        assert!(value["jobId"].as_str().is_some());
    }

    #[test]
    fn test_warning_response_splits_errors() {
        let report = RunReport {
            rows: 1,
            changed: 0,
            error_count: 2,
            errors: "Row 2 - AnyAPI: HTTP 500: boom\nRow 3 - AnyAPI: HTTP 404: gone".into(),
        };
        let response = ProcessResponse::new(sheet(), report);

        assert_eq!(response.status, "warning");
        assert_eq!(response.errors.len(), 2);
        assert_eq!(response.errors[1], "Row 3 - AnyAPI: HTTP 404: gone");
    }

    #[test]
    fn test_error_response_shape() {
        let value = error_response("No file provided");
        assert_eq!(value["status"], "error");
        assert_eq!(value["errors"][0], "No file provided");
        assert_eq!(value["rows"], json!([]));
    }
}
