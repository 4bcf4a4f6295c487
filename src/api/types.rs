//! REST API response types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Environment;
use crate::models::UploadResult;
use crate::pipeline::PipelineOutcome;

/// Response sent after a file upload run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Correlation id for this run.
    pub job_id: String,

    /// "ok", "partial" or "error".
    pub status: String,

    /// Human-readable summary.
    pub message: String,

    /// Aggregated per-record outcomes.
    pub result: UploadResult,

    /// Metadata about the run.
    pub metadata: ResponseMetadata,
}

/// Metadata about one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub environment: String,
    pub processed_at: DateTime<Utc>,
    /// Fields the AI mapped to a source column (tabular path only).
    pub mapped_fields: Option<usize>,
    /// Source table info (tabular path only).
    pub table: Option<TableMetadata>,
}

/// Source table metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl UploadResponse {
    /// Build the response for a finished pipeline run.
    pub fn from_outcome(outcome: PipelineOutcome, environment: Environment) -> Self {
        let upload = &outcome.upload;
        let status = if upload.failed == 0 {
            "ok"
        } else if upload.succeeded > 0 {
            "partial"
        } else {
            "error"
        };
        let message = format!(
            "{} leads imported successfully. {} errors.",
            upload.succeeded, upload.failed
        );

        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            message,
            metadata: ResponseMetadata {
                environment: environment.to_string(),
                processed_at: Utc::now(),
                mapped_fields: outcome.mapping.as_ref().map(|m| m.mapped_count()),
                table: outcome.table.map(|t| TableMetadata {
                    encoding: t.encoding,
                    delimiter: t.delimiter.map(String::from).unwrap_or_default(),
                    row_count: t.row_count,
                    columns: t.headers,
                }),
            },
            result: outcome.upload,
        }
    }
}

/// Create an error response body.
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "message": error,
        "result": {
            "total": 0,
            "succeeded": 0,
            "failed": 0,
            "outcomes": [],
        },
    })
}
