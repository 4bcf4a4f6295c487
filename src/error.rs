//! Error types for the leadload conversion and upload pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ParseError`] - source file reading/parsing errors
//! - [`AiError`] - completion service errors
//! - [`AuthError`] - Salesforce token acquisition errors
//! - [`BulkError`] - Bulk API 2.0 job lifecycle errors
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Source File Errors
// =============================================================================

/// Errors while reading a source file into a table.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read the file at all.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// No encoding/delimiter combination produced a usable table.
    #[error("Unparsable file '{path}': no encoding/delimiter combination yields more than one column")]
    UnparsableFile { path: String },

    /// Spreadsheet engine failure (xls/xlsx).
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// File decoded but contains no data rows.
    #[error("File is empty")]
    EmptyFile,

    /// File has no header row.
    #[error("No headers found")]
    NoHeaders,

    /// Extension is not one of csv/xls/xlsx/txt.
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
}

// =============================================================================
// AI Completion Errors
// =============================================================================

/// Errors from the completion service.
#[derive(Debug, Error)]
pub enum AiError {
    /// Missing API key.
    #[error("Missing ANTHROPIC_API_KEY environment variable")]
    MissingApiKey,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The service answered with an error payload.
    #[error("API error: {0}")]
    ApiError(String),

    /// The response is not parseable into the expected shape.
    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),
}

// =============================================================================
// Salesforce Authentication Errors
// =============================================================================

/// Errors while acquiring a Salesforce access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required credential variables are not set.
    #[error("Missing credential variables: {0}")]
    MissingCredentials(String),

    /// The token request could not be sent.
    #[error("Token request failed: {0}")]
    RequestFailed(String),

    /// Salesforce rejected the credentials.
    #[error("Authentication rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

// =============================================================================
// Bulk API Errors
// =============================================================================

/// Errors from the Bulk API 2.0 job lifecycle.
///
/// These are batch-scoped: the uploader recovers by marking the whole
/// batch failed and moving on to the next one.
#[derive(Debug, Error)]
pub enum BulkError {
    /// Job creation returned a non-success status.
    #[error("Job creation failed (HTTP {status}): {body}")]
    JobCreation { status: u16, body: String },

    /// CSV payload upload was not accepted.
    #[error("Batch upload failed (HTTP {status}): {body}")]
    Upload { status: u16, body: String },

    /// Closing the job for processing failed.
    #[error("Job close failed (HTTP {status}): {body}")]
    Close { status: u16, body: String },

    /// The job did not reach a terminal state within the polling budget.
    #[error("Polling timed out after {attempts} attempts")]
    PollingTimeout { attempts: u32 },

    /// Result retrieval failed.
    #[error("Result retrieval failed (HTTP {status}): {body}")]
    Results { status: u16, body: String },

    /// Transport-level failure talking to the API.
    #[error("Bulk API request failed: {0}")]
    RequestFailed(String),
}

impl From<reqwest::Error> for BulkError {
    fn from(e: reqwest::Error) -> Self {
        BulkError::RequestFailed(e.to_string())
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// Only a handful of conditions abort a run entirely: unparsable input,
/// a failed column mapping, or authentication failure. Batch-level bulk
/// errors are absorbed into the [`crate::models::UploadResult`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source file error.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Completion service error.
    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    /// Token acquisition error.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// No records survived normalization.
    #[error("No records to upload")]
    EmptyInput,

    /// IO error staging or reading files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for file reading operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for AI operations.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type for bulk job operations.
pub type BulkResult<T> = Result<T, BulkError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ParseError -> PipelineError
        let parse_err = ParseError::EmptyFile;
        let pipeline_err: PipelineError = parse_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // AiError -> PipelineError
        let ai_err = AiError::MalformedResponse("not json".into());
        let pipeline_err: PipelineError = ai_err.into();
        assert!(pipeline_err.to_string().contains("not json"));
    }

    #[test]
    fn test_unparsable_file_message() {
        let err = ParseError::UnparsableFile {
            path: "leads.csv".into(),
        };
        assert!(err.to_string().contains("leads.csv"));
    }

    #[test]
    fn test_bulk_error_formats() {
        let err = BulkError::PollingTimeout { attempts: 30 };
        assert!(err.to_string().contains("30"));

        let err = BulkError::JobCreation {
            status: 400,
            body: "InvalidJob".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("InvalidJob"));
    }
}
