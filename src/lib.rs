//! # Leadload - AI-assisted lead conversion and bulk upload
//!
//! Leadload ingests spreadsheets or delimited text files of prospective
//! sales contacts, infers a column-to-schema mapping with an AI completion
//! service, normalizes the data and bulk-uploads the records to Salesforce
//! through the Bulk API 2.0.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / Excel │────▶│   Reader    │────▶│  AI Mapper  │────▶│ Normalizer  │──┐
//! │  (auto-enc) │     └─────────────┘     └─────────────┘     └─────────────┘  │
//! └─────────────┘                                                              ▼
//! ┌─────────────┐     ┌──────────────────────┐                       ┌──────────────┐
//! │  Free text  │────▶│ Text-Record Extractor│──────────────────────▶│ Bulk Uploader│
//! └─────────────┘     └──────────────────────┘                       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leadload::{run_file_pipeline, AppConfig, FileKind, TargetSchema};
//!
//! let config = AppConfig::default();
//! let outcome = run_file_pipeline(
//!     path, FileKind::Csv, &TargetSchema::lead(), &config, &completion, &bulk,
//! ).await?;
//! println!("{} of {} leads created", outcome.upload.succeeded, outcome.upload.total);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Explicit runtime configuration
//! - [`models`] - Domain models (Lead, TargetSchema, UploadResult)
//! - [`reader`] - File parsing with encoding/delimiter auto-detection
//! - [`ai`] - Completion service client and prompts
//! - [`mapper`] - AI column mapping with validation
//! - [`normalize`] - Field cleanup and mandatory defaulting
//! - [`extract`] - Free-text record extraction
//! - [`salesforce`] - Authentication and Bulk API 2.0 upload
//! - [`pipeline`] - End-to-end orchestration
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Input
pub mod reader;

// AI
pub mod ai;
pub mod mapper;

// Transformation
pub mod extract;
pub mod normalize;

// Salesforce
pub mod salesforce;

// Orchestration
pub mod pipeline;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{AiError, AuthError, BulkError, ParseError, PipelineError, ServerError};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{AppConfig, BulkConfig, Environment, NormalizeConfig};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{ColumnMapping, Lead, RecordOutcome, TargetSchema, UploadResult};

// =============================================================================
// Re-exports - Reader
// =============================================================================

pub use reader::{detect_encoding, read_snippet, read_table, FileKind, ParsedTable};

// =============================================================================
// Re-exports - AI
// =============================================================================

pub use ai::{AiClient, Completion, CompletionOptions};

// =============================================================================
// Re-exports - Mapper & Normalizer
// =============================================================================

pub use mapper::infer_mapping;
pub use normalize::{clean_phone, format_email, format_name, money_to_integer, normalize_records};

// =============================================================================
// Re-exports - Extraction
// =============================================================================

pub use extract::extract_records;

// =============================================================================
// Re-exports - Salesforce
// =============================================================================

pub use salesforce::{
    batch_to_csv, get_access_token, upload_leads, AuthSession, BulkIngestApi, Credentials,
    JobState, SalesforceBulkClient,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    map_and_normalize, run_file_pipeline, run_text_pipeline, PipelineOutcome, TableInfo,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
