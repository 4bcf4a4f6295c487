//! Salesforce integration: OAuth token acquisition and the Bulk API 2.0
//! ingest pipeline.

pub mod auth;
pub mod bulk;

pub use auth::{get_access_token, AuthSession, Credentials};
pub use bulk::{
    batch_to_csv, upload_leads, BulkIngestApi, JobState, SalesforceBulkClient,
};
