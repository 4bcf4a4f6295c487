//! Bulk API 2.0 lead upload.
//!
//! Normalized leads are chunked into batches, each batch driven through
//! one ingest job: create -> upload CSV -> close -> poll -> collect
//! per-record results. Batches run strictly sequentially; a batch that
//! dies at any lifecycle step is marked wholly failed and processing
//! continues with the next one. The aggregated [`UploadResult`] always
//! accounts for every submitted record.
//!
//! The Salesforce HTTP surface sits behind [`BulkIngestApi`] so tests can
//! drive the orchestration against fakes.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::BulkConfig;
use crate::error::{BulkError, BulkResult};
use crate::models::{Lead, RecordOutcome, UploadResult};
use crate::salesforce::auth::AuthSession;

// =============================================================================
// Job state
// =============================================================================

/// Bulk API 2.0 ingest job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Open,
    UploadComplete,
    InProgress,
    JobComplete,
    Failed,
    Aborted,
}

impl JobState {
    /// Terminal states stop the polling loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::JobComplete | JobState::Failed | JobState::Aborted)
    }
}

/// One successful row from the job's result set.
#[derive(Debug, Clone)]
pub struct SuccessRow {
    /// Created record id.
    pub id: String,
    /// Original position within the batch.
    pub index: usize,
}

/// One failed row from the job's result set.
#[derive(Debug, Clone)]
pub struct FailureRow {
    /// Original position within the batch.
    pub index: usize,
    /// Error message reported by Salesforce.
    pub error: String,
}

// =============================================================================
// Ingest API capability
// =============================================================================

/// The Bulk API calls the uploader consumes.
pub trait BulkIngestApi: Send + Sync {
    /// Create an ingest job, returning its id.
    fn create_job(&self) -> impl Future<Output = BulkResult<String>> + Send;

    /// Upload the batch CSV payload to the job.
    fn upload_batch(&self, job_id: &str, csv: &str) -> impl Future<Output = BulkResult<()>> + Send;

    /// Signal upload complete so Salesforce starts processing.
    fn close_job(&self, job_id: &str) -> impl Future<Output = BulkResult<()>> + Send;

    /// Current job state.
    fn job_status(&self, job_id: &str) -> impl Future<Output = BulkResult<JobState>> + Send;

    /// CSV of successfully processed rows.
    fn successful_results(&self, job_id: &str) -> impl Future<Output = BulkResult<String>> + Send;

    /// CSV of failed rows.
    fn failed_results(&self, job_id: &str) -> impl Future<Output = BulkResult<String>> + Send;

    /// Best-effort job abort after a failed upload.
    fn abort_job(&self, job_id: &str) -> impl Future<Output = BulkResult<()>> + Send;
}

// =============================================================================
// HTTP client
// =============================================================================

#[derive(Debug, Deserialize)]
struct JobInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatusInfo {
    state: JobState,
}

/// Real [`BulkIngestApi`] implementation over the Salesforce REST API.
#[derive(Clone)]
pub struct SalesforceBulkClient {
    http: reqwest::Client,
    session: AuthSession,
    api_version: String,
}

impl SalesforceBulkClient {
    pub fn new(session: AuthSession, api_version: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            session,
            // Tolerate a configured version carrying the `v` prefix
            api_version: api_version.trim_start_matches('v').to_string(),
        }
    }

    fn ingest_url(&self) -> String {
        format!(
            "{}/services/data/v{}/jobs/ingest",
            self.session.instance_url, self.api_version
        )
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.ingest_url(), job_id)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.session.access_token)
    }

    async fn get_text(
        &self,
        url: String,
        on_error: fn(u16, String) -> BulkError,
    ) -> BulkResult<String> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.bearer())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(on_error(status.as_u16(), body));
        }
        Ok(body)
    }
}

impl BulkIngestApi for SalesforceBulkClient {
    async fn create_job(&self) -> BulkResult<String> {
        // Line ending declared explicitly: Salesforce rejects jobs whose
        // payload endings do not match ("LineEnding is invalid on user data").
        let job_data = serde_json::json!({
            "object": "Lead",
            "contentType": "CSV",
            "operation": "insert",
            "lineEnding": "LF",
        });

        let response = self
            .http
            .post(self.ingest_url())
            .header("Authorization", self.bearer())
            .json(&job_data)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BulkError::JobCreation {
                status: status.as_u16(),
                body,
            });
        }

        let info: JobInfo = serde_json::from_str(&body).map_err(|e| BulkError::JobCreation {
            status: status.as_u16(),
            body: format!("unreadable job info: {}", e),
        })?;
        Ok(info.id)
    }

    async fn upload_batch(&self, job_id: &str, csv: &str) -> BulkResult<()> {
        let response = self
            .http
            .put(format!("{}/batches", self.job_url(job_id)))
            .header("Authorization", self.bearer())
            .header("Content-Type", "text/csv")
            .header("Accept", "application/json")
            .body(csv.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Upload {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn close_job(&self, job_id: &str) -> BulkResult<()> {
        let response = self
            .http
            .patch(self.job_url(job_id))
            .header("Authorization", self.bearer())
            .json(&serde_json::json!({ "state": "UploadComplete" }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Close {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn job_status(&self, job_id: &str) -> BulkResult<JobState> {
        let body = self
            .get_text(self.job_url(job_id), |status, body| BulkError::RequestFailed(
                format!("status check HTTP {}: {}", status, body),
            ))
            .await?;

        let info: JobStatusInfo = serde_json::from_str(&body)
            .map_err(|e| BulkError::RequestFailed(format!("unreadable job status: {}", e)))?;
        Ok(info.state)
    }

    async fn successful_results(&self, job_id: &str) -> BulkResult<String> {
        self.get_text(
            format!("{}/successfulResults", self.job_url(job_id)),
            |status, body| BulkError::Results { status, body },
        )
        .await
    }

    async fn failed_results(&self, job_id: &str) -> BulkResult<String> {
        self.get_text(
            format!("{}/failedResults", self.job_url(job_id)),
            |status, body| BulkError::Results { status, body },
        )
        .await
    }

    async fn abort_job(&self, job_id: &str) -> BulkResult<()> {
        let response = self
            .http
            .patch(self.job_url(job_id))
            .header("Authorization", self.bearer())
            .json(&serde_json::json!({ "state": "Aborted" }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Close {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// =============================================================================
// CSV payload
// =============================================================================

/// Serialize a batch to the CSV payload Salesforce expects.
///
/// Columns that are empty across the whole batch are dropped, literal
/// `nan` markers are cleared, values are truncated to the field ceiling,
/// and line endings are forced to LF (with a defensive CR sweep even
/// though the writer already emits LF).
pub fn batch_to_csv(leads: &[Lead], field_max_len: usize) -> String {
    let columns: Vec<&str> = Lead::FIELDS
        .iter()
        .copied()
        .filter(|field| leads.iter().any(|lead| !lead.get(field).trim().is_empty()))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let _ = writer.write_record(&columns);
    for lead in leads {
        let record: Vec<String> = columns
            .iter()
            .map(|field| clean_cell(lead.get(field), field_max_len))
            .collect();
        let _ = writer.write_record(&record);
    }

    let bytes = writer.into_inner().unwrap_or_default();
    normalize_line_endings(&String::from_utf8_lossy(&bytes))
}

fn clean_cell(value: &str, field_max_len: usize) -> String {
    let trimmed = value.trim();
    if trimmed == "nan" {
        return String::new();
    }
    if trimmed.chars().count() > field_max_len {
        trimmed.chars().take(field_max_len).collect()
    } else {
        trimmed.to_string()
    }
}

/// Force Unix line endings.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// =============================================================================
// Result CSV parsing
// =============================================================================

/// Parse the successful-results CSV: `(created id, original index)` rows.
pub fn parse_success_csv(text: &str) -> Vec<SuccessRow> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .records()
        .filter_map(Result::ok)
        .filter_map(|record| {
            let id = record.get(0)?.trim().trim_matches('"').to_string();
            let index = record.get(1)?.trim().parse().ok()?;
            if id.is_empty() {
                return None;
            }
            Some(SuccessRow { id, index })
        })
        .collect()
}

/// Parse the failed-results CSV: `(original index, error message)` rows.
pub fn parse_failure_csv(text: &str) -> Vec<FailureRow> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    reader
        .records()
        .filter_map(Result::ok)
        .map(|record| {
            let index = record
                .get(0)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            let error = record
                .get(1)
                .map(|v| v.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "Unknown error".to_string());
            FailureRow { index, error }
        })
        .collect()
}

// =============================================================================
// Orchestration
// =============================================================================

/// Results collected from one terminal job.
struct BatchResults {
    state: JobState,
    successes: Vec<SuccessRow>,
    failures: Vec<FailureRow>,
}

/// Submit all leads in sequential batches and aggregate the outcome.
pub async fn upload_leads<A: BulkIngestApi>(
    api: &A,
    leads: &[Lead],
    config: &BulkConfig,
) -> UploadResult {
    let total = leads.len();
    if total == 0 {
        return UploadResult::from_outcomes(0, Vec::new());
    }

    let batch_size = config.batch_size.max(1);
    let batch_count = total.div_ceil(batch_size);
    let mut outcomes: Vec<RecordOutcome> = Vec::with_capacity(total);

    for (batch_idx, batch) in leads.chunks(batch_size).enumerate() {
        log_info(format!(
            "Processing batch {}/{} ({} records)",
            batch_idx + 1,
            batch_count,
            batch.len()
        ));

        match run_batch(api, batch, config).await {
            Ok(results) => {
                log_success(format!(
                    "Batch {}/{}: {} created, {} failed (job state {:?})",
                    batch_idx + 1,
                    batch_count,
                    results.successes.len(),
                    results.failures.len(),
                    results.state
                ));
                outcomes.extend(join_results(batch, &results));
            }
            Err(e) => {
                log_error(format!("Batch {}/{} failed: {}", batch_idx + 1, batch_count, e));
                for lead in batch {
                    outcomes.push(RecordOutcome::failed(lead, format!("Batch failed: {}", e)));
                }
            }
        }
    }

    let result = UploadResult::from_outcomes(total, outcomes);
    log_info(format!(
        "Upload finished: {} of {} records created",
        result.succeeded, result.total
    ));
    result
}

/// Attach names and e-mails to the per-row results by original position.
fn join_results(batch: &[Lead], results: &BatchResults) -> Vec<RecordOutcome> {
    let mut slots: Vec<Option<RecordOutcome>> = vec![None; batch.len()];

    for success in &results.successes {
        if let Some(lead) = batch.get(success.index) {
            slots[success.index] = Some(RecordOutcome::created(lead, success.id.clone()));
        }
    }
    for failure in &results.failures {
        if let Some(lead) = batch.get(failure.index) {
            // A row both succeeded and failed should not happen; failures win
            slots[failure.index] = Some(RecordOutcome::failed(lead, failure.error.clone()));
        }
    }

    slots.into_iter().flatten().collect()
}

/// Drive one batch through the full job lifecycle.
async fn run_batch<A: BulkIngestApi>(
    api: &A,
    batch: &[Lead],
    config: &BulkConfig,
) -> BulkResult<BatchResults> {
    let job_id = api.create_job().await?;
    log_success(format!("Ingest job created: {}", job_id));

    let csv = batch_to_csv(batch, config.field_max_len);
    if let Err(e) = api.upload_batch(&job_id, &csv).await {
        // Best-effort cleanup so the org is not left with an open job
        if let Err(abort_err) = api.abort_job(&job_id).await {
            log_warning(format!("Could not abort job {}: {}", job_id, abort_err));
        }
        return Err(e);
    }

    api.close_job(&job_id).await?;

    let state = poll_until_terminal(api, &job_id, config).await?;

    let successes = match api.successful_results(&job_id).await {
        Ok(text) => parse_success_csv(&text),
        Err(e) => {
            log_warning(format!("Could not fetch successful results: {}", e));
            Vec::new()
        }
    };
    let failures = match api.failed_results(&job_id).await {
        Ok(text) => parse_failure_csv(&text),
        Err(e) => {
            log_warning(format!("Could not fetch failed results: {}", e));
            Vec::new()
        }
    };

    Ok(BatchResults {
        state,
        successes,
        failures,
    })
}

/// Poll the job at a fixed interval until it reaches a terminal state or
/// the attempt budget runs out.
async fn poll_until_terminal<A: BulkIngestApi>(
    api: &A,
    job_id: &str,
    config: &BulkConfig,
) -> BulkResult<JobState> {
    for attempt in 1..=config.max_poll_attempts {
        tokio::time::sleep(config.poll_interval).await;

        match api.job_status(job_id).await {
            Ok(state) if state.is_terminal() => {
                log_info(format!("Job {} reached terminal state {:?}", job_id, state));
                return Ok(state);
            }
            Ok(state) => {
                log_info(format!(
                    "Job {} state: {:?} (attempt {}/{})",
                    job_id, state, attempt, config.max_poll_attempts
                ));
            }
            Err(e) => {
                log_warning(format!(
                    "Status check failed (attempt {}/{}): {}",
                    attempt, config.max_poll_attempts, e
                ));
            }
        }
    }

    Err(BulkError::PollingTimeout {
        attempts: config.max_poll_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn lead(last: &str, email: &str) -> Lead {
        Lead {
            last_name: last.to_string(),
            company: "Acme".to_string(),
            email: email.to_string(),
            ..Lead::default()
        }
    }

    fn fast_config(batch_size: usize) -> BulkConfig {
        BulkConfig {
            batch_size,
            poll_interval: Duration::ZERO,
            max_poll_attempts: 3,
            ..BulkConfig::default()
        }
    }

    /// Scripted fake: one entry per job the fake will hand out.
    #[derive(Default)]
    struct FakeApi {
        /// Batches whose job creation is rejected (0-based job sequence).
        fail_create_for: Vec<usize>,
        /// Reject every CSV upload.
        fail_upload: bool,
        /// Job state reported once polling starts.
        state: Option<JobState>,
        /// Canned result CSVs.
        success_csv: String,
        failure_csv: String,
        jobs_created: AtomicUsize,
        aborted: Mutex<Vec<String>>,
        uploads: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn completing(success_csv: &str, failure_csv: &str) -> Self {
            Self {
                state: Some(JobState::JobComplete),
                success_csv: success_csv.to_string(),
                failure_csv: failure_csv.to_string(),
                ..Self::default()
            }
        }
    }

    impl BulkIngestApi for FakeApi {
        async fn create_job(&self) -> BulkResult<String> {
            let n = self.jobs_created.fetch_add(1, Ordering::SeqCst);
            if self.fail_create_for.contains(&n) {
                return Err(BulkError::JobCreation {
                    status: 400,
                    body: "rejected".into(),
                });
            }
            Ok(format!("750-{}", n))
        }

        async fn upload_batch(&self, _job_id: &str, csv: &str) -> BulkResult<()> {
            if self.fail_upload {
                return Err(BulkError::Upload {
                    status: 422,
                    body: "bad payload".into(),
                });
            }
            self.uploads.lock().unwrap().push(csv.to_string());
            Ok(())
        }

        async fn close_job(&self, _job_id: &str) -> BulkResult<()> {
            Ok(())
        }

        async fn job_status(&self, _job_id: &str) -> BulkResult<JobState> {
            Ok(self.state.unwrap_or(JobState::InProgress))
        }

        async fn successful_results(&self, _job_id: &str) -> BulkResult<String> {
            Ok(self.success_csv.clone())
        }

        async fn failed_results(&self, _job_id: &str) -> BulkResult<String> {
            Ok(self.failure_csv.clone())
        }

        async fn abort_job(&self, job_id: &str) -> BulkResult<()> {
            self.aborted.lock().unwrap().push(job_id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_happy_path_joins_results_by_index() {
        let api = FakeApi::completing(
            "sf__Id,sf__Index\n00Q001,0\n00Q002,2\n",
            "sf__Index,sf__Error\n1,Duplicate detected\n",
        );
        let leads = vec![
            lead("Silva", "s@a.com"),
            lead("Santos", "t@a.com"),
            lead("Souza", "z@a.com"),
        ];

        let result = upload_leads(&api, &leads, &fast_config(2000)).await;

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert!(result.is_success());

        assert_eq!(result.outcomes[0].id.as_deref(), Some("00Q001"));
        assert_eq!(result.outcomes[0].name, "Silva");
        let failed: Vec<_> = result.outcomes.iter().filter(|o| !o.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "Santos");
        assert!(failed[0].errors[0].contains("Duplicate"));
    }

    #[tokio::test]
    async fn test_aggregation_invariant_with_failed_batch() {
        // 5 leads in batches of 2 -> 3 jobs; the second job fails creation
        let mut api = FakeApi::completing(
            "sf__Id,sf__Index\n00Q001,0\n00Q002,1\n",
            "sf__Index,sf__Error\n",
        );
        api.fail_create_for = vec![1];

        let leads: Vec<Lead> = (0..5).map(|i| lead(&format!("L{}", i), "")).collect();
        let result = upload_leads(&api, &leads, &fast_config(2)).await;

        assert_eq!(result.total, 5);
        assert_eq!(result.succeeded + result.failed, 5);
        assert_eq!(result.outcomes.len(), 5);
        // The failed batch's records carry the job creation error
        let creation_failures: Vec<_> = result
            .outcomes
            .iter()
            .filter(|o| o.errors.iter().any(|e| e.contains("Job creation failed")))
            .collect();
        assert_eq!(creation_failures.len(), 2);
    }

    #[tokio::test]
    async fn test_polling_timeout_marks_batch_failed() {
        let api = FakeApi {
            state: Some(JobState::InProgress),
            ..FakeApi::default()
        };
        let leads: Vec<Lead> = (0..5).map(|i| lead(&format!("L{}", i), "")).collect();

        let result = upload_leads(&api, &leads, &fast_config(2000)).await;

        assert_eq!(result.total, 5);
        assert_eq!(result.failed, 5);
        assert!(!result.is_success());
        for outcome in &result.outcomes {
            assert!(outcome.errors.iter().any(|e| e.contains("timed out")));
        }
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_job() {
        let api = FakeApi {
            fail_upload: true,
            state: Some(JobState::JobComplete),
            ..FakeApi::default()
        };
        let leads = vec![lead("Silva", "")];

        let result = upload_leads(&api, &leads, &fast_config(2000)).await;

        assert_eq!(result.failed, 1);
        assert_eq!(api.aborted.lock().unwrap().as_slice(), ["750-0"]);
    }

    #[tokio::test]
    async fn test_terminal_failed_state_with_results() {
        let api = FakeApi {
            state: Some(JobState::Failed),
            failure_csv: "sf__Index,sf__Error\n0,LineEnding is invalid on user data\n".into(),
            ..FakeApi::default()
        };
        let leads = vec![lead("Silva", "")];

        let result = upload_leads(&api, &leads, &fast_config(2000)).await;
        assert_eq!(result.failed, 1);
        assert!(result.outcomes[0].errors[0].contains("LineEnding"));
    }

    #[tokio::test]
    async fn test_csv_payload_shape() {
        let api = FakeApi::completing("sf__Id,sf__Index\n", "sf__Index,sf__Error\n");
        let mut long_lead = lead("Silva", "s@a.com");
        long_lead.street = "x".repeat(300);
        let mut nan_lead = lead("Santos", "");
        nan_lead.phone = "nan".into();
        let leads = vec![long_lead, nan_lead];

        let _ = upload_leads(&api, &leads, &fast_config(2000)).await;

        let uploads = api.uploads.lock().unwrap();
        let csv = &uploads[0];
        // No CR anywhere, LF-terminated
        assert!(!csv.contains('\r'));
        // All-empty columns (FirstName, Title, ...) are dropped; Phone
        // stays because the raw "nan" only empties out per-cell
        assert!(csv.starts_with("LastName,Company,Email,Phone,Street"));
        assert!(!csv.contains("FirstName"));
        // 255-char ceiling applied
        assert!(!csv.contains(&"x".repeat(256)));
        assert!(csv.contains(&"x".repeat(255)));
        // nan cleared
        assert!(!csv.contains("nan"));
    }

    #[test]
    fn test_batch_to_csv_line_endings() {
        let mut l = lead("Silva", "a@b.com");
        l.street = "Rua A\r\nApto 2".into();
        let csv = batch_to_csv(&[l], 255);
        assert!(!csv.contains('\r'));
    }

    #[test]
    fn test_parse_success_csv() {
        let rows = parse_success_csv("sf__Id,sf__Index\n\"00Q1\",0\n00Q2,1\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "00Q1");
        assert_eq!(rows[1].index, 1);
    }

    #[test]
    fn test_parse_failure_csv_tolerates_garbage() {
        let rows = parse_failure_csv("sf__Index,sf__Error\nnot-a-number,Something broke\n2,\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].error, "Something broke");
        assert_eq!(rows[1].error, "Unknown error");
    }

    #[test]
    fn test_job_state_terminality() {
        assert!(JobState::JobComplete.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Aborted.is_terminal());
        assert!(!JobState::Open.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
        assert!(!JobState::UploadComplete.is_terminal());
    }

    #[test]
    fn test_job_state_deserializes_from_api_names() {
        let state: JobState = serde_json::from_str("\"JobComplete\"").unwrap();
        assert_eq!(state, JobState::JobComplete);
        let state: JobState = serde_json::from_str("\"UploadComplete\"").unwrap();
        assert_eq!(state, JobState::UploadComplete);
    }
}
