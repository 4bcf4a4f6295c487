//! End-to-end orchestration.
//!
//! Two input paths feed the Bulk Uploader:
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌──────────────┐
//! │  Reader  │──▶│  Mapper │──▶│ Normalizer │──▶│ Bulk Uploader│
//! └──────────┘   └─────────┘   └────────────┘   └──────┬───────┘
//! ┌───────────────────────┐                            │
//! │ Text-Record Extractor │────────────────────────────┘
//! └───────────────────────┘
//! ```
//!
//! Per-cell problems become defaults, batch problems become failed
//! outcomes; only unparsable input, a failed column mapping, or an
//! authentication failure abort the run.

use serde::Serialize;
use std::path::Path;

use crate::ai::Completion;
use crate::api::logs::{log_info, log_success};
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::extract::extract_records;
use crate::mapper::infer_mapping;
use crate::models::{ColumnMapping, Lead, TargetSchema, UploadResult};
use crate::normalize::normalize_records;
use crate::reader::{read_snippet, read_table, FileKind, ParsedTable};
use crate::salesforce::bulk::{upload_leads, BulkIngestApi};

/// Source table metadata carried into responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub encoding: String,
    pub delimiter: Option<char>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

impl From<&ParsedTable> for TableInfo {
    fn from(table: &ParsedTable) -> Self {
        Self {
            encoding: table.encoding.clone(),
            delimiter: table.delimiter,
            headers: table.headers.clone(),
            row_count: table.rows.len(),
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    /// Aggregated upload result; the run's durable output.
    pub upload: UploadResult,
    /// The inferred mapping, absent on the free-text path.
    pub mapping: Option<ColumnMapping>,
    /// Source table metadata, absent on the free-text path.
    pub table: Option<TableInfo>,
}

/// Map and normalize a tabular file without uploading.
///
/// The snippet and full reads are independent: the full read re-runs the
/// encoding/delimiter search rather than inheriting the snippet's choice.
pub async fn map_and_normalize<C: Completion>(
    path: &Path,
    kind: FileKind,
    schema: &TargetSchema,
    config: &AppConfig,
    completion: &C,
) -> PipelineResult<(Vec<Lead>, ColumnMapping, TableInfo)> {
    log_info(format!("Reading snippet from {}", path.display()));
    let snippet = read_snippet(path, kind, config.preview_rows)?;
    log_success(format!(
        "Snippet read: {} rows, {} columns (encoding {}, delimiter {:?})",
        snippet.rows.len(),
        snippet.headers.len(),
        snippet.encoding,
        snippet.delimiter
    ));

    let mapping = infer_mapping(completion, schema, &snippet).await?;

    log_info("Reading full file");
    let table = read_table(path, kind)?;
    log_success(format!("Full read: {} rows", table.rows.len()));

    let mut leads = normalize_records(&table, &mapping, schema, &config.normalize);
    stamp_owner(&mut leads, config);
    log_success(format!("Normalized {} records", leads.len()));

    let info = TableInfo::from(&table);
    Ok((leads, mapping, info))
}

/// Full tabular pipeline: read, map, normalize, upload.
pub async fn run_file_pipeline<C: Completion, A: BulkIngestApi>(
    path: &Path,
    kind: FileKind,
    schema: &TargetSchema,
    config: &AppConfig,
    completion: &C,
    bulk: &A,
) -> PipelineResult<PipelineOutcome> {
    let (leads, mapping, table) = map_and_normalize(path, kind, schema, config, completion).await?;
    if leads.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let upload = upload_leads(bulk, &leads, &config.bulk).await;

    Ok(PipelineOutcome {
        upload,
        mapping: Some(mapping),
        table: Some(table),
    })
}

/// Free-text pipeline: extract records straight from unstructured text,
/// then upload.
pub async fn run_text_pipeline<C: Completion, A: BulkIngestApi>(
    path: &Path,
    schema: &TargetSchema,
    config: &AppConfig,
    completion: &C,
    bulk: &A,
) -> PipelineResult<PipelineOutcome> {
    log_info(format!("Extracting records from {}", path.display()));
    let mut leads = extract_records(completion, schema, path, &config.normalize).await?;
    if leads.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    stamp_owner(&mut leads, config);
    log_success(format!("Extracted {} record(s)", leads.len()));

    let upload = upload_leads(bulk, &leads, &config.bulk).await;

    Ok(PipelineOutcome {
        upload,
        mapping: None,
        table: None,
    })
}

/// Stamp the configured owner onto every lead.
fn stamp_owner(leads: &mut [Lead], config: &AppConfig) {
    if let Some(owner) = &config.owner_id {
        for lead in leads.iter_mut() {
            lead.owner_id = owner.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CompletionOptions;
    use crate::error::{AiResult, BulkResult};
    use crate::salesforce::bulk::JobState;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    struct CannedCompletion {
        response: String,
    }

    impl Completion for CannedCompletion {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> AiResult<String> {
            Ok(self.response.clone())
        }
    }

    /// Accepts every job and reports every row created.
    #[derive(Default)]
    struct AcceptAllApi {
        uploads: Mutex<Vec<String>>,
    }

    impl BulkIngestApi for AcceptAllApi {
        async fn create_job(&self) -> BulkResult<String> {
            Ok("750-test".to_string())
        }

        async fn upload_batch(&self, _job_id: &str, csv: &str) -> BulkResult<()> {
            self.uploads.lock().unwrap().push(csv.to_string());
            Ok(())
        }

        async fn close_job(&self, _job_id: &str) -> BulkResult<()> {
            Ok(())
        }

        async fn job_status(&self, _job_id: &str) -> BulkResult<JobState> {
            Ok(JobState::JobComplete)
        }

        async fn successful_results(&self, _job_id: &str) -> BulkResult<String> {
            // Every uploaded row reported created
            let uploads = self.uploads.lock().unwrap();
            let rows = uploads
                .last()
                .map(|csv| csv.lines().count().saturating_sub(1))
                .unwrap_or(0);
            let mut out = String::from("sf__Id,sf__Index\n");
            for i in 0..rows {
                out.push_str(&format!("00Q{:06},{}\n", i, i));
            }
            Ok(out)
        }

        async fn failed_results(&self, _job_id: &str) -> BulkResult<String> {
            Ok("sf__Index,sf__Error\n".to_string())
        }

        async fn abort_job(&self, _job_id: &str) -> BulkResult<()> {
            Ok(())
        }
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.bulk.poll_interval = Duration::ZERO;
        config
    }

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_file_pipeline_end_to_end() {
        let file = csv_file(
            "Full Name,Organization,Contact Email\n\
             John Doe,Example Corp,J.Doe@Example.com\n\
             jane roe,Test Inc,jane@test.com\n",
        );
        let completion = CannedCompletion {
            response: r#"{"LastName": "Full Name", "Company": "Organization", "Email": "Contact Email"}"#
                .into(),
        };
        let bulk = AcceptAllApi::default();

        let outcome = run_file_pipeline(
            file.path(),
            FileKind::Csv,
            &TargetSchema::lead(),
            &fast_config(),
            &completion,
            &bulk,
        )
        .await
        .unwrap();

        assert_eq!(outcome.upload.total, 2);
        assert_eq!(outcome.upload.succeeded, 2);
        assert!(outcome.upload.is_success());

        let table = outcome.table.unwrap();
        assert_eq!(table.row_count, 2);
        assert_eq!(table.headers.len(), 3);

        let mapping = outcome.mapping.unwrap();
        assert_eq!(mapping.source_for("LastName"), Some("Full Name"));

        // Normalized values made it into the payload
        let uploads = bulk.uploads.lock().unwrap();
        assert!(uploads[0].contains("j.doe@example.com"));
        assert!(uploads[0].contains("Jane Roe"));
    }

    #[tokio::test]
    async fn test_file_pipeline_owner_stamping() {
        let file = csv_file("Nome,Org\nalice,acme\n");
        let completion = CannedCompletion {
            response: r#"{"LastName": "Nome", "Company": "Org"}"#.into(),
        };
        let bulk = AcceptAllApi::default();

        let config = fast_config().with_owner(Some("005Aa000001abcdEFG".into()));
        let outcome = run_file_pipeline(
            file.path(),
            FileKind::Csv,
            &TargetSchema::lead(),
            &config,
            &completion,
            &bulk,
        )
        .await
        .unwrap();

        assert_eq!(outcome.upload.total, 1);
        let uploads = bulk.uploads.lock().unwrap();
        assert!(uploads[0].contains("005Aa000001abcdEFG"));
    }

    #[tokio::test]
    async fn test_file_pipeline_mapping_failure_aborts() {
        let file = csv_file("a,b\n1,2\n");
        let completion = CannedCompletion {
            response: "sorry, no mapping today".into(),
        };
        let bulk = AcceptAllApi::default();

        let err = run_file_pipeline(
            file.path(),
            FileKind::Csv,
            &TargetSchema::lead(),
            &fast_config(),
            &completion,
            &bulk,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Ai(_)));
        // Nothing was uploaded
        assert!(bulk.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cliente - joao lucas.txt");
        std::fs::write(&path, "contato joao@exemplo.com tel 11912345678").unwrap();

        let completion = CannedCompletion {
            response: r#"[{"LastName": "Lucas", "FirstName": "Joao", "Company": "", "Email": "joao@exemplo.com", "Phone": "11912345678"}]"#
                .into(),
        };
        let bulk = AcceptAllApi::default();

        let outcome = run_text_pipeline(
            &path,
            &TargetSchema::lead(),
            &fast_config(),
            &completion,
            &bulk,
        )
        .await
        .unwrap();

        assert_eq!(outcome.upload.total, 1);
        assert!(outcome.mapping.is_none());
        assert!(outcome.table.is_none());

        let uploads = bulk.uploads.lock().unwrap();
        // Mandatory company fallback applied before upload
        assert!(uploads[0].contains("Empresa Desconhecida"));
    }
}
