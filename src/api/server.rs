//! HTTP server for the upload pipeline.
//!
//! The interactive front end lives elsewhere; this layer stages the
//! uploaded file, runs the pipeline and hands back the aggregated result.
//!
//! # API Endpoints
//!
//! | Method | Path          | Description                              |
//! |--------|---------------|------------------------------------------|
//! | GET    | `/health`     | Health check                             |
//! | POST   | `/api/upload` | Upload a CSV/XLS/XLSX/TXT file of leads  |
//! | GET    | `/api/logs`   | SSE stream for real-time logs            |

use axum::{
    extract::Multipart,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, UploadResponse};
use crate::ai::AiClient;
use crate::config::{AppConfig, Environment};
use crate::models::TargetSchema;
use crate::pipeline::{run_file_pipeline, run_text_pipeline, PipelineOutcome};
use crate::reader::FileKind;
use crate::salesforce::auth::{get_access_token, Credentials};
use crate::salesforce::bulk::SalesforceBulkClient;

/// Start the HTTP server.
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_file))
        .route("/api/logs", get(sse_logs))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 leadload server running on http://localhost:{}", port);
    println!("   POST /api/upload - Upload a lead file");
    println!("   GET  /api/logs   - SSE log stream");
    println!("   GET  /health     - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "leadload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming.
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

type UploadError = (StatusCode, Json<Value>);

fn bad_request(message: String) -> UploadError {
    (StatusCode::BAD_REQUEST, Json(error_response(&message)))
}

/// Upload endpoint: multipart form with `file` plus optional `environment`
/// ("sandbox"/"production") and `owner_id` fields.
async fn upload_file(mut multipart: Multipart) -> Result<Json<UploadResponse>, UploadError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut environment = Environment::Sandbox;
    let mut owner_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("Read error: {}", e)))?
                        .to_vec(),
                );
            }
            "environment" => {
                let value = field.text().await.unwrap_or_default();
                environment = value
                    .parse()
                    .map_err(|e: String| bad_request(e))?;
            }
            "owner_id" => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    owner_id = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided".to_string()))?;
    let file_name = file_name.unwrap_or_else(|| "upload.csv".to_string());
    let extension = PathBuf::from(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv")
        .to_lowercase();

    println!("\n{}", "=".repeat(70));
    println!("📄 NEW UPLOAD: {} ({} bytes)", file_name, bytes.len());
    println!("{}\n", "=".repeat(70));

    let config = AppConfig::for_environment(environment).with_owner(owner_id);

    // Stage the payload under a collision-free name; the pipeline only
    // consumes a readable path.
    let staged = std::env::temp_dir().join(format!(
        "leadload_{}_{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(&file_name)
    ));
    tokio::fs::write(&staged, &bytes).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&format!("Could not stage upload: {}", e))),
        )
    })?;

    let outcome = run_upload(&staged, &extension, &config).await;

    if let Err(e) = tokio::fs::remove_file(&staged).await {
        super::logs::log_warning(format!("Could not remove staged file: {}", e));
    }

    let outcome = outcome.map_err(|e| {
        eprintln!("❌ Pipeline error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&e.to_string())),
        )
    })?;

    println!("\n{}", "=".repeat(70));
    println!("📊 SUMMARY");
    println!("{}", "=".repeat(70));
    println!("   Submitted: {}", outcome.upload.total);
    println!("   Created:   {}", outcome.upload.succeeded);
    println!("   Failed:    {}", outcome.upload.failed);
    println!("{}\n", "=".repeat(70));

    Ok(Json(UploadResponse::from_outcome(outcome, environment)))
}

/// Wire up the real collaborators and dispatch by file type.
async fn run_upload(
    staged: &std::path::Path,
    extension: &str,
    config: &AppConfig,
) -> Result<PipelineOutcome, crate::error::PipelineError> {
    let schema = TargetSchema::lead();
    let completion = AiClient::from_env()?;

    let credentials = Credentials::from_env(config.environment)?;
    let http = reqwest::Client::new();
    let session = get_access_token(&http, config.environment, &credentials).await?;
    let bulk = SalesforceBulkClient::new(session, &config.bulk.api_version);

    if extension == "txt" {
        run_text_pipeline(staged, &schema, config, &completion, &bulk).await
    } else {
        let kind = FileKind::from_extension(extension)?;
        run_file_pipeline(staged, kind, &schema, config, &completion, &bulk).await
    }
}

/// Keep staged file names filesystem-safe. Spaces and hyphens survive so
/// the text extractor's filename-name recovery still sees `cliente - joao`
/// patterns after staging.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
