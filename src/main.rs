//! Leadload CLI - convert lead spreadsheets and upload them to Salesforce.
//!
//! # Main Commands
//!
//! ```bash
//! leadload upload leads.xlsx --environment production   # Full pipeline
//! leadload convert leads.csv -o leads.json              # Map + normalize only
//! leadload extract "cliente - joao.txt"                 # Free-text extraction
//! leadload serve                                        # Start HTTP server
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! leadload parse leads.csv          # Just parse the file to JSON
//! ```

use clap::{Parser, Subcommand};
use leadload::{
    extract_records, map_and_normalize, read_table, run_file_pipeline, run_text_pipeline,
    AiClient, AppConfig, Credentials, Environment, FileKind, PipelineOutcome, SalesforceBulkClient,
    TargetSchema,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "leadload")]
#[command(about = "Convert lead spreadsheets and bulk upload them to Salesforce", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a lead file and output its rows as JSON
    Parse {
        /// Input file (csv/xls/xlsx)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Map and normalize a lead file without uploading
    Convert {
        /// Input file (csv/xls/xlsx)
        input: PathBuf,

        /// Output file for normalized records (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rows sampled for the AI mapping prompt
        #[arg(long, default_value = "10")]
        preview_rows: usize,

        /// Split combined names in the LastName column
        #[arg(long)]
        split_names: bool,
    },

    /// Full pipeline: read, map, normalize and upload to Salesforce
    Upload {
        /// Input file (csv/xls/xlsx)
        input: PathBuf,

        /// Target org
        #[arg(short, long, default_value = "sandbox")]
        environment: Environment,

        /// Salesforce user id to own the created leads
        #[arg(long)]
        owner_id: Option<String>,

        /// Records per ingest job
        #[arg(long, default_value = "2000")]
        batch_size: usize,

        /// Split combined names in the LastName column
        #[arg(long)]
        split_names: bool,

        /// Output file for the per-record outcomes (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract leads from a free-form text file and upload them
    Extract {
        /// Input text file
        input: PathBuf,

        /// Target org
        #[arg(short, long, default_value = "sandbox")]
        environment: Environment,

        /// Salesforce user id to own the created leads
        #[arg(long)]
        owner_id: Option<String>,

        /// Only extract; print the records instead of uploading
        #[arg(long)]
        dry_run: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Convert {
            input,
            output,
            preview_rows,
            split_names,
        } => cmd_convert(&input, output.as_deref(), preview_rows, split_names).await,

        Commands::Upload {
            input,
            environment,
            owner_id,
            batch_size,
            split_names,
            output,
        } => {
            cmd_upload(
                &input,
                environment,
                owner_id,
                batch_size,
                split_names,
                output.as_deref(),
            )
            .await
        }

        Commands::Extract {
            input,
            environment,
            owner_id,
            dry_run,
            output,
        } => cmd_extract(&input, environment, owner_id, dry_run, output.as_deref()).await,

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let kind = FileKind::from_path(input)?;
    let table = read_table(input, kind)?;

    eprintln!("   Encoding: {}", table.encoding);
    if let Some(delimiter) = table.delimiter {
        eprintln!("   Delimiter: '{}'", format_delimiter(delimiter));
    }
    eprintln!("   Columns: {}", table.headers.join(", "));
    eprintln!("✅ Parsed {} records", table.rows.len());

    let json = serde_json::to_string_pretty(&table.rows)?;
    write_output(&json, output)?;

    Ok(())
}

async fn cmd_convert(
    input: &Path,
    output: Option<&Path>,
    preview_rows: usize,
    split_names: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Converting: {}", input.display());

    let kind = FileKind::from_path(input)?;
    let mut config = AppConfig::default();
    config.preview_rows = preview_rows;
    config.normalize.split_combined_names = split_names;

    let completion = AiClient::from_env()?;
    let schema = TargetSchema::lead();

    let (leads, mapping, info) =
        map_and_normalize(input, kind, &schema, &config, &completion).await?;

    eprintln!("   Encoding: {}", info.encoding);
    eprintln!("   Rows: {}", info.row_count);
    eprintln!("   Mapped fields: {}/{}", mapping.mapped_count(), schema.len());
    for (field, source) in mapping.iter() {
        if let Some(column) = source {
            eprintln!("   {} ← {}", field, column);
        }
    }
    eprintln!("✅ Normalized {} records", leads.len());

    let json = serde_json::to_string_pretty(&leads)?;
    write_output(&json, output)?;

    Ok(())
}

async fn cmd_upload(
    input: &Path,
    environment: Environment,
    owner_id: Option<String>,
    batch_size: usize,
    split_names: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Uploading: {} ({})", input.display(), environment);

    let kind = FileKind::from_path(input)?;
    let mut config = AppConfig::for_environment(environment).with_owner(owner_id);
    config.bulk.batch_size = batch_size;
    config.normalize.split_combined_names = split_names;

    let completion = AiClient::from_env()?;
    let bulk = authenticated_client(&config).await?;
    let schema = TargetSchema::lead();

    let outcome =
        run_file_pipeline(input, kind, &schema, &config, &completion, &bulk).await?;

    report_outcome(&outcome, output)
}

async fn cmd_extract(
    input: &Path,
    environment: Environment,
    owner_id: Option<String>,
    dry_run: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Extracting: {}", input.display());

    let config = AppConfig::for_environment(environment).with_owner(owner_id);
    let completion = AiClient::from_env()?;
    let schema = TargetSchema::lead();

    if dry_run {
        let leads = extract_records(&completion, &schema, input, &config.normalize).await?;
        eprintln!("✅ Extracted {} record(s)", leads.len());
        let json = serde_json::to_string_pretty(&leads)?;
        write_output(&json, output)?;
        return Ok(());
    }

    let bulk = authenticated_client(&config).await?;
    let outcome = run_text_pipeline(input, &schema, &config, &completion, &bulk).await?;

    report_outcome(&outcome, output)
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    leadload::server::start_server(port).await
}

/// Authenticate against the configured org and build the bulk client.
async fn authenticated_client(
    config: &AppConfig,
) -> Result<SalesforceBulkClient, Box<dyn std::error::Error>> {
    let credentials = Credentials::from_env(config.environment)?;
    let http = reqwest::Client::new();
    let session =
        leadload::get_access_token(&http, config.environment, &credentials).await?;
    Ok(SalesforceBulkClient::new(session, &config.bulk.api_version))
}

fn report_outcome(
    outcome: &PipelineOutcome,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let upload = &outcome.upload;
    eprintln!();
    eprintln!("📊 Results: {} submitted, {} created, {} failed",
        upload.total, upload.succeeded, upload.failed);

    for failed in upload.outcomes.iter().filter(|o| !o.success).take(5) {
        eprintln!("   ❌ {}: {}", failed.name, failed.errors.join("; "));
    }
    if upload.failed > 5 {
        eprintln!("   ... {} more failures not shown", upload.failed - 5);
    }

    let json = serde_json::to_string_pretty(&upload)?;
    write_output(&json, output)?;

    if !upload.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
