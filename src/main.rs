//! aria-ingest CLI
//!
//! Submits one score file to the ingestion worker and prints every event for
//! the job as a JSON line, the way the host application would consume them.
//! Exits nonzero if the terminal result is a failure.

use anyhow::Result;
use aria_ingest::{EventBus, IngestConfig, IngestWorker, IngestionJob, IngestionResult, JobEvent};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "aria-ingest", version, about = "Ingest a MusicXML score file")]
struct Args {
    /// Score file to ingest (.xml, .musicxml, or .mxl)
    file: PathBuf,

    /// Optional TOML config with ingestion limits
    #[arg(long, env = "ARIA_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Also print telemetry events
    #[arg(long)]
    telemetry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => IngestConfig::from_toml_file(path)?,
        None => IngestConfig::default(),
    };
    config.validate()?;

    info!("Starting aria-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let telemetry = EventBus::new(100);
    if args.telemetry {
        let mut rx = telemetry.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{}", line);
                }
            }
        });
    }

    let worker = IngestWorker::new(config, telemetry);
    let job_id = Uuid::new_v4();
    let mut handle = worker.submit(IngestionJob::new(job_id, &args.file));

    while let Some(event) = handle.recv().await {
        match &event {
            JobEvent::Chunk(chunk) => {
                // chunk payloads can be large; print a summary line instead
                println!(
                    "{}",
                    serde_json::json!({
                        "type": "chunk",
                        "kind": chunk.kind,
                        "measure_count": chunk.measure_count,
                        "is_complete": chunk.is_complete,
                        "content_bytes": chunk.content.len(),
                    })
                );
            }
            JobEvent::Finished(result) => {
                println!("{}", serde_json::to_string(result)?);
                match result {
                    IngestionResult::Success { .. } => return Ok(()),
                    IngestionResult::Failure { error_message, .. } => {
                        anyhow::bail!("ingestion failed: {}", error_message);
                    }
                }
            }
        }
    }

    anyhow::bail!("worker ended without a terminal result")
}
