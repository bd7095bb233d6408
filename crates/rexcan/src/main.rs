use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use rexcan::config::{load_config, Config};
use rexcan::queue::JobStoreOptions;
use rexcan::worker::JobOutcome;
use rexcan::{
    Broadcasters, Database, ExtractionClient, HttpExtractionService, JobStore, RexcanError,
    StatusService, WorkerError, WorkerOptions, WorkerPool,
};

/// Invoice processing worker daemon.
#[derive(Parser, Debug)]
#[command(name = "rexcan", version, about)]
struct Args {
    /// Path to the JSON config file.
    #[arg(short, long, env = "REXCAN_CONFIG")]
    config: PathBuf,

    /// Database file, overriding the config.
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Worker threads, overriding `queue.concurrency`.
    #[arg(short, long)]
    workers: Option<usize>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("rexcan: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> rexcan::Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }
    if let Some(workers) = args.workers {
        config.queue.concurrency = workers.max(1);
    }

    rexcan::telemetry::init_logging(&config.logging)?;
    info!("Starting rexcan v{}", env!("CARGO_PKG_VERSION"));

    serve(config)
}

fn serve(config: Config) -> rexcan::Result<()> {
    let db_path = config.resolved_database_path().ok_or_else(|| {
        RexcanError::Config(rexcan::ConfigError::Validation {
            message: "no database path configured and no home directory".to_string(),
        })
    })?;
    let db = Database::open(&db_path)?;
    info!("Database ready at {}", db_path.display());

    let store = JobStore::new(db.clone(), JobStoreOptions::from(&config.queue));
    let client = ExtractionClient::from_config(&config.extraction)?;
    let service = Arc::new(HttpExtractionService::new(client));
    let broadcasters = Broadcasters::default();

    let status = StatusService::new(
        db.clone(),
        store.clone(),
        service.clone(),
        broadcasters.clone(),
    );
    if !status.service_healthy() {
        warn!(
            "Extraction service at {} is not healthy; jobs will retry",
            config.extraction.base_url
        );
    }

    let pool = WorkerPool::start(
        store,
        db,
        service,
        broadcasters,
        WorkerOptions::from(&config.queue),
    )?;

    let shutdown = pool.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received interrupt, finishing in-flight jobs");
        shutdown.store(true, Ordering::Relaxed);
    })
    .map_err(WorkerError::SignalHandler)?;

    while !pool.is_shutdown() {
        if let Some(result) = pool.recv_result_timeout(Duration::from_millis(500)) {
            match &result.outcome {
                JobOutcome::Failed { error } | JobOutcome::Abandoned { error } => error!(
                    "Document {} failed after attempt {}: {}",
                    result.document_id, result.attempt, error
                ),
                outcome => info!("Document {}: {:?}", result.document_id, outcome),
            }
            if let Ok(counts) = status.queue_overview() {
                info!(
                    "Queue: {} waiting, {} delayed, {} active",
                    counts.waiting, counts.delayed, counts.active
                );
            }
        }
    }

    pool.wait()?;
    info!("rexcan stopped");
    Ok(())
}
