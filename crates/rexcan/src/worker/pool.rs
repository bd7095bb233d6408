use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::broadcast::{JobProgressBroadcaster, LogBroadcaster};
use crate::config::QueueConfig;
use crate::db::Database;
use crate::error::WorkerError;
use crate::extraction::ExtractionService;
use crate::pipeline::{
    BroadcastProgress, Pipeline, PipelineContext, PipelineError, PipelineOutcome, ProgressEvent,
    ProgressReporter,
};
use crate::queue::{ClaimedJob, FailOutcome, JobStore};

use super::job::{JobOutcome, JobResult};
use super::maintenance;
use super::rate_limit::StartLimiter;

/// Results buffered for readers before new ones are dropped.
const RESULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub rate_limit_per_sec: u32,
    pub poll_interval: Duration,
    pub stalled_after: Duration,
    pub maintenance_interval: Duration,
}

impl From<&QueueConfig> for WorkerOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            rate_limit_per_sec: config.rate_limit_per_sec,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stalled_after: Duration::from_secs(config.stalled_after_secs),
            maintenance_interval: Duration::from_secs(config.maintenance_interval_secs),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Broadcast channels the workers publish to.
#[derive(Clone, Default)]
pub struct Broadcasters {
    pub progress: JobProgressBroadcaster,
    pub logs: LogBroadcaster,
}

struct Shared {
    store: JobStore,
    db: Database,
    pipeline: Pipeline,
    limiter: StartLimiter,
    broadcasters: Broadcasters,
    results: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    options: WorkerOptions,
}

/// Fixed pool of worker threads claiming jobs from the [`JobStore`], plus
/// one maintenance thread.
pub struct WorkerPool {
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn start(
        store: JobStore,
        db: Database,
        service: Arc<dyn ExtractionService>,
        broadcasters: Broadcasters,
        options: WorkerOptions,
    ) -> Result<Self, WorkerError> {
        let worker_count = options.concurrency.max(1);
        let (result_sender, result_receiver) = bounded::<JobResult>(RESULT_CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        let shared = Arc::new(Shared {
            store,
            pipeline: Pipeline::new(db.clone(), service),
            db,
            limiter: StartLimiter::per_second(options.rate_limit_per_sec),
            broadcasters,
            results: result_sender,
            shutdown: Arc::clone(&shutdown),
            options,
        });

        let mut pool = Self {
            result_receiver,
            workers: Vec::with_capacity(worker_count + 1),
            shutdown,
        };

        for worker_id in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("rexcan-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, worker_shared));
            pool.push_or_abort(handle)?;
        }

        let maintenance_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("rexcan-maintenance".to_string())
            .spawn(move || run_maintenance(maintenance_shared));
        pool.push_or_abort(handle)?;

        info!("Started {} workers", worker_count);
        Ok(pool)
    }

    fn push_or_abort(
        &mut self,
        handle: std::io::Result<JoinHandle<()>>,
    ) -> Result<(), WorkerError> {
        match handle {
            Ok(handle) => {
                self.workers.push(handle);
                Ok(())
            }
            Err(e) => {
                self.shutdown.store(true, Ordering::Relaxed);
                Err(WorkerError::Spawn(e))
            }
        }
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Asks every thread to stop after its current job.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// A handle that can request shutdown from another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Joins all threads. Call [`shutdown`](Self::shutdown) first.
    pub fn wait(self) -> Result<(), WorkerError> {
        let mut panicked = false;
        for worker in self.workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!("{} panicked", name);
                panicked = true;
            } else {
                debug!("{} finished", name);
            }
        }

        info!("All workers have stopped");
        if panicked {
            Err(WorkerError::ThreadPanic)
        } else {
            Ok(())
        }
    }
}

fn run_worker(worker_id: usize, shared: Arc<Shared>) {
    let worker_name = format!("worker-{}", worker_id);
    debug!("{} started", worker_name);

    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            debug!("{} received shutdown signal", worker_name);
            break;
        }

        match shared.store.claim(&worker_name) {
            Ok(Some(job)) => {
                shared.limiter.acquire();
                let result = process_job(&shared, job);
                match shared.results.try_send(result) {
                    Ok(()) => {}
                    Err(TrySendError::Full(result)) => {
                        debug!("Result channel full, dropping result for {}", result.job_id)
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(None) => thread::sleep(shared.options.poll_interval),
            Err(e) => {
                error!("{} failed to claim a job: {}", worker_name, e);
                thread::sleep(shared.options.poll_interval);
            }
        }
    }

    debug!("{} stopped", worker_name);
}

fn process_job(shared: &Shared, job: ClaimedJob) -> JobResult {
    let document_id = job.payload.document_id.clone();
    let job_id = job.id.clone();
    let attempt = job.attempt;

    let tracker =
        shared
            .broadcasters
            .progress
            .track(&document_id, &job_id, &job.payload.filename, attempt);
    let progress = BroadcastProgress::new(&document_id, tracker, shared.broadcasters.logs.clone());

    let mut ctx = PipelineContext::new(job);
    let outcome = match shared.pipeline.run(&mut ctx, &progress) {
        Ok(outcome) => {
            if let Err(e) = shared.store.complete(&job_id) {
                // The stall sweep redelivers; the redelivery is a no-op.
                warn!("Failed to complete job {}: {}", job_id, e);
            }
            match outcome {
                PipelineOutcome::Processed {
                    external_job_id,
                    is_duplicate,
                } => JobOutcome::Processed {
                    external_job_id,
                    is_duplicate,
                },
                PipelineOutcome::AlreadyProcessed => JobOutcome::AlreadyProcessed,
            }
        }
        Err(e) => handle_failure(shared, &document_id, &job_id, &progress, e),
    };

    JobResult {
        job_id,
        document_id,
        attempt,
        outcome,
    }
}

fn handle_failure(
    shared: &Shared,
    document_id: &str,
    job_id: &str,
    progress: &BroadcastProgress,
    e: PipelineError,
) -> JobOutcome {
    let error = e.to_string();
    match shared.store.fail(job_id, &error, e.is_permanent()) {
        Ok(FailOutcome::Retrying { attempt, delay }) => {
            shared.broadcasters.logs.warn(
                document_id,
                &format!("Attempt {} failed, retrying in {:?}: {}", attempt, delay, error),
            );
            progress.tracker().retrying(delay, &error);
            JobOutcome::Retrying { delay, error }
        }
        Ok(FailOutcome::Exhausted { attempts }) => {
            warn!(
                "Job {} failed after {} attempt(s): {}",
                job_id, attempts, error
            );
            if let Err(mark_err) = maintenance::fail_document(&shared.db, document_id, &error) {
                error!("Failed to mark document {} failed: {}", document_id, mark_err);
            }
            progress.report(ProgressEvent::Failed {
                error: error.clone(),
            });
            JobOutcome::Failed { error }
        }
        Err(store_err) => {
            error!("Failed to record failure of job {}: {}", job_id, store_err);
            JobOutcome::Abandoned { error }
        }
    }
}

fn run_maintenance(shared: Arc<Shared>) {
    let tick = shared
        .options
        .poll_interval
        .min(shared.options.maintenance_interval);
    let mut last_sweep: Option<Instant> = None;

    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let due = last_sweep.map_or(true, |t| t.elapsed() >= shared.options.maintenance_interval);
        if due {
            if let Err(e) = maintenance::sweep(&shared.store, &shared.db, shared.options.stalled_after)
            {
                error!("Queue maintenance failed: {}", e);
            }
            last_sweep = Some(Instant::now());
        }

        thread::sleep(tick);
    }

    debug!("Maintenance thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo;
    use crate::document::{Document, DocumentStatus};
    use crate::extraction::{
        ApplyResponse, ExportFormat, ExtractionError, PromoteResponse, RemoteAuditLog,
        RemoteStatusReport, RollbackResponse, UploadResponse,
    };
    use crate::queue::{JobPayload, JobStoreOptions};
    use serde_json::{json, Map, Value};
    use std::path::{Path, PathBuf};

    struct StaticService {
        process_status: Option<u16>,
    }

    impl ExtractionService for StaticService {
        fn submit(&self, _: &Path, _: &str, _: &str) -> Result<UploadResponse, ExtractionError> {
            Ok(UploadResponse {
                job_id: "ext-static".to_string(),
                filename: None,
                preview_url: None,
            })
        }

        fn process(&self, _: &str, _: Option<&str>) -> Result<Value, ExtractionError> {
            match self.process_status {
                None => Ok(json!({"invoice_id": "INV-1", "total_amount": 5.0})),
                Some(status) => Err(ExtractionError::Status {
                    endpoint: "/process".to_string(),
                    status,
                    body: "down".to_string(),
                }),
            }
        }

        fn apply_corrections(
            &self,
            _: &str,
            _: &Map<String, Value>,
            _: &str,
            _: bool,
        ) -> Result<ApplyResponse, ExtractionError> {
            unimplemented!()
        }

        fn rollback(&self, _: &str, _: &str) -> Result<RollbackResponse, ExtractionError> {
            unimplemented!()
        }

        fn audit_log(&self, _: &str) -> Result<RemoteAuditLog, ExtractionError> {
            unimplemented!()
        }

        fn status(&self, _: &str) -> Result<RemoteStatusReport, ExtractionError> {
            unimplemented!()
        }

        fn promote_vendor(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> Result<PromoteResponse, ExtractionError> {
            unimplemented!()
        }

        fn export(&self, _: &str, _: &ExportFormat) -> Result<Vec<u8>, ExtractionError> {
            unimplemented!()
        }

        fn health(&self) -> Result<(), ExtractionError> {
            Ok(())
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions {
            concurrency: 2,
            rate_limit_per_sec: 100,
            poll_interval: Duration::from_millis(10),
            stalled_after: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(60),
        }
    }

    fn enqueue_document(db: &Database, store: &JobStore) -> Document {
        let doc = Document::new(
            "u1",
            "a.pdf",
            PathBuf::from("/tmp/a.pdf"),
            "application/pdf",
            1,
        );
        document_repo::insert(db, &doc).unwrap();
        let job_id = store
            .enqueue(
                &doc.id,
                &JobPayload {
                    document_id: doc.id.clone(),
                    user_id: doc.user_id.clone(),
                    file_path: doc.file_path.clone(),
                    filename: doc.filename.clone(),
                    mime_type: doc.mime_type.clone(),
                    profile: None,
                },
            )
            .unwrap();
        let _ = document_repo::mark_queued(db, &doc.id, &job_id);
        doc
    }

    fn wait_for_final(pool: &WorkerPool) -> JobResult {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(result) = pool.recv_result_timeout(Duration::from_millis(100)) {
                if result.is_final() {
                    return result;
                }
            }
        }
        panic!("no final job result within 10s");
    }

    #[test]
    fn test_pool_start_and_shutdown() {
        let db = Database::open_in_memory().unwrap();
        let store = JobStore::new(db.clone(), JobStoreOptions::default());
        let pool = WorkerPool::start(
            store,
            db,
            Arc::new(StaticService {
                process_status: None,
            }),
            Broadcasters::default(),
            options(),
        )
        .unwrap();

        assert!(!pool.is_shutdown());
        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait().unwrap();
    }

    #[test]
    fn test_pool_processes_enqueued_document() {
        let db = Database::open_in_memory().unwrap();
        let store = JobStore::new(db.clone(), JobStoreOptions::default());
        let doc = enqueue_document(&db, &store);
        let broadcasters = Broadcasters::default();
        let mut progress_rx = broadcasters.progress.subscribe();

        let pool = WorkerPool::start(
            store.clone(),
            db.clone(),
            Arc::new(StaticService {
                process_status: None,
            }),
            broadcasters.clone(),
            options(),
        )
        .unwrap();

        let result = wait_for_final(&pool);
        pool.shutdown();
        pool.wait().unwrap();

        assert_eq!(result.document_id, doc.id);
        assert!(result.is_success());
        let stored = document_repo::get(&db, &doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Processed);
        assert_eq!(
            store.state_of(&doc.id).unwrap(),
            Some(crate::queue::JobState::Completed)
        );
        assert!(progress_rx.try_recv().is_ok());
        assert!(!broadcasters.logs.recent(&doc.id).is_empty());
    }

    #[test]
    fn test_exhausted_job_fails_document() {
        let db = Database::open_in_memory().unwrap();
        let store = JobStore::new(
            db.clone(),
            JobStoreOptions {
                attempts: 2,
                backoff_base: Duration::from_millis(10),
                ..JobStoreOptions::default()
            },
        );
        let doc = enqueue_document(&db, &store);

        let pool = WorkerPool::start(
            store,
            db.clone(),
            Arc::new(StaticService {
                process_status: Some(503),
            }),
            Broadcasters::default(),
            options(),
        )
        .unwrap();

        let result = wait_for_final(&pool);
        pool.shutdown();
        pool.wait().unwrap();

        assert_eq!(result.attempt, 2);
        assert!(matches!(result.outcome, JobOutcome::Failed { .. }));
        let stored = document_repo::get(&db, &doc.id).unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error_message.unwrap().contains("HTTP 503"));
        assert_eq!(stored.external_job_id.as_deref(), Some("ext-static"));
    }
}
