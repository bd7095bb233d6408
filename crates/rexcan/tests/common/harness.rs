//! Test harness for isolated pipeline runs.
//!
//! Each harness owns a temp directory holding the SQLite database and the
//! uploaded files, so tests never share state.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use rexcan::batch::{BatchCoordinator, BatchFile};
use rexcan::config::UploadConfig;
use rexcan::db::document_repo;
use rexcan::queue::JobStoreOptions;
use rexcan::{
    Broadcasters, Database, Document, Intake, JobStore, ReviewService, StatusService,
    UploadRequest, WorkerOptions, WorkerPool,
};

use super::service::ScriptedService;

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub store: JobStore,
    pub service: Arc<ScriptedService>,
    pub broadcasters: Broadcasters,
    pub intake: Intake,
}

impl TestHarness {
    pub fn new(service: ScriptedService) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("rexcan.db")).expect("Failed to open database");
        let store = JobStore::new(db.clone(), Self::store_options());
        let intake = Intake::new(db.clone(), store.clone(), &UploadConfig::default());
        Self {
            temp_dir,
            db,
            store,
            service: Arc::new(service),
            broadcasters: Broadcasters::default(),
            intake,
        }
    }

    /// Three attempts with a short backoff so retries finish quickly.
    pub fn store_options() -> JobStoreOptions {
        JobStoreOptions {
            attempts: 3,
            backoff_base: Duration::from_millis(20),
            ..JobStoreOptions::default()
        }
    }

    pub fn worker_options(concurrency: usize) -> WorkerOptions {
        WorkerOptions {
            concurrency,
            rate_limit_per_sec: 1000,
            poll_interval: Duration::from_millis(10),
            stalled_after: Duration::from_secs(900),
            maintenance_interval: Duration::from_secs(60),
        }
    }

    pub fn start_workers(&self, concurrency: usize) -> WorkerPool {
        WorkerPool::start(
            self.store.clone(),
            self.db.clone(),
            self.service.clone(),
            self.broadcasters.clone(),
            Self::worker_options(concurrency),
        )
        .expect("Failed to start worker pool")
    }

    /// Writes a small PDF-looking file into the upload directory.
    pub fn write_file(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, b"%PDF-1.4 test").expect("Failed to write upload");
        path
    }

    pub fn upload(&self, name: &str) -> Document {
        let path = self.write_file(name);
        let size = std::fs::metadata(&path).unwrap().len();
        self.intake
            .upload(UploadRequest::new("user-1", name, path, size).with_mime_type("application/pdf"))
            .expect("Upload failed")
    }

    pub fn batch_file(&self, name: &str) -> BatchFile {
        let path = self.write_file(name);
        BatchFile {
            filename: name.to_string(),
            file_size: std::fs::metadata(&path).unwrap().len(),
            file_path: path,
            mime_type: None,
        }
    }

    /// Polls until the document is `processed` or `failed`.
    pub fn wait_for_terminal(&self, document_id: &str, timeout: Duration) -> Document {
        let deadline = Instant::now() + timeout;
        loop {
            let doc = document_repo::get(&self.db, document_id).unwrap();
            if doc.status.is_terminal() {
                return doc;
            }
            assert!(
                Instant::now() < deadline,
                "document {} still {} after {:?}",
                document_id,
                doc.status,
                timeout
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn review(&self) -> ReviewService {
        ReviewService::new(self.db.clone(), self.service.clone())
    }

    pub fn status(&self) -> StatusService {
        StatusService::new(
            self.db.clone(),
            self.store.clone(),
            self.service.clone(),
            self.broadcasters.clone(),
        )
    }

    pub fn batches(&self) -> BatchCoordinator {
        BatchCoordinator::new(self.db.clone(), self.intake.clone())
    }
}
