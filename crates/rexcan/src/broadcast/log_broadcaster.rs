//! Per-document log lines for pollers and live subscribers.
//!
//! Every line is broadcast and also kept in a bounded per-document ring,
//! held in a `moka` cache so idle documents age out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::Serialize;
use tokio::sync::broadcast;

/// Lines kept per document.
pub const RECENT_LINES_PER_DOCUMENT: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub document_id: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: &str, document_id: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            document_id: document_id.to_string(),
            message: message.to_string(),
        }
    }
}

type RecentLines = Arc<Mutex<VecDeque<LogEvent>>>;

#[derive(Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEvent>,
    recent: Cache<String, RecentLines>,
}

impl LogBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let recent = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(60 * 60))
            .build();
        Self { sender, recent }
    }

    pub fn send(&self, event: LogEvent) {
        let lines = self
            .recent
            .get_with(event.document_id.clone(), || {
                Arc::new(Mutex::new(VecDeque::with_capacity(RECENT_LINES_PER_DOCUMENT)))
            });
        if let Ok(mut lines) = lines.lock() {
            if lines.len() == RECENT_LINES_PER_DOCUMENT {
                lines.pop_front();
            }
            lines.push_back(event.clone());
        }
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    /// Most recent lines for a document, oldest first.
    pub fn recent(&self, document_id: &str) -> Vec<LogEvent> {
        self.recent
            .get(document_id)
            .and_then(|lines| lines.lock().ok().map(|l| l.iter().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn log(&self, level: &str, document_id: &str, message: &str) {
        self.send(LogEvent::new(level, document_id, message));
    }

    pub fn info(&self, document_id: &str, message: &str) {
        self.log("INFO", document_id, message);
    }

    pub fn warn(&self, document_id: &str, message: &str) {
        self.log("WARN", document_id, message);
    }

    pub fn error(&self, document_id: &str, message: &str) {
        self.log("ERROR", document_id, message);
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = LogBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        broadcaster.info("d1", "Submitted to extraction service");

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.level, "INFO");
        assert_eq!(event.document_id, "d1");
        assert_eq!(event.message, "Submitted to extraction service");
    }

    #[test]
    fn test_recent_lines_per_document() {
        let broadcaster = LogBroadcaster::new(10);
        broadcaster.info("d1", "one");
        broadcaster.warn("d2", "other");
        broadcaster.error("d1", "two");

        let lines: Vec<String> = broadcaster
            .recent("d1")
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
        assert!(broadcaster.recent("unknown").is_empty());
    }

    #[test]
    fn test_recent_lines_are_bounded() {
        let broadcaster = LogBroadcaster::new(10);
        for i in 0..(RECENT_LINES_PER_DOCUMENT + 5) {
            broadcaster.info("d1", &format!("line {}", i));
        }

        let lines = broadcaster.recent("d1");
        assert_eq!(lines.len(), RECENT_LINES_PER_DOCUMENT);
        assert_eq!(lines[0].message, "line 5");
    }
}
