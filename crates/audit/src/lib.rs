//! `AuditSink`: the append-only destination for every non-simulated
//! `Decision`, plus a bounded JSONL-backed implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use gateway_core::AuditEntry;
use thiserror::Error;

/// Errors raised while reading back audit history.
#[derive(Debug, Error)]
pub enum AuditQueryError {
    /// The backing file or store could not be read.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record failed to deserialize.
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Append-only destination for audit entries. Callers never block: a full
/// sink drops the oldest queued entry and increments a counter (§5, §6).
pub trait AuditSink: Send + Sync {
    /// Submit `entry`. Returns `true` if it was queued, `false` if the sink
    /// was full and an older entry was dropped to make room.
    fn append(&self, entry: AuditEntry) -> bool;

    /// Total entries dropped due to backpressure since construction.
    fn dropped_count(&self) -> u64;
}

/// Read-back over previously appended audit entries, used by administrative
/// `ListAudit` operations.
pub trait AuditQuery: Send + Sync {
    /// Return entries for `project_id` in append order, newest last.
    ///
    /// # Errors
    /// Returns [`AuditQueryError`] if the backing store cannot be read.
    fn list(&self, project_id: &str) -> Result<Vec<AuditEntry>, AuditQueryError>;
}

/// A bounded, in-memory [`AuditSink`] useful for tests and as the default
/// local backend. Keeps the most recent `capacity` entries per sink.
#[derive(Debug)]
pub struct InMemoryAuditSink {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
    dropped: AtomicU64,
}

impl InMemoryAuditSink {
    /// Construct a sink bounded to `capacity` queued entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(VecDeque::new()), dropped: AtomicU64::new(0) }
    }

    /// Snapshot all currently retained entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit lock poisoned").iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, entry: AuditEntry) -> bool {
        let mut queue = self.entries.lock().expect("audit lock poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            queue.push_back(entry);
            return false;
        }
        queue.push_back(entry);
        true
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditQuery for InMemoryAuditSink {
    fn list(&self, project_id: &str) -> Result<Vec<AuditEntry>, AuditQueryError> {
        Ok(self.snapshot().into_iter().filter(|e| e.project_id == project_id).collect())
    }
}

/// A [`AuditSink`] that persists entries as newline-delimited JSON on a
/// background thread, so `append` never performs file I/O on the caller's
/// path. The channel itself provides the bound: when full, the oldest
/// queued (not-yet-written) entry is dropped (§5 `audit_buffer_size`).
pub struct JsonlAuditSink {
    sender: Mutex<Option<SyncSender<AuditEntry>>>,
    dropped: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JsonlAuditSink {
    /// Open (creating if absent) a JSONL file and spawn its writer thread.
    ///
    /// # Errors
    /// Returns an [`std::io::Error`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, buffer_size: usize) -> std::io::Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        OpenOptions::new().create(true).append(true).open(&path)?;

        let (sender, receiver): (SyncSender<AuditEntry>, Receiver<AuditEntry>) =
            sync_channel(buffer_size.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let worker = std::thread::spawn(move || writer_loop(path, receiver));

        Ok(Self { sender: Mutex::new(Some(sender)), dropped, worker: Mutex::new(Some(worker)) })
    }
}

fn writer_loop(path: PathBuf, receiver: Receiver<AuditEntry>) {
    let mut file = match OpenOptions::new().append(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "audit writer failed to open file");
            return;
        }
    };
    for entry in receiver {
        match serde_json::to_string(&entry) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::error!(error = %e, "audit writer failed to append entry");
                }
            }
            Err(e) => tracing::error!(error = %e, "audit entry failed to serialize"),
        }
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: AuditEntry) -> bool {
        let sender = self.sender.lock().expect("audit lock poisoned");
        match sender.as_ref().map(|s| s.try_send(entry)) {
            Some(Ok(())) => true,
            Some(Err(TrySendError::Full(_) | TrySendError::Disconnected(_))) | None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for JsonlAuditSink {
    fn drop(&mut self) {
        // Drop the sender first so the writer thread's receiver loop ends,
        // then join it; otherwise the join below would hang forever.
        self.sender.lock().expect("audit lock poisoned").take();
        if let Some(handle) = self.worker.lock().expect("audit lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(project_id: &str) -> AuditEntry {
        AuditEntry {
            project_id: project_id.into(),
            agent_name: "agent".into(),
            action_type: "pay_invoice".into(),
            params: json!({}),
            allowed: true,
            action_id: "act-1".into(),
            timestamp: 0,
            reason: None,
            policy_version: "v1".into(),
            execution_time_ms: 0.1,
        }
    }

    #[test]
    fn in_memory_sink_admits_under_capacity() {
        let sink = InMemoryAuditSink::new(2);
        assert!(sink.append(entry("p")));
        assert!(sink.append(entry("p")));
        assert_eq!(sink.dropped_count(), 0);
    }

    #[test]
    fn in_memory_sink_drops_oldest_over_capacity() {
        let sink = InMemoryAuditSink::new(1);
        assert!(sink.append(entry("p")));
        assert!(!sink.append(entry("p")));
        assert_eq!(sink.dropped_count(), 1);
        assert_eq!(sink.snapshot().len(), 1);
    }

    #[test]
    fn query_filters_by_project() {
        let sink = InMemoryAuditSink::new(10);
        sink.append(entry("p1"));
        sink.append(entry("p2"));
        let listed = sink.list("p1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].project_id, "p1");
    }

    #[test]
    fn jsonl_sink_writes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let sink = JsonlAuditSink::open(&path, 8).unwrap();
            assert!(sink.append(entry("p")));
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"project_id\":\"p\""));
    }
}
