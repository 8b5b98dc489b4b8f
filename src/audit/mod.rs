//! Audit recording
//!
//! Every state transition is appended as one JSON record per line, keyed by
//! request id. Recording never fails the caller: sink errors are logged via
//! `tracing` and the entry is still returned and kept in memory.
//!
//! The in-memory index only holds the most recent requests. Older trails are
//! replayed from the JSON-lines sink when one is configured.

use crate::models::{AuditEntry, RequestContext};
use crate::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Requests kept in the in-memory index unless configured otherwise
pub const DEFAULT_RETAINED_REQUESTS: usize = 1_000;

/// Per-request trails for the most recent `capacity` request ids
#[derive(Debug)]
struct RetainedIndex {
    trails: HashMap<Uuid, Vec<AuditEntry>>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl RetainedIndex {
    fn new(capacity: usize) -> Self {
        Self {
            trails: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, entry: AuditEntry) {
        let request_id = entry.request_id;
        if !self.trails.contains_key(&request_id) {
            self.order.push_back(request_id);
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.trails.remove(&evicted);
                    debug!(request_id = %evicted, "Evicted audit trail from memory");
                }
            }
        }
        self.trails.entry(request_id).or_default().push(entry);
    }

    fn get(&self, request_id: &Uuid) -> Option<Vec<AuditEntry>> {
        self.trails.get(request_id).cloned()
    }
}

/// Append-only audit trail, injected into every component at construction
pub struct AuditRecorder {
    records: Mutex<RetainedIndex>,
    sink: Mutex<Option<BufWriter<File>>>,
    sink_path: Option<PathBuf>,
}

impl AuditRecorder {
    /// Recorder without a durable sink
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(RetainedIndex::new(DEFAULT_RETAINED_REQUESTS)),
            sink: Mutex::new(None),
            sink_path: None,
        }
    }

    /// Recorder appending JSON lines to `path` (created if missing)
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;

        debug!(path = %path.as_ref().display(), "Audit sink opened");

        Ok(Self {
            records: Mutex::new(RetainedIndex::new(DEFAULT_RETAINED_REQUESTS)),
            sink: Mutex::new(Some(BufWriter::new(file))),
            sink_path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Keep at most `max_requests` request trails in memory (minimum 1)
    pub fn with_retention(mut self, max_requests: usize) -> Self {
        self.records = Mutex::new(RetainedIndex::new(max_requests));
        self
    }

    /// Open the configured sink, degrading to in-memory when it cannot be opened
    pub fn open(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::with_file(path).unwrap_or_else(|e| {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Audit sink unavailable, recording in memory only"
                );
                Self::in_memory()
            }),
            None => Self::in_memory(),
        }
    }

    /// Create, persist and return an audit entry.
    pub fn record(
        &self,
        action: &str,
        agent: &str,
        context: &RequestContext,
        details: Value,
    ) -> AuditEntry {
        let entry = AuditEntry::new(action, agent, context, details);

        if let Ok(mut sink) = self.sink.lock() {
            if let Some(writer) = sink.as_mut() {
                if let Err(e) = write_line(writer, &entry) {
                    warn!(
                        action,
                        request_id = %entry.request_id,
                        error = %e,
                        "Failed to persist audit entry"
                    );
                }
            }
        }

        match self.records.lock() {
            Ok(mut records) => records.push(entry.clone()),
            Err(_) => warn!(action, "Audit index poisoned, entry not indexed"),
        }

        entry
    }

    /// All entries recorded for a request, in recording order. Trails no
    /// longer held in memory are read back from the sink file.
    pub fn entries_for_request(&self, request_id: Uuid) -> Vec<AuditEntry> {
        let retained = self
            .records
            .lock()
            .ok()
            .and_then(|records| records.get(&request_id));
        if let Some(entries) = retained {
            return entries;
        }

        match &self.sink_path {
            Some(path) => self.replay_from_sink(path, request_id),
            None => Vec::new(),
        }
    }

    fn replay_from_sink(&self, path: &Path, request_id: Uuid) -> Vec<AuditEntry> {
        if let Err(e) = self.flush() {
            warn!(error = %e, "Failed to flush audit sink before replay");
        }

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Audit sink unreadable for replay");
                return Vec::new();
            }
        };

        BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str::<AuditEntry>(&line).ok())
            .filter(|entry| entry.request_id == request_id)
            .collect()
    }

    pub fn flush(&self) -> Result<()> {
        if let Ok(mut sink) = self.sink.lock() {
            if let Some(writer) = sink.as_mut() {
                writer.flush()?;
            }
        }
        Ok(())
    }

    /// Flush and release the sink. Later records stay in memory only.
    pub fn close(&self) {
        if let Ok(mut sink) = self.sink.lock() {
            if let Some(mut writer) = sink.take() {
                if let Err(e) = writer.flush() {
                    warn!(error = %e, "Failed to flush audit sink on close");
                }
            }
        }
    }
}

impl Default for AuditRecorder {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Drop for AuditRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_line(writer: &mut BufWriter<File>, entry: &AuditEntry) -> Result<()> {
    serde_json::to_writer(&mut *writer, entry)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Compute SHA256 hash of a request context for integrity verification
/// Uses zero-copy streaming serialization into hasher
pub fn compute_context_hash(context: &RequestContext) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), context).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplianceFlag, RiskTolerance};
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::new("auditor", RiskTolerance::Moderate, "5 years", 10_000.0)
    }

    #[test]
    fn test_record_indexes_by_request() {
        let recorder = AuditRecorder::in_memory();
        let a = context();
        let b = context();

        recorder.record("REQUEST_INITIATED", "orchestrator", &a, json!({}));
        recorder.record("REQUEST_COMPLETED", "orchestrator", &a, json!({}));
        recorder.record("REQUEST_INITIATED", "orchestrator", &b, json!({}));

        let trail = recorder.entries_for_request(a.request_id);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, "REQUEST_INITIATED");
        assert_eq!(trail[1].action, "REQUEST_COMPLETED");
        assert!(trail.iter().all(|e| e.request_id == a.request_id));
        assert_eq!(recorder.entries_for_request(b.request_id).len(), 1);
    }

    #[test]
    fn test_file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let ctx = context();

        let recorder = AuditRecorder::with_file(&path).unwrap();
        recorder.record(
            "PORTFOLIO_CONSTRUCTION_COMPLETED",
            "PortfolioConstructionAgent",
            &ctx,
            json!({"large_position_size": true}),
        );
        recorder.record("REQUEST_COMPLETED", "orchestrator", &ctx, json!({}));
        recorder.close();

        let file = File::open(&path).unwrap();
        let lines: Vec<String> = BufReader::new(file).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first.request_id, ctx.request_id);
        assert_eq!(first.compliance_flags, vec![ComplianceFlag::ConcentrationRisk]);
    }

    #[test]
    fn test_unopenable_sink_degrades_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("audit.log");

        let recorder = AuditRecorder::open(Some(missing.as_path()));
        let ctx = context();
        let entry = recorder.record("REQUEST_INITIATED", "orchestrator", &ctx, json!({}));

        assert_eq!(entry.action, "REQUEST_INITIATED");
        assert_eq!(recorder.entries_for_request(ctx.request_id).len(), 1);
    }

    #[test]
    fn test_index_keeps_only_recent_requests() {
        let recorder = AuditRecorder::in_memory().with_retention(2);
        let contexts: Vec<RequestContext> = (0..3).map(|_| context()).collect();

        for ctx in &contexts {
            recorder.record("REQUEST_INITIATED", "orchestrator", ctx, json!({}));
            recorder.record("REQUEST_COMPLETED", "orchestrator", ctx, json!({}));
        }

        assert!(recorder.entries_for_request(contexts[0].request_id).is_empty());
        assert_eq!(recorder.entries_for_request(contexts[1].request_id).len(), 2);
        assert_eq!(recorder.entries_for_request(contexts[2].request_id).len(), 2);
    }

    #[test]
    fn test_evicted_trail_replays_from_sink() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = AuditRecorder::with_file(dir.path().join("audit.log"))
            .unwrap()
            .with_retention(1);
        let first = context();
        let second = context();

        recorder.record("REQUEST_INITIATED", "orchestrator", &first, json!({}));
        recorder.record("REQUEST_COMPLETED", "orchestrator", &first, json!({}));
        recorder.record("REQUEST_INITIATED", "orchestrator", &second, json!({}));

        let trail = recorder.entries_for_request(first.request_id);
        assert_eq!(
            trail.iter().map(|e| e.action.as_str()).collect::<Vec<_>>(),
            vec!["REQUEST_INITIATED", "REQUEST_COMPLETED"]
        );
        assert!(trail.iter().all(|e| e.request_id == first.request_id));
        assert_eq!(recorder.entries_for_request(second.request_id).len(), 1);
        assert!(recorder.entries_for_request(context().request_id).is_empty());
    }

    #[test]
    fn test_context_hash_is_stable() {
        let ctx = context();
        let first = compute_context_hash(&ctx);
        assert_eq!(first.len(), 64);
        assert_eq!(first, compute_context_hash(&ctx.clone()));
        assert_ne!(first, compute_context_hash(&context()));
    }
}
