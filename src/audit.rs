//! Append-only JSONL audit log.
//!
//! One self-contained JSON object per line, so consumers can tolerate
//! partial files after a crash: every line that parses is a valid record.
//! Concurrently-running tasks never write here directly; their records are
//! buffered per task and merged only after the level barrier, so the stream
//! has a single writer at all times.

use crate::core::task::{ExitClassification, TaskId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened, in machine-readable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    RunStarted,
    LevelStarted,
    TaskFinished,
    LevelCompleted,
    LevelFailed,
    LevelRetried,
    LevelSkipped,
    ValidationAttempt,
    RemediationApplied,
    BlockerRecorded,
    GateDecision,
    RunCompleted,
    RunEscalated,
    RunAborted,
}

/// One line of the audit stream.
///
/// Optional fields are omitted from the JSON when absent so each event type
/// stays compact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub event: AuditEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ExitClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    /// Create a record for `event` stamped now.
    pub fn new(run_id: RunId, event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            level_index: None,
            task_id: None,
            attempt: None,
            event,
            classification: None,
            duration_ms: None,
            detail: None,
        }
    }

    pub fn level(mut self, index: usize) -> Self {
        self.level_index = Some(index);
        self
    }

    pub fn task(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn classification(mut self, classification: ExitClassification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Per-task record buffer.
///
/// Tasks running concurrently within a level accumulate records here; the
/// driver merges buffers into the [`AuditLog`] after the level barrier, in
/// task order, so the single stream never sees interleaved writers.
#[derive(Debug, Clone, Default)]
pub struct TaskAuditBuffer {
    records: Vec<AuditRecord>,
}

impl TaskAuditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: AuditRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drain the buffered records in insertion order.
    pub fn drain(&mut self) -> Vec<AuditRecord> {
        std::mem::take(&mut self.records)
    }
}

/// The append-only JSONL writer.
///
/// Each append is a single write of one line followed by a flush, keeping
/// lines self-contained even if the process dies mid-run.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Open (or create) the audit log at `path`, appending to existing
    /// content.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a JSON line.
    pub fn append(&mut self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    /// Merge a task buffer into the log.
    pub fn merge(&mut self, buffer: &mut TaskAuditBuffer) -> Result<()> {
        for record in buffer.drain() {
            self.append(&record)?;
        }
        Ok(())
    }

    /// Read back every parseable record from a (possibly truncated) log.
    ///
    /// Lines that fail to parse are skipped: a crash can leave a partial
    /// final line, and consumers must tolerate it.
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
