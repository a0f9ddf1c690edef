//! Optional file-backed persistence for `ConversationMemory` (spec §6
//! "Persisted state layout"): one newline-delimited JSON file per session,
//! each line a `{session_id, role, content, tool_calls?, tool_call_id?,
//! created_at}` record.
//!
//! Grounded in the teacher's `SqliteSaver` (file-backed checkpointer reached
//! via `tokio::task::spawn_blocking` so synchronous file IO never blocks the
//! runtime), adapted from SQLite rows to the NDJSON wire format spec §6
//! names explicitly rather than introducing a database dependency for a
//! feature the spec scopes to "file-backed."

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, ErrorKind, Result};
use crate::message::Message;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Record {
    session_id: String,
    #[serde(flatten)]
    message: Message,
    created_at: DateTime<Utc>,
}

/// Appends and replays a session's history as one NDJSON file per
/// `session_id` under `dir`. Every write is a single `O_APPEND` line, so
/// concurrent appenders from different sessions never contend on a file.
pub struct NdjsonConversationStore {
    dir: PathBuf,
}

impl NdjsonConversationStore {
    /// Creates `dir` (and any missing parents) if it does not already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AgentError::new(ErrorKind::MemoryError, format!("failed to create ndjson store dir: {e}")).with_cause(e)
        })?;
        Ok(Self { dir })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.ndjson"))
    }

    /// Appends `message` to `session_id`'s file, stamped with the current
    /// time. Runs on a blocking thread so the async caller never stalls on
    /// disk IO (the teacher's file-backed checkpointer does the same).
    pub async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        let path = self.session_path(session_id);
        let record = Record {
            session_id: session_id.to_string(),
            message,
            created_at: Utc::now(),
        };
        tokio::task::spawn_blocking(move || write_record(&path, &record))
            .await
            .map_err(|e| AgentError::new(ErrorKind::Internal, format!("ndjson append task panicked: {e}")))?
    }

    /// Replays every record previously appended for `session_id`, in append
    /// order. Returns an empty vec if the session has no file yet.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let path = self.session_path(session_id);
        tokio::task::spawn_blocking(move || read_records(&path))
            .await
            .map_err(|e| AgentError::new(ErrorKind::Internal, format!("ndjson load task panicked: {e}")))?
    }
}

fn write_record(path: &Path, record: &Record) -> Result<()> {
    let line = serde_json::to_string(record)
        .map_err(|e| AgentError::new(ErrorKind::MemoryError, format!("failed to encode ndjson record: {e}")).with_cause(e))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AgentError::new(ErrorKind::MemoryError, format!("failed to open ndjson file: {e}")).with_cause(e))?;
    writeln!(file, "{line}").map_err(|e| AgentError::new(ErrorKind::MemoryError, format!("failed to append ndjson record: {e}")).with_cause(e))
}

fn read_records(path: &Path) -> Result<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)
        .map_err(|e| AgentError::new(ErrorKind::MemoryError, format!("failed to open ndjson file: {e}")).with_cause(e))?;
    let reader = BufReader::new(file);
    let mut messages = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| AgentError::new(ErrorKind::MemoryError, format!("failed to read ndjson line: {e}")).with_cause(e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .map_err(|e| AgentError::new(ErrorKind::MemoryError, format!("failed to decode ndjson record: {e}")).with_cause(e))?;
        messages.push(record.message);
    }
    Ok(messages)
}
