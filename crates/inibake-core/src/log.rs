//! Build log entries and the in-memory log sink.
//!
//! Every command the engine executes produces one or more [`LogEntry`]
//! values. Each entry records the severity, the message, the raw command
//! text, the section it came from, and the nesting depth, which is enough
//! to reconstruct an indented trace of the whole build afterwards.
//!
//! # Example
//!
//! ```
//! use inibake_core::log::{BuildLog, LogEntry, LogState};
//!
//! let mut log = BuildLog::new();
//! log.push(LogEntry::success("File [a.txt] copied").with_depth(1));
//! log.push(LogEntry::warning("Overwrite [b.txt]"));
//!
//! assert_eq!(log.count(LogState::Warning), 1);
//! println!("{}", log.render_trace());
//! ```

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::Command;
use crate::script::SectionAddress;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogState {
    Success,
    Warning,
    /// An existing file or value was replaced.
    Overwrite,
    Error,
    CriticalError,
    Info,
    /// A condition did not hold or an action was skipped.
    Ignore,
    Muted,
}

impl LogState {
    /// Short tag used in rendered traces and tracing fields.
    pub fn name(&self) -> &'static str {
        match self {
            LogState::Success => "Success",
            LogState::Warning => "Warning",
            LogState::Overwrite => "Overwrite",
            LogState::Error => "Error",
            LogState::CriticalError => "CriticalError",
            LogState::Info => "Info",
            LogState::Ignore => "Ignore",
            LogState::Muted => "Muted",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogState::Error | LogState::CriticalError)
    }
}

/// A single build log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier for this entry.
    pub id: Uuid,

    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,

    pub state: LogState,

    pub message: String,

    /// Raw text of the originating command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Section the originating command belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Arc<SectionAddress>>,

    /// Nesting depth at the time of logging.
    pub depth: usize,
}

impl LogEntry {
    /// Creates a new entry with a fresh id and the current time.
    pub fn new(state: LogState, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            state,
            message: message.into(),
            command: None,
            address: None,
            depth: 0,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogState::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogState::Info, message)
    }

    pub fn ignore(message: impl Into<String>) -> Self {
        Self::new(LogState::Ignore, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogState::Warning, message)
    }

    pub fn overwrite(message: impl Into<String>) -> Self {
        Self::new(LogState::Overwrite, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogState::Error, message)
    }

    /// Attaches the command's raw text and section address.
    pub fn with_command(mut self, cmd: &Command) -> Self {
        self.command = Some(cmd.raw.clone());
        self.address = Some(cmd.address.clone());
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }
}

/// Append-only sink for [`LogEntry`] values.
///
/// Entries are mirrored to `tracing` as they arrive so that a subscriber
/// configured by the host sees the build as it happens.
#[derive(Debug, Clone, Default)]
pub struct BuildLog {
    entries: Vec<LogEntry>,
}

impl BuildLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        match entry.state {
            LogState::Error | LogState::CriticalError => {
                tracing::warn!(state = entry.state.name(), depth = entry.depth, "{}", entry.message)
            }
            LogState::Warning | LogState::Overwrite => {
                tracing::info!(state = entry.state.name(), depth = entry.depth, "{}", entry.message)
            }
            _ => tracing::debug!(state = entry.state.name(), depth = entry.depth, "{}", entry.message),
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded at or after `start`.
    pub fn since(&self, start: usize) -> &[LogEntry] {
        &self.entries[start.min(self.entries.len())..]
    }

    pub fn count(&self, state: LogState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.state.is_error())
    }

    /// Writes every entry as one JSON object per line.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for entry in &self.entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()
    }

    /// Renders an indented, human-readable trace.
    pub fn render_trace(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&"  ".repeat(entry.depth));
            out.push('[');
            out.push_str(entry.state.name());
            out.push_str("] ");
            out.push_str(&entry.message);
            if let Some(cmd) = &entry.command {
                if !cmd.is_empty() {
                    out.push_str(" (");
                    out.push_str(&cmd.replace('\n', " "));
                    out.push(')');
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_errors() {
        let mut log = BuildLog::new();
        log.push(LogEntry::success("ok"));
        log.push(LogEntry::error("bad"));
        log.push(LogEntry::success("ok again"));
        assert_eq!(log.count(LogState::Success), 2);
        assert!(log.has_errors());
        assert_eq!(log.since(1).len(), 2);
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn trace_is_indented_by_depth() {
        let mut log = BuildLog::new();
        log.push(LogEntry::info("top"));
        log.push(LogEntry::success("nested").with_depth(2));
        let trace = log.render_trace();
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines[0], "[Info] top");
        assert_eq!(lines[1], "    [Success] nested");
    }

    #[test]
    fn jsonl_skips_empty_optionals() {
        let mut log = BuildLog::new();
        log.push(LogEntry::warning("careful"));
        let mut buf = Vec::new();
        log.write_jsonl(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["state"], "Warning");
        assert!(value.get("command").is_none());
        assert!(value.get("address").is_none());
    }

    #[test]
    fn entry_roundtrips_through_json() {
        let entry = LogEntry::overwrite("replaced").with_depth(3);
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.state, LogState::Overwrite);
        assert_eq!(back.depth, 3);
    }
}
