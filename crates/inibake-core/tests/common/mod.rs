//! Shared test helpers for inibake-core integration tests.
//!
//! Builds throwaway projects on disk and engines wired to fakes, so tests
//! never touch the real network.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use inibake_core::config::EngineConfig;
use inibake_core::engine::EngineState;
use inibake_core::log::{LogEntry, LogState};
use inibake_core::network::NetworkProbe;
use inibake_core::registry::MemoryRegistry;
use inibake_core::script::Project;

// ---------------------------------------------------------------------------
// Fake network
// ---------------------------------------------------------------------------

/// Answers pings for a fixed set of hosts and counts every request.
#[derive(Debug, Default)]
pub struct FakeProbe {
    pub reachable: Vec<String>,
    pub online: bool,
    pub pings: AtomicUsize,
}

impl FakeProbe {
    pub fn new(reachable: &[&str], online: bool) -> Self {
        Self {
            reachable: reachable.iter().map(|h| h.to_string()).collect(),
            online,
            pings: AtomicUsize::new(0),
        }
    }
}

impl NetworkProbe for FakeProbe {
    fn ping(&self, host: &str, _timeout: Duration) -> Result<Duration, String> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.reachable.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            Ok(Duration::from_millis(1))
        } else {
            Err("Request timed out".to_string())
        }
    }

    fn is_online(&self) -> bool {
        self.online
    }
}

// ---------------------------------------------------------------------------
// Projects on disk
// ---------------------------------------------------------------------------

/// A project directory that lives as long as the value.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    /// Writes `script.project` plus `(file name, text)` scripts.
    pub fn new(main: &str, scripts: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(Project::MAIN_SCRIPT), main).unwrap();
        for (name, text) in scripts {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Path usable inside a script operand.
    pub fn operand(&self, name: &str) -> String {
        self.file(name).display().to_string()
    }

    pub fn load(&self) -> Project {
        Project::load(self.path()).unwrap()
    }

    pub fn engine(&self) -> EngineState {
        self.engine_with(EngineConfig::default())
    }

    pub fn engine_with(&self, config: EngineConfig) -> EngineState {
        EngineState::new(self.load(), config)
            .with_network(Arc::new(FakeProbe::new(&["localhost"], true)))
            .with_registry(Arc::new(MemoryRegistry::new()))
    }
}

/// A project whose main script has the given `[Process]` body.
pub fn project_with_process(body: &str) -> TestProject {
    TestProject::new(&format!("[Main]\nTitle=Test\n\n[Process]\n{}\n", body), &[])
}

// ---------------------------------------------------------------------------
// Running commands
// ---------------------------------------------------------------------------

/// Parses `line` against the current script and executes it.
pub fn exec(state: &mut EngineState, line: &str) -> Vec<LogEntry> {
    let cmd = state.parse_in_current(line).unwrap();
    state.execute_command(&cmd)
}

/// Messages of every entry with `state`.
pub fn messages(entries: &[LogEntry], state: LogState) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.state == state)
        .map(|e| e.message.clone())
        .collect()
}

pub fn has_message(entries: &[LogEntry], needle: &str) -> bool {
    entries.iter().any(|e| e.message.contains(needle))
}

/// Current value of a variable as a script would read it.
pub fn var(state: &EngineState, name: &str) -> String {
    state.preprocess(&format!("%{}%", name)).unwrap()
}
