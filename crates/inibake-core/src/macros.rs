//! Macro tables.
//!
//! A macro is a named command. Global macros come from the project's API
//! section (named by `API`/`APIVAR` in the main script's `[Variables]`) and
//! from bare `Name=Command` lines in that same `[Variables]` section, which
//! is where `SetMacro,...,PERMANENT` writes. Local macros come from the
//! running script's own `[Variables]` and from `SetMacro` without a scope;
//! they are dropped when the next script starts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{parse_macro_name, Command};
use crate::log::LogEntry;
use crate::script::{Script, Section};

/// Key naming the macro script in the main script's `[Variables]`.
pub const API_KEY: &str = "API";
/// Key naming the macro section.
pub const APIVAR_KEY: &str = "APIVAR";
/// Section used when `APIVAR` is not set.
pub const DEFAULT_API_SECTION: &str = "ApiVar";

/// `Name=Command` lines of a section, skipping variables and API keys.
pub fn macro_lines(section: &Section) -> Vec<(usize, String, String)> {
    section
        .lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.trim();
            if crate::splitter::is_comment(line) {
                return None;
            }
            let (key, value) = crate::ini::split_key_value(line)?;
            if key.starts_with('%')
                || key.eq_ignore_ascii_case(API_KEY)
                || key.eq_ignore_ascii_case(APIVAR_KEY)
            {
                return None;
            }
            Some((i, key.to_string(), value.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    global: HashMap<String, Arc<Command>>,
    local: HashMap<String, Arc<Command>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the macro definitions of `section` into one tier.
    ///
    /// Malformed definitions are reported as warnings and skipped.
    pub fn load_section(&mut self, script: &Script, section: &str, global: bool) -> Vec<LogEntry> {
        let Some(sec) = script.section(section) else {
            return vec![LogEntry::warning(format!(
                "Macro section [{}] does not exist in [{}]",
                section,
                script.path().display()
            ))];
        };
        let address = script.address(section);
        let mut logs = Vec::new();
        let mut loaded = 0usize;
        for (idx, name, text) in macro_lines(sec) {
            if let Err(e) = parse_macro_name(&name) {
                logs.push(LogEntry::warning(e.to_string()));
                continue;
            }
            match Command::parse_line(&text, address.clone(), idx) {
                Ok(cmd) => {
                    self.insert(&name, cmd, global);
                    loaded += 1;
                }
                Err(e) => logs.push(LogEntry::warning(format!("Invalid macro [{}]: {}", name, e))),
            }
        }
        tracing::debug!(section, loaded, global, "loaded macros");
        logs.push(LogEntry::info(format!(
            "{} {} macro(s) loaded from [{}]",
            loaded,
            if global { "global" } else { "local" },
            section
        )));
        logs
    }

    pub fn insert(&mut self, name: &str, cmd: Command, global: bool) {
        let table = if global { &mut self.global } else { &mut self.local };
        table.insert(name.to_lowercase(), Arc::new(cmd));
    }

    pub fn remove(&mut self, name: &str, global: bool) -> bool {
        let table = if global { &mut self.global } else { &mut self.local };
        table.remove(&name.to_lowercase()).is_some()
    }

    /// Local first, then global.
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        let key = name.to_lowercase();
        self.local.get(&key).or_else(|| self.global.get(&key)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn global_len(&self) -> usize {
        self.global.len()
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn reset_local(&mut self) {
        self.local.clear();
    }

    pub fn local_snapshot(&self) -> HashMap<String, Arc<Command>> {
        self.local.clone()
    }

    pub fn restore_local(&mut self, snapshot: HashMap<String, Arc<Command>>) {
        self.local = snapshot;
    }
}
