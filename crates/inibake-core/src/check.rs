//! Static checks over scripts, without running anything.
//!
//! Only sections that are actually code are compiled: the entry section and
//! every section it reaches through `Run`, `Exec` or `Loop` on the same
//! script. Data sections such as `[Main]` or attached files are left alone.

use std::collections::{HashSet, VecDeque};

use crate::command::{parse_section, Body, Command, CommandKind, LoopAction};
use crate::error::ScriptError;
use crate::script::{Project, Script};

/// A grammar error together with where it was found.
#[derive(Debug)]
pub struct SectionError {
    pub script: String,
    pub section: String,
    pub error: ScriptError,
}

impl std::fmt::Display for SectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.script, self.section, self.error)
    }
}

/// Compiles every code section of every script in the project.
pub fn check_project(project: &Project, max_depth: usize) -> Vec<SectionError> {
    project
        .scripts()
        .iter()
        .flat_map(|s| check_script(s, max_depth))
        .collect()
}

/// Compiles the code sections of one script and collects what fails.
pub fn check_script(script: &Script, max_depth: usize) -> Vec<SectionError> {
    let mut errors = Vec::new();
    for name in code_sections(script, max_depth, &mut errors) {
        tracing::debug!(script = %script.path().display(), section = %name, "Section compiled");
    }
    errors
}

/// Names of the sections reachable from `[Process]`, in visit order.
fn code_sections(script: &Script, max_depth: usize, errors: &mut Vec<SectionError>) -> Vec<String> {
    let mut visited = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([Script::ENTRY_SECTION.to_string()]);

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        let Some(section) = script.section(&name) else {
            continue;
        };
        match parse_section(script.address(&name), &section.lines, max_depth) {
            Ok(commands) => {
                let mut calls = Vec::new();
                collect_calls(script, &commands, &mut calls);
                queue.extend(calls);
                visited.push(section.name.clone());
            }
            Err(error) => errors.push(SectionError {
                script: script.path().display().to_string(),
                section: section.name.clone(),
                error,
            }),
        }
    }
    visited
}

/// Pushes literal section names that `commands` call on `script`.
fn collect_calls(script: &Script, commands: &[Command], out: &mut Vec<String>) {
    for cmd in commands {
        match &cmd.kind {
            CommandKind::Run { script: target, section, .. }
            | CommandKind::Exec { script: target, section, .. }
            | CommandKind::Loop {
                action: LoopAction::Iterate { script: target, section, .. },
                ..
            } => {
                if calls_self(script, target) && is_literal(section) {
                    out.push(section.clone());
                }
            }
            CommandKind::If { body: Body::Compiled(body), .. } | CommandKind::Else { body: Body::Compiled(body) } => {
                collect_calls(script, body, out);
            }
            CommandKind::System { command, .. } => {
                collect_calls(script, std::slice::from_ref(command.as_ref()), out);
            }
            _ => {}
        }
    }
}

fn calls_self(script: &Script, target: &str) -> bool {
    target.eq_ignore_ascii_case("%ScriptFile%")
        || script
            .path()
            .file_name()
            .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(target))
}

fn is_literal(token: &str) -> bool {
    !token.contains('%') && !token.contains('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(text: &str) -> Script {
        Script::parse("/p/a.script", text)
    }

    #[test]
    fn data_sections_are_skipped() {
        let s = script("[Main]\nTitle=A\n\n[Variables]\n%X%=1\n\n[Process]\nEcho,hi\n");
        assert!(check_script(&s, 8).is_empty());
    }

    #[test]
    fn called_sections_are_checked() {
        let s = script(
            "[Process]\nIf,1,Equal,1,Run,%ScriptFile%,Helper\n\n[Helper]\nIf,1,Equal,1,Begin\nEcho,x\n\n[Unused]\nEnd\n",
        );
        let errors = check_script(&s, 8);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].section, "Helper");
        assert!(errors[0].error.is_grammar());
    }

    #[test]
    fn dynamic_targets_are_not_followed() {
        let s = script("[Process]\nRun,%ScriptFile%,%Target%\n\n[Other]\nEnd\n");
        assert!(check_script(&s, 8).is_empty());
    }
}
