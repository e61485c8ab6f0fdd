//! Build driver and lifecycle callbacks.

use std::sync::Arc;

use tracing::{info, info_span};

use crate::command::{Command, CommandKind, HookKind};
use crate::error::ScriptError;
use crate::log::LogEntry;
use crate::script::Script;
use crate::variables::ParamList;

use super::state::{BuildEvent, EngineState};

/// Copies a callback, passing the event as its first section parameter.
fn with_event_arg(cmd: &Command, event: BuildEvent) -> Command {
    let mut cmd = cmd.clone();
    if let CommandKind::Run { args, .. } | CommandKind::Exec { args, .. } = &mut cmd.kind {
        match args.first_mut() {
            Some(first) => *first = event.as_str().to_string(),
            None => args.push(event.as_str().to_string()),
        }
    }
    cmd
}

impl EngineState {
    /// Runs every selected script of the project, then the build callback.
    pub fn run_build(&mut self) -> BuildEvent {
        let scripts = self.project.build_order();
        self.run_scripts(&scripts)
    }

    /// Runs `scripts` in order as one build.
    pub fn run_scripts(&mut self, scripts: &[Arc<Script>]) -> BuildEvent {
        let span = info_span!("build", project = %self.project.title());
        let _guard = span.enter();
        info!(scripts = scripts.len(), "build started");
        self.record(LogEntry::info(format!("Build [{}] started", self.project.title())));

        for script in scripts {
            if self.halt.stops_build() {
                break;
            }
            self.run_script(script.clone());
        }

        self.run_callback(HookKind::OnBuildExit, self.event());
        let event = self.event();
        info!(event = %event, entries = self.log.len(), "build finished");
        self.record(LogEntry::info(format!("Build finished [{}]", event)));
        event
    }

    /// Runs the `[Process]` section of one script, then its callback.
    pub fn run_script(&mut self, script: Arc<Script>) -> BuildEvent {
        self.enter_script(&script);
        let title = script.title();
        info!(script = %title, "processing script");
        self.record(LogEntry::info(format!("Processing script [{}]", title)));

        if script.has_section(Script::ENTRY_SECTION) {
            if let Err(e) = self.run_section_in(script.clone(), Script::ENTRY_SECTION, ParamList::new(), 0) {
                self.record_error(None, &e);
            }
        } else {
            self.record(LogEntry::info(format!(
                "Script [{}] has no [{}] section",
                title,
                Script::ENTRY_SECTION
            )));
        }

        self.run_callback(HookKind::OnPluginExit, self.event());
        let event = self.event();
        self.record(LogEntry::info(format!("End of script [{}]", title)));
        event
    }

    /// Runs and clears a pending callback with halt flags suspended.
    fn run_callback(&mut self, hook: HookKind, event: BuildEvent) {
        let pending = match hook {
            HookKind::OnBuildExit => self.on_build_exit.take(),
            HookKind::OnPluginExit => self.on_plugin_exit.take(),
        };
        let Some(callback) = pending else {
            return;
        };
        let name = match hook {
            HookKind::OnBuildExit => "OnBuildExit",
            HookKind::OnPluginExit => "OnPluginExit",
        };

        self.record(LogEntry::info(format!("Processing callback of event [{}]", name)));
        let saved_halt = std::mem::take(&mut self.halt);
        let saved_script = self.current_script.clone();
        if hook == HookKind::OnBuildExit {
            if let Some(owner) = self.project.find(&callback.address.script.to_string_lossy()) {
                self.current_script = owner;
            }
        }

        let cmd = with_event_arg(&callback, event);
        let saved_depth = self.depth;
        self.depth = 0;
        self.execute_command(&cmd);
        self.depth = saved_depth;

        self.current_script = saved_script;
        let raised = std::mem::replace(&mut self.halt, saved_halt);
        self.halt.absorb_build_stop(raised);
        self.record(LogEntry::info(format!("End of callback [{}]", name)));
    }

    /// Parses `line` in the context of the current script's entry section.
    pub fn parse_in_current(&self, line: &str) -> Result<Command, ScriptError> {
        let address = self.current_script.address(Script::ENTRY_SECTION);
        Command::parse_line(line, address, 0)
    }
}
