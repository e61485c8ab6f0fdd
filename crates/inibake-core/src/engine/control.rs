//! Variables, macros, hooks, interface output and flow control.

use std::time::Duration;

use crate::command::{Command, HookKind, SetScope, VarKey};
use crate::error::ScriptError;
use crate::escaper::quote_escape;
use crate::ini::IniDocument;
use crate::log::LogEntry;
use crate::macros::macro_lines;
use crate::script::{variable_lines, Script};
use crate::variables::{expand_params, VarTier};

use super::state::EngineState;
use super::string::parse_int;

const NIL: &str = "NIL";

const SOUNDS: &[&str] = &["OK", "Error", "Asterisk", "Confirmation"];
const ICONS: &[&str] = &["Information", "Confirmation", "Error", "Warning"];

impl EngineState {
    /// Writes a `[Variables]` line of the main script and reloads it.
    fn persist_main_variable(&mut self, key: &str, value: Option<&str>) -> Result<(), ScriptError> {
        let path = self.project.main().path().to_path_buf();
        let mut doc = IniDocument::load(&path)?;
        match value {
            Some(value) => {
                doc.set(Script::VARIABLES_SECTION, key, value);
            }
            None => {
                doc.delete_key(Script::VARIABLES_SECTION, key);
            }
        }
        doc.save(&path)?;
        self.reload_script(&path)?;
        Ok(())
    }

    pub(super) fn set(&mut self, cmd: &Command, target: &VarKey, value: &str, scope: SetScope) -> Result<(), ScriptError> {
        // Only parameters are substituted; variable references stay lazy.
        let value = expand_params(value, &self.param_context())?;
        let name = match target {
            VarKey::Param(n) => {
                self.params.set(*n, value.clone())?;
                self.emit(cmd, LogEntry::success(format!("Section parameter [#{}] set to [{}]", n, value)));
                return Ok(());
            }
            VarKey::Variable(name) => name,
        };

        if self.variables.is_fixed(name) {
            return Err(ScriptError::FixedVariable(name.clone()));
        }

        if value.eq_ignore_ascii_case(NIL) {
            let local = self.variables.delete(VarTier::Local, name);
            let global = self.variables.delete(VarTier::Global, name);
            if scope == SetScope::Permanent {
                self.persist_main_variable(&format!("%{}%", name), None)?;
            }
            let entry = if local || global {
                LogEntry::success(format!("Variable [%{}%] deleted", name))
            } else {
                LogEntry::ignore(format!("Variable [%{}%] does not exist", name))
            };
            self.emit(cmd, entry);
            return Ok(());
        }

        match scope {
            SetScope::Local => {
                self.variables.set_local(name, value.clone())?;
                self.emit(cmd, LogEntry::success(format!("Local variable [%{}%] set to [{}]", name, value)));
            }
            SetScope::Global => {
                self.variables.set_global(name, value.clone())?;
                self.variables.delete(VarTier::Local, name);
                self.emit(cmd, LogEntry::success(format!("Global variable [%{}%] set to [{}]", name, value)));
            }
            SetScope::Permanent => {
                self.variables.set_global(name, value.clone())?;
                self.variables.delete(VarTier::Local, name);
                self.persist_main_variable(&format!("%{}%", name), Some(&value))?;
                self.emit(cmd, LogEntry::success(format!("Permanent variable [%{}%] set to [{}]", name, value)));
            }
        }
        Ok(())
    }

    pub(super) fn set_macro(&mut self, cmd: &Command, name: &str, command: &str, scope: SetScope) -> Result<(), ScriptError> {
        let global = scope != SetScope::Local;
        let tier = if global { "Global" } else { "Local" };

        if command.trim().eq_ignore_ascii_case(NIL) {
            let removed = self.macros.remove(name, global);
            if scope == SetScope::Permanent {
                self.persist_main_variable(name, None)?;
            }
            let entry = if removed {
                LogEntry::success(format!("{} macro [{}] deleted", tier, name))
            } else {
                LogEntry::ignore(format!("{} macro [{}] does not exist", tier, name))
            };
            self.emit(cmd, entry);
            return Ok(());
        }

        let parsed = Command::parse_line(command, cmd.address.clone(), cmd.line_idx)?;
        self.macros.insert(name, parsed, global);
        if scope == SetScope::Permanent {
            self.persist_main_variable(name, Some(command))?;
        }
        self.emit(cmd, LogEntry::success(format!("{} macro [{}] set to [{}]", tier, name, command)));
        Ok(())
    }

    pub(super) fn add_variables(&mut self, cmd: &Command, script: &str, section: &str, global: bool) -> Result<(), ScriptError> {
        let script_name = self.preprocess(script)?;
        let section = self.preprocess(section)?;
        let target = self.resolve_script(&script_name)?;
        let sec = target.section(&section).ok_or_else(|| {
            ScriptError::execution(format!("[{}] does not have section [{}]", script_name, section))
        })?;

        let tier = if global { VarTier::Global } else { VarTier::Local };
        let mut added = 0usize;
        for (name, value) in variable_lines(sec) {
            match self.variables.set(tier, &name, value) {
                Ok(()) => added += 1,
                Err(e) => self.record_error(Some(cmd), &e),
            }
        }
        if !macro_lines(sec).is_empty() {
            for entry in self.macros.load_section(&target, &section, global) {
                self.emit(cmd, entry);
            }
        }
        self.emit(
            cmd,
            LogEntry::success(format!("Added [{}] {} variables from section [{}]", added, tier, section)),
        );
        Ok(())
    }

    pub(super) fn echo(&mut self, cmd: &Command, message: &str, warn: bool) -> Result<(), ScriptError> {
        let message = self.preprocess(message)?;
        let entry = if warn {
            LogEntry::warning(message)
        } else {
            LogEntry::success(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    /// No UI exists, so the message is only logged.
    pub(super) fn message(
        &mut self,
        cmd: &Command,
        message: &str,
        icon: Option<&str>,
        timeout: Option<&str>,
    ) -> Result<(), ScriptError> {
        let message = self.preprocess(message)?;
        let icon = match icon {
            Some(raw) => {
                let icon = self.preprocess(raw)?;
                ICONS
                    .iter()
                    .find(|i| i.eq_ignore_ascii_case(&icon))
                    .copied()
                    .ok_or_else(|| ScriptError::execution(format!("Invalid message icon [{}]", icon)))?
            }
            None => "Information",
        };
        if let Some(raw) = timeout {
            let secs = parse_int(&self.preprocess(raw)?)?;
            if secs < 0 {
                return Err(ScriptError::execution(format!("Timeout [{}] must not be negative", secs)));
            }
        }
        let entry = if icon == "Warning" || icon == "Error" {
            LogEntry::warning(message)
        } else {
            LogEntry::success(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn exit(&mut self, cmd: &Command, message: &str, no_warn: bool) -> Result<(), ScriptError> {
        let message = self.preprocess(message)?;
        self.halt.script_exit = true;
        let entry = if no_warn {
            LogEntry::info(message)
        } else {
            LogEntry::warning(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn halt_build(&mut self, cmd: &Command, message: &str) -> Result<(), ScriptError> {
        let message = self.preprocess(message)?;
        self.halt.cmd_halt = true;
        self.emit(cmd, LogEntry::warning(message));
        Ok(())
    }

    pub(super) fn wait(&mut self, cmd: &Command, seconds: &str) -> Result<(), ScriptError> {
        let secs = parse_int(&self.preprocess(seconds)?)?;
        let secs = u64::try_from(secs)
            .map_err(|_| ScriptError::execution(format!("Argument [{}] must not be negative", secs)))?;
        std::thread::sleep(Duration::from_secs(secs));
        self.emit(cmd, LogEntry::success(format!("Slept [{}] seconds", secs)));
        Ok(())
    }

    /// Sounds are not played; the request is logged.
    pub(super) fn beep(&mut self, cmd: &Command, sound: Option<&str>) -> Result<(), ScriptError> {
        let sound = match sound {
            Some(raw) => {
                let wanted = self.preprocess(raw)?;
                SOUNDS
                    .iter()
                    .find(|s| s.eq_ignore_ascii_case(&wanted))
                    .copied()
                    .ok_or_else(|| ScriptError::execution(format!("Invalid beep type [{}]", wanted)))?
            }
            None => "OK",
        };
        self.emit(cmd, LogEntry::success(format!("Played sound [{}]", sound)));
        Ok(())
    }

    pub(super) fn get_param(&mut self, cmd: &Command, index: &str, dest: &VarKey) -> Result<(), ScriptError> {
        let index = parse_int(&self.preprocess(index)?)?;
        let value = self.params.get(index)?.to_string();
        self.assign(cmd, dest, &value)
    }

    /// Packs `#start..#n` into one comma separated, quote-escaped value.
    pub(super) fn pack_param(
        &mut self,
        cmd: &Command,
        start: &str,
        dest: &VarKey,
        count: Option<&VarKey>,
    ) -> Result<(), ScriptError> {
        let start = parse_int(&self.preprocess(start)?)?;
        if start <= 0 {
            return Err(ScriptError::execution(format!(
                "Section parameter index [#{}] must be positive",
                start
            )));
        }
        let skip = usize::try_from(start - 1).unwrap_or(usize::MAX);
        let packed: Vec<String> = self
            .params
            .as_slice()
            .iter()
            .skip(skip)
            .map(|p| quote_escape(p, false, true))
            .collect();
        let total = packed.len();
        self.assign(cmd, dest, &packed.join(","))?;
        if let Some(count) = count {
            self.assign(cmd, count, &total.to_string())?;
        }
        Ok(())
    }

    pub(super) fn section_return(&mut self, cmd: &Command, value: Option<&str>) -> Result<(), ScriptError> {
        let section = cmd.address.section.clone();
        let entry = match value {
            Some(raw) => {
                let value = self.preprocess(raw)?;
                let entry = LogEntry::info(format!("Returned [{}] from section [{}]", value, section));
                self.return_value = value;
                entry
            }
            None => LogEntry::info(format!("Returned from section [{}]", section)),
        };
        self.halt.section_return = true;
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn system(&mut self, cmd: &Command, hook: HookKind, callback: &Command) -> Result<(), ScriptError> {
        self.set_hook(hook, callback.clone());
        let name = match hook {
            HookKind::OnBuildExit => "OnBuildExit",
            HookKind::OnPluginExit => "OnPluginExit",
        };
        self.emit(cmd, LogEntry::success(format!("{} callback registered", name)));
        Ok(())
    }
}
