//! Execution engine.
//!
//! [`EngineState`] carries everything a build touches. Commands run through
//! [`EngineState::execute_command`], which dispatches on the opcode, turns
//! any [`ScriptError`] into a log entry of matching severity and returns the
//! entries the command produced. Sections are compiled on first use and
//! cached for the rest of the build.
//!
//! ```no_run
//! use inibake_core::config::EngineConfig;
//! use inibake_core::engine::EngineState;
//! use inibake_core::script::Project;
//!
//! let project = Project::load("projects/Demo").expect("cannot load project");
//! let mut state = EngineState::new(project, EngineConfig::default());
//! let event = state.run_build();
//! println!("{} ({} entries)", event, state.log().len());
//! ```

mod attach;
mod branch;
mod build;
mod control;
mod file;
mod registry;
mod state;
mod string;
mod text;

use std::sync::Arc;

use tracing::debug_span;

use crate::command::{Command, CommandKind};
use crate::error::ScriptError;
use crate::log::LogEntry;
use crate::script::{Script, SectionAddress};
use crate::variables::ParamList;

pub use state::{BuildEvent, EngineState, HaltFlags, LoopFrame};

impl EngineState {
    /// Runs one command and returns the log entries it produced, including
    /// those of any section it called.
    pub fn execute_command(&mut self, cmd: &Command) -> Vec<LogEntry> {
        let start = self.log.len();
        let span = debug_span!("command", op = cmd.kind.name(), depth = self.depth);
        let _guard = span.enter();

        if let Err(e) = self.dispatch(cmd) {
            self.record_error(Some(cmd), &e);
        }
        self.log.since(start).to_vec()
    }

    /// Runs `commands` in order at `depth`, stopping early on any halt.
    pub fn run_commands(&mut self, commands: &[Command], depth: usize) {
        let saved = self.depth;
        self.depth = depth;
        for cmd in commands {
            if self.halt.stops_commands() {
                break;
            }
            self.execute_command(cmd);
        }
        self.depth = saved;
    }

    /// Runs the section at `address` with its own positional parameters.
    pub fn run_section(&mut self, address: &SectionAddress, params: ParamList, depth: usize) -> Result<(), ScriptError> {
        let script = self.resolve_script(&address.script.to_string_lossy())?;
        self.run_section_in(script, &address.section, params, depth)
    }

    pub(crate) fn run_section_in(
        &mut self,
        script: Arc<Script>,
        section: &str,
        params: ParamList,
        depth: usize,
    ) -> Result<(), ScriptError> {
        if !script.has_section(section) {
            return Err(ScriptError::execution(format!(
                "[{}] does not have section [{}]",
                script.path().display(),
                section
            )));
        }
        if self.call_depth >= self.config.max_call_depth {
            return Err(ScriptError::critical(format!(
                "Section calls exceed the maximum depth of [{}]",
                self.config.max_call_depth
            )));
        }
        let commands = self.compiled_section(&script, section)?;

        let saved_params = std::mem::replace(&mut self.params, params);
        let saved_else = self.else_flag;
        self.else_flag = false;
        self.call_depth += 1;

        self.run_commands(&commands, depth);

        self.call_depth -= 1;
        self.halt.section_return = false;
        self.else_flag = saved_else;
        self.params = saved_params;
        Ok(())
    }

    /// Runs a compiled branch body one level below the current depth.
    pub(crate) fn run_body(&mut self, body: &[Command]) {
        self.run_commands(body, self.depth + 1);
    }

    fn dispatch(&mut self, cmd: &Command) -> Result<(), ScriptError> {
        match &cmd.kind {
            CommandKind::Comment => Ok(()),

            CommandKind::FileCopy { src, dest, preserve, no_warn, no_rec } => {
                self.file_copy(cmd, src, dest, *preserve, *no_warn, *no_rec)
            }
            CommandKind::FileDelete { path, no_warn } => self.file_delete(cmd, path, *no_warn),
            CommandKind::FileRename { src, dest } => self.file_rename(cmd, src, dest),
            CommandKind::FileCreateBlank { path, preserve, no_warn } => {
                self.file_create_blank(cmd, path, *preserve, *no_warn)
            }
            CommandKind::FileSize { path, dest } => self.file_size(cmd, path, dest),
            CommandKind::DirCopy { src, dest } => self.dir_copy(cmd, src, dest),
            CommandKind::DirDelete { dir } => self.dir_delete(cmd, dir),
            CommandKind::DirMove { src, dest } => self.dir_move(cmd, src, dest),
            CommandKind::DirMake { dir } => self.dir_make(cmd, dir),
            CommandKind::DirSize { dir, dest } => self.dir_size(cmd, dir, dest),

            CommandKind::RegRead { hive, key, value, dest } => self.reg_read(cmd, hive, key, value, dest),
            CommandKind::RegWrite { hive, value_type, key, value, data, no_warn } => {
                self.reg_write(cmd, hive, value_type, key, value, data, *no_warn)
            }
            CommandKind::RegDelete { hive, key, value } => self.reg_delete(cmd, hive, key, value.as_deref()),
            CommandKind::RegMulti { hive, key, value, action } => self.reg_multi(cmd, hive, key, value, action),

            CommandKind::TxtAddLine { file, line, placement } => self.txt_add_line(cmd, file, line, *placement),
            CommandKind::TxtDelLine { file, prefix } => self.txt_del_line(cmd, file, prefix),
            CommandKind::TxtReplace { file, old, new } => self.txt_replace(cmd, file, old, new),
            CommandKind::TxtDelEmptyLines { file } => self.txt_del_empty_lines(cmd, file),

            CommandKind::IniRead { file, section, key, dest, default } => {
                self.ini_read(cmd, file, section, key, dest, default.as_deref())
            }
            CommandKind::IniWrite { file, section, key, value } => self.ini_write(cmd, file, section, key, value),
            CommandKind::IniDelete { file, section, key } => self.ini_delete(cmd, file, section, key),
            CommandKind::IniAddSection { file, section } => self.ini_add_section(cmd, file, section),
            CommandKind::IniDeleteSection { file, section } => self.ini_delete_section(cmd, file, section),

            CommandKind::Echo { message, warn } => self.echo(cmd, message, *warn),
            CommandKind::Message { message, icon, timeout } => {
                self.message(cmd, message, icon.as_deref(), timeout.as_deref())
            }

            CommandKind::Encode { script, folder, file } => self.encode(cmd, script, folder, file),
            CommandKind::ExtractFile { script, folder, name, dest_dir } => {
                self.extract_file(cmd, script, folder, name, dest_dir)
            }

            CommandKind::StrFormat(op) => self.str_format(cmd, op),
            CommandKind::Math { op, dest, lhs, rhs } => self.math(cmd, *op, dest, lhs, rhs),

            CommandKind::Run { script, section, args } => self.run_exec(cmd, script, section, args, false),
            CommandKind::Exec { script, section, args } => self.run_exec(cmd, script, section, args, true),
            CommandKind::Loop { letters, action } => self.run_loop(cmd, *letters, action),
            CommandKind::If { cond, body } => self.run_if(cmd, cond, body),
            CommandKind::Else { body } => self.run_else(cmd, body),
            CommandKind::Begin | CommandKind::End => Err(ScriptError::critical(format!(
                "[{}] survived compilation",
                cmd.kind.name()
            ))),

            CommandKind::Set { target, value, scope } => self.set(cmd, target, value, *scope),
            CommandKind::SetMacro { name, command, scope } => self.set_macro(cmd, name, command, *scope),
            CommandKind::AddVariables { script, section, global } => {
                self.add_variables(cmd, script, section, *global)
            }
            CommandKind::Exit { message, no_warn } => self.exit(cmd, message, *no_warn),
            CommandKind::Halt { message } => self.halt_build(cmd, message),
            CommandKind::Wait { seconds } => self.wait(cmd, seconds),
            CommandKind::Beep { sound } => self.beep(cmd, sound.as_deref()),
            CommandKind::GetParam { index, dest } => self.get_param(cmd, index, dest),
            CommandKind::PackParam { start, dest, count } => self.pack_param(cmd, start, dest, count.as_ref()),
            CommandKind::Return { value } => self.section_return(cmd, value.as_deref()),
            CommandKind::System { hook, command } => self.system(cmd, *hook, command),

            CommandKind::Macro { name, args } => self.invoke_macro(cmd, name, args),
        }
    }
}
