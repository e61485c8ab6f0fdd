//! Per-run interpreter state.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::command::{parse_section, Command, HookKind, VarKey};
use crate::condition::ConditionEnv;
use crate::config::EngineConfig;
use crate::encoded::{Base64Codec, SectionCodec};
use crate::error::ScriptError;
use crate::escaper::{escape, unescape};
use crate::log::{BuildLog, LogEntry, LogState};
use crate::macros::{macro_lines, MacroTable, APIVAR_KEY, API_KEY, DEFAULT_API_SECTION};
use crate::network::{NetworkProbe, SystemProbe};
use crate::registry::{MemoryRegistry, Registry};
use crate::script::{paths_equal, Project, Script};
use crate::variables::{expand_params, ParamContext, ParamList, VarTier, VariableStore};

/// One running `Loop`/`LoopLetter` iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopFrame {
    /// Value of `#c` for this iteration.
    pub counter: String,
    /// Set by `Loop,BREAK`; the loop ends after this iteration.
    pub broken: bool,
}

/// Conditions that cut execution short.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HaltFlags {
    /// `Exit`: skip the rest of the current script.
    pub script_exit: bool,
    /// `Halt`: stop the build.
    pub cmd_halt: bool,
    /// A critical error, or any error with `stop_on_error`.
    pub error: bool,
    /// `Return`: leave the current section.
    pub section_return: bool,
}

impl HaltFlags {
    /// True when the command sequence being run must stop.
    pub fn stops_commands(&self) -> bool {
        self.script_exit || self.cmd_halt || self.error || self.section_return
    }

    /// True when no further script of the build may start.
    pub fn stops_build(&self) -> bool {
        self.cmd_halt || self.error
    }

    /// Carries build-stopping flags raised by `other` over into `self`.
    pub fn absorb_build_stop(&mut self, other: HaltFlags) {
        self.cmd_halt |= other.cmd_halt;
        self.error |= other.error;
    }
}

/// Why a script or a build ended; passed to exit callbacks as `#1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
    Done,
    /// Ended by `Exit` or `Halt`.
    Command,
    Error,
}

impl BuildEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildEvent::Done => "DONE",
            BuildEvent::Command => "COMMAND",
            BuildEvent::Error => "ERROR",
        }
    }
}

impl fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a build reads and writes.
///
/// Constructed once per build with [`EngineState::new`], which bootstraps
/// Fixed and Global variables and loads the global macros. Collaborators
/// default to an in-memory registry, the system network probe and the
/// base64 section codec; the `with_*` builders replace them.
#[derive(Clone)]
pub struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) project: Project,
    pub(crate) current_script: Arc<Script>,
    pub(crate) variables: VariableStore,
    pub(crate) params: ParamList,
    pub(crate) return_value: String,
    pub(crate) loop_stack: Vec<LoopFrame>,
    pub(crate) depth: usize,
    pub(crate) call_depth: usize,
    pub(crate) else_flag: bool,
    pub(crate) halt: HaltFlags,
    pub(crate) macros: MacroTable,
    pub(crate) on_build_exit: Option<Command>,
    pub(crate) on_plugin_exit: Option<Command>,
    compiled: HashMap<(PathBuf, String), Arc<Vec<Command>>>,
    pub(crate) registry: Arc<dyn Registry>,
    pub(crate) network: Arc<dyn NetworkProbe>,
    pub(crate) codec: Arc<dyn SectionCodec>,
    pub(crate) log: BuildLog,
}

impl fmt::Debug for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineState")
            .field("project", &self.project.dir())
            .field("current_script", &self.current_script.path())
            .field("depth", &self.depth)
            .field("call_depth", &self.call_depth)
            .field("halt", &self.halt)
            .field("log_entries", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl EngineState {
    pub fn new(project: Project, config: EngineConfig) -> Self {
        let current_script = project.main().clone();
        let mut state = Self {
            variables: VariableStore::new(config.max_expand_iterations),
            config,
            project,
            current_script,
            params: ParamList::new(),
            return_value: String::new(),
            loop_stack: Vec::new(),
            depth: 0,
            call_depth: 0,
            else_flag: false,
            halt: HaltFlags::default(),
            macros: MacroTable::new(),
            on_build_exit: None,
            on_plugin_exit: None,
            compiled: HashMap::new(),
            registry: Arc::new(MemoryRegistry::new()),
            network: Arc::new(SystemProbe),
            codec: Arc::new(Base64Codec::default()),
            log: BuildLog::new(),
        };
        state.bootstrap_variables();
        state.load_global_macros();
        state
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkProbe>) -> Self {
        self.network = network;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn SectionCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn current_script(&self) -> &Arc<Script> {
        &self.current_script
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    pub fn return_value(&self) -> &str {
        &self.return_value
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    pub fn halt(&self) -> HaltFlags {
        self.halt
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    pub fn registry_handle(&self) -> Arc<dyn Registry> {
        self.registry.clone()
    }

    pub fn on_build_exit(&self) -> Option<&Command> {
        self.on_build_exit.as_ref()
    }

    pub fn on_plugin_exit(&self) -> Option<&Command> {
        self.on_plugin_exit.as_ref()
    }

    /// Registers the command run once after the build.
    pub fn set_on_build_exit(&mut self, cmd: Option<Command>) {
        self.on_build_exit = cmd;
    }

    /// Registers the command run once after the current script.
    pub fn set_on_plugin_exit(&mut self, cmd: Option<Command>) {
        self.on_plugin_exit = cmd;
    }

    pub(crate) fn set_hook(&mut self, hook: HookKind, cmd: Command) {
        match hook {
            HookKind::OnBuildExit => self.on_build_exit = Some(cmd),
            HookKind::OnPluginExit => self.on_plugin_exit = Some(cmd),
        }
    }

    pub(crate) fn param_context(&self) -> ParamContext<'_> {
        ParamContext {
            params: &self.params,
            return_value: &self.return_value,
            loop_counter: self.loop_stack.last().map(|f| f.counter.as_str()),
        }
    }

    /// Expands parameters, then variables, then unescapes.
    pub fn preprocess(&self, text: &str) -> Result<String, ScriptError> {
        let with_params = expand_params(text, &self.param_context())?;
        let expanded = self.variables.expand(&with_params)?;
        Ok(unescape(&expanded, true, true))
    }

    pub(crate) fn preprocess_all(&self, items: &[String]) -> Result<Vec<String>, ScriptError> {
        items.iter().map(|s| self.preprocess(s)).collect()
    }

    /// Records an entry produced by `cmd` at the current depth.
    pub(crate) fn emit(&mut self, cmd: &Command, entry: LogEntry) {
        let entry = entry.with_command(cmd).with_depth(self.depth);
        self.record(entry);
    }

    /// Records an entry and raises the error halt when it calls for one.
    pub(crate) fn record(&mut self, entry: LogEntry) {
        if entry.state == LogState::CriticalError
            || (entry.state == LogState::Error && self.config.stop_on_error)
        {
            self.halt.error = true;
        }
        self.log.push(entry);
    }

    pub(crate) fn record_error(&mut self, cmd: Option<&Command>, err: &ScriptError) {
        let mut entry = LogEntry::new(err.severity(), err.to_string()).with_depth(self.depth);
        if let Some(cmd) = cmd {
            entry = entry.with_command(cmd);
        }
        self.record(entry);
    }

    /// Stores a command result so that reading it back yields `value` unchanged.
    pub(crate) fn assign(&mut self, cmd: &Command, key: &VarKey, value: &str) -> Result<(), ScriptError> {
        match key {
            VarKey::Variable(name) => {
                self.variables.set_local(name, escape(value, false, true))?;
                self.emit(cmd, LogEntry::success(format!("Local variable [%{}%] set to [{}]", name, value)));
            }
            VarKey::Param(n) => {
                self.params.set(*n, value)?;
                self.emit(cmd, LogEntry::success(format!("Section parameter [#{}] set to [{}]", n, value)));
            }
        }
        Ok(())
    }

    /// Current value behind a variable or parameter.
    pub(crate) fn read_key(&self, key: &VarKey) -> Result<String, ScriptError> {
        match key {
            VarKey::Variable(name) => {
                if !self.variables.contains(name) {
                    return Err(ScriptError::execution(format!("Variable [%{}%] does not exist", name)));
                }
                self.preprocess(&format!("%{}%", name))
            }
            VarKey::Param(n) => Ok(self.params.get(*n)?.to_string()),
        }
    }

    /// Finds a script named by an operand.
    ///
    /// Accepts the current script's path, a project script (by path or file
    /// name), or any script file on disk.
    pub fn resolve_script(&self, token: &str) -> Result<Arc<Script>, ScriptError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ScriptError::execution("Script path is empty"));
        }
        if paths_equal(self.current_script.path(), Path::new(token)) {
            return Ok(self.current_script.clone());
        }
        if let Some(script) = self.project.find(token) {
            return Ok(script);
        }
        let path = Path::new(token);
        if path.is_file() {
            return Ok(Arc::new(Script::load(path)?));
        }
        Err(ScriptError::execution(format!("Unable to find script [{}]", token)))
    }

    /// Parsed and compiled commands of a section, cached per address.
    pub(crate) fn compiled_section(&mut self, script: &Script, section: &str) -> Result<Arc<Vec<Command>>, ScriptError> {
        let address = script.address(section);
        let key = address.key();
        if let Some(cached) = self.compiled.get(&key) {
            return Ok(cached.clone());
        }
        let sec = script.section(section).ok_or_else(|| {
            ScriptError::execution(format!(
                "[{}] does not have section [{}]",
                script.path().display(),
                section
            ))
        })?;
        let commands = Arc::new(parse_section(address, &sec.lines, self.config.max_nesting_depth)?);
        self.compiled.insert(key, commands.clone());
        Ok(commands)
    }

    /// Swaps in a re-read script after its file changed on disk.
    pub(crate) fn reload_script(&mut self, path: &Path) -> Result<Arc<Script>, ScriptError> {
        let script = self.project.replace(Script::load(path)?);
        self.compiled.retain(|(p, _), _| !paths_equal(p, path));
        if paths_equal(self.current_script.path(), path) {
            self.current_script = script.clone();
        }
        Ok(script)
    }

    fn bootstrap_variables(&mut self) {
        let main = self.project.main().clone();
        let project_dir = self.project.dir().to_path_buf();
        let base_dir = project_dir.parent().unwrap_or(&project_dir).to_path_buf();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();

        let mut fixed = vec![
            ("ProjectTitle", self.project.title()),
            ("Title", self.project.title()),
            ("ProjectDir", project_dir.display().to_string()),
            ("BaseDir", base_dir.display().to_string()),
            ("EngineVersion", env!("CARGO_PKG_VERSION").to_string()),
            ("TempDir", std::env::temp_dir().display().to_string()),
            ("UserName", user),
        ];
        if let Some(version) = main.main_value("Version") {
            fixed.push(("Version", version));
        }
        let fixed = fixed.into_iter().map(|(k, v)| (k, escape(&v, false, true)));
        if let Err(e) = self.variables.bootstrap_fixed(fixed) {
            self.record_error(None, &e);
        }

        for (name, value) in main.variables() {
            if let Err(e) = self.variables.set_global(&name, value) {
                self.record_error(None, &e);
            }
        }
        for key in ["SourceDir", "TargetDir", "ISOFile"] {
            if let Some(value) = main.main_value(key) {
                if let Err(e) = self.variables.set_global(key, value) {
                    self.record_error(None, &e);
                }
            }
        }
        tracing::debug!(
            fixed = self.variables.vars(VarTier::Fixed).len(),
            global = self.variables.vars(VarTier::Global).len(),
            "variables bootstrapped"
        );
    }

    fn load_global_macros(&mut self) {
        let main = self.project.main().clone();
        let lookup = |key: &str| {
            main.section(Script::VARIABLES_SECTION).and_then(|sec| {
                sec.key_values()
                    .into_iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.trim_matches('"').to_string())
            })
        };
        let api = lookup(API_KEY);
        let apivar = lookup(APIVAR_KEY);

        let section = match apivar.as_deref().map(|s| self.preprocess(s)) {
            Some(Ok(name)) => name,
            Some(Err(e)) => {
                self.record_error(None, &e);
                return;
            }
            None => DEFAULT_API_SECTION.to_string(),
        };
        let script = match api.as_deref().map(|s| self.preprocess(s).and_then(|p| self.resolve_script(&p))) {
            Some(Ok(script)) => script,
            Some(Err(e)) => {
                self.record(LogEntry::warning(format!("Unable to load macros: {}", e)));
                return;
            }
            None => main.clone(),
        };

        if api.is_some() || apivar.is_some() || script.has_section(&section) {
            for entry in self.macros.load_section(&script, &section, true) {
                self.record(entry);
            }
        }
        let has_inline = main
            .section(Script::VARIABLES_SECTION)
            .is_some_and(|sec| !macro_lines(sec).is_empty());
        if has_inline {
            for entry in self.macros.load_section(&main, Script::VARIABLES_SECTION, true) {
                self.record(entry);
            }
        }
    }

    /// Resets the Local tier for a script and loads its own defaults.
    pub(crate) fn enter_script(&mut self, script: &Arc<Script>) {
        self.current_script = script.clone();
        self.variables.reset_local();
        self.macros.reset_local();
        self.params = ParamList::new();
        self.return_value.clear();
        self.loop_stack.clear();
        self.else_flag = false;
        self.halt.script_exit = false;
        self.halt.section_return = false;
        self.load_script_locals(script);
    }

    /// Loads a script's builtin and `[Variables]` locals and its local macros
    /// into the (already reset) Local tiers.
    pub(crate) fn load_script_locals(&mut self, script: &Arc<Script>) {
        let dir = script
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let builtins = [
            ("ScriptFile", script.path().display().to_string()),
            ("ScriptDir", dir),
            ("ScriptTitle", script.title()),
        ];
        for (name, value) in builtins {
            if let Err(e) = self.variables.set_local(name, escape(&value, false, true)) {
                self.record_error(None, &e);
            }
        }
        for (name, value) in script.variables() {
            if let Err(e) = self.variables.set_local(&name, value) {
                self.record_error(None, &e);
            }
        }

        let is_main = paths_equal(script.path(), self.project.main().path());
        let has_inline = script
            .section(Script::VARIABLES_SECTION)
            .is_some_and(|sec| !macro_lines(sec).is_empty());
        if !is_main && has_inline {
            for entry in self.macros.load_section(script, Script::VARIABLES_SECTION, false) {
                self.record(entry);
            }
        }
    }

    pub(crate) fn event(&self) -> BuildEvent {
        if self.halt.error {
            BuildEvent::Error
        } else if self.halt.cmd_halt || self.halt.script_exit {
            BuildEvent::Command
        } else {
            BuildEvent::Done
        }
    }
}

impl ConditionEnv for EngineState {
    fn preprocess(&self, text: &str) -> Result<String, ScriptError> {
        EngineState::preprocess(self, text)
    }

    fn variable_exists(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    fn macro_exists(&self, name: &str) -> bool {
        self.macros.contains(name)
    }

    fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    fn network(&self) -> &dyn NetworkProbe {
        self.network.as_ref()
    }

    fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.config.ping_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = "[Main]\nTitle=Demo\nVersion=3\nTargetDir=C:\\Target\n\n\
        [Variables]\n%Greeting%=Hello\nSay=Echo,#1\n\n\
        [ApiVar]\nShout=Echo,#1,WARN\n";

    fn state() -> EngineState {
        let project = Project::single(Script::parse("/p/script.project", MAIN));
        EngineState::new(project, EngineConfig::default())
    }

    #[test]
    fn bootstrap_sets_fixed_and_global() {
        let s = state();
        assert_eq!(s.variables.tier_of("ProjectTitle"), Some(VarTier::Fixed));
        assert_eq!(s.variables.tier_of("Title"), Some(VarTier::Fixed));
        assert_eq!(s.variables.get("Title"), Some("Demo"));
        assert_eq!(s.variables.get("Version"), Some("3"));
        assert_eq!(s.variables.get_in(VarTier::Global, "Greeting"), Some("Hello"));
        assert_eq!(s.variables.get_in(VarTier::Global, "TargetDir"), Some("C:\\Target"));
    }

    #[test]
    fn global_macros_from_api_section_and_variables() {
        let s = state();
        assert!(s.macros.contains("shout"));
        assert!(s.macros.contains("Say"));
        assert_eq!(s.macros.global_len(), 2);
    }

    #[test]
    fn preprocess_chains_params_variables_and_unescape() {
        let mut s = state();
        s.params = ParamList::from(vec!["World".to_string()]);
        assert_eq!(s.preprocess("%Greeting%#$s#1").unwrap(), "Hello World");
        assert_eq!(s.preprocess("%Missing%").unwrap(), "%Missing%");
    }

    #[test]
    fn assigned_values_read_back_verbatim() {
        let mut s = state();
        let cmd = Command::parse_line("Echo,x", s.current_script.address("Process"), 0).unwrap();
        let key = VarKey::Variable("Out".into());
        s.assign(&cmd, &key, "50% off, #1 deal").unwrap();
        assert_eq!(s.read_key(&key).unwrap(), "50% off, #1 deal");
    }

    #[test]
    fn stop_on_error_raises_halt() {
        let mut s = state();
        s.record(LogEntry::error("boom"));
        assert!(!s.halt.error);
        s.config.stop_on_error = true;
        s.record(LogEntry::error("boom"));
        assert!(s.halt.error);
    }

    #[test]
    fn events_follow_halt_flags() {
        let mut s = state();
        assert_eq!(s.event(), BuildEvent::Done);
        s.halt.script_exit = true;
        assert_eq!(s.event().as_str(), "COMMAND");
        s.halt.error = true;
        assert_eq!(s.event(), BuildEvent::Error);
    }
}
