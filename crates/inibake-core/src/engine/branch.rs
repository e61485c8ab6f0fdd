//! If/Else, section calls, loops and macros.

use std::borrow::Cow;

use crate::command::{Body, Command, CommandKind, LoopAction};
use crate::compiler::compile;
use crate::condition::BranchCondition;
use crate::error::ScriptError;
use crate::log::LogEntry;
use crate::variables::{expand_params, ParamList};

use super::state::{EngineState, LoopFrame};
use super::string::parse_int;

/// The commands of a branch body. A command executed on its own has not been
/// through the section compiler, so its embedded body is compiled here.
fn compiled(body: &Body, max_depth: usize) -> Result<Cow<'_, [Command]>, ScriptError> {
    match body {
        Body::Compiled(commands) => Ok(Cow::Borrowed(commands)),
        Body::Embedded(inner) => Ok(Cow::Owned(compile(vec![(**inner).clone()], max_depth)?)),
    }
}

/// Bounds of a `Loop` or `LoopLetter`. Counters are produced one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopRange {
    Numbers(i64, i64),
    Letters(char, char),
}

impl LoopRange {
    fn parse(letters: bool, start: &str, end: &str) -> Result<Self, ScriptError> {
        if letters {
            let letter = |s: &str| -> Result<char, ScriptError> {
                let mut chars = s.trim().chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
                    _ => Err(ScriptError::execution(format!("Argument [{}] is not a valid drive letter", s))),
                }
            };
            let (first, last) = (letter(start)?, letter(end)?);
            if last < first {
                return Err(ScriptError::execution(
                    "<StartLetter> must not come after <EndLetter> in alphabetical order",
                ));
            }
            return Ok(LoopRange::Letters(first, last));
        }
        Ok(LoopRange::Numbers(parse_int(start)?, parse_int(end)?))
    }

    /// Number of iterations; zero when the end comes before the start.
    fn len(&self) -> u128 {
        let (first, last) = match *self {
            LoopRange::Numbers(first, last) => (i128::from(first), i128::from(last)),
            LoopRange::Letters(first, last) => (i128::from(u32::from(first)), i128::from(u32::from(last))),
        };
        if last < first {
            0
        } else {
            (last - first + 1) as u128
        }
    }

    fn counters(self) -> Box<dyn Iterator<Item = String>> {
        match self {
            LoopRange::Numbers(first, last) => Box::new((first..=last).map(|i| i.to_string())),
            LoopRange::Letters(first, last) => Box::new((first..=last).map(String::from)),
        }
    }
}

impl EngineState {
    pub(super) fn run_if(&mut self, cmd: &Command, cond: &BranchCondition, body: &Body) -> Result<(), ScriptError> {
        self.else_flag = false;
        let body = compiled(body, self.config.max_nesting_depth)?;
        let (matched, message) = cond.evaluate(&*self)?;
        if matched {
            self.emit(cmd, LogEntry::success(message));
            self.run_body(&body);
            self.else_flag = false;
        } else {
            self.emit(cmd, LogEntry::ignore(message));
            self.else_flag = true;
        }
        Ok(())
    }

    pub(super) fn run_else(&mut self, cmd: &Command, body: &Body) -> Result<(), ScriptError> {
        let body = compiled(body, self.config.max_nesting_depth)?;
        if !self.else_flag {
            self.emit(cmd, LogEntry::ignore("Else condition not met"));
            return Ok(());
        }
        self.else_flag = false;
        self.emit(cmd, LogEntry::success("Else condition met"));
        // An else-if leaves the flag for the next Else in the chain.
        let chained = matches!(&*body, [only] if matches!(only.kind, CommandKind::If { .. }));
        self.run_body(&body);
        if !chained {
            self.else_flag = false;
        }
        Ok(())
    }

    /// `Run` gets the arguments as a fresh parameter list. `Exec` does too
    /// when it has arguments and otherwise keeps the caller's parameters; it
    /// also swaps in the target script's locals and local macros for the
    /// duration of the call.
    pub(super) fn run_exec(
        &mut self,
        cmd: &Command,
        script: &str,
        section: &str,
        args: &[String],
        exec: bool,
    ) -> Result<(), ScriptError> {
        let script_name = self.preprocess(script)?;
        let section = self.preprocess(section)?;
        let args = self.preprocess_all(args)?;
        if !exec {
            return self.call_section(cmd, &script_name, &section, ParamList::from(args));
        }
        let params = if args.is_empty() {
            self.params.clone()
        } else {
            ParamList::from(args)
        };

        let target = self.resolve_script(&script_name)?;
        let saved_vars = self.variables.local_snapshot();
        let saved_macros = self.macros.local_snapshot();
        self.variables.reset_local();
        self.macros.reset_local();
        self.load_script_locals(&target);

        let result = self.call_section(cmd, &script_name, &section, params);

        self.variables.restore_local(saved_vars);
        self.macros.restore_local(saved_macros);
        result
    }

    fn call_section(&mut self, cmd: &Command, script_name: &str, section: &str, params: ParamList) -> Result<(), ScriptError> {
        let target = self.resolve_script(script_name)?;
        if !target.has_section(section) {
            return Err(ScriptError::execution(format!(
                "[{}] does not have section [{}]",
                script_name, section
            )));
        }
        let shown = if params.is_empty() {
            String::new()
        } else {
            format!(" with params [{}]", params.as_slice().join(", "))
        };
        self.emit(
            cmd,
            LogEntry::info(format!("Processing section [{}] of [{}]{}", section, target.title(), shown)),
        );
        self.run_section_in(target.clone(), section, params, self.depth + 1)?;
        self.emit(cmd, LogEntry::info(format!("End of section [{}] of [{}]", section, target.title())));
        Ok(())
    }

    pub(super) fn run_loop(&mut self, cmd: &Command, letters: bool, action: &LoopAction) -> Result<(), ScriptError> {
        let (script, section, start, end, args) = match action {
            LoopAction::Break => {
                let frame = self
                    .loop_stack
                    .last_mut()
                    .ok_or_else(|| ScriptError::execution("Loop is not running"))?;
                frame.broken = true;
                self.emit(cmd, LogEntry::info("Breaking loop"));
                return Ok(());
            }
            LoopAction::Iterate { script, section, start, end, args } => (script, section, start, end, args),
        };

        let start = self.preprocess(start)?;
        let end = self.preprocess(end)?;
        let script_name = self.preprocess(script)?;
        let section = self.preprocess(section)?;
        let params = ParamList::from(self.preprocess_all(args)?);

        let target = self.resolve_script(&script_name)?;
        if !target.has_section(&section) {
            return Err(ScriptError::execution(format!(
                "[{}] does not have section [{}]",
                script_name, section
            )));
        }
        let range = LoopRange::parse(letters, &start, &end)?;
        let total = range.len();
        self.emit(
            cmd,
            LogEntry::info(format!("Loop Section [{}] [{}] times ({} ~ {})", section, total, start, end)),
        );

        for (i, counter) in range.counters().enumerate() {
            if self.halt.stops_build() || self.halt.script_exit {
                break;
            }
            self.emit(cmd, LogEntry::info(format!("Entering Loop with [{}] ({}/{})", counter, i + 1, total)));
            self.loop_stack.push(LoopFrame {
                counter: counter.clone(),
                broken: false,
            });
            let result = self.run_section_in(target.clone(), &section, params.clone(), self.depth + 1);
            let frame = self.loop_stack.pop();
            result?;
            if frame.is_some_and(|f| f.broken) {
                break;
            }
            self.emit(cmd, LogEntry::info(format!("End of Loop with [{}] ({}/{})", counter, i + 1, total)));
        }
        Ok(())
    }

    /// Binds the arguments as `#1..#n` and runs the macro's command.
    pub(super) fn invoke_macro(&mut self, cmd: &Command, name: &str, args: &[String]) -> Result<(), ScriptError> {
        let mac = self
            .macros
            .get(name)
            .ok_or_else(|| ScriptError::execution(format!("Invalid command [{}]", name)))?;

        let ctx = self.param_context();
        let bound = args
            .iter()
            .map(|a| expand_params(a, &ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let bound = ParamList::from(bound);
        self.emit(cmd, LogEntry::info(format!("Executing command [{}]", name)));

        match &mac.kind {
            CommandKind::Run { script, section, .. } | CommandKind::Exec { script, section, .. } => {
                let script_name = self.preprocess(script)?;
                let section = self.preprocess(section)?;
                self.call_section(cmd, &script_name, &section, bound)
            }
            _ => {
                if self.call_depth >= self.config.max_call_depth {
                    return Err(ScriptError::critical(format!(
                        "Section calls exceed the maximum depth of [{}]",
                        self.config.max_call_depth
                    )));
                }
                let saved = std::mem::replace(&mut self.params, bound);
                let saved_else = self.else_flag;
                let saved_depth = self.depth;
                self.call_depth += 1;
                self.depth += 1;
                self.execute_command(&mac);
                self.depth = saved_depth;
                self.call_depth -= 1;
                self.else_flag = saved_else;
                self.params = saved;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(letters: bool, start: &str, end: &str) -> Vec<String> {
        LoopRange::parse(letters, start, end).unwrap().counters().collect()
    }

    #[test]
    fn integer_counters_are_inclusive() {
        assert_eq!(counters(false, "1", "3"), vec!["1", "2", "3"]);
        assert!(counters(false, "3", "1").is_empty());
        assert_eq!(LoopRange::parse(false, "3", "1").unwrap().len(), 0);
        assert!(LoopRange::parse(false, "a", "3").is_err());
    }

    #[test]
    fn huge_ranges_are_produced_lazily() {
        let range = LoopRange::parse(false, "0", "9223372036854775807").unwrap();
        assert_eq!(range.len(), 1u128 << 63);
        let first: Vec<String> = range.counters().take(2).collect();
        assert_eq!(first, vec!["0", "1"]);

        let full = LoopRange::parse(false, "-9223372036854775808", "9223372036854775807").unwrap();
        assert_eq!(full.len(), 1u128 << 64);
    }

    #[test]
    fn letter_counters() {
        assert_eq!(counters(true, "c", "E"), vec!["C", "D", "E"]);
        assert_eq!(LoopRange::parse(true, "c", "E").unwrap().len(), 3);
        assert!(LoopRange::parse(true, "E", "C").is_err());
        assert!(LoopRange::parse(true, "CD", "E").is_err());
    }
}
