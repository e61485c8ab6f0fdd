//! Typed commands.
//!
//! [`Command::parse`] turns one split code line into a [`Command`] whose
//! [`CommandKind`] carries exactly the operands and flags of its opcode.
//! Operands stay raw here; they are expanded against the engine state at the
//! moment the command runs. Arity and flag mistakes are grammar errors so
//! they surface before anything executes.
//!
//! `If`/`Else` keep their embedded command as [`Body::Embedded`] until the
//! compiler replaces it with a [`Body::Compiled`] list.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compiler;
use crate::condition::BranchCondition;
use crate::error::ScriptError;
use crate::escaper::quote_operand;
use crate::opcode::{self, Opcode, Resolved};
use crate::script::SectionAddress;
use crate::splitter::{self, SourceLine};

/// Destination of a value written by a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKey {
    /// `%Name%`
    Variable(String),
    /// `#1`..`#9`
    Param(i64),
}

impl VarKey {
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Some(name) = token.strip_prefix('%').and_then(|s| s.strip_suffix('%')) {
            if !name.is_empty() && !name.contains(['%', ' ']) {
                return Some(VarKey::Variable(name.to_string()));
            }
            return None;
        }
        let digits = token.strip_prefix('#')?;
        if digits.len() == 1 {
            let n = digits.parse::<i64>().ok()?;
            if n > 0 {
                return Some(VarKey::Param(n));
            }
        }
        None
    }
}

impl std::fmt::Display for VarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarKey::Variable(name) => write!(f, "%{}%", name),
            VarKey::Param(n) => write!(f, "#{}", n),
        }
    }
}

/// Where `Set` and `SetMacro` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetScope {
    Local,
    Global,
    /// Global, and persisted to the main script's `[Variables]`.
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinePlacement {
    Append,
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegMultiAction {
    Append(String),
    Prepend(String),
    Delete(String),
    /// Looks up the 1-based index of an item; 0 when absent.
    Index { item: String, dest: VarKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOperator {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrFormatOp {
    Inc { dest: VarKey, amount: String },
    Dec { dest: VarKey, amount: String },
    Left { src: String, count: String, dest: VarKey },
    Right { src: String, count: String, dest: VarKey },
    Len { src: String, dest: VarKey },
    UCase { src: String, dest: VarKey },
    LCase { src: String, dest: VarKey },
    /// `case_sensitive` is set for `ReplaceX`.
    Replace { src: String, from: String, to: String, case_sensitive: bool, dest: VarKey },
    /// Index 0 stores the number of parts.
    Split { src: String, delimiter: String, index: String, dest: VarKey },
    Pos { src: String, needle: String, dest: VarKey },
}

impl StrFormatOp {
    pub fn name(&self) -> &'static str {
        match self {
            StrFormatOp::Inc { .. } => "Inc",
            StrFormatOp::Dec { .. } => "Dec",
            StrFormatOp::Left { .. } => "Left",
            StrFormatOp::Right { .. } => "Right",
            StrFormatOp::Len { .. } => "Len",
            StrFormatOp::UCase { .. } => "UCase",
            StrFormatOp::LCase { .. } => "LCase",
            StrFormatOp::Replace { case_sensitive: false, .. } => "Replace",
            StrFormatOp::Replace { case_sensitive: true, .. } => "ReplaceX",
            StrFormatOp::Split { .. } => "Split",
            StrFormatOp::Pos { .. } => "Pos",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopAction {
    /// `Loop,BREAK`
    Break,
    Iterate {
        script: String,
        section: String,
        start: String,
        end: String,
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    OnBuildExit,
    /// Also spelled `OnScriptExit`.
    OnPluginExit,
}

/// The body of an `If` or `Else`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// As written on the line; only valid before compilation.
    Embedded(Box<Command>),
    Compiled(Vec<Command>),
}

/// One command per opcode, carrying exactly its operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Kept so the compiler can see comments between `If` and `Else`.
    Comment,

    // File
    FileCopy { src: String, dest: String, preserve: bool, no_warn: bool, no_rec: bool },
    FileDelete { path: String, no_warn: bool },
    FileRename { src: String, dest: String },
    FileCreateBlank { path: String, preserve: bool, no_warn: bool },
    FileSize { path: String, dest: VarKey },
    DirCopy { src: String, dest: String },
    DirDelete { dir: String },
    DirMove { src: String, dest: String },
    DirMake { dir: String },
    DirSize { dir: String, dest: VarKey },

    // Registry
    RegRead { hive: String, key: String, value: String, dest: VarKey },
    RegWrite { hive: String, value_type: String, key: String, value: String, data: Vec<String>, no_warn: bool },
    RegDelete { hive: String, key: String, value: Option<String> },
    RegMulti { hive: String, key: String, value: String, action: RegMultiAction },

    // Text
    TxtAddLine { file: String, line: String, placement: LinePlacement },
    TxtDelLine { file: String, prefix: String },
    TxtReplace { file: String, old: String, new: String },
    TxtDelEmptyLines { file: String },

    // Ini
    IniRead { file: String, section: String, key: String, dest: VarKey, default: Option<String> },
    IniWrite { file: String, section: String, key: String, value: String },
    IniDelete { file: String, section: String, key: String },
    IniAddSection { file: String, section: String },
    IniDeleteSection { file: String, section: String },

    // Interface
    Echo { message: String, warn: bool },
    Message { message: String, icon: Option<String>, timeout: Option<String> },

    // Attachments
    Encode { script: String, folder: String, file: String },
    ExtractFile { script: String, folder: String, name: String, dest_dir: String },

    StrFormat(StrFormatOp),
    Math { op: MathOperator, dest: VarKey, lhs: String, rhs: String },

    // Branch
    Run { script: String, section: String, args: Vec<String> },
    Exec { script: String, section: String, args: Vec<String> },
    Loop { letters: bool, action: LoopAction },
    If { cond: BranchCondition, body: Body },
    Else { body: Body },
    Begin,
    End,

    // Control
    Set { target: VarKey, value: String, scope: SetScope },
    SetMacro { name: String, command: String, scope: SetScope },
    AddVariables { script: String, section: String, global: bool },
    Exit { message: String, no_warn: bool },
    Halt { message: String },
    Wait { seconds: String },
    Beep { sound: Option<String> },
    GetParam { index: String, dest: VarKey },
    PackParam { start: String, dest: VarKey, count: Option<VarKey> },
    Return { value: Option<String> },
    System { hook: HookKind, command: Box<Command> },

    Macro { name: String, args: Vec<String> },
}

impl CommandKind {
    /// Mnemonic used in logs and diagnostics.
    pub fn name(&self) -> &'static str {
        let opcode = match self {
            CommandKind::Comment => return "Comment",
            CommandKind::FileCopy { .. } => Opcode::FileCopy,
            CommandKind::FileDelete { .. } => Opcode::FileDelete,
            CommandKind::FileRename { .. } => Opcode::FileRename,
            CommandKind::FileCreateBlank { .. } => Opcode::FileCreateBlank,
            CommandKind::FileSize { .. } => Opcode::FileSize,
            CommandKind::DirCopy { .. } => Opcode::DirCopy,
            CommandKind::DirDelete { .. } => Opcode::DirDelete,
            CommandKind::DirMove { .. } => Opcode::DirMove,
            CommandKind::DirMake { .. } => Opcode::DirMake,
            CommandKind::DirSize { .. } => Opcode::DirSize,
            CommandKind::RegRead { .. } => Opcode::RegRead,
            CommandKind::RegWrite { .. } => Opcode::RegWrite,
            CommandKind::RegDelete { .. } => Opcode::RegDelete,
            CommandKind::RegMulti { .. } => Opcode::RegMulti,
            CommandKind::TxtAddLine { .. } => Opcode::TxtAddLine,
            CommandKind::TxtDelLine { .. } => Opcode::TxtDelLine,
            CommandKind::TxtReplace { .. } => Opcode::TxtReplace,
            CommandKind::TxtDelEmptyLines { .. } => Opcode::TxtDelEmptyLines,
            CommandKind::IniRead { .. } => Opcode::IniRead,
            CommandKind::IniWrite { .. } => Opcode::IniWrite,
            CommandKind::IniDelete { .. } => Opcode::IniDelete,
            CommandKind::IniAddSection { .. } => Opcode::IniAddSection,
            CommandKind::IniDeleteSection { .. } => Opcode::IniDeleteSection,
            CommandKind::Echo { .. } => Opcode::Echo,
            CommandKind::Message { .. } => Opcode::Message,
            CommandKind::Encode { .. } => Opcode::Encode,
            CommandKind::ExtractFile { .. } => Opcode::ExtractFile,
            CommandKind::StrFormat(_) => Opcode::StrFormat,
            CommandKind::Math { .. } => Opcode::Math,
            CommandKind::Run { .. } => Opcode::Run,
            CommandKind::Exec { .. } => Opcode::Exec,
            CommandKind::Loop { letters: false, .. } => Opcode::Loop,
            CommandKind::Loop { letters: true, .. } => Opcode::LoopLetter,
            CommandKind::If { .. } => Opcode::If,
            CommandKind::Else { .. } => Opcode::Else,
            CommandKind::Begin => Opcode::Begin,
            CommandKind::End => Opcode::End,
            CommandKind::Set { .. } => Opcode::Set,
            CommandKind::SetMacro { .. } => Opcode::SetMacro,
            CommandKind::AddVariables { .. } => Opcode::AddVariables,
            CommandKind::Exit { .. } => Opcode::Exit,
            CommandKind::Halt { .. } => Opcode::Halt,
            CommandKind::Wait { .. } => Opcode::Wait,
            CommandKind::Beep { .. } => Opcode::Beep,
            CommandKind::GetParam { .. } => Opcode::GetParam,
            CommandKind::PackParam { .. } => Opcode::PackParam,
            CommandKind::Return { .. } => Opcode::Return,
            CommandKind::System { .. } => Opcode::System,
            CommandKind::Macro { .. } => Opcode::Macro,
        };
        opcode.name()
    }

    /// True for `Run`/`Exec`, which receive macro arguments verbatim.
    pub fn is_section_call(&self) -> bool {
        matches!(self, CommandKind::Run { .. } | CommandKind::Exec { .. })
    }
}

/// A parsed command and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Source text as written.
    pub raw: String,
    pub address: Arc<SectionAddress>,
    /// Index of the (first) source line within the section body.
    pub line_idx: usize,
    /// `If`/`Else` nesting depth assigned by the compiler.
    pub depth: usize,
    pub kind: CommandKind,
}

impl Command {
    pub fn comment(raw: impl Into<String>, address: Arc<SectionAddress>, line_idx: usize) -> Self {
        Self {
            raw: raw.into(),
            address,
            line_idx,
            depth: 0,
            kind: CommandKind::Comment,
        }
    }

    /// Builds a command from split operands; `operands[0]` is the mnemonic.
    pub fn parse(
        raw: impl Into<String>,
        operands: &[String],
        address: Arc<SectionAddress>,
        line_idx: usize,
    ) -> Result<Self, ScriptError> {
        let raw = raw.into();
        let kind = parse_kind(operands, &address, line_idx).map_err(|e| e.with_raw(raw.clone()))?;
        Ok(Self {
            raw,
            address,
            line_idx,
            depth: 0,
            kind,
        })
    }

    /// Parses a single line of text, such as a macro definition.
    pub fn parse_line(line: &str, address: Arc<SectionAddress>, line_idx: usize) -> Result<Self, ScriptError> {
        let lines = [line];
        let mut idx = 0;
        match splitter::read_line(&lines, &mut idx)? {
            SourceLine::Code { raw, operands } => Self::parse(raw, &operands, address, line_idx),
            _ => Err(ScriptError::grammar(format!("[{}] is not a command", line))),
        }
    }
}

/// Reads, parses and compiles every command of a section body.
pub fn parse_section(
    address: Arc<SectionAddress>,
    lines: &[String],
    max_depth: usize,
) -> Result<Vec<Command>, ScriptError> {
    let mut commands = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let start = idx;
        match splitter::read_line(lines, &mut idx)? {
            SourceLine::Blank => {}
            SourceLine::Comment(text) => commands.push(Command::comment(text, address.clone(), start)),
            SourceLine::Code { raw, operands } => {
                commands.push(Command::parse(raw, &operands, address.clone(), start)?);
            }
        }
        idx += 1;
    }
    compiler::compile(commands, max_depth)
}

/// Operand cursor with arity and flag checks.
struct Args<'a> {
    name: &'static str,
    args: &'a [String],
}

impl<'a> Args<'a> {
    fn new(name: &'static str, args: &'a [String]) -> Self {
        Self { name, args }
    }

    fn len(&self) -> usize {
        self.args.len()
    }

    fn range(&self, min: usize, max: Option<usize>) -> Result<(), ScriptError> {
        if self.args.len() < min {
            return Err(ScriptError::grammar(format!(
                "Command [{}] expects at least [{}] arguments, found [{}]",
                self.name,
                min,
                self.args.len()
            )));
        }
        if let Some(max) = max {
            if self.args.len() > max {
                return Err(ScriptError::grammar(format!(
                    "Command [{}] expects at most [{}] arguments, found [{}]",
                    self.name,
                    max,
                    self.args.len()
                )));
            }
        }
        Ok(())
    }

    fn exact(&self, n: usize) -> Result<(), ScriptError> {
        self.range(n, Some(n))
    }

    fn at(&self, i: usize) -> String {
        self.args.get(i).cloned().unwrap_or_default()
    }

    fn opt(&self, i: usize) -> Option<String> {
        self.args.get(i).cloned()
    }

    fn var(&self, i: usize) -> Result<VarKey, ScriptError> {
        let token = self.at(i);
        VarKey::parse(&token)
            .ok_or_else(|| ScriptError::grammar(format!("[{}] is not a valid variable name", token)))
    }

    fn rest(&self, from: usize) -> Vec<String> {
        self.args.get(from..).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// Operands from `from` on must be flags out of `allowed`, each at most once.
    fn flags(&self, from: usize, allowed: &[&str]) -> Result<Vec<&'static str>, ScriptError> {
        let mut found: Vec<&'static str> = Vec::new();
        for token in self.args.iter().skip(from) {
            let flag = FLAGS
                .iter()
                .copied()
                .find(|f| f.eq_ignore_ascii_case(token) && allowed.contains(f))
                .ok_or_else(|| {
                    ScriptError::grammar(format!("Invalid flag [{}] for command [{}]", token, self.name))
                })?;
            if found.contains(&flag) {
                return Err(ScriptError::grammar(format!("Flag [{}] cannot be duplicated", flag)));
            }
            found.push(flag);
        }
        Ok(found)
    }
}

const FLAGS: &[&str] = &["PRESERVE", "NOWARN", "NOREC", "WARN", "GLOBAL", "PERMANENT"];

fn scope_of(flags: &[&str]) -> Result<SetScope, ScriptError> {
    match (flags.contains(&"GLOBAL"), flags.contains(&"PERMANENT")) {
        (true, true) => Err(ScriptError::grammar("Flags [GLOBAL] and [PERMANENT] cannot be combined")),
        (true, false) => Ok(SetScope::Global),
        (false, true) => Ok(SetScope::Permanent),
        (false, false) => Ok(SetScope::Local),
    }
}

/// Rebuilds source text for operands that were split from a longer line.
pub fn join_operands(operands: &[String]) -> String {
    operands
        .iter()
        .map(|o| quote_operand(o))
        .collect::<Vec<_>>()
        .join(",")
}

fn embedded(
    owner: &str,
    operands: &[String],
    address: &Arc<SectionAddress>,
    line_idx: usize,
) -> Result<Box<Command>, ScriptError> {
    if operands.is_empty() {
        return Err(ScriptError::grammar(format!("Command [{}] needs an embedded command", owner)));
    }
    let cmd = Command::parse(join_operands(operands), operands, address.clone(), line_idx)?;
    Ok(Box::new(cmd))
}

fn parse_kind(
    operands: &[String],
    address: &Arc<SectionAddress>,
    line_idx: usize,
) -> Result<CommandKind, ScriptError> {
    let (head, tail) = operands
        .split_first()
        .ok_or_else(|| ScriptError::grammar("Empty command line"))?;

    let opcode = match opcode::resolve(head)? {
        Resolved::Builtin(op) => op,
        Resolved::Macro(name) => {
            return Ok(CommandKind::Macro {
                name,
                args: tail.to_vec(),
            })
        }
    };
    let a = Args::new(opcode.name(), tail);

    let kind = match opcode {
        Opcode::FileCopy => {
            a.range(2, Some(5))?;
            let flags = a.flags(2, &["PRESERVE", "NOWARN", "NOREC"])?;
            CommandKind::FileCopy {
                src: a.at(0),
                dest: a.at(1),
                preserve: flags.contains(&"PRESERVE"),
                no_warn: flags.contains(&"NOWARN"),
                no_rec: flags.contains(&"NOREC"),
            }
        }
        Opcode::FileDelete => {
            a.range(1, Some(2))?;
            let flags = a.flags(1, &["NOWARN"])?;
            CommandKind::FileDelete {
                path: a.at(0),
                no_warn: flags.contains(&"NOWARN"),
            }
        }
        Opcode::FileRename => {
            a.exact(2)?;
            CommandKind::FileRename { src: a.at(0), dest: a.at(1) }
        }
        Opcode::FileCreateBlank => {
            a.range(1, Some(3))?;
            let flags = a.flags(1, &["PRESERVE", "NOWARN"])?;
            CommandKind::FileCreateBlank {
                path: a.at(0),
                preserve: flags.contains(&"PRESERVE"),
                no_warn: flags.contains(&"NOWARN"),
            }
        }
        Opcode::FileSize => {
            a.exact(2)?;
            CommandKind::FileSize { path: a.at(0), dest: a.var(1)? }
        }
        Opcode::DirCopy => {
            a.exact(2)?;
            CommandKind::DirCopy { src: a.at(0), dest: a.at(1) }
        }
        Opcode::DirDelete => {
            a.exact(1)?;
            CommandKind::DirDelete { dir: a.at(0) }
        }
        Opcode::DirMove => {
            a.exact(2)?;
            CommandKind::DirMove { src: a.at(0), dest: a.at(1) }
        }
        Opcode::DirMake => {
            a.exact(1)?;
            CommandKind::DirMake { dir: a.at(0) }
        }
        Opcode::DirSize => {
            a.exact(2)?;
            CommandKind::DirSize { dir: a.at(0), dest: a.var(1)? }
        }

        Opcode::RegRead => {
            a.exact(4)?;
            CommandKind::RegRead {
                hive: a.at(0),
                key: a.at(1),
                value: a.at(2),
                dest: a.var(3)?,
            }
        }
        Opcode::RegWrite => {
            a.range(4, None)?;
            let mut data = a.rest(4);
            let no_warn = data.last().is_some_and(|d| d.eq_ignore_ascii_case("NOWARN"));
            if no_warn {
                data.pop();
            }
            CommandKind::RegWrite {
                hive: a.at(0),
                value_type: a.at(1),
                key: a.at(2),
                value: a.at(3),
                data,
                no_warn,
            }
        }
        Opcode::RegDelete => {
            a.range(2, Some(3))?;
            CommandKind::RegDelete {
                hive: a.at(0),
                key: a.at(1),
                value: a.opt(2),
            }
        }
        Opcode::RegMulti => {
            a.range(5, Some(6))?;
            let verb = a.at(3);
            let arg = a.at(4);
            let action = match verb.to_ascii_lowercase().as_str() {
                "append" => RegMultiAction::Append(arg),
                "prepend" => RegMultiAction::Prepend(arg),
                "delete" => RegMultiAction::Delete(arg),
                "index" => {
                    a.exact(6)?;
                    RegMultiAction::Index { item: arg, dest: a.var(5)? }
                }
                _ => {
                    return Err(ScriptError::grammar(format!(
                        "Invalid RegMulti action [{}]",
                        verb
                    )))
                }
            };
            if !matches!(action, RegMultiAction::Index { .. }) {
                a.exact(5)?;
            }
            CommandKind::RegMulti {
                hive: a.at(0),
                key: a.at(1),
                value: a.at(2),
                action,
            }
        }

        Opcode::TxtAddLine => {
            a.exact(3)?;
            let mode = a.at(2);
            let placement = if mode.eq_ignore_ascii_case("Append") {
                LinePlacement::Append
            } else if mode.eq_ignore_ascii_case("Prepend") {
                LinePlacement::Prepend
            } else {
                return Err(ScriptError::grammar(format!("Invalid placement [{}]", mode)));
            };
            CommandKind::TxtAddLine { file: a.at(0), line: a.at(1), placement }
        }
        Opcode::TxtDelLine => {
            a.exact(2)?;
            CommandKind::TxtDelLine { file: a.at(0), prefix: a.at(1) }
        }
        Opcode::TxtReplace => {
            a.exact(3)?;
            CommandKind::TxtReplace { file: a.at(0), old: a.at(1), new: a.at(2) }
        }
        Opcode::TxtDelEmptyLines => {
            a.exact(1)?;
            CommandKind::TxtDelEmptyLines { file: a.at(0) }
        }

        Opcode::IniRead => {
            a.range(4, Some(5))?;
            CommandKind::IniRead {
                file: a.at(0),
                section: a.at(1),
                key: a.at(2),
                dest: a.var(3)?,
                default: a.opt(4),
            }
        }
        Opcode::IniWrite => {
            a.exact(4)?;
            CommandKind::IniWrite {
                file: a.at(0),
                section: a.at(1),
                key: a.at(2),
                value: a.at(3),
            }
        }
        Opcode::IniDelete => {
            a.exact(3)?;
            CommandKind::IniDelete { file: a.at(0), section: a.at(1), key: a.at(2) }
        }
        Opcode::IniAddSection => {
            a.exact(2)?;
            CommandKind::IniAddSection { file: a.at(0), section: a.at(1) }
        }
        Opcode::IniDeleteSection => {
            a.exact(2)?;
            CommandKind::IniDeleteSection { file: a.at(0), section: a.at(1) }
        }

        Opcode::Echo => {
            a.range(1, Some(2))?;
            let flags = a.flags(1, &["WARN"])?;
            CommandKind::Echo { message: a.at(0), warn: flags.contains(&"WARN") }
        }
        Opcode::Message => {
            a.range(1, Some(3))?;
            CommandKind::Message {
                message: a.at(0),
                icon: a.opt(1),
                timeout: a.opt(2),
            }
        }

        Opcode::Encode => {
            a.exact(3)?;
            CommandKind::Encode { script: a.at(0), folder: a.at(1), file: a.at(2) }
        }
        Opcode::ExtractFile => {
            a.exact(4)?;
            CommandKind::ExtractFile {
                script: a.at(0),
                folder: a.at(1),
                name: a.at(2),
                dest_dir: a.at(3),
            }
        }

        Opcode::StrFormat => CommandKind::StrFormat(parse_str_format(tail)?),
        Opcode::Math => {
            a.exact(4)?;
            let verb = a.at(0);
            let op = match verb.to_ascii_lowercase().as_str() {
                "add" => MathOperator::Add,
                "sub" => MathOperator::Sub,
                "mul" => MathOperator::Mul,
                "div" => MathOperator::Div,
                _ => return Err(ScriptError::grammar(format!("Invalid Math operation [{}]", verb))),
            };
            CommandKind::Math { op, dest: a.var(1)?, lhs: a.at(2), rhs: a.at(3) }
        }

        Opcode::Run | Opcode::Exec => {
            a.range(2, None)?;
            let (script, section, args) = (a.at(0), a.at(1), a.rest(2));
            if a.len() > 11 {
                return Err(ScriptError::grammar(format!(
                    "Command [{}] can pass at most [9] parameters",
                    opcode.name()
                )));
            }
            if opcode == Opcode::Run {
                CommandKind::Run { script, section, args }
            } else {
                CommandKind::Exec { script, section, args }
            }
        }
        Opcode::Loop | Opcode::LoopLetter => {
            let letters = opcode == Opcode::LoopLetter;
            let action = if a.len() == 1 && a.at(0).eq_ignore_ascii_case("BREAK") {
                LoopAction::Break
            } else {
                a.range(4, Some(13))?;
                LoopAction::Iterate {
                    script: a.at(0),
                    section: a.at(1),
                    start: a.at(2),
                    end: a.at(3),
                    args: a.rest(4),
                }
            };
            CommandKind::Loop { letters, action }
        }
        Opcode::If => {
            let (cond, used) = BranchCondition::parse(tail)?;
            let body = embedded("If", &tail[used..], address, line_idx)?;
            CommandKind::If { cond, body: Body::Embedded(body) }
        }
        Opcode::Else => {
            let body = embedded("Else", tail, address, line_idx)?;
            CommandKind::Else { body: Body::Embedded(body) }
        }
        Opcode::Begin => {
            a.exact(0)?;
            CommandKind::Begin
        }
        Opcode::End => {
            a.exact(0)?;
            CommandKind::End
        }

        Opcode::Set => {
            a.range(2, Some(3))?;
            let flags = a.flags(2, &["GLOBAL", "PERMANENT"])?;
            let scope = scope_of(&flags)?;
            let target = a.at(0);
            if target.starts_with('%') || target.starts_with('#') {
                CommandKind::Set { target: a.var(0)?, value: a.at(1), scope }
            } else {
                // A bare name defines a macro.
                parse_macro_name(&target)?;
                CommandKind::SetMacro { name: target, command: a.at(1), scope }
            }
        }
        Opcode::SetMacro => {
            a.range(2, Some(3))?;
            let flags = a.flags(2, &["GLOBAL", "PERMANENT"])?;
            let name = a.at(0);
            parse_macro_name(&name)?;
            CommandKind::SetMacro { name, command: a.at(1), scope: scope_of(&flags)? }
        }
        Opcode::AddVariables => {
            a.range(2, Some(3))?;
            let flags = a.flags(2, &["GLOBAL"])?;
            CommandKind::AddVariables {
                script: a.at(0),
                section: a.at(1),
                global: flags.contains(&"GLOBAL"),
            }
        }
        Opcode::Exit => {
            a.range(1, Some(2))?;
            let flags = a.flags(1, &["NOWARN"])?;
            CommandKind::Exit { message: a.at(0), no_warn: flags.contains(&"NOWARN") }
        }
        Opcode::Halt => {
            a.exact(1)?;
            CommandKind::Halt { message: a.at(0) }
        }
        Opcode::Wait => {
            a.exact(1)?;
            CommandKind::Wait { seconds: a.at(0) }
        }
        Opcode::Beep => {
            a.range(0, Some(1))?;
            CommandKind::Beep { sound: a.opt(0) }
        }
        Opcode::GetParam => {
            a.exact(2)?;
            CommandKind::GetParam { index: a.at(0), dest: a.var(1)? }
        }
        Opcode::PackParam => {
            a.range(2, Some(3))?;
            let count = match a.opt(2) {
                Some(_) => Some(a.var(2)?),
                None => None,
            };
            CommandKind::PackParam { start: a.at(0), dest: a.var(1)?, count }
        }
        Opcode::Return => {
            a.range(0, Some(1))?;
            CommandKind::Return { value: a.opt(0) }
        }
        Opcode::System => {
            a.range(1, None)?;
            let verb = a.at(0);
            let hook = match verb.to_ascii_lowercase().as_str() {
                "onbuildexit" => HookKind::OnBuildExit,
                "onpluginexit" | "onscriptexit" => HookKind::OnPluginExit,
                _ => return Err(ScriptError::grammar(format!("Invalid System command [{}]", verb))),
            };
            let command = embedded("System", &tail[1..], address, line_idx)?;
            CommandKind::System { hook, command }
        }
        Opcode::Macro => {
            // resolve() never yields this opcode directly.
            return Err(ScriptError::grammar(format!("Invalid command name [{}]", head)));
        }
    };
    Ok(kind)
}

/// Macro names are letters, digits and underscores.
pub fn parse_macro_name(name: &str) -> Result<(), ScriptError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ScriptError::grammar(format!("Invalid macro name [{}]", name)))
    }
}

fn parse_str_format(tail: &[String]) -> Result<StrFormatOp, ScriptError> {
    let verb = tail
        .first()
        .ok_or_else(|| ScriptError::grammar("Command [StrFormat] needs a format type"))?;
    let args = &tail[1..];
    let name: &'static str = match verb.to_ascii_lowercase().as_str() {
        "inc" => "StrFormat,Inc",
        "dec" => "StrFormat,Dec",
        "left" => "StrFormat,Left",
        "right" => "StrFormat,Right",
        "len" => "StrFormat,Len",
        "ucase" => "StrFormat,UCase",
        "lcase" => "StrFormat,LCase",
        "replace" => "StrFormat,Replace",
        "replacex" => "StrFormat,ReplaceX",
        "split" => "StrFormat,Split",
        "pos" => "StrFormat,Pos",
        _ => return Err(ScriptError::grammar(format!("Invalid StrFormat type [{}]", verb))),
    };
    let a = Args::new(name, args);

    let op = match name {
        "StrFormat,Inc" | "StrFormat,Dec" => {
            a.exact(2)?;
            let (dest, amount) = (a.var(0)?, a.at(1));
            if name.ends_with("Inc") {
                StrFormatOp::Inc { dest, amount }
            } else {
                StrFormatOp::Dec { dest, amount }
            }
        }
        "StrFormat,Left" | "StrFormat,Right" => {
            a.exact(3)?;
            let (src, count, dest) = (a.at(0), a.at(1), a.var(2)?);
            if name.ends_with("Left") {
                StrFormatOp::Left { src, count, dest }
            } else {
                StrFormatOp::Right { src, count, dest }
            }
        }
        "StrFormat,Len" => {
            a.exact(2)?;
            StrFormatOp::Len { src: a.at(0), dest: a.var(1)? }
        }
        "StrFormat,UCase" => {
            a.exact(2)?;
            StrFormatOp::UCase { src: a.at(0), dest: a.var(1)? }
        }
        "StrFormat,LCase" => {
            a.exact(2)?;
            StrFormatOp::LCase { src: a.at(0), dest: a.var(1)? }
        }
        "StrFormat,Replace" | "StrFormat,ReplaceX" => {
            a.exact(4)?;
            StrFormatOp::Replace {
                src: a.at(0),
                from: a.at(1),
                to: a.at(2),
                case_sensitive: name.ends_with('X'),
                dest: a.var(3)?,
            }
        }
        "StrFormat,Split" => {
            a.exact(4)?;
            StrFormatOp::Split {
                src: a.at(0),
                delimiter: a.at(1),
                index: a.at(2),
                dest: a.var(3)?,
            }
        }
        _ => {
            a.exact(3)?;
            StrFormatOp::Pos { src: a.at(0), needle: a.at(1), dest: a.var(2)? }
        }
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Arc<SectionAddress> {
        Arc::new(SectionAddress::new("/p/a.script", "Process"))
    }

    fn parse(line: &str) -> Result<Command, ScriptError> {
        Command::parse_line(line, addr(), 0)
    }

    #[test]
    fn var_keys() {
        assert_eq!(VarKey::parse("%Dest%"), Some(VarKey::Variable("Dest".into())));
        assert_eq!(VarKey::parse("#3"), Some(VarKey::Param(3)));
        assert_eq!(VarKey::parse("#0"), None);
        assert_eq!(VarKey::parse("#12"), None);
        assert_eq!(VarKey::parse("Dest"), None);
        assert_eq!(VarKey::parse("%%"), None);
        assert_eq!(VarKey::Variable("A".into()).to_string(), "%A%");
    }

    #[test]
    fn file_copy_flags() {
        let cmd = parse("FileCopy,a.txt,b.txt,NOWARN,preserve").unwrap();
        match cmd.kind {
            CommandKind::FileCopy { preserve, no_warn, no_rec, .. } => {
                assert!(preserve && no_warn && !no_rec);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("FileCopy,a,b,FAST").unwrap_err().is_grammar());
        assert!(parse("FileCopy,a,b,NOWARN,NOWARN").unwrap_err().is_grammar());
    }

    #[test]
    fn arity_errors_name_the_command() {
        let err = parse("FileRename,a").unwrap_err();
        assert!(err.to_string().starts_with("Command [FileRename] expects at least [2]"));
        match err {
            ScriptError::Grammar { raw, .. } => assert_eq!(raw.as_deref(), Some("FileRename,a")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn destination_must_be_a_variable() {
        assert!(parse("FileSize,a.txt,Size").unwrap_err().is_grammar());
        assert!(parse("FileSize,a.txt,%Size%").is_ok());
    }

    #[test]
    fn unknown_name_is_macro() {
        let cmd = parse("Require_File,a.txt,b").unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Macro { name: "Require_File".into(), args: vec!["a.txt".into(), "b".into()] }
        );
        assert_eq!(cmd.kind.name(), "Macro");
    }

    #[test]
    fn if_keeps_embedded_command() {
        let cmd = parse("If,%A%,Equal,B,Echo,\"Hello, World\"").unwrap();
        match cmd.kind {
            CommandKind::If { cond, body: Body::Embedded(inner) } => {
                assert_eq!(cond.args, vec!["%A%", "B"]);
                assert_eq!(inner.raw, "Echo,\"Hello, World\"");
                assert!(matches!(inner.kind, CommandKind::Echo { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("If,%A%,Equal,B").unwrap_err().is_grammar());
    }

    #[test]
    fn set_variants() {
        let cmd = parse("Set,%A%,1,GLOBAL").unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Set { target: VarKey::Variable("A".into()), value: "1".into(), scope: SetScope::Global }
        );
        let cmd = parse("Set,Greet,\"Echo,Hi\"").unwrap();
        assert!(matches!(cmd.kind, CommandKind::SetMacro { .. }));
        assert!(parse("Set,%A%,1,GLOBAL,PERMANENT").is_err());
        assert!(parse("Set,%A,1").is_err());
    }

    #[test]
    fn loop_forms() {
        assert_eq!(
            parse("Loop,BREAK").unwrap().kind,
            CommandKind::Loop { letters: false, action: LoopAction::Break }
        );
        let cmd = parse("LoopLetter,%ScriptFile%,Sub,C,E,x").unwrap();
        assert_eq!(cmd.kind.name(), "LoopLetter");
        assert!(parse("Loop,%ScriptFile%,Sub,1").is_err());
    }

    #[test]
    fn reg_write_collects_data() {
        let cmd = parse("RegWrite,HKLM,REG_MULTI_SZ,Soft,Paths,a,b,NOWARN").unwrap();
        match cmd.kind {
            CommandKind::RegWrite { data, no_warn, .. } => {
                assert_eq!(data, vec!["a", "b"]);
                assert!(no_warn);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reg_multi_actions() {
        assert!(parse("RegMulti,HKLM,K,V,Append,x").is_ok());
        assert!(parse("RegMulti,HKLM,K,V,Index,x,%Idx%").is_ok());
        assert!(parse("RegMulti,HKLM,K,V,Index,x").is_err());
        assert!(parse("RegMulti,HKLM,K,V,Append,x,%Idx%").is_err());
        assert!(parse("RegMulti,HKLM,K,V,Shuffle,x").is_err());
    }

    #[test]
    fn str_format_types() {
        let cmd = parse("StrFormat,ReplaceX,abc,b,B,%Out%").unwrap();
        match cmd.kind {
            CommandKind::StrFormat(op) => assert_eq!(op.name(), "ReplaceX"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("StrFormat,Inc,%N%,1").is_ok());
        assert!(parse("StrFormat,Bytes,1,%N%").is_err());
        assert!(parse("StrFormat,Len,abc").is_err());
    }

    #[test]
    fn system_hooks() {
        let cmd = parse("System,OnScriptExit,Echo,Bye").unwrap();
        match cmd.kind {
            CommandKind::System { hook, command } => {
                assert_eq!(hook, HookKind::OnPluginExit);
                assert_eq!(command.raw, "Echo,Bye");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("System,Reboot").is_err());
        assert!(parse("System,OnBuildExit").is_err());
    }

    #[test]
    fn begin_and_end_take_no_operands() {
        assert!(parse("Begin").is_ok());
        assert!(parse("End,x").is_err());
    }

    #[test]
    fn section_keeps_comments_and_line_indices() {
        let lines: Vec<String> = ["// note", "", "Echo,A,\\", "B", "Echo,C"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cmds = parse_section(addr(), &lines, 16).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0].kind, CommandKind::Comment);
        assert_eq!(cmds[1].line_idx, 2);
        assert_eq!(cmds[2].line_idx, 4);
    }
}
