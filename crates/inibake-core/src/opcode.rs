//! Opcode table and mnemonic resolution.
//!
//! The first operand of every code line names the command. Names are matched
//! case-insensitively against [`Opcode::ALL`]. Anything that is a well-formed
//! name but not a built-in resolves to a macro invocation, so user-defined
//! commands need no declaration syntax.

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// Built-in command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // File
    FileCopy,
    FileDelete,
    FileRename,
    FileCreateBlank,
    FileSize,
    DirCopy,
    DirDelete,
    DirMove,
    DirMake,
    DirSize,
    // Registry
    RegRead,
    RegWrite,
    RegDelete,
    RegMulti,
    // Text
    TxtAddLine,
    TxtDelLine,
    TxtReplace,
    TxtDelEmptyLines,
    // Ini
    IniRead,
    IniWrite,
    IniDelete,
    IniAddSection,
    IniDeleteSection,
    // Interface
    Echo,
    Message,
    // Attachments
    Encode,
    ExtractFile,
    // String & math
    StrFormat,
    Math,
    // Branch
    Run,
    Exec,
    Loop,
    LoopLetter,
    If,
    Else,
    Begin,
    End,
    // Control
    Set,
    SetMacro,
    AddVariables,
    Exit,
    Halt,
    Wait,
    Beep,
    GetParam,
    PackParam,
    Return,
    System,
    /// Fallback for names that are not built-ins.
    Macro,
}

/// Coarse grouping used for documentation and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpcodeGroup {
    File,
    Registry,
    Text,
    Ini,
    Interface,
    Attachment,
    String,
    Branch,
    Control,
    Macro,
}

/// Result of resolving a mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Builtin(Opcode),
    /// Unknown name, looked up in the macro tables at run time.
    Macro(String),
}

impl Opcode {
    /// Every opcode a mnemonic can resolve to. [`Opcode::Macro`] is excluded.
    pub const ALL: &'static [Opcode] = &[
        Opcode::FileCopy,
        Opcode::FileDelete,
        Opcode::FileRename,
        Opcode::FileCreateBlank,
        Opcode::FileSize,
        Opcode::DirCopy,
        Opcode::DirDelete,
        Opcode::DirMove,
        Opcode::DirMake,
        Opcode::DirSize,
        Opcode::RegRead,
        Opcode::RegWrite,
        Opcode::RegDelete,
        Opcode::RegMulti,
        Opcode::TxtAddLine,
        Opcode::TxtDelLine,
        Opcode::TxtReplace,
        Opcode::TxtDelEmptyLines,
        Opcode::IniRead,
        Opcode::IniWrite,
        Opcode::IniDelete,
        Opcode::IniAddSection,
        Opcode::IniDeleteSection,
        Opcode::Echo,
        Opcode::Message,
        Opcode::Encode,
        Opcode::ExtractFile,
        Opcode::StrFormat,
        Opcode::Math,
        Opcode::Run,
        Opcode::Exec,
        Opcode::Loop,
        Opcode::LoopLetter,
        Opcode::If,
        Opcode::Else,
        Opcode::Begin,
        Opcode::End,
        Opcode::Set,
        Opcode::SetMacro,
        Opcode::AddVariables,
        Opcode::Exit,
        Opcode::Halt,
        Opcode::Wait,
        Opcode::Beep,
        Opcode::GetParam,
        Opcode::PackParam,
        Opcode::Return,
        Opcode::System,
    ];

    /// Canonical mnemonic as written in scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::FileCopy => "FileCopy",
            Opcode::FileDelete => "FileDelete",
            Opcode::FileRename => "FileRename",
            Opcode::FileCreateBlank => "FileCreateBlank",
            Opcode::FileSize => "FileSize",
            Opcode::DirCopy => "DirCopy",
            Opcode::DirDelete => "DirDelete",
            Opcode::DirMove => "DirMove",
            Opcode::DirMake => "DirMake",
            Opcode::DirSize => "DirSize",
            Opcode::RegRead => "RegRead",
            Opcode::RegWrite => "RegWrite",
            Opcode::RegDelete => "RegDelete",
            Opcode::RegMulti => "RegMulti",
            Opcode::TxtAddLine => "TXTAddLine",
            Opcode::TxtDelLine => "TXTDelLine",
            Opcode::TxtReplace => "TXTReplace",
            Opcode::TxtDelEmptyLines => "TXTDelEmptyLines",
            Opcode::IniRead => "IniRead",
            Opcode::IniWrite => "IniWrite",
            Opcode::IniDelete => "IniDelete",
            Opcode::IniAddSection => "IniAddSection",
            Opcode::IniDeleteSection => "IniDeleteSection",
            Opcode::Echo => "Echo",
            Opcode::Message => "Message",
            Opcode::Encode => "Encode",
            Opcode::ExtractFile => "ExtractFile",
            Opcode::StrFormat => "StrFormat",
            Opcode::Math => "Math",
            Opcode::Run => "Run",
            Opcode::Exec => "Exec",
            Opcode::Loop => "Loop",
            Opcode::LoopLetter => "LoopLetter",
            Opcode::If => "If",
            Opcode::Else => "Else",
            Opcode::Begin => "Begin",
            Opcode::End => "End",
            Opcode::Set => "Set",
            Opcode::SetMacro => "SetMacro",
            Opcode::AddVariables => "AddVariables",
            Opcode::Exit => "Exit",
            Opcode::Halt => "Halt",
            Opcode::Wait => "Wait",
            Opcode::Beep => "Beep",
            Opcode::GetParam => "GetParam",
            Opcode::PackParam => "PackParam",
            Opcode::Return => "Return",
            Opcode::System => "System",
            Opcode::Macro => "Macro",
        }
    }

    pub fn group(&self) -> OpcodeGroup {
        use Opcode::*;
        match self {
            FileCopy | FileDelete | FileRename | FileCreateBlank | FileSize | DirCopy
            | DirDelete | DirMove | DirMake | DirSize => OpcodeGroup::File,
            RegRead | RegWrite | RegDelete | RegMulti => OpcodeGroup::Registry,
            TxtAddLine | TxtDelLine | TxtReplace | TxtDelEmptyLines => OpcodeGroup::Text,
            IniRead | IniWrite | IniDelete | IniAddSection | IniDeleteSection => OpcodeGroup::Ini,
            Echo | Message => OpcodeGroup::Interface,
            Encode | ExtractFile => OpcodeGroup::Attachment,
            StrFormat | Math => OpcodeGroup::String,
            Run | Exec | Loop | LoopLetter | If | Else | Begin | End => OpcodeGroup::Branch,
            Set | SetMacro | AddVariables | Exit | Halt | Wait | Beep | GetParam | PackParam
            | Return | System => OpcodeGroup::Control,
            Macro => OpcodeGroup::Macro,
        }
    }
}

/// Alternate spellings accepted for built-ins.
const ALIASES: &[(&str, Opcode)] = &[("FileMove", Opcode::FileRename)];

/// Resolves the first operand of a code line.
///
/// Names must consist of ASCII letters and underscores only; anything else
/// (including digits) is a grammar error.
pub fn resolve(token: &str) -> Result<Resolved, ScriptError> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return Err(ScriptError::grammar(format!("Invalid command name [{}]", token)));
    }

    if let Some(op) = Opcode::ALL.iter().find(|op| op.name().eq_ignore_ascii_case(token)) {
        return Ok(Resolved::Builtin(*op));
    }
    if let Some((_, op)) = ALIASES.iter().find(|(alias, _)| alias.eq_ignore_ascii_case(token)) {
        return Ok(Resolved::Builtin(*op));
    }
    Ok(Resolved::Macro(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_case_insensitively() {
        assert_eq!(resolve("echo").unwrap(), Resolved::Builtin(Opcode::Echo));
        assert_eq!(resolve("txtaddline").unwrap(), Resolved::Builtin(Opcode::TxtAddLine));
        assert_eq!(resolve("IF").unwrap(), Resolved::Builtin(Opcode::If));
    }

    #[test]
    fn alias_resolves_to_canonical() {
        assert_eq!(resolve("FileMove").unwrap(), Resolved::Builtin(Opcode::FileRename));
    }

    #[test]
    fn unknown_name_is_macro() {
        assert_eq!(resolve("Require_FileQ").unwrap(), Resolved::Macro("Require_FileQ".into()));
        assert_eq!(resolve("Macro").unwrap(), Resolved::Macro("Macro".into()));
    }

    #[test]
    fn digits_and_symbols_are_rejected() {
        assert!(resolve("Echo2").is_err());
        assert!(resolve("Set-Var").is_err());
        assert!(resolve("").is_err());
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            for b in &Opcode::ALL[i + 1..] {
                assert!(!a.name().eq_ignore_ascii_case(b.name()), "{} duplicated", a.name());
            }
        }
        assert!(!Opcode::ALL.contains(&Opcode::Macro));
    }

    #[test]
    fn groups() {
        assert_eq!(Opcode::RegMulti.group(), OpcodeGroup::Registry);
        assert_eq!(Opcode::LoopLetter.group(), OpcodeGroup::Branch);
        assert_eq!(Opcode::Return.group(), OpcodeGroup::Control);
    }
}
