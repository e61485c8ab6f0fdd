//! Branch conditions for `If` and `Else`.
//!
//! A condition is parsed once, when the section is compiled, into a
//! [`BranchCondition`] holding its raw operands. Evaluation preprocesses the
//! operands against the live engine state through [`ConditionEnv`] and
//! returns whether it matched together with a message describing the
//! underlying fact. `Not` flips the result, never the message.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;
use crate::ini::IniDocument;
use crate::network::NetworkProbe;
use crate::registry::{Hive, RegValue, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    Equal,
    EqualX,
    Smaller,
    Bigger,
    SmallerEqual,
    BiggerEqual,
    ExistFile,
    ExistDir,
    ExistSection,
    ExistRegSection,
    ExistRegKey,
    ExistRegMulti,
    ExistVar,
    ExistMacro,
    Ping,
    Online,
    Question,
}

impl ConditionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConditionKind::Equal => "Equal",
            ConditionKind::EqualX => "EqualX",
            ConditionKind::Smaller => "Smaller",
            ConditionKind::Bigger => "Bigger",
            ConditionKind::SmallerEqual => "SmallerEqual",
            ConditionKind::BiggerEqual => "BiggerEqual",
            ConditionKind::ExistFile => "ExistFile",
            ConditionKind::ExistDir => "ExistDir",
            ConditionKind::ExistSection => "ExistSection",
            ConditionKind::ExistRegSection => "ExistRegSection",
            ConditionKind::ExistRegKey => "ExistRegKey",
            ConditionKind::ExistRegMulti => "ExistRegMulti",
            ConditionKind::ExistVar => "ExistVar",
            ConditionKind::ExistMacro => "ExistMacro",
            ConditionKind::Ping => "Ping",
            ConditionKind::Online => "Online",
            ConditionKind::Question => "Question",
        }
    }

    pub fn is_compare(&self) -> bool {
        matches!(
            self,
            ConditionKind::Equal
                | ConditionKind::EqualX
                | ConditionKind::Smaller
                | ConditionKind::Bigger
                | ConditionKind::SmallerEqual
                | ConditionKind::BiggerEqual
        )
    }

    /// Accepted argument counts.
    fn arities(&self) -> &'static [usize] {
        match self {
            k if k.is_compare() => &[2],
            ConditionKind::ExistFile
            | ConditionKind::ExistDir
            | ConditionKind::ExistVar
            | ConditionKind::ExistMacro
            | ConditionKind::Ping => &[1],
            ConditionKind::ExistSection | ConditionKind::ExistRegSection => &[2],
            ConditionKind::ExistRegKey => &[3],
            ConditionKind::ExistRegMulti => &[4],
            ConditionKind::Online => &[0],
            ConditionKind::Question => &[1, 3],
            _ => &[],
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named (non-comparison) conditions and the kind they map to.
const NAMED: &[(&str, ConditionKind)] = &[
    ("ExistFile", ConditionKind::ExistFile),
    ("ExistDir", ConditionKind::ExistDir),
    ("ExistSection", ConditionKind::ExistSection),
    ("ExistRegSection", ConditionKind::ExistRegSection),
    ("ExistRegSubKey", ConditionKind::ExistRegSection),
    ("ExistRegKey", ConditionKind::ExistRegKey),
    ("ExistRegValue", ConditionKind::ExistRegKey),
    ("ExistRegMulti", ConditionKind::ExistRegMulti),
    ("ExistVar", ConditionKind::ExistVar),
    ("ExistMacro", ConditionKind::ExistMacro),
    ("Ping", ConditionKind::Ping),
    ("Online", ConditionKind::Online),
    ("Question", ConditionKind::Question),
];

/// Legacy spellings that carry an implicit `Not`.
const LEGACY_NOT: &[(&str, ConditionKind)] = &[
    ("NotExistFile", ConditionKind::ExistFile),
    ("NotExistDir", ConditionKind::ExistDir),
    ("NotExistSection", ConditionKind::ExistSection),
    ("NotExistRegSection", ConditionKind::ExistRegSection),
    ("NotExistRegKey", ConditionKind::ExistRegKey),
    ("NotExistVar", ConditionKind::ExistVar),
];

fn lookup(table: &[(&str, ConditionKind)], token: &str) -> Option<ConditionKind> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(token))
        .map(|(_, kind)| *kind)
}

/// Comparison operator token, plus whether it implies `Not`.
fn compare_operator(token: &str) -> Option<(ConditionKind, bool)> {
    let kind = match token.to_ascii_lowercase().as_str() {
        "equal" | "==" => (ConditionKind::Equal, false),
        "equalx" | "===" => (ConditionKind::EqualX, false),
        "smaller" | "<" => (ConditionKind::Smaller, false),
        "bigger" | ">" => (ConditionKind::Bigger, false),
        "smallerequal" | "<=" => (ConditionKind::SmallerEqual, false),
        "biggerequal" | ">=" => (ConditionKind::BiggerEqual, false),
        "notequal" | "!=" => (ConditionKind::Equal, true),
        _ => return None,
    };
    Some(kind)
}

/// Engine services a condition needs while evaluating.
pub trait ConditionEnv {
    /// Expands parameters and variables, then unescapes.
    fn preprocess(&self, text: &str) -> Result<String, ScriptError>;
    fn variable_exists(&self, name: &str) -> bool;
    fn macro_exists(&self, name: &str) -> bool;
    fn registry(&self) -> &dyn Registry;
    fn network(&self) -> &dyn NetworkProbe;
    fn ping_timeout(&self) -> Duration;
}

/// A parsed branch condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCondition {
    pub kind: ConditionKind,
    pub not: bool,
    /// Raw, unexpanded operands.
    pub args: Vec<String>,
}

impl BranchCondition {
    pub fn new(kind: ConditionKind, not: bool, args: Vec<String>) -> Result<Self, ScriptError> {
        if !kind.arities().contains(&args.len()) {
            return Err(ScriptError::grammar(format!(
                "BranchCondition [{}] cannot take [{}] arguments",
                kind,
                args.len()
            )));
        }
        Ok(Self { kind, not, args })
    }

    /// Parses a condition from the operands following `If`/`Else`.
    ///
    /// Returns the condition and the number of operands it consumed; the
    /// rest form the embedded command.
    pub fn parse(operands: &[String]) -> Result<(Self, usize), ScriptError> {
        let mut idx = 0;
        let mut not = false;
        if operands.first().is_some_and(|o| o.eq_ignore_ascii_case("Not")) {
            not = true;
            idx = 1;
        }
        let head = operands
            .get(idx)
            .ok_or_else(|| ScriptError::grammar("Unable to parse BranchCondition from empty arguments"))?;

        let legacy = lookup(LEGACY_NOT, head);
        if let Some(kind) = lookup(NAMED, head).or(legacy) {
            if legacy.is_some() {
                if not {
                    return Err(ScriptError::grammar("Branch condition [Not] cannot be duplicated"));
                }
                not = true;
            }
            let rest = &operands[idx + 1..];
            let count = match kind {
                ConditionKind::Question => question_arity(rest),
                _ => kind.arities().first().copied().unwrap_or(0),
            };
            if rest.len() < count {
                return Err(ScriptError::grammar(format!(
                    "BranchCondition [{}] must have at least [{}] arguments",
                    kind, count
                )));
            }
            let cond = Self::new(kind, not, rest[..count].to_vec())?;
            return Ok((cond, idx + 1 + count));
        }

        // Comparison form: <lhs>,<op>,<rhs>
        let op = operands
            .get(idx + 1)
            .ok_or_else(|| ScriptError::grammar(format!("Invalid branch condition [{}]", head)))?;
        let (kind, implied_not) = compare_operator(op)
            .ok_or_else(|| ScriptError::grammar(format!("Invalid branch condition [{}]", op)))?;
        if implied_not && not {
            return Err(ScriptError::grammar("Branch condition [Not] cannot be duplicated"));
        }
        let rhs = operands.get(idx + 2).ok_or_else(|| {
            ScriptError::grammar(format!("BranchCondition [{}] must have at least [2] arguments", kind))
        })?;
        let cond = Self::new(kind, not || implied_not, vec![head.clone(), rhs.clone()])?;
        Ok((cond, idx + 3))
    }

    /// Evaluates the condition. `Not` is already applied to the boolean.
    pub fn evaluate(&self, env: &dyn ConditionEnv) -> Result<(bool, String), ScriptError> {
        let (matched, message) = match self.kind {
            ConditionKind::Equal
            | ConditionKind::EqualX
            | ConditionKind::Smaller
            | ConditionKind::Bigger
            | ConditionKind::SmallerEqual
            | ConditionKind::BiggerEqual => {
                let lhs = env.preprocess(&self.args[0])?;
                let rhs = env.preprocess(&self.args[1])?;
                compare_condition(self.kind, &lhs, &rhs)
            }
            ConditionKind::ExistFile => {
                let path = env.preprocess(&self.args[0])?;
                let found = path_exists(&path, false);
                let message = if found {
                    format!("File [{}] exists", path)
                } else {
                    format!("File [{}] does not exist", path)
                };
                (found, message)
            }
            ConditionKind::ExistDir => {
                let path = env.preprocess(&self.args[0])?;
                let found = path_exists(&path, true);
                let message = if found {
                    format!("Directory [{}] exists", path)
                } else {
                    format!("Directory [{}] does not exist", path)
                };
                (found, message)
            }
            ConditionKind::ExistSection => {
                let file = env.preprocess(&self.args[0])?;
                let section = env.preprocess(&self.args[1])?;
                let found = IniDocument::load(Path::new(&file))?.has_section(&section);
                let message = if found {
                    format!("Section [{}] exists in INI file [{}]", section, file)
                } else {
                    format!("Section [{}] does not exist in INI file [{}]", section, file)
                };
                (found, message)
            }
            ConditionKind::ExistRegSection => {
                let hive: Hive = env.preprocess(&self.args[0])?.parse()?;
                let key = env.preprocess(&self.args[1])?;
                let found = env.registry().open_key(hive, &key)?.is_some();
                let message = if found {
                    format!("Registry SubKey [{}\\{}] exists", hive, key)
                } else {
                    format!("Registry SubKey [{}\\{}] does not exist", hive, key)
                };
                (found, message)
            }
            ConditionKind::ExistRegKey => {
                let hive: Hive = env.preprocess(&self.args[0])?.parse()?;
                let key = env.preprocess(&self.args[1])?;
                let value = env.preprocess(&self.args[2])?;
                let found = match env.registry().open_key(hive, &key)? {
                    Some(handle) => handle.value(&value).is_some(),
                    None => false,
                };
                let message = if found {
                    format!("Registry Value [{}\\{}\\{}] exists", hive, key, value)
                } else {
                    format!("Registry Value [{}\\{}\\{}] does not exist", hive, key, value)
                };
                (found, message)
            }
            ConditionKind::ExistRegMulti => {
                let hive: Hive = env.preprocess(&self.args[0])?.parse()?;
                let key = env.preprocess(&self.args[1])?;
                let value = env.preprocess(&self.args[2])?;
                let item = env.preprocess(&self.args[3])?;
                let found = match env.registry().open_key(hive, &key)? {
                    Some(handle) => match handle.value(&value) {
                        Some(RegValue::MultiSz(items)) => {
                            items.iter().any(|i| i.eq_ignore_ascii_case(&item))
                        }
                        Some(_) => {
                            return Err(ScriptError::execution(format!(
                                "Registry Value [{}\\{}\\{}] is not REG_MULTI_SZ",
                                hive, key, value
                            )))
                        }
                        None => false,
                    },
                    None => false,
                };
                let message = if found {
                    format!("Registry Value [{}\\{}\\{}] contains [{}]", hive, key, value, item)
                } else {
                    format!("Registry Value [{}\\{}\\{}] does not contain [{}]", hive, key, value, item)
                };
                (found, message)
            }
            ConditionKind::ExistVar => {
                let raw = self.args[0].trim();
                let name = raw
                    .strip_prefix('%')
                    .and_then(|s| s.strip_suffix('%'))
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        ScriptError::execution(format!("[{}] is not a valid variable name", raw))
                    })?;
                let found = env.variable_exists(name);
                let message = if found {
                    format!("Variable [%{}%] exists", name)
                } else {
                    format!("Variable [%{}%] does not exist", name)
                };
                (found, message)
            }
            ConditionKind::ExistMacro => {
                let name = env.preprocess(&self.args[0])?;
                let found = env.macro_exists(&name);
                let message = if found {
                    format!("Macro [{}] exists", name)
                } else {
                    format!("Macro [{}] does not exist", name)
                };
                (found, message)
            }
            ConditionKind::Ping => {
                let host = env.preprocess(&self.args[0])?;
                match env.network().ping(&host, env.ping_timeout()) {
                    Ok(_) => (true, format!("[{}] responded to Ping", host)),
                    Err(reason) => (false, format!("Error while pinging [{}] : {}", host, reason)),
                }
            }
            ConditionKind::Online => {
                if env.network().is_online() {
                    (true, "Network is online".to_string())
                } else {
                    (false, "Network is offline".to_string())
                }
            }
            ConditionKind::Question => {
                let question = env.preprocess(&self.args[0])?;
                let answer = match self.args.get(2) {
                    Some(default) => env.preprocess(default)?.eq_ignore_ascii_case("True"),
                    None => false,
                };
                let reply = if answer { "Yes" } else { "No" };
                (answer, format!("[{}] was answered with [{}]", question, reply))
            }
        };
        Ok((matched != self.not, message))
    }
}

/// `Question,<msg>[,<timeout>,<True|False>]`
fn question_arity(rest: &[String]) -> usize {
    let timed = rest.len() >= 3
        && rest[1].trim().parse::<u64>().is_ok()
        && (rest[2].eq_ignore_ascii_case("True") || rest[2].eq_ignore_ascii_case("False"));
    if timed {
        3
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::Int(i));
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Some(Number::Int(i));
        }
    }
    let plain = !text.is_empty()
        && text.chars().any(|c| c.is_ascii_digit())
        && text.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'));
    if plain {
        if let Ok(f) = text.parse::<f64>() {
            return Some(Number::Float(f));
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordering3 {
    Equal,
    Smaller,
    Bigger,
    NotEqual,
}

fn compare_values(lhs: &str, rhs: &str, case_sensitive: bool) -> Ordering3 {
    use std::cmp::Ordering;

    let ordering = match (parse_number(lhs), parse_number(rhs)) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => Some(a.cmp(&b)),
        (Some(a), Some(b)) => {
            let as_f64 = |n: Number| match n {
                Number::Int(i) => i as f64,
                Number::Float(f) => f,
            };
            as_f64(a).partial_cmp(&as_f64(b))
        }
        _ => None,
    };
    match ordering {
        Some(Ordering::Equal) => Ordering3::Equal,
        Some(Ordering::Less) => Ordering3::Smaller,
        Some(Ordering::Greater) => Ordering3::Bigger,
        None => {
            let equal = if case_sensitive {
                lhs == rhs
            } else {
                lhs.to_lowercase() == rhs.to_lowercase()
            };
            if equal {
                Ordering3::Equal
            } else {
                Ordering3::NotEqual
            }
        }
    }
}

fn compare_condition(kind: ConditionKind, lhs: &str, rhs: &str) -> (bool, String) {
    let result = compare_values(lhs, rhs, kind == ConditionKind::EqualX);
    let matched = match kind {
        ConditionKind::Equal | ConditionKind::EqualX => result == Ordering3::Equal,
        ConditionKind::Smaller => result == Ordering3::Smaller,
        ConditionKind::Bigger => result == Ordering3::Bigger,
        ConditionKind::SmallerEqual => matches!(result, Ordering3::Smaller | Ordering3::Equal),
        ConditionKind::BiggerEqual => matches!(result, Ordering3::Bigger | Ordering3::Equal),
        _ => false,
    };
    let relation = match result {
        Ordering3::Equal => "is equal to",
        Ordering3::Smaller => "is smaller than",
        Ordering3::Bigger => "is bigger than",
        Ordering3::NotEqual => "is not equal to",
    };
    (matched, format!("[{}] {} [{}]", lhs, relation, rhs))
}

pub(crate) fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// Checks a path, expanding `*`/`?` in the last component only.
pub(crate) fn path_exists(path: &str, want_dir: bool) -> bool {
    let path = Path::new(path);
    let is_kind = |p: &Path| if want_dir { p.is_dir() } else { p.is_file() };
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return is_kind(path);
    };
    if !has_wildcard(&name) {
        return is_kind(path);
    }
    !wildcard_matches(path, want_dir).is_empty()
}

/// Entries of the parent directory matching the wildcard file name of `path`.
pub(crate) fn wildcard_matches(path: &Path, want_dir: bool) -> Vec<std::path::PathBuf> {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            _ => escaped.push(c),
        }
    }
    let Ok(pattern) = glob::Pattern::new(&escaped) else {
        return Vec::new();
    };
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let Ok(entries) = std::fs::read_dir(&parent) else {
        return Vec::new();
    };
    let mut found: Vec<std::path::PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| pattern.matches_with(&e.file_name().to_string_lossy(), options))
        .map(|e| e.path())
        .filter(|p| if want_dir { p.is_dir() } else { p.is_file() })
        .collect();
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escaper::unescape;
    use crate::registry::MemoryRegistry;
    use crate::variables::VariableStore;

    struct FakeProbe {
        online: bool,
    }

    impl NetworkProbe for FakeProbe {
        fn ping(&self, host: &str, _timeout: Duration) -> Result<Duration, String> {
            if host == "reachable" {
                Ok(Duration::from_millis(1))
            } else {
                Err("timed out".to_string())
            }
        }

        fn is_online(&self) -> bool {
            self.online
        }
    }

    struct Env {
        vars: VariableStore,
        registry: MemoryRegistry,
        probe: FakeProbe,
    }

    impl Env {
        fn new() -> Self {
            Self {
                vars: VariableStore::default(),
                registry: MemoryRegistry::new(),
                probe: FakeProbe { online: true },
            }
        }
    }

    impl ConditionEnv for Env {
        fn preprocess(&self, text: &str) -> Result<String, ScriptError> {
            Ok(unescape(&self.vars.expand(text)?, true, true))
        }

        fn variable_exists(&self, name: &str) -> bool {
            self.vars.contains(name)
        }

        fn macro_exists(&self, name: &str) -> bool {
            name.eq_ignore_ascii_case("Known")
        }

        fn registry(&self) -> &dyn Registry {
            &self.registry
        }

        fn network(&self) -> &dyn NetworkProbe {
            &self.probe
        }

        fn ping_timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn ops(line: &str) -> Vec<String> {
        line.split(',').map(str::to_string).collect()
    }

    fn eval(env: &Env, line: &str) -> (bool, String) {
        let (cond, _) = BranchCondition::parse(&ops(line)).unwrap();
        cond.evaluate(env).unwrap()
    }

    #[test]
    fn parse_reports_consumed_operands() {
        let (cond, used) = BranchCondition::parse(&ops("%A%,Equal,B,Echo,Hi")).unwrap();
        assert_eq!(cond.kind, ConditionKind::Equal);
        assert_eq!(used, 3);

        let (cond, used) = BranchCondition::parse(&ops("Not,ExistFile,a.txt,Echo,Hi")).unwrap();
        assert!(cond.not);
        assert_eq!(used, 3);

        let (cond, used) = BranchCondition::parse(&ops("ExistRegMulti,HKLM,K,V,item,Echo,x")).unwrap();
        assert_eq!(cond.args.len(), 4);
        assert_eq!(used, 5);

        let (_, used) = BranchCondition::parse(&ops("Online,Echo,x")).unwrap();
        assert_eq!(used, 1);
    }

    #[test]
    fn operator_symbols() {
        let (cond, _) = BranchCondition::parse(&ops("1,<=,2")).unwrap();
        assert_eq!(cond.kind, ConditionKind::SmallerEqual);
        let (cond, _) = BranchCondition::parse(&ops("a,!=,b")).unwrap();
        assert_eq!(cond.kind, ConditionKind::Equal);
        assert!(cond.not);
    }

    #[test]
    fn duplicated_not_is_rejected() {
        assert!(BranchCondition::parse(&ops("Not,NotExistFile,a")).unwrap_err().is_grammar());
        assert!(BranchCondition::parse(&ops("Not,a,NotEqual,b")).unwrap_err().is_grammar());
        let (cond, _) = BranchCondition::parse(&ops("NotExistDir,x")).unwrap();
        assert_eq!(cond.kind, ConditionKind::ExistDir);
        assert!(cond.not);
    }

    #[test]
    fn missing_arguments_are_grammar_errors() {
        assert!(BranchCondition::parse(&ops("ExistSection,a.ini")).unwrap_err().is_grammar());
        assert!(BranchCondition::parse(&ops("a,Equal")).unwrap_err().is_grammar());
        assert!(BranchCondition::parse(&ops("a,Like,b")).unwrap_err().is_grammar());
        assert!(BranchCondition::parse(&[]).unwrap_err().is_grammar());
        assert!(BranchCondition::new(ConditionKind::Online, false, vec!["x".into()]).is_err());
    }

    #[test]
    fn question_forms() {
        let (cond, used) = BranchCondition::parse(&ops("Question,Continue?,Echo,x")).unwrap();
        assert_eq!(cond.args.len(), 1);
        assert_eq!(used, 2);
        let (cond, used) = BranchCondition::parse(&ops("Question,Continue?,10,True,Echo,x")).unwrap();
        assert_eq!(cond.args.len(), 3);
        assert_eq!(used, 4);

        let env = Env::new();
        assert!(!eval(&env, "Question,Continue?").0);
        assert!(eval(&env, "Question,Continue?,10,True").0);
    }

    #[test]
    fn unresolved_variable_does_not_match() {
        let env = Env::new();
        let (matched, message) = eval(&env, "%A%,Equal,B");
        assert!(!matched);
        assert_eq!(message, "[%A%] is not equal to [B]");
    }

    #[test]
    fn numeric_and_string_comparison() {
        let env = Env::new();
        assert!(eval(&env, "10,Bigger,9").0);
        assert!(eval(&env, "0x10,Equal,16").0);
        assert!(eval(&env, "1.5,Smaller,2").0);
        assert!(eval(&env, "abc,Equal,ABC").0);
        assert!(!eval(&env, "abc,EqualX,ABC").0);
        // Strings never order.
        assert!(!eval(&env, "a,Smaller,b").0);
        assert!(!eval(&env, "a,SmallerEqual,b").0);
        assert_eq!(eval(&env, "3,<,4").1, "[3] is smaller than [4]");
    }

    #[test]
    fn not_flips_only_the_result() {
        let env = Env::new();
        let (matched, message) = eval(&env, "Not,1,Equal,1");
        assert!(!matched);
        assert_eq!(message, "[1] is equal to [1]");
    }

    #[test]
    fn file_and_dir_existence_with_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Setup.exe"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("Drivers")).unwrap();
        let env = Env::new();
        let base = dir.path().display().to_string();

        assert!(eval(&env, &format!("ExistFile,{}/*.exe", base)).0);
        assert!(eval(&env, &format!("ExistFile,{}/Set?p.exe", base)).0);
        assert!(eval(&env, &format!("ExistFile,{}/SETUP.*", base)).0);
        assert!(!eval(&env, &format!("ExistFile,{}/*.dll", base)).0);
        assert!(!eval(&env, &format!("ExistFile,{}/Dr*", base)).0);
        assert!(eval(&env, &format!("ExistDir,{}/Dr*", base)).0);
        assert!(eval(&env, &format!("NotExistDir,{}/Missing", base)).0);
    }

    #[test]
    fn section_existence() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("a.ini");
        std::fs::write(&ini, "[Main]\nk=v\n").unwrap();
        let env = Env::new();
        let (matched, message) = eval(&env, &format!("ExistSection,{},main", ini.display()));
        assert!(matched);
        assert!(message.starts_with("Section [main] exists in INI file"));
        assert!(!eval(&env, &format!("ExistSection,{},Other", ini.display())).0);
        assert!(!eval(&env, &format!("ExistSection,{}/none.ini,Main", dir.path().display())).0);
    }

    #[test]
    fn registry_existence_releases_handles() {
        let env = Env::new();
        env.registry
            .set_value(Hive::LocalMachine, "Soft\\App", "Paths", RegValue::MultiSz(vec!["C:\\A".into()]))
            .unwrap();
        assert!(eval(&env, "ExistRegSection,HKLM,Soft").0);
        assert!(eval(&env, "ExistRegSubKey,HKLM,Soft\\App").0);
        assert!(!eval(&env, "ExistRegSection,HKCU,Soft").0);
        assert!(eval(&env, "ExistRegValue,HKLM,Soft\\App,Paths").0);
        assert!(!eval(&env, "ExistRegKey,HKLM,Soft\\App,Other").0);
        assert!(eval(&env, "ExistRegMulti,HKLM,Soft\\App,Paths,c:\\a").0);
        assert!(!eval(&env, "ExistRegMulti,HKLM,Soft\\App,Paths,C:\\B").0);
        assert_eq!(env.registry.open_handles(), 0);
    }

    #[test]
    fn bad_hive_is_an_error() {
        let env = Env::new();
        let (cond, _) = BranchCondition::parse(&ops("ExistRegSection,HKXX,Soft")).unwrap();
        assert!(cond.evaluate(&env).is_err());
    }

    #[test]
    fn variable_and_macro_existence() {
        let mut env = Env::new();
        env.vars.set_local("Target", "x").unwrap();
        assert_eq!(eval(&env, "ExistVar,%Target%"), (true, "Variable [%Target%] exists".to_string()));
        assert!(!eval(&env, "ExistVar,%Other%").0);
        assert!(eval(&env, "ExistMacro,Known").0);
        assert!(!eval(&env, "ExistMacro,Unknown").0);
    }

    #[test]
    fn network_conditions_use_probe() {
        let mut env = Env::new();
        assert_eq!(eval(&env, "Ping,reachable"), (true, "[reachable] responded to Ping".to_string()));
        let (matched, message) = eval(&env, "Ping,nowhere");
        assert!(!matched);
        assert_eq!(message, "Error while pinging [nowhere] : timed out");
        assert!(eval(&env, "Online").0);
        env.probe.online = false;
        assert_eq!(eval(&env, "Online"), (false, "Network is offline".to_string()));
    }
}
