//! StrFormat and Math.

use regex::{NoExpand, RegexBuilder};

use crate::command::{Command, MathOperator, StrFormatOp, VarKey};
use crate::error::ScriptError;

use super::state::EngineState;

/// Parses a decimal or `0x` hexadecimal integer.
pub(super) fn parse_int(text: &str) -> Result<i64, ScriptError> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => trimmed.parse::<i64>().ok(),
    };
    parsed.ok_or_else(|| ScriptError::execution(format!("Argument [{}] is not a valid integer", text)))
}

/// Replaces every occurrence of `from`, ignoring case.
pub(super) fn replace_ignore_case(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return text.to_string();
    }
    match RegexBuilder::new(&regex::escape(from)).case_insensitive(true).build() {
        Ok(re) => re.replace_all(text, NoExpand(to)).into_owned(),
        Err(_) => text.to_string(),
    }
}

fn count_arg(text: &str) -> Result<usize, ScriptError> {
    let n = parse_int(text)?;
    usize::try_from(n).map_err(|_| ScriptError::execution(format!("Argument [{}] must not be negative", n)))
}

fn left(src: &str, count: usize) -> String {
    src.chars().take(count).collect()
}

fn right(src: &str, count: usize) -> String {
    let len = src.chars().count();
    src.chars().skip(len.saturating_sub(count)).collect()
}

/// 1-based position of `needle`, ignoring ASCII case; 0 when absent.
fn position(src: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let haystack = src.to_ascii_lowercase();
    match haystack.find(&needle.to_ascii_lowercase()) {
        Some(byte) => haystack[..byte].chars().count() + 1,
        None => 0,
    }
}

/// Part `index` (1-based) of `src`; index 0 yields the number of parts.
fn split_part(src: &str, delimiter: &str, index: i64) -> Result<String, ScriptError> {
    if delimiter.is_empty() {
        return Err(ScriptError::execution("Delimiter must not be empty"));
    }
    let parts: Vec<&str> = src.split(delimiter).collect();
    match index {
        0 => Ok(parts.len().to_string()),
        i if i < 0 => Err(ScriptError::execution(format!("Index [{}] must not be negative", i))),
        i => Ok(usize::try_from(i - 1)
            .ok()
            .and_then(|i| parts.get(i))
            .map(|s| s.to_string())
            .unwrap_or_default()),
    }
}

/// Adds `delta` to an integer, or shifts a single letter.
fn step(current: &str, delta: i64) -> Result<String, ScriptError> {
    if let Ok(n) = parse_int(current) {
        return n
            .checked_add(delta)
            .map(|v| v.to_string())
            .ok_or_else(|| ScriptError::execution(format!("[{}] overflows", current)));
    }
    let mut chars = current.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            let base = if c.is_ascii_uppercase() { b'A' } else { b'a' };
            let shifted = i64::from(c as u8 - base) + delta;
            if (0..26).contains(&shifted) {
                return Ok(char::from(base + shifted as u8).to_string());
            }
            return Err(ScriptError::execution(format!("Letter [{}] cannot be shifted by [{}]", c, delta)));
        }
    }
    Err(ScriptError::execution(format!("[{}] is not a number or a letter", current)))
}

impl EngineState {
    pub(super) fn str_format(&mut self, cmd: &Command, op: &StrFormatOp) -> Result<(), ScriptError> {
        let (dest, value): (&VarKey, String) = match op {
            StrFormatOp::Inc { dest, amount } | StrFormatOp::Dec { dest, amount } => {
                let amount = parse_int(&self.preprocess(amount)?)?;
                let delta = if matches!(op, StrFormatOp::Inc { .. }) { amount } else { -amount };
                (dest, step(&self.read_key(dest)?, delta)?)
            }
            StrFormatOp::Left { src, count, dest } => {
                let count = count_arg(&self.preprocess(count)?)?;
                (dest, left(&self.preprocess(src)?, count))
            }
            StrFormatOp::Right { src, count, dest } => {
                let count = count_arg(&self.preprocess(count)?)?;
                (dest, right(&self.preprocess(src)?, count))
            }
            StrFormatOp::Len { src, dest } => (dest, self.preprocess(src)?.chars().count().to_string()),
            StrFormatOp::UCase { src, dest } => (dest, self.preprocess(src)?.to_uppercase()),
            StrFormatOp::LCase { src, dest } => (dest, self.preprocess(src)?.to_lowercase()),
            StrFormatOp::Replace { src, from, to, case_sensitive, dest } => {
                let src = self.preprocess(src)?;
                let from = self.preprocess(from)?;
                let to = self.preprocess(to)?;
                let replaced = if from.is_empty() {
                    src
                } else if *case_sensitive {
                    src.replace(&from, &to)
                } else {
                    replace_ignore_case(&src, &from, &to)
                };
                (dest, replaced)
            }
            StrFormatOp::Split { src, delimiter, index, dest } => {
                let index = parse_int(&self.preprocess(index)?)?;
                (dest, split_part(&self.preprocess(src)?, &self.preprocess(delimiter)?, index)?)
            }
            StrFormatOp::Pos { src, needle, dest } => {
                (dest, position(&self.preprocess(src)?, &self.preprocess(needle)?).to_string())
            }
        };
        self.assign(cmd, dest, &value)
    }

    pub(super) fn math(&mut self, cmd: &Command, op: MathOperator, dest: &VarKey, lhs: &str, rhs: &str) -> Result<(), ScriptError> {
        let a = parse_int(&self.preprocess(lhs)?)?;
        let b = parse_int(&self.preprocess(rhs)?)?;
        let result = match op {
            MathOperator::Add => a.checked_add(b),
            MathOperator::Sub => a.checked_sub(b),
            MathOperator::Mul => a.checked_mul(b),
            MathOperator::Div => {
                if b == 0 {
                    return Err(ScriptError::execution("Division by zero"));
                }
                a.checked_div(b)
            }
        }
        .ok_or_else(|| ScriptError::execution(format!("Arithmetic overflow in [{}]", cmd.raw)))?;
        self.assign(cmd, dest, &result.to_string())
    }
}
