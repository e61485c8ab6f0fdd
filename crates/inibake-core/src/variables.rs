//! Three-tier variable store and parameter substitution.
//!
//! Names are case-insensitive. Lookup order is Local, then Global, then
//! Fixed. Fixed variables are written exactly once, during bootstrap.
//!
//! Values are stored raw: `%A%=%B%` keeps the text `%B%`, and the reference
//! is only resolved when something expands it. [`VariableStore::expand`]
//! re-scans until no `%name%` token is left; names that are not defined turn
//! into the inert marker `#$pname#$p`, which [`crate::escaper::unescape`]
//! later renders back as `%name%`.
//!
//! Positional parameters (`#1`..`#9`) live in a separate [`ParamList`] and
//! are substituted by [`expand_params`] in a single pass.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// The namespace a variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarTier {
    Fixed,
    Global,
    Local,
}

impl fmt::Display for VarTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarTier::Fixed => "Fixed",
            VarTier::Global => "Global",
            VarTier::Local => "Local",
        };
        f.write_str(name)
    }
}

/// Case-insensitive name to value map that remembers the original spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarMap {
    entries: HashMap<String, (String, String)>,
}

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.to_lowercase(), (name.to_string(), value.into()));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&name.to_lowercase()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, value)` pairs sorted by name.
    pub fn iter_sorted(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .entries
            .values()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect();
        pairs.sort_by_key(|(n, _)| n.to_lowercase());
        pairs
    }
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%([^ %]+)%").expect("variable regex must compile"))
}

/// Marker left in place of an undefined `%name%`.
pub fn unresolved_marker(name: &str) -> String {
    format!("#$p{}#$p", name)
}

/// Returns true if `text` contains the token `%name%`, ignoring case.
fn references(text: &str, name: &str) -> bool {
    variable_pattern()
        .captures_iter(text)
        .any(|c| c[1].eq_ignore_ascii_case(name))
}

/// Fixed, Global and Local variable maps.
#[derive(Debug, Clone)]
pub struct VariableStore {
    fixed: VarMap,
    global: VarMap,
    local: VarMap,
    bootstrapped: bool,
    max_iterations: usize,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new(32)
    }
}

impl VariableStore {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            fixed: VarMap::new(),
            global: VarMap::new(),
            local: VarMap::new(),
            bootstrapped: false,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Sets every Fixed variable. Only the first call is accepted.
    pub fn bootstrap_fixed<I, K, V>(&mut self, vars: I) -> Result<(), ScriptError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        if self.bootstrapped {
            return Err(ScriptError::critical("Fixed variables were already initialized"));
        }
        for (name, value) in vars {
            self.fixed.insert(name.as_ref(), value);
        }
        self.bootstrapped = true;
        Ok(())
    }

    fn map(&self, tier: VarTier) -> &VarMap {
        match tier {
            VarTier::Fixed => &self.fixed,
            VarTier::Global => &self.global,
            VarTier::Local => &self.local,
        }
    }

    fn map_mut(&mut self, tier: VarTier) -> &mut VarMap {
        match tier {
            VarTier::Fixed => &mut self.fixed,
            VarTier::Global => &mut self.global,
            VarTier::Local => &mut self.local,
        }
    }

    /// Raw value, honoring Local > Global > Fixed.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.local
            .get(name)
            .or_else(|| self.global.get(name))
            .or_else(|| self.fixed.get(name))
    }

    pub fn get_in(&self, tier: VarTier, name: &str) -> Option<&str> {
        self.map(tier).get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The tier a lookup of `name` would be served from.
    pub fn tier_of(&self, name: &str) -> Option<VarTier> {
        [VarTier::Local, VarTier::Global, VarTier::Fixed]
            .into_iter()
            .find(|t| self.map(*t).contains(name))
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.fixed.contains(name)
    }

    /// Stores `value` unexpanded.
    ///
    /// Fixed names and values that reference their own name are rejected.
    pub fn set(&mut self, tier: VarTier, name: &str, value: impl Into<String>) -> Result<(), ScriptError> {
        let value = value.into();
        if tier == VarTier::Fixed || self.is_fixed(name) {
            return Err(ScriptError::FixedVariable(name.to_string()));
        }
        if references(&value, name) {
            return Err(ScriptError::CircularReference(format!(
                "Variable [%{}%] cannot contain itself in [{}]",
                name, value
            )));
        }
        self.map_mut(tier).insert(name, value);
        Ok(())
    }

    pub fn set_local(&mut self, name: &str, value: impl Into<String>) -> Result<(), ScriptError> {
        self.set(VarTier::Local, name, value)
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<String>) -> Result<(), ScriptError> {
        self.set(VarTier::Global, name, value)
    }

    /// Removes `name` from one tier. Fixed variables cannot be removed.
    pub fn delete(&mut self, tier: VarTier, name: &str) -> bool {
        match tier {
            VarTier::Fixed => false,
            _ => self.map_mut(tier).remove(name),
        }
    }

    /// Replaces `%name%` tokens until none are left.
    pub fn expand(&self, text: &str) -> Result<String, ScriptError> {
        let pattern = variable_pattern();
        let mut current = text.to_string();
        for _ in 0..self.max_iterations {
            if !pattern.is_match(&current) {
                return Ok(current);
            }
            current = pattern
                .replace_all(&current, |caps: &regex::Captures<'_>| match self.get(&caps[1]) {
                    Some(value) => value.to_string(),
                    None => unresolved_marker(&caps[1]),
                })
                .into_owned();
        }
        if pattern.is_match(&current) {
            return Err(ScriptError::CircularReference(format!(
                "Variable expansion of [{}] did not settle",
                text
            )));
        }
        Ok(current)
    }

    /// Clears Local variables; done on every script entry.
    pub fn reset_local(&mut self) {
        self.local = VarMap::new();
    }

    pub fn local_snapshot(&self) -> VarMap {
        self.local.clone()
    }

    pub fn restore_local(&mut self, snapshot: VarMap) {
        self.local = snapshot;
    }

    pub fn vars(&self, tier: VarTier) -> &VarMap {
        self.map(tier)
    }
}

/// Ordered positional parameters, addressed from 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamList(Vec<String>);

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_index(index: i64) -> Result<usize, ScriptError> {
        if index <= 0 {
            return Err(ScriptError::execution(format!(
                "Section parameter index [#{}] must be positive",
                index
            )));
        }
        usize::try_from(index - 1)
            .map_err(|_| ScriptError::execution(format!("Section parameter index [#{}] is too large", index)))
    }

    /// Value at `index`; past the end reads as empty.
    pub fn get(&self, index: i64) -> Result<&str, ScriptError> {
        let i = Self::check_index(index)?;
        Ok(self.0.get(i).map(String::as_str).unwrap_or(""))
    }

    /// Writes `index`, padding any gap with empty strings.
    pub fn set(&mut self, index: i64, value: impl Into<String>) -> Result<(), ScriptError> {
        let i = Self::check_index(index)?;
        if i >= self.0.len() {
            self.0.resize(i + 1, String::new());
        }
        self.0[i] = value.into();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for ParamList {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

/// Values visible to [`expand_params`].
#[derive(Debug, Clone, Copy)]
pub struct ParamContext<'a> {
    pub params: &'a ParamList,
    pub return_value: &'a str,
    /// Counter (or letter) of the innermost running loop.
    pub loop_counter: Option<&'a str>,
}

/// Substitutes `#1`..`#9`, `#a`, `#r` and `#c` in one pass.
///
/// `##` and `#$?` tokens are left for unescaping; `#c` outside a loop is
/// kept literally. `#0` is an error.
pub fn expand_params(text: &str, ctx: &ParamContext<'_>) -> Result<String, ScriptError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '#' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('#') => {
                chars.next();
                out.push_str("##");
            }
            Some('0') => {
                return Err(ScriptError::execution(format!(
                    "Section parameter index [#0] must be positive in [{}]",
                    text
                )));
            }
            Some(d @ '1'..='9') => {
                chars.next();
                let index = i64::from(d.to_digit(10).unwrap_or(1));
                out.push_str(ctx.params.get(index)?);
            }
            Some('a' | 'A') => {
                chars.next();
                out.push_str(&ctx.params.len().to_string());
            }
            Some('r' | 'R') => {
                chars.next();
                out.push_str(ctx.return_value);
            }
            Some(l @ ('c' | 'C')) => {
                chars.next();
                match ctx.loop_counter {
                    Some(counter) => out.push_str(counter),
                    None => {
                        out.push('#');
                        out.push(l);
                    }
                }
            }
            _ => out.push('#'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        let mut vars = VariableStore::default();
        vars.bootstrap_fixed([("BaseDir", "C:\\Base")]).unwrap();
        vars
    }

    #[test]
    fn lookup_priority_and_case() {
        let mut vars = store();
        vars.set_global("Target", "global").unwrap();
        assert_eq!(vars.get("target"), Some("global"));
        vars.set_local("TARGET", "local").unwrap();
        assert_eq!(vars.get("Target"), Some("local"));
        assert_eq!(vars.tier_of("target"), Some(VarTier::Local));
        assert_eq!(vars.get_in(VarTier::Global, "Target"), Some("global"));
        assert_eq!(vars.tier_of("BaseDir"), Some(VarTier::Fixed));
    }

    #[test]
    fn fixed_is_bootstrapped_once() {
        let mut vars = store();
        assert!(vars.bootstrap_fixed([("X", "1")]).unwrap_err().is_critical());
        assert!(matches!(
            vars.set_local("basedir", "x"),
            Err(ScriptError::FixedVariable(_))
        ));
        assert!(!vars.delete(VarTier::Fixed, "BaseDir"));
        assert_eq!(vars.get("BaseDir"), Some("C:\\Base"));
    }

    #[test]
    fn lazy_assignment_resolves_later() {
        let mut vars = store();
        vars.set_local("A", "%B%").unwrap();
        assert_eq!(vars.expand("%A%").unwrap(), "#$pB#$p");
        vars.set_local("B", "x").unwrap();
        assert_eq!(vars.expand("%A%").unwrap(), "x");
    }

    #[test]
    fn nested_references_expand() {
        let mut vars = store();
        vars.set_local("Dir", "%BaseDir%\\Sub").unwrap();
        vars.set_local("File", "%Dir%\\a.txt").unwrap();
        assert_eq!(vars.expand("[%File%]").unwrap(), "[C:\\Base\\Sub\\a.txt]");
    }

    #[test]
    fn self_reference_is_rejected() {
        let mut vars = store();
        let err = vars.set_local("A", "x%a%y").unwrap_err();
        assert!(matches!(err, ScriptError::CircularReference(_)));
        assert!(!vars.contains("A"));
    }

    #[test]
    fn indirect_cycle_hits_iteration_cap() {
        let mut vars = store();
        vars.set_local("A", "%B%").unwrap();
        vars.set_local("B", "%A%").unwrap();
        assert!(matches!(vars.expand("%A%"), Err(ScriptError::CircularReference(_))));
    }

    #[test]
    fn text_without_tokens_is_unchanged() {
        let vars = store();
        assert_eq!(vars.expand("100% sure").unwrap(), "100% sure");
        assert_eq!(vars.expand("%a b%").unwrap(), "%a b%");
    }

    #[test]
    fn local_snapshot_and_reset() {
        let mut vars = store();
        vars.set_local("A", "1").unwrap();
        let saved = vars.local_snapshot();
        vars.reset_local();
        assert!(!vars.contains("A"));
        vars.restore_local(saved);
        assert_eq!(vars.get("A"), Some("1"));
    }

    #[test]
    fn params_read_and_gap_fill() {
        let mut params = ParamList::new();
        assert_eq!(params.get(3).unwrap(), "");
        params.set(3, "c").unwrap();
        assert_eq!(params.as_slice(), &["", "", "c"]);
        assert!(params.get(0).is_err());
        assert!(params.set(-1, "x").is_err());
    }

    #[test]
    fn param_expansion() {
        let params = ParamList::from(vec!["one".to_string(), "two".to_string()]);
        let ctx = ParamContext {
            params: &params,
            return_value: "ret",
            loop_counter: None,
        };
        assert_eq!(expand_params("#1-#2-#3", &ctx).unwrap(), "one-two-");
        assert_eq!(expand_params("#a #r", &ctx).unwrap(), "2 ret");
        assert_eq!(expand_params("##1 #$c #c", &ctx).unwrap(), "##1 #$c #c");
        assert!(expand_params("#0", &ctx).is_err());
    }

    #[test]
    fn param_expansion_is_single_pass() {
        let params = ParamList::from(vec!["#2".to_string(), "deep".to_string()]);
        let ctx = ParamContext {
            params: &params,
            return_value: "",
            loop_counter: Some("5"),
        };
        assert_eq!(expand_params("#1", &ctx).unwrap(), "#2");
        assert_eq!(expand_params("#c", &ctx).unwrap(), "5");
    }
}
