//! Scripts, sections, and projects.
//!
//! A [`Script`] is an INI-shaped file split into named sections of raw
//! lines. A [`Project`] is a directory holding one `script.project` (the
//! main script, which carries project-wide metadata and variables) plus any
//! number of `*.script` files.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;
use crate::ini::{header_name, split_key_value};

/// Identifies a section inside a script. Used for logging and caching only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionAddress {
    pub script: PathBuf,
    pub section: String,
}

impl SectionAddress {
    pub fn new(script: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            section: section.into(),
        }
    }

    /// Case-insensitive cache key.
    pub fn key(&self) -> (PathBuf, String) {
        (self.script.clone(), self.section.to_lowercase())
    }
}

impl fmt::Display for SectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.script.display().to_string());
        write!(f, "{}:[{}]", file, self.section)
    }
}

/// A named group of raw lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub lines: Vec<String>,
    /// 1-based line number of the section header in the file.
    pub line_offset: usize,
}

impl Section {
    /// `key=value` pairs of the section, skipping lines without `=`.
    pub fn key_values(&self) -> Vec<(String, String)> {
        self.lines
            .iter()
            .filter(|l| !crate::splitter::is_comment(l.trim()))
            .filter_map(|l| split_key_value(l))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// A parsed script file.
#[derive(Debug, Clone)]
pub struct Script {
    path: PathBuf,
    sections: Vec<Section>,
    index: HashMap<String, usize>,
}

impl Script {
    pub const ENTRY_SECTION: &'static str = "Process";
    pub const MAIN_SECTION: &'static str = "Main";
    pub const VARIABLES_SECTION: &'static str = "Variables";

    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        let mut index = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            if let Some(name) = header_name(line) {
                index.entry(name.to_lowercase()).or_insert(sections.len());
                sections.push(Section {
                    name: name.to_string(),
                    lines: Vec::new(),
                    line_offset: i + 1,
                });
            } else if let Some(current) = sections.last_mut() {
                current.lines.push(line.to_string());
            }
        }
        Self {
            path: path.into(),
            sections,
            index,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::execution(format!("Unable to read script [{}]: {}", path.display(), e))
        })?;
        Ok(Self::parse(path, &text))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.index.get(&name.to_lowercase()).map(|&i| &self.sections[i])
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn address(&self, section: &str) -> Arc<SectionAddress> {
        let name = self
            .section(section)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| section.to_string());
        Arc::new(SectionAddress::new(self.path.clone(), name))
    }

    /// Value of a `[Main]` key.
    pub fn main_value(&self, key: &str) -> Option<String> {
        self.section(Self::MAIN_SECTION)?
            .key_values()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn title(&self) -> String {
        self.main_value("Title").unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Scripts marked `Selected=False` are skipped by a build.
    pub fn is_selected(&self) -> bool {
        !self
            .main_value("Selected")
            .is_some_and(|v| v.eq_ignore_ascii_case("False"))
    }

    /// Variable defaults from `[Variables]`.
    ///
    /// Only `%Name%=Value` lines are variables; names are returned without
    /// the percent marks and values are trimmed and unquoted.
    pub fn variables(&self) -> Vec<(String, String)> {
        self.section(Self::VARIABLES_SECTION)
            .map(variable_lines)
            .unwrap_or_default()
    }
}

/// Extracts `%Name%=Value` pairs from a section.
pub fn variable_lines(section: &Section) -> Vec<(String, String)> {
    section
        .key_values()
        .into_iter()
        .filter_map(|(k, v)| {
            let name = k.strip_prefix('%')?.strip_suffix('%')?;
            if name.is_empty() || name.contains('%') {
                return None;
            }
            let value = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(&v)
                .to_string();
            Some((name.to_string(), value))
        })
        .collect()
}

/// A set of scripts built together.
#[derive(Debug, Clone)]
pub struct Project {
    dir: PathBuf,
    /// Main script first.
    scripts: Vec<Arc<Script>>,
}

impl Project {
    pub const MAIN_SCRIPT: &'static str = "script.project";

    /// Loads `script.project` and every `*.script` below `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let dir = dir.as_ref();
        let main_path = dir.join(Self::MAIN_SCRIPT);
        if !main_path.is_file() {
            return Err(ScriptError::execution(format!(
                "Project [{}] does not have [{}]",
                dir.display(),
                Self::MAIN_SCRIPT
            )));
        }
        let main = Script::load(&main_path)?;

        let pattern = format!("{}/**/*.script", glob::Pattern::escape(&dir.to_string_lossy()));
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ScriptError::execution(format!("Invalid project path: {}", e)))?
            .filter_map(Result::ok)
            .collect();
        paths.sort();

        let mut others = Vec::with_capacity(paths.len());
        for path in paths {
            others.push(Script::load(&path)?);
        }
        Ok(Self::from_scripts(dir, main, others))
    }

    pub fn from_scripts(dir: impl Into<PathBuf>, main: Script, others: Vec<Script>) -> Self {
        let mut scripts = Vec::with_capacity(others.len() + 1);
        scripts.push(Arc::new(main));
        scripts.extend(others.into_iter().map(Arc::new));
        Self {
            dir: dir.into(),
            scripts,
        }
    }

    /// A project made of a single script, which doubles as the main script.
    pub fn single(script: Script) -> Self {
        let dir = script
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_scripts(dir, script, Vec::new())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn main(&self) -> &Arc<Script> {
        &self.scripts[0]
    }

    pub fn scripts(&self) -> &[Arc<Script>] {
        &self.scripts
    }

    pub fn title(&self) -> String {
        self.main().title()
    }

    /// Scripts that take part in a build, main script first.
    pub fn build_order(&self) -> Vec<Arc<Script>> {
        self.scripts
            .iter()
            .filter(|s| s.is_selected())
            .cloned()
            .collect()
    }

    /// Finds a script by full path, path relative to the project, or file name.
    pub fn find(&self, token: &str) -> Option<Arc<Script>> {
        let wanted = Path::new(token);
        let by_path = |s: &&Arc<Script>| {
            paths_equal(s.path(), wanted) || paths_equal(s.path(), &self.dir.join(wanted))
        };
        if let Some(found) = self.scripts.iter().find(by_path) {
            return Some(found.clone());
        }
        self.scripts
            .iter()
            .find(|s| {
                s.path()
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(token))
            })
            .cloned()
    }

    /// Replaces the script with the same path, or adds it.
    pub fn replace(&mut self, script: Script) -> Arc<Script> {
        let script = Arc::new(script);
        match self.scripts.iter().position(|s| s.path() == script.path()) {
            Some(i) => self.scripts[i] = script.clone(),
            None => self.scripts.push(script.clone()),
        }
        script
    }
}

/// Compares paths textually, ignoring ASCII case and separator style.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    let norm = |p: &Path| p.to_string_lossy().replace('\\', "/").to_ascii_lowercase();
    norm(a) == norm(b)
}
