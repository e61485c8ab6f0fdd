//! Text file and INI file commands.

use std::fs;
use std::path::{Path, PathBuf};

use crate::command::{Command, LinePlacement, VarKey};
use crate::error::ScriptError;
use crate::ini::IniDocument;
use crate::log::LogEntry;

use super::state::EngineState;
use super::string::replace_ignore_case;

/// A text file split into lines, remembering its line ending.
struct TextFile {
    lines: Vec<String>,
    newline: &'static str,
}

impl TextFile {
    fn read(path: &Path) -> Result<Self, ScriptError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    fn parse(text: &str) -> Self {
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let lines = text.lines().map(str::to_string).collect();
        Self { lines, newline }
    }

    fn render(&self) -> String {
        let mut out = self.lines.join(self.newline);
        if !self.lines.is_empty() {
            out.push_str(self.newline);
        }
        out
    }

    fn write(&self, path: &Path) -> Result<(), ScriptError> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

fn require_file(path: &Path) -> Result<(), ScriptError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ScriptError::execution(format!("File [{}] does not exist", path.display())))
    }
}

impl EngineState {
    pub(super) fn txt_add_line(&mut self, cmd: &Command, file: &str, line: &str, placement: LinePlacement) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let line = self.preprocess(line)?;
        let mut text = if path.exists() {
            TextFile::read(&path)?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            TextFile::parse("")
        };
        let verb = match placement {
            LinePlacement::Append => {
                text.lines.push(line.clone());
                "Appended"
            }
            LinePlacement::Prepend => {
                text.lines.insert(0, line.clone());
                "Prepended"
            }
        };
        text.write(&path)?;
        self.emit(cmd, LogEntry::success(format!("{} [{}] to [{}]", verb, line, path.display())));
        Ok(())
    }

    /// Deletes every line starting with `prefix`, ignoring case.
    pub(super) fn txt_del_line(&mut self, cmd: &Command, file: &str, prefix: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let prefix = self.preprocess(prefix)?.to_lowercase();
        require_file(&path)?;
        let mut text = TextFile::read(&path)?;
        let before = text.lines.len();
        text.lines.retain(|l| !l.to_lowercase().starts_with(&prefix));
        let removed = before - text.lines.len();
        if removed == 0 {
            self.emit(cmd, LogEntry::ignore(format!("No line in [{}] starts with [{}]", path.display(), prefix)));
            return Ok(());
        }
        text.write(&path)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Deleted [{}] lines from [{}]", removed, path.display())),
        );
        Ok(())
    }

    pub(super) fn txt_replace(&mut self, cmd: &Command, file: &str, old: &str, new: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let old = self.preprocess(old)?;
        let new = self.preprocess(new)?;
        require_file(&path)?;
        let text = fs::read_to_string(&path)?;
        let replaced = replace_ignore_case(&text, &old, &new);
        fs::write(&path, &replaced)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Replaced [{}] with [{}] in [{}]", old, new, path.display())),
        );
        Ok(())
    }

    pub(super) fn txt_del_empty_lines(&mut self, cmd: &Command, file: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        require_file(&path)?;
        let mut text = TextFile::read(&path)?;
        let before = text.lines.len();
        text.lines.retain(|l| !l.trim().is_empty());
        let removed = before - text.lines.len();
        text.write(&path)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Deleted [{}] empty lines from [{}]", removed, path.display())),
        );
        Ok(())
    }

    pub(super) fn ini_read(
        &mut self,
        cmd: &Command,
        file: &str,
        section: &str,
        key: &str,
        dest: &VarKey,
        default: Option<&str>,
    ) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let section = self.preprocess(section)?;
        let key = self.preprocess(key)?;
        let doc = IniDocument::load(&path)?;
        let value = match (doc.get(&section, &key), default) {
            (Some(value), _) => value,
            (None, Some(default)) => self.preprocess(default)?,
            (None, None) => {
                return Err(ScriptError::execution(format!(
                    "Key [{}] does not exist in section [{}] of [{}]",
                    key,
                    section,
                    path.display()
                )))
            }
        };
        self.assign(cmd, dest, &value)
    }

    pub(super) fn ini_write(&mut self, cmd: &Command, file: &str, section: &str, key: &str, value: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let section = self.preprocess(section)?;
        let key = self.preprocess(key)?;
        let value = self.preprocess(value)?;
        let mut doc = IniDocument::load(&path)?;
        let replaced = doc.set(&section, &key, &value);
        doc.save(&path)?;
        let message = format!("Key [{}] set to [{}] in section [{}] of [{}]", key, value, section, path.display());
        let entry = if replaced {
            LogEntry::overwrite(message)
        } else {
            LogEntry::success(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn ini_delete(&mut self, cmd: &Command, file: &str, section: &str, key: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let section = self.preprocess(section)?;
        let key = self.preprocess(key)?;
        let mut doc = IniDocument::load(&path)?;
        if !doc.delete_key(&section, &key) {
            self.emit(
                cmd,
                LogEntry::ignore(format!("Key [{}] does not exist in section [{}]", key, section)),
            );
            return Ok(());
        }
        doc.save(&path)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Key [{}] deleted from section [{}] of [{}]", key, section, path.display())),
        );
        Ok(())
    }

    pub(super) fn ini_add_section(&mut self, cmd: &Command, file: &str, section: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let section = self.preprocess(section)?;
        let mut doc = IniDocument::load(&path)?;
        if !doc.add_section(&section) {
            self.emit(cmd, LogEntry::ignore(format!("Section [{}] already exists", section)));
            return Ok(());
        }
        doc.save(&path)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Section [{}] added to [{}]", section, path.display())),
        );
        Ok(())
    }

    pub(super) fn ini_delete_section(&mut self, cmd: &Command, file: &str, section: &str) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(file)?);
        let section = self.preprocess(section)?;
        let mut doc = IniDocument::load(&path)?;
        if !doc.delete_section(&section) {
            self.emit(cmd, LogEntry::ignore(format!("Section [{}] does not exist", section)));
            return Ok(());
        }
        doc.save(&path)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Section [{}] deleted from [{}]", section, path.display())),
        );
        Ok(())
    }
}
