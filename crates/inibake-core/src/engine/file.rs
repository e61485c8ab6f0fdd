//! File and directory commands.

use std::fs;
use std::path::{Path, PathBuf};

use crate::command::{Command, VarKey};
use crate::condition::has_wildcard;
use crate::error::ScriptError;
use crate::log::LogEntry;

use super::state::EngineState;

fn match_options() -> glob::MatchOptions {
    glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn name_pattern(name: &str) -> Result<glob::Pattern, ScriptError> {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            _ => escaped.push(c),
        }
    }
    glob::Pattern::new(&escaped).map_err(|e| ScriptError::execution(format!("Invalid wildcard [{}]: {}", name, e)))
}

/// Files under `dir` whose name matches `pattern`, paired with their path
/// relative to `dir`.
fn wildcard_files(dir: &Path, pattern: &glob::Pattern, recursive: bool) -> Result<Vec<(PathBuf, PathBuf)>, ScriptError> {
    let mut found = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(rel) = pending.pop() {
        for entry in fs::read_dir(dir.join(&rel))? {
            let entry = entry?;
            let path = entry.path();
            let rel_path = rel.join(entry.file_name());
            if path.is_dir() {
                if recursive {
                    pending.push(rel_path);
                }
            } else if pattern.matches_with(&entry.file_name().to_string_lossy(), match_options()) {
                found.push((path, rel_path));
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Splits `path` into its parent directory and last component.
fn split_wildcard(path: &Path) -> (PathBuf, String) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (parent, name)
}

fn copy_dir(src: &Path, dest: &Path) -> std::io::Result<u64> {
    fs::create_dir_all(dest)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn dir_bytes(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() { dir_bytes(&entry.path())? } else { meta.len() };
    }
    Ok(total)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

impl EngineState {
    pub(super) fn file_copy(
        &mut self,
        cmd: &Command,
        src: &str,
        dest: &str,
        preserve: bool,
        no_warn: bool,
        no_rec: bool,
    ) -> Result<(), ScriptError> {
        let src = PathBuf::from(self.preprocess(src)?);
        let dest = PathBuf::from(self.preprocess(dest)?);
        let (src_dir, name) = split_wildcard(&src);

        if has_wildcard(&name) {
            let files = wildcard_files(&src_dir, &name_pattern(&name)?, !no_rec)?;
            if files.is_empty() {
                return Err(ScriptError::execution(format!("Cannot find file [{}]", src.display())));
            }
            for (from, rel) in files {
                self.copy_one(cmd, &from, &dest.join(rel), preserve, no_warn)?;
            }
            return Ok(());
        }

        if !src.is_file() {
            return Err(ScriptError::execution(format!("File [{}] does not exist", src.display())));
        }
        let target = if dest.is_dir() { dest.join(&name) } else { dest };
        self.copy_one(cmd, &src, &target, preserve, no_warn)
    }

    fn copy_one(&mut self, cmd: &Command, from: &Path, to: &Path, preserve: bool, no_warn: bool) -> Result<(), ScriptError> {
        let exists = to.exists();
        if exists && preserve {
            let message = format!("Cannot overwrite file [{}], PRESERVE specified", to.display());
            let entry = if no_warn {
                LogEntry::ignore(message)
            } else {
                LogEntry::warning(message)
            };
            self.emit(cmd, entry);
            return Ok(());
        }
        ensure_parent(to)?;
        fs::copy(from, to)?;
        let message = format!("File [{}] copied to [{}]", from.display(), to.display());
        let entry = if exists && !no_warn {
            LogEntry::overwrite(message)
        } else {
            LogEntry::success(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn file_delete(&mut self, cmd: &Command, path: &str, no_warn: bool) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(path)?);
        let (dir, name) = split_wildcard(&path);

        let targets = if has_wildcard(&name) {
            wildcard_files(&dir, &name_pattern(&name)?, false)?
                .into_iter()
                .map(|(p, _)| p)
                .collect()
        } else if path.is_dir() {
            return Err(ScriptError::execution(format!("[{}] is a directory, not a file", path.display())));
        } else if path.is_file() {
            vec![path.clone()]
        } else {
            Vec::new()
        };

        if targets.is_empty() {
            let message = format!("File [{}] does not exist", path.display());
            let entry = if no_warn {
                LogEntry::ignore(message)
            } else {
                LogEntry::warning(message)
            };
            self.emit(cmd, entry);
            return Ok(());
        }
        for target in targets {
            fs::remove_file(&target)?;
            self.emit(cmd, LogEntry::success(format!("Deleted file [{}]", target.display())));
        }
        Ok(())
    }

    pub(super) fn file_rename(&mut self, cmd: &Command, src: &str, dest: &str) -> Result<(), ScriptError> {
        let src = PathBuf::from(self.preprocess(src)?);
        let dest = PathBuf::from(self.preprocess(dest)?);
        if !src.is_file() {
            return Err(ScriptError::execution(format!("File [{}] does not exist", src.display())));
        }
        if dest.exists() {
            return Err(ScriptError::execution(format!("[{}] already exists", dest.display())));
        }
        ensure_parent(&dest)?;
        fs::rename(&src, &dest)?;
        self.emit(
            cmd,
            LogEntry::success(format!("File [{}] renamed to [{}]", src.display(), dest.display())),
        );
        Ok(())
    }

    pub(super) fn file_create_blank(&mut self, cmd: &Command, path: &str, preserve: bool, no_warn: bool) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(path)?);
        let exists = path.exists();
        if exists && preserve {
            let message = format!("Cannot overwrite file [{}], PRESERVE specified", path.display());
            let entry = if no_warn {
                LogEntry::ignore(message)
            } else {
                LogEntry::warning(message)
            };
            self.emit(cmd, entry);
            return Ok(());
        }
        ensure_parent(&path)?;
        fs::write(&path, b"")?;
        let message = format!("Created blank file [{}]", path.display());
        let entry = if exists && !no_warn {
            LogEntry::overwrite(message)
        } else {
            LogEntry::success(message)
        };
        self.emit(cmd, entry);
        Ok(())
    }

    pub(super) fn file_size(&mut self, cmd: &Command, path: &str, dest: &VarKey) -> Result<(), ScriptError> {
        let path = PathBuf::from(self.preprocess(path)?);
        if !path.is_file() {
            return Err(ScriptError::execution(format!("File [{}] does not exist", path.display())));
        }
        let size = fs::metadata(&path)?.len();
        self.assign(cmd, dest, &size.to_string())
    }

    /// Copies `src` into the directory `dest`.
    pub(super) fn dir_copy(&mut self, cmd: &Command, src: &str, dest: &str) -> Result<(), ScriptError> {
        let src = PathBuf::from(self.preprocess(src)?);
        let dest = PathBuf::from(self.preprocess(dest)?);
        if !src.is_dir() {
            return Err(ScriptError::execution(format!("Directory [{}] does not exist", src.display())));
        }
        if dest.is_file() {
            return Err(ScriptError::execution(format!("[{}] is a file, not a directory", dest.display())));
        }
        let name = src
            .file_name()
            .ok_or_else(|| ScriptError::execution(format!("[{}] has no directory name", src.display())))?;
        let target = dest.join(name);
        let copied = copy_dir(&src, &target)?;
        self.emit(
            cmd,
            LogEntry::success(format!(
                "Directory [{}] copied to [{}] ({} files)",
                src.display(),
                target.display(),
                copied
            )),
        );
        Ok(())
    }

    pub(super) fn dir_delete(&mut self, cmd: &Command, dir: &str) -> Result<(), ScriptError> {
        let dir = PathBuf::from(self.preprocess(dir)?);
        if dir.is_file() {
            return Err(ScriptError::execution(format!("[{}] is a file, not a directory", dir.display())));
        }
        if !dir.exists() {
            self.emit(cmd, LogEntry::warning(format!("Directory [{}] does not exist", dir.display())));
            return Ok(());
        }
        fs::remove_dir_all(&dir)?;
        self.emit(cmd, LogEntry::success(format!("Deleted directory [{}]", dir.display())));
        Ok(())
    }

    /// Moves `src` to `dest`, or into `dest` when it is an existing directory.
    pub(super) fn dir_move(&mut self, cmd: &Command, src: &str, dest: &str) -> Result<(), ScriptError> {
        let src = PathBuf::from(self.preprocess(src)?);
        let dest = PathBuf::from(self.preprocess(dest)?);
        if !src.is_dir() {
            return Err(ScriptError::execution(format!("Directory [{}] does not exist", src.display())));
        }
        let target = match src.file_name() {
            Some(name) if dest.is_dir() => dest.join(name),
            _ => dest,
        };
        if target.exists() {
            return Err(ScriptError::execution(format!("[{}] already exists", target.display())));
        }
        ensure_parent(&target)?;
        fs::rename(&src, &target)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Directory [{}] moved to [{}]", src.display(), target.display())),
        );
        Ok(())
    }

    pub(super) fn dir_make(&mut self, cmd: &Command, dir: &str) -> Result<(), ScriptError> {
        let dir = PathBuf::from(self.preprocess(dir)?);
        if dir.is_file() {
            return Err(ScriptError::execution(format!("[{}] is a file, not a directory", dir.display())));
        }
        if dir.is_dir() {
            self.emit(cmd, LogEntry::ignore(format!("Directory [{}] already exists", dir.display())));
            return Ok(());
        }
        fs::create_dir_all(&dir)?;
        self.emit(cmd, LogEntry::success(format!("Created directory [{}]", dir.display())));
        Ok(())
    }

    pub(super) fn dir_size(&mut self, cmd: &Command, dir: &str, dest: &VarKey) -> Result<(), ScriptError> {
        let dir = PathBuf::from(self.preprocess(dir)?);
        if !dir.is_dir() {
            return Err(ScriptError::execution(format!("Directory [{}] does not exist", dir.display())));
        }
        let size = dir_bytes(&dir)?;
        self.assign(cmd, dest, &size.to_string())
    }
}
