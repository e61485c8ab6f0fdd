//! Encode and ExtractFile: files attached to scripts.

use std::fs;
use std::path::PathBuf;

use crate::command::Command;
use crate::encoded::{file_section, FOLDERS_SECTION};
use crate::error::ScriptError;
use crate::ini::IniDocument;
use crate::log::LogEntry;

use super::state::EngineState;

impl EngineState {
    /// Attaches `file` to `folder` of a script, rewriting the script on disk.
    pub(super) fn encode(&mut self, cmd: &Command, script: &str, folder: &str, file: &str) -> Result<(), ScriptError> {
        let script_name = self.preprocess(script)?;
        let folder = self.preprocess(folder)?;
        let src = PathBuf::from(self.preprocess(file)?);
        let target = self.resolve_script(&script_name)?;

        if !src.is_file() {
            return Err(ScriptError::execution(format!("File [{}] does not exist", src.display())));
        }
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ScriptError::execution(format!("[{}] has no file name", src.display())))?;
        let data = fs::read(&src)?;
        let body = self.codec.encode(&data);
        let encoded_len: usize = body.iter().skip(1).filter_map(|l| l.split_once('=')).map(|(_, v)| v.len()).sum();

        let path = target.path().to_path_buf();
        let mut doc = IniDocument::load(&path)?;
        let mut folders = doc.section_lines(FOLDERS_SECTION).unwrap_or_default();
        folders.retain(|l| !l.trim().is_empty());
        if !folders.iter().any(|l| l.trim().eq_ignore_ascii_case(&folder)) {
            folders.push(folder.clone());
            doc.replace_section(FOLDERS_SECTION, folders);
        }
        doc.set(&folder, &name, &format!("{},{}", data.len(), encoded_len));
        doc.replace_section(&file_section(&folder, &name), body);
        doc.save(&path)?;
        self.reload_script(&path)?;

        self.emit(
            cmd,
            LogEntry::success(format!(
                "Encoded [{}] into folder [{}] of [{}] ({} bytes)",
                name,
                folder,
                target.title(),
                data.len()
            )),
        );
        Ok(())
    }

    pub(super) fn extract_file(
        &mut self,
        cmd: &Command,
        script: &str,
        folder: &str,
        name: &str,
        dest_dir: &str,
    ) -> Result<(), ScriptError> {
        let script_name = self.preprocess(script)?;
        let folder = self.preprocess(folder)?;
        let name = self.preprocess(name)?;
        let dest_dir = PathBuf::from(self.preprocess(dest_dir)?);
        let target = self.resolve_script(&script_name)?;

        let section = target.section(&file_section(&folder, &name)).ok_or_else(|| {
            ScriptError::execution(format!(
                "Encoded file [{}] does not exist in folder [{}] of [{}]",
                name,
                folder,
                target.title()
            ))
        })?;
        let data = self.codec.decode(&section.lines)?;
        if dest_dir.is_file() {
            return Err(ScriptError::execution(format!("[{}] is a file, not a directory", dest_dir.display())));
        }
        fs::create_dir_all(&dest_dir)?;
        let dest = dest_dir.join(&name);
        fs::write(&dest, &data)?;
        self.emit(
            cmd,
            LogEntry::success(format!("Extracted [{}] to [{}] ({} bytes)", name, dest.display(), data.len())),
        );
        Ok(())
    }
}
