//! Line-preserving INI documents.
//!
//! Scripts and the files `Ini*` commands operate on are plain INI text.
//! [`IniDocument`] edits them in place without reformatting untouched
//! lines, so comments and ordering survive a round-trip.

use std::path::Path;

/// Returns the section name if `line` is a `[Header]`.
pub fn header_name(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.len() >= 2 && line.starts_with('[') && line.ends_with(']') {
        Some(line[1..line.len() - 1].trim())
    } else {
        None
    }
}

/// Splits `key=value`, trimming both halves.
pub fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        None
    } else {
        Some((key, value.trim()))
    }
}

/// An INI file held as its raw lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    lines: Vec<String>,
    crlf: bool,
}

impl IniDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            crlf: text.contains("\r\n"),
        }
    }

    /// Loads a file; a missing file yields an empty document.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    pub fn to_text(&self) -> String {
        let eol = if self.crlf { "\r\n" } else { "\n" };
        let mut text = self.lines.join(eol);
        if !self.lines.is_empty() {
            text.push_str(eol);
        }
        text
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Header index and the exclusive end of the section body.
    fn section_range(&self, section: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|l| header_name(l).is_some_and(|n| n.eq_ignore_ascii_case(section)))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|l| header_name(l).is_some())
            .map(|off| start + 1 + off)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }

    fn key_index(&self, section: &str, key: &str) -> Option<usize> {
        let (start, end) = self.section_range(section)?;
        (start + 1..end).find(|&i| {
            split_key_value(&self.lines[i]).is_some_and(|(k, _)| k.eq_ignore_ascii_case(key))
        })
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section_range(section).is_some()
    }

    pub fn section_names(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|l| header_name(l).map(str::to_string))
            .collect()
    }

    /// Raw body lines of a section.
    pub fn section_lines(&self, section: &str) -> Option<Vec<String>> {
        let (start, end) = self.section_range(section)?;
        Some(self.lines[start + 1..end].to_vec())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        let idx = self.key_index(section, key)?;
        split_key_value(&self.lines[idx]).map(|(_, v)| v.to_string())
    }

    /// Writes `key=value`. Returns true when an existing key was replaced.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> bool {
        let line = format!("{}={}", key, value);
        if let Some(idx) = self.key_index(section, key) {
            self.lines[idx] = line;
            return true;
        }
        match self.section_range(section) {
            Some((start, end)) => {
                let insert_at = self.last_content_line(start, end) + 1;
                self.lines.insert(insert_at, line);
            }
            None => {
                self.push_header(section);
                self.lines.push(line);
            }
        }
        false
    }

    pub fn delete_key(&mut self, section: &str, key: &str) -> bool {
        match self.key_index(section, key) {
            Some(idx) => {
                self.lines.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Creates an empty section. Returns false if it already existed.
    pub fn add_section(&mut self, section: &str) -> bool {
        if self.has_section(section) {
            return false;
        }
        self.push_header(section);
        true
    }

    pub fn delete_section(&mut self, section: &str) -> bool {
        match self.section_range(section) {
            Some((start, end)) => {
                self.lines.drain(start..end);
                true
            }
            None => false,
        }
    }

    /// Replaces a section body, creating the section if needed.
    pub fn replace_section(&mut self, section: &str, body: Vec<String>) {
        match self.section_range(section) {
            Some((start, end)) => {
                let keep_blank = end < self.lines.len();
                let mut body = body;
                if keep_blank {
                    body.push(String::new());
                }
                self.lines.splice(start + 1..end, body);
            }
            None => {
                self.push_header(section);
                self.lines.extend(body);
            }
        }
    }

    fn last_content_line(&self, start: usize, end: usize) -> usize {
        (start..end)
            .rev()
            .find(|&i| !self.lines[i].trim().is_empty())
            .unwrap_or(start)
    }

    fn push_header(&mut self, section: &str) {
        if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
            self.lines.push(String::new());
        }
        self.lines.push(format!("[{}]", section));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "; header comment\n[Main]\nTitle=Sample\nLevel = 5\n\n[Process]\nEcho,Hello\n";

    #[test]
    fn header_detection() {
        assert_eq!(header_name("[Main]"), Some("Main"));
        assert_eq!(header_name("  [ Process ] "), Some("Process"));
        assert_eq!(header_name("Main"), None);
        assert_eq!(header_name("[]"), Some(""));
    }

    #[test]
    fn reads_keys_case_insensitively() {
        let doc = IniDocument::parse(SAMPLE);
        assert_eq!(doc.get("main", "title").as_deref(), Some("Sample"));
        assert_eq!(doc.get("Main", "Level").as_deref(), Some("5"));
        assert_eq!(doc.get("Main", "Missing"), None);
        assert_eq!(doc.section_names(), vec!["Main", "Process"]);
    }

    #[test]
    fn set_replaces_or_inserts() {
        let mut doc = IniDocument::parse(SAMPLE);
        assert!(doc.set("Main", "Title", "Renamed"));
        assert!(!doc.set("Main", "Author", "me"));
        assert_eq!(
            doc.section_lines("Main").unwrap(),
            vec!["Title=Renamed", "Level = 5", "Author=me", ""]
        );
        assert!(!doc.set("New", "Key", "Value"));
        assert_eq!(doc.get("New", "Key").as_deref(), Some("Value"));
    }

    #[test]
    fn delete_key_and_section() {
        let mut doc = IniDocument::parse(SAMPLE);
        assert!(doc.delete_key("Main", "Level"));
        assert!(!doc.delete_key("Main", "Level"));
        assert!(doc.delete_section("Process"));
        assert!(!doc.has_section("Process"));
        assert!(doc.has_section("Main"));
    }

    #[test]
    fn add_section_once() {
        let mut doc = IniDocument::default();
        assert!(doc.add_section("A"));
        assert!(!doc.add_section("a"));
        assert_eq!(doc.to_text(), "[A]\n");
    }

    #[test]
    fn replace_section_body() {
        let mut doc = IniDocument::parse(SAMPLE);
        doc.replace_section("Main", vec!["Title=X".into()]);
        assert_eq!(doc.section_lines("Main").unwrap(), vec!["Title=X", ""]);
        assert_eq!(doc.section_lines("Process").unwrap(), vec!["Echo,Hello"]);
    }

    #[test]
    fn preserves_crlf() {
        let doc = IniDocument::parse("[A]\r\nk=v\r\n");
        assert_eq!(doc.to_text(), "[A]\r\nk=v\r\n");
    }
}
