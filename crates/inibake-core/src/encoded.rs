//! Encoded attachment sections.
//!
//! Files attached to a script live in INI sections as text lines. The
//! engine only depends on [`SectionCodec`]; [`Base64Codec`] is the bundled
//! implementation and writes:
//!
//! ```text
//! lineCount=2
//! 0=SGVsbG8s
//! 1=IHdvcmxk
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

use crate::ini::split_key_value;

/// Section listing the attachment folders of a script.
pub const FOLDERS_SECTION: &str = "EncodedFolders";

/// Name of the section holding one encoded file.
pub fn file_section(folder: &str, name: &str) -> String {
    format!("EncodedFile-{}-{}", folder, name)
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoded section has no lineCount")]
    MissingLineCount,

    #[error("Encoded section is missing line {0}")]
    MissingLine(usize),

    #[error("Invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Converts raw bytes to and from section body lines.
pub trait SectionCodec: Send + Sync {
    fn encode(&self, data: &[u8]) -> Vec<String>;
    fn decode(&self, lines: &[String]) -> Result<Vec<u8>, CodecError>;
}

/// Standard base64 split into fixed-width numbered lines.
#[derive(Debug, Clone)]
pub struct Base64Codec {
    pub line_width: usize,
}

impl Default for Base64Codec {
    fn default() -> Self {
        Self { line_width: 4090 }
    }
}

impl SectionCodec for Base64Codec {
    fn encode(&self, data: &[u8]) -> Vec<String> {
        let encoded = STANDARD.encode(data);
        let width = self.line_width.max(4);
        let chunks: Vec<&str> = encoded
            .as_bytes()
            .chunks(width)
            // base64 output is ASCII
            .map(|c| std::str::from_utf8(c).unwrap_or_default())
            .collect();

        let mut lines = Vec::with_capacity(chunks.len() + 1);
        lines.push(format!("lineCount={}", chunks.len()));
        lines.extend(chunks.iter().enumerate().map(|(i, c)| format!("{}={}", i, c)));
        lines
    }

    fn decode(&self, lines: &[String]) -> Result<Vec<u8>, CodecError> {
        let pairs: Vec<(&str, &str)> = lines.iter().filter_map(|l| split_key_value(l)).collect();
        let count: usize = pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("lineCount"))
            .and_then(|(_, v)| v.parse().ok())
            .ok_or(CodecError::MissingLineCount)?;

        let mut encoded = String::new();
        for i in 0..count {
            let key = i.to_string();
            let (_, chunk) = pairs
                .iter()
                .find(|(k, _)| *k == key)
                .ok_or(CodecError::MissingLine(i))?;
            encoded.push_str(chunk);
        }
        Ok(STANDARD.decode(encoded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_numbered_lines() {
        let codec = Base64Codec { line_width: 8 };
        let lines = codec.encode(b"Hello, world");
        assert_eq!(lines, vec!["lineCount=2", "0=SGVsbG8s", "1=IHdvcmxk"]);
        assert_eq!(codec.decode(&lines).unwrap(), b"Hello, world");
    }

    #[test]
    fn empty_payload() {
        let codec = Base64Codec::default();
        let lines = codec.encode(b"");
        assert_eq!(lines, vec!["lineCount=0"]);
        assert!(codec.decode(&lines).unwrap().is_empty());
    }

    #[test]
    fn missing_line_is_reported() {
        let codec = Base64Codec::default();
        let lines = vec!["lineCount=2".to_string(), "0=SGVs".to_string()];
        assert!(matches!(codec.decode(&lines), Err(CodecError::MissingLine(1))));
        assert!(matches!(codec.decode(&[]), Err(CodecError::MissingLineCount)));
    }

    #[test]
    fn corrupt_data_is_reported() {
        let codec = Base64Codec::default();
        let lines = vec!["lineCount=1".to_string(), "0=@@@".to_string()];
        assert!(matches!(codec.decode(&lines), Err(CodecError::Base64(_))));
    }

    #[test]
    fn section_naming() {
        assert_eq!(file_section("Folder", "a.txt"), "EncodedFile-Folder-a.txt");
    }
}
