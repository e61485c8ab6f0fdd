//! Error types shared by the front end and the interpreter.
//!
//! Every failure inside the engine is a [`ScriptError`]. The variant decides
//! how the engine reacts: grammar errors abort compilation of a section,
//! critical errors halt the whole build, everything else is logged against the
//! failing command and execution moves on to the next one.

use thiserror::Error;

use crate::encoded::CodecError;
use crate::log::LogState;
use crate::registry::RegistryError;

/// Errors raised while parsing, compiling, or executing scripts.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Malformed source: bad operands, unmatched blocks, dangling continuation.
    #[error("{message}")]
    Grammar {
        /// Human-readable description.
        message: String,
        /// The offending raw line, when known.
        raw: Option<String>,
    },

    /// A variable references itself, or expansion never settles.
    #[error("Circular reference: {0}")]
    CircularReference(String),

    /// A Fixed variable was targeted by a write.
    #[error("Fixed variable [%{0}%] cannot be overridden")]
    FixedVariable(String),

    /// A runtime precondition of a single command failed.
    #[error("{0}")]
    Execution(String),

    /// Unrecoverable failure; the build stops.
    #[error("{0}")]
    Critical(String),

    /// Registry backend failure.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Encoded attachment failure.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScriptError {
    pub fn grammar(message: impl Into<String>) -> Self {
        ScriptError::Grammar { message: message.into(), raw: None }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        ScriptError::Execution(message.into())
    }

    pub fn critical(message: impl Into<String>) -> Self {
        ScriptError::Critical(message.into())
    }

    /// Attaches the raw source line to a grammar error. Other variants pass through.
    pub fn with_raw(self, line: impl Into<String>) -> Self {
        match self {
            ScriptError::Grammar { message, raw: None } => ScriptError::Grammar {
                message,
                raw: Some(line.into()),
            },
            other => other,
        }
    }

    pub fn is_grammar(&self) -> bool {
        matches!(self, ScriptError::Grammar { .. })
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, ScriptError::Critical(_))
    }

    /// Severity used when this error is written to the build log.
    pub fn severity(&self) -> LogState {
        match self {
            ScriptError::Critical(_) => LogState::CriticalError,
            ScriptError::FixedVariable(_) => LogState::Warning,
            _ => LogState::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_raw_only_fills_grammar_errors() {
        let err = ScriptError::grammar("bad").with_raw("Echo,\"x");
        match err {
            ScriptError::Grammar { raw, .. } => assert_eq!(raw.as_deref(), Some("Echo,\"x")),
            other => panic!("unexpected {other:?}"),
        }

        let err = ScriptError::execution("missing").with_raw("ignored");
        assert!(matches!(err, ScriptError::Execution(_)));
    }

    #[test]
    fn with_raw_keeps_first_line() {
        let err = ScriptError::grammar("bad").with_raw("first").with_raw("second");
        match err {
            ScriptError::Grammar { raw, .. } => assert_eq!(raw.as_deref(), Some("first")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(ScriptError::critical("x").severity(), LogState::CriticalError);
        assert_eq!(ScriptError::FixedVariable("BaseDir".into()).severity(), LogState::Warning);
        assert_eq!(ScriptError::execution("x").severity(), LogState::Error);
        assert_eq!(ScriptError::grammar("x").severity(), LogState::Error);
        assert_eq!(ScriptError::CircularReference("x".into()).severity(), LogState::Error);
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ScriptError::FixedVariable("BaseDir".into()).to_string(),
            "Fixed variable [%BaseDir%] cannot be overridden"
        );
        assert_eq!(ScriptError::grammar("Syntax error").to_string(), "Syntax error");
    }
}
