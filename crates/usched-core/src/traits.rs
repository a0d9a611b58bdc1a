//! The engine seam and its error types.

use std::{ffi::CStr, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntryId, EntryRecord, SessionConfig, UsageError};

/// Status reported for failures that carry no engine-specific code.
pub const STATUS_FAILURE: i32 = -1;
/// Status reported for result-channel misuse.
pub const STATUS_PROTOCOL: i32 = -2;

/// Request verb; selects which result channel a request fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// Install new entries; yields their IDs.
    Run,
    /// Remove entries; yields the IDs the engine tried to stop.
    Stop,
    /// List entries; yields full records.
    Show,
}

impl Verb {
    /// Match a request word, ignoring ASCII case.
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        [Self::Run, Self::Stop, Self::Show]
            .into_iter()
            .find(|verb| word.eq_ignore_ascii_case(verb.as_str()))
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Show => "show",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed view of an engine-owned result buffer.
///
/// The borrow is tied to the engine, so nothing obtained from it can be
/// used after the buffer is freed.
#[derive(Debug, Clone, Copy)]
pub enum RawResult<'a> {
    /// No buffer is populated.
    Empty,
    /// Entry identifiers (run and stop requests).
    Ids(&'a [EntryId]),
    /// Decoded entries (show requests).
    Records(&'a [EntryRecord]),
    /// `count` entries back to back in wire layout (show requests).
    Encoded { bytes: &'a [u8], count: usize },
}

/// Engine error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Invalid endpoint or credentials.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The request text was rejected.
    #[error("{usage}{}", .offending.as_ref().map(|o| format!(": {o}")).unwrap_or_default())]
    Parse {
        usage: UsageError,
        offending: Option<String>,
    },
    /// The engine could not be reached or timed out.
    #[error("Transport error ({code}): {message}")]
    Transport { code: i32, message: String },
}

impl EngineError {
    /// Parse error without an offending token.
    #[must_use]
    pub const fn usage(usage: UsageError) -> Self {
        Self::Parse {
            usage,
            offending: None,
        }
    }

    /// Numeric status for this failure; never 0.
    #[must_use]
    pub const fn status(&self) -> i32 {
        match self {
            Self::Config(_) => STATUS_FAILURE,
            Self::Parse { usage, .. } => usage.code(),
            Self::Transport { code, .. } if *code != 0 => *code,
            Self::Transport { .. } => STATUS_FAILURE,
        }
    }
}

/// Result-channel misuse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{0} result fetched twice without an intervening free")]
    DoubleGet(Verb),
    #[error("{0} result still holds an unfreed buffer")]
    PendingResult(Verb),
    #[error("{0} result buffer has the wrong shape")]
    UnexpectedShape(Verb),
    #[error("Session lock poisoned")]
    Poisoned,
}

/// A scheduling engine, seen from the client.
///
/// Implementations own the result buffers. A buffer filled by
/// [`Engine::request`] stays valid until [`Engine::free_result`] for the
/// same verb, and the engine may keep a single slot for all verbs.
pub trait Engine: Send {
    /// Allocate engine-client state. Called once, before anything else.
    ///
    /// # Errors
    /// Returns error if the engine cannot be initialized.
    fn init(&mut self) -> Result<(), EngineError>;

    /// Apply endpoint and credentials for the next request.
    ///
    /// # Errors
    /// Returns error if the engine rejects a value.
    fn configure(&mut self, config: &SessionConfig) -> Result<(), EngineError>;

    /// Forward one request and populate the matching result buffer.
    ///
    /// # Errors
    /// Returns the engine's failure.
    fn request(&mut self, request: &CStr) -> Result<(), EngineError>;

    /// Borrow the buffer produced for `verb`.
    fn result(&mut self, verb: Verb) -> RawResult<'_>;

    /// Release the buffer produced for `verb`. Must tolerate an empty slot.
    fn free_result(&mut self, verb: Verb);

    /// Last usage error code, 0 if none.
    fn usage_error(&self) -> i32;

    /// Release engine-client state. Called once, last.
    fn destroy(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_ignores_case() {
        assert_eq!(Verb::from_word("RUN"), Some(Verb::Run));
        assert_eq!(Verb::from_word("Show"), Some(Verb::Show));
        assert_eq!(Verb::from_word("hold"), None);
    }

    #[test]
    fn test_status_is_never_zero() {
        let errors = [
            EngineError::Config("bad port".into()),
            EngineError::usage(UsageError::TooManyArgs),
            EngineError::Transport {
                code: 0,
                message: "timeout".into(),
            },
            EngineError::Transport {
                code: 111,
                message: "refused".into(),
            },
        ];
        let statuses: Vec<i32> = errors.iter().map(EngineError::status).collect();
        assert_eq!(statuses, vec![STATUS_FAILURE, 9, STATUS_FAILURE, 111]);
    }

    #[test]
    fn test_parse_error_display() {
        let err = EngineError::Parse {
            usage: UsageError::InvalidOp,
            offending: Some("hold".into()),
        };
        assert_eq!(err.to_string(), "Invalid operation: hold");
        assert_eq!(
            EngineError::usage(UsageError::InsufficientArgs).to_string(),
            "Insufficient arguments"
        );
    }
}
