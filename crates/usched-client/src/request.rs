//! Request encoding for the engine transport.

use std::ffi::{CStr, CString};

use usched_core::{EngineError, UsageError, Verb};

/// A request ready to be forwarded to the engine.
///
/// The grammar belongs to the engine; only the leading verb is read here,
/// to know which result channel the engine will fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    verb: Verb,
    text: CString,
}

impl Request {
    /// Encode request text.
    ///
    /// The transport carries NUL-terminated text, so anything from the first
    /// embedded NUL onwards is dropped before the verb is read.
    ///
    /// # Errors
    /// Returns a parse error for empty text or an unknown verb.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let kept = text.find('\0').map_or(text, |nul| {
            tracing::debug!(
                kept = nul,
                dropped = text.len() - nul,
                "Request truncated at embedded NUL"
            );
            &text[..nul]
        });

        let word = kept
            .split_whitespace()
            .next()
            .ok_or(EngineError::usage(UsageError::InsufficientArgs))?;

        let verb = Verb::from_word(word).ok_or_else(|| EngineError::Parse {
            usage: UsageError::InvalidOp,
            offending: Some(word.to_owned()),
        })?;

        let text = CString::new(kept).map_err(|_| EngineError::usage(UsageError::InvalidArgument))?;

        Ok(Self { verb, text })
    }

    /// The request verb.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// The NUL-terminated text handed to the engine.
    #[must_use]
    pub fn as_c_str(&self) -> &CStr {
        &self.text
    }

    /// The forwarded text, without terminator.
    #[must_use]
    pub fn text(&self) -> &str {
        // Built from a `&str` prefix, so always valid UTF-8.
        self.text.to_str().unwrap_or_default()
    }
}
