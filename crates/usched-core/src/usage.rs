//! Usage error codes reported by the engine for malformed requests.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Text returned for codes that carry no error.
pub const SUCCESS_TEXT: &str = "Success";

/// Client usage error, as numbered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum UsageError {
    InvalidOp = 1,
    InvalidPreposition = 2,
    InvalidAdverb = 3,
    InvalidConjunction = 4,
    InvalidArgument = 5,
    UnexpectedPreposition = 6,
    UnexpectedConjunction = 7,
    InsufficientArgs = 8,
    TooManyArgs = 9,
}

impl UsageError {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Look up a code; `None` for 0 and unknown values.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::InvalidOp,
            2 => Self::InvalidPreposition,
            3 => Self::InvalidAdverb,
            4 => Self::InvalidConjunction,
            5 => Self::InvalidArgument,
            6 => Self::UnexpectedPreposition,
            7 => Self::UnexpectedConjunction,
            8 => Self::InsufficientArgs,
            9 => Self::TooManyArgs,
            _ => return None,
        })
    }

    /// Stable human-readable description.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::InvalidOp => "Invalid operation",
            Self::InvalidPreposition => "Invalid preposition",
            Self::InvalidAdverb => "Invalid adverbial of time",
            Self::InvalidConjunction => "Invalid conjunction",
            Self::InvalidArgument => "Invalid argument",
            Self::UnexpectedPreposition => "Unexpected preposition",
            Self::UnexpectedConjunction => "Unexpected conjunction",
            Self::InsufficientArgs => "Insufficient arguments",
            Self::TooManyArgs => "Too many arguments",
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Map any engine usage code to its text. Unknown codes read as success.
#[must_use]
pub const fn usage_error_text(code: i32) -> &'static str {
    match UsageError::from_code(code) {
        Some(err) => err.text(),
        None => SUCCESS_TEXT,
    }
}
