//! Client error.

use usched_core::{CodecError, EngineError, ProtocolError, traits::STATUS_PROTOCOL};

/// Any failure surfaced by a session operation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Result decode failed: {0}")]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// Numeric status, as the engine's C interface would report it. Never 0.
    #[must_use]
    pub const fn status(&self) -> i32 {
        match self {
            Self::Engine(err) => err.status(),
            Self::Protocol(_) | Self::Codec(_) => STATUS_PROTOCOL,
        }
    }

    /// Whether this is result-channel misuse by the caller.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use usched_core::{UsageError, Verb};

    use super::*;

    #[test]
    fn test_status_follows_source() {
        let parse: ClientError = EngineError::usage(UsageError::InvalidAdverb).into();
        assert_eq!(parse.status(), 3);

        let misuse: ClientError = ProtocolError::DoubleGet(Verb::Run).into();
        assert_eq!(misuse.status(), STATUS_PROTOCOL);
        assert!(misuse.is_protocol());
    }
}
