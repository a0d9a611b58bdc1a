//! Client-side control protocol for the uSched scheduling engine.
//!
//! Provides:
//! - `Session` - Owned engine session with explicit locking
//! - `Request` - Request encoding and verb classification
//! - `ResultChannel` - Get/free protocol over engine-owned buffers
//! - Engine implementations (feature: libusc)

pub mod channel;
pub mod engine;
pub mod error;
pub mod request;
pub mod result;
pub mod session;

pub use channel::{ChannelKind, Channels, ResultChannel, Run, Show, Stop};
pub use error::ClientError;
pub use request::Request;
pub use result::ResultSet;
pub use session::{Session, SessionGuard};
pub use usched_core::{EntryId, EntryRecord, SessionConfig, UsageError, Verb, usage_error_text};
