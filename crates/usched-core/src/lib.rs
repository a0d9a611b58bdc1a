//! Core types for the uSched client.
//!
//! This crate provides the fundamental building blocks:
//! - `EntryRecord` - Schedule entry and its wire codec
//! - `SessionConfig` - Endpoint and credential configuration
//! - `UsageError` - Engine usage codes and their texts
//! - The `Engine` trait and the error taxonomy

pub mod blob;
pub mod context;
pub mod entry;
pub mod traits;
pub mod usage;

pub use blob::FixedBytes;
pub use context::{ConfigField, SessionConfig};
pub use entry::{CodecError, EntryId, EntryRecord};
pub use traits::{Engine, EngineError, ProtocolError, RawResult, Verb};
pub use usage::{UsageError, usage_error_text};
