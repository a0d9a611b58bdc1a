//! Engine implementations.

#[cfg(feature = "libusc")]
pub mod libusc;

#[cfg(feature = "libusc")]
pub use libusc::LibuscEngine;
