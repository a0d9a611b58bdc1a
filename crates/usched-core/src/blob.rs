//! Fixed-size byte blobs used by the entry layout.

use std::{borrow::Cow, fmt};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// A byte array of exactly `N` bytes.
///
/// The engine treats most of these fields as opaque state, so the client
/// only ever copies them. Text fields such as the username are NUL-padded
/// and are not NUL-terminated when they use all `N` bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBytes<const N: usize>([u8; N]);

impl<const N: usize> FixedBytes<N> {
    /// Size of the blob on the wire.
    pub const LEN: usize = N;

    /// An all-zero blob.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0; N])
    }

    /// Wrap an existing array.
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Build a blob from a shorter slice, zero-padding the rest.
    ///
    /// Returns `None` when `bytes` is longer than `N`.
    #[must_use]
    pub fn from_slice_padded(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > N {
            return None;
        }
        let mut out = [0; N];
        out[..bytes.len()].copy_from_slice(bytes);
        Some(Self(out))
    }

    /// Raw bytes, including any padding.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Bytes up to (not including) the first NUL, or all `N` bytes.
    #[must_use]
    pub fn trimmed(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..end]
    }

    /// The trimmed bytes as text, replacing invalid UTF-8.
    #[must_use]
    pub fn to_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.trimmed())
    }

    /// Whether every byte is zero.
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> From<[u8; N]> for FixedBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> AsRef<[u8]> for FixedBytes<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zeroed() {
            write!(f, "FixedBytes<{N}>(zeroed)")
        } else {
            let used = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            write!(f, "FixedBytes<{N}>({used} bytes used)")
        }
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = BASE64.decode(encoded.as_bytes()).map_err(de::Error::custom)?;
        let bytes: [u8; N] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| de::Error::invalid_length(v.len(), &"exact blob size"))?;
        Ok(Self(bytes))
    }
}

/// Serde adapter for variable-length byte buffers, encoded as base64.
pub mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize bytes as a base64 string.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    /// Deserialize bytes from a base64 string.
    ///
    /// # Errors
    /// Fails on malformed base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}
