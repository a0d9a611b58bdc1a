//! Schedule entry record and its wire codec.
//!
//! The layout is shared with the engine and carries no version tag, so the
//! field order and sizes below must stay exactly as they are:
//!
//! | field        | size            |
//! |--------------|-----------------|
//! | id           | 8               |
//! | flags        | 4               |
//! | uid, gid     | 4 + 4           |
//! | trigger      | 4               |
//! | step         | 4               |
//! | expire       | 4               |
//! | psize        | 4               |
//! | username     | 32              |
//! | session      | 272             |
//! | payload      | psize           |
//! | subj_size    | 4               |
//! | subj         | subj_size       |
//! | reserved     | 32              |
//! | context      | 480             |
//! | agreed_key   | 32              |
//! | nonce        | 8               |
//!
//! Integers travel in network byte order. Variable buffers are written
//! as-is, with no padding after them.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blob::{FixedBytes, base64_bytes};

/// Username field width.
pub const USERNAME_LEN: usize = 32;
/// Authentication session blob width.
pub const SESSION_LEN: usize = 272;
/// Reserved area width.
pub const RESERVED_LEN: usize = 32;
/// Key-exchange context width.
pub const CONTEXT_LEN: usize = 480;
/// Agreed key width.
pub const AGREED_KEY_LEN: usize = 32;

/// Bytes preceding the payload.
pub const HEADER_LEN: usize = 8 + 4 * 7 + USERNAME_LEN + SESSION_LEN;
/// Bytes following the subject.
pub const TRAILER_LEN: usize = RESERVED_LEN + CONTEXT_LEN + AGREED_KEY_LEN + 8;

/// Codec error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Entry truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("{field} is {len} bytes, larger than the wire format allows")]
    TooLarge { field: &'static str, len: usize },
}

/// Entry engine identifier.
pub type EntryId = u64;

/// One scheduled unit of work known to the engine.
///
/// Only the engine mutates entries; the client copies them out of result
/// buffers and never writes them back. `psize` and `subj_size` are not
/// stored: they are always the lengths of `payload` and `subj`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub id: EntryId,
    pub flags: u32,
    pub uid: u32,
    pub gid: u32,
    /// First (or only) fire time, epoch seconds.
    pub trigger: u32,
    /// Repeat interval in seconds; 0 means one-shot.
    pub step: u32,
    /// Auto-removal time, epoch seconds; 0 means never.
    pub expire: u32,
    pub username: FixedBytes<USERNAME_LEN>,
    pub session: FixedBytes<SESSION_LEN>,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub subj: Vec<u8>,
    pub reserved: FixedBytes<RESERVED_LEN>,
    pub context: FixedBytes<CONTEXT_LEN>,
    pub agreed_key: FixedBytes<AGREED_KEY_LEN>,
    pub nonce: u64,
}

impl EntryRecord {
    /// Create an empty record with the given identifier.
    #[must_use]
    pub fn new(id: EntryId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Payload length as carried on the wire.
    ///
    /// # Errors
    /// Returns error if the payload does not fit in 32 bits.
    pub fn psize(&self) -> Result<u32, CodecError> {
        wire_len("payload", &self.payload)
    }

    /// Subject length as carried on the wire.
    ///
    /// # Errors
    /// Returns error if the subject does not fit in 32 bits.
    pub fn subj_size(&self) -> Result<u32, CodecError> {
        wire_len("subj", &self.subj)
    }

    /// The command text, replacing invalid UTF-8.
    #[must_use]
    pub fn subject(&self) -> String {
        String::from_utf8_lossy(&self.subj).into_owned()
    }

    /// Whether the entry fires more than once.
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.step != 0
    }

    /// Whether the entry is past its auto-removal time at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: u32) -> bool {
        self.expire != 0 && self.expire <= now
    }

    /// Number of bytes [`Self::encode`] writes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + 4 + self.subj.len() + TRAILER_LEN
    }

    /// Write the record in wire layout.
    ///
    /// # Errors
    /// Returns error if a variable-length field exceeds 32-bit length.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), CodecError> {
        let psize = self.psize()?;
        let subj_size = self.subj_size()?;

        buf.put_u64(self.id);
        buf.put_u32(self.flags);
        buf.put_u32(self.uid);
        buf.put_u32(self.gid);
        buf.put_u32(self.trigger);
        buf.put_u32(self.step);
        buf.put_u32(self.expire);
        buf.put_u32(psize);
        buf.put_slice(self.username.as_bytes());
        buf.put_slice(self.session.as_bytes());
        buf.put_slice(&self.payload);
        buf.put_u32(subj_size);
        buf.put_slice(&self.subj);
        buf.put_slice(self.reserved.as_bytes());
        buf.put_slice(self.context.as_bytes());
        buf.put_slice(self.agreed_key.as_bytes());
        buf.put_u64(self.nonce);
        Ok(())
    }

    /// Encode into a fresh buffer.
    ///
    /// # Errors
    /// See [`Self::encode`].
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Read one record, advancing `buf` past it.
    ///
    /// # Errors
    /// Returns error if `buf` ends before the record does.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        need(buf, HEADER_LEN)?;
        let id = buf.get_u64();
        let flags = buf.get_u32();
        let uid = buf.get_u32();
        let gid = buf.get_u32();
        let trigger = buf.get_u32();
        let step = buf.get_u32();
        let expire = buf.get_u32();
        let psize = buf.get_u32() as usize;
        let username = get_fixed(buf);
        let session = get_fixed(buf);

        let payload = get_vec(buf, psize)?;

        need(buf, 4)?;
        let subj_size = buf.get_u32() as usize;
        let subj = get_vec(buf, subj_size)?;

        need(buf, TRAILER_LEN)?;
        let reserved = get_fixed(buf);
        let context = get_fixed(buf);
        let agreed_key = get_fixed(buf);
        let nonce = buf.get_u64();

        Ok(Self {
            id,
            flags,
            uid,
            gid,
            trigger,
            step,
            expire,
            username,
            session,
            payload,
            subj,
            reserved,
            context,
            agreed_key,
            nonce,
        })
    }

    /// Read `count` consecutive records.
    ///
    /// # Errors
    /// Returns error if any record is truncated.
    pub fn decode_many<B: Buf>(buf: &mut B, count: usize) -> Result<Vec<Self>, CodecError> {
        (0..count).map(|_| Self::decode(buf)).collect()
    }
}

fn wire_len(field: &'static str, bytes: &[u8]) -> Result<u32, CodecError> {
    u32::try_from(bytes.len()).map_err(|_| CodecError::TooLarge {
        field,
        len: bytes.len(),
    })
}

fn need<B: Buf>(buf: &B, needed: usize) -> Result<(), CodecError> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(CodecError::Truncated { needed, remaining });
    }
    Ok(())
}

fn get_vec<B: Buf>(buf: &mut B, len: usize) -> Result<Vec<u8>, CodecError> {
    need(buf, len)?;
    let mut out = vec![0; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

// Caller has already checked `remaining() >= N`.
fn get_fixed<B: Buf, const N: usize>(buf: &mut B) -> FixedBytes<N> {
    let mut out = [0; N];
    buf.copy_to_slice(&mut out);
    FixedBytes::new(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample() -> EntryRecord {
        EntryRecord {
            id: 0x0123_4567_89ab_cdef,
            flags: 0x8000_0001,
            uid: 1000,
            gid: 100,
            trigger: 1_700_000_010,
            step: 5,
            expire: 0,
            username: FixedBytes::from_slice_padded(b"operator").unwrap(),
            session: FixedBytes::new([0x5a; SESSION_LEN]),
            payload: vec![1, 2, 3],
            subj: b"ls -lah /".to_vec(),
            reserved: FixedBytes::new([0xee; RESERVED_LEN]),
            context: FixedBytes::new([0x11; CONTEXT_LEN]),
            agreed_key: FixedBytes::new([0x42; AGREED_KEY_LEN]),
            nonce: u64::MAX - 7,
        }
    }

    #[test]
    fn test_header_matches_layout() {
        assert_eq!(HEADER_LEN, 340);
        assert_eq!(TRAILER_LEN, 552);
        assert_eq!(HEADER_LEN % 4, 0);
    }

    #[test]
    fn test_field_offsets() {
        let entry = sample();
        let bytes = entry.to_bytes().unwrap();

        assert_eq!(&bytes[0..8], &entry.id.to_be_bytes());
        assert_eq!(&bytes[8..12], &entry.flags.to_be_bytes());
        assert_eq!(&bytes[20..24], &entry.trigger.to_be_bytes());
        assert_eq!(&bytes[32..36], &3u32.to_be_bytes());
        assert_eq!(&bytes[36..44], b"operator");
        assert!(bytes[44..68].iter().all(|&b| b == 0));
        // subj_size follows the 3-byte payload directly
        assert_eq!(&bytes[340..343], &[1, 2, 3]);
        assert_eq!(&bytes[343..347], &9u32.to_be_bytes());
        assert_eq!(&bytes[347..356], b"ls -lah /");
        assert_eq!(&bytes[356..388], &[0xee; RESERVED_LEN]);
        assert_eq!(&bytes[bytes.len() - 8..], &entry.nonce.to_be_bytes());
    }

    #[test]
    fn test_encoded_len_is_exact() {
        let entry = sample();
        let bytes = entry.to_bytes().unwrap();
        assert_eq!(bytes.len(), entry.encoded_len());
        assert_eq!(bytes.len(), HEADER_LEN + 3 + 4 + 9 + TRAILER_LEN);
        assert_eq!(bytes.len(), 908);
    }

    #[test]
    fn test_unaligned_payload_adds_no_padding() {
        let mut entry = EntryRecord::new(1);
        entry.payload = vec![1, 2, 3];

        let bytes = entry.to_bytes().unwrap();
        assert_eq!(bytes.len(), 899);
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 7], &[1, 2, 3, 0, 0, 0, 0]);
        assert!(bytes[HEADER_LEN + 7..].iter().all(|&b| b == 0));

        let mut buf = bytes;
        assert_eq!(EntryRecord::decode(&mut buf).unwrap(), entry);
    }

    #[test]
    fn test_truncated_input_rejected() {
        let bytes = sample().to_bytes().unwrap();
        let mut short = &bytes[..bytes.len() - 1];
        assert!(matches!(
            EntryRecord::decode(&mut short),
            Err(CodecError::Truncated { .. })
        ));

        let mut header_only = &bytes[..HEADER_LEN - 1];
        assert_eq!(
            EntryRecord::decode(&mut header_only),
            Err(CodecError::Truncated {
                needed: HEADER_LEN,
                remaining: HEADER_LEN - 1
            })
        );
    }

    #[test]
    fn test_psize_overrun_rejected() {
        let mut bytes = BytesMut::from(&sample().to_bytes().unwrap()[..]);
        // Claim a payload far larger than the buffer.
        bytes[32..36].copy_from_slice(&0x00ff_ffffu32.to_be_bytes());
        let mut buf = bytes.freeze();
        assert!(matches!(
            EntryRecord::decode(&mut buf),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_many_keeps_order() {
        let mut first = sample();
        first.id = 7;
        let mut second = sample();
        second.id = 3;
        second.payload.clear();

        let mut buf = BytesMut::new();
        first.encode(&mut buf).unwrap();
        second.encode(&mut buf).unwrap();

        let mut bytes = buf.freeze();
        let decoded = EntryRecord::decode_many(&mut bytes, 2).unwrap();
        assert_eq!(decoded, vec![first, second]);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_expiry() {
        let mut entry = EntryRecord::new(1);
        assert!(!entry.is_expired(u32::MAX));
        entry.expire = 100;
        assert!(!entry.is_expired(99));
        assert!(entry.is_expired(100));
    }

    #[test]
    fn test_json_roundtrip_keeps_blobs() {
        let entry = sample();
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: EntryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    fn arb_entry() -> impl Strategy<Value = EntryRecord> {
        (
            (any::<u64>(), any::<u32>(), any::<u32>(), any::<u32>()),
            (any::<u32>(), any::<u32>(), any::<u32>(), any::<u64>()),
            (
                prop::collection::vec(any::<u8>(), 0..64),
                prop::collection::vec(any::<u8>(), 0..64),
                prop::array::uniform32(any::<u8>()),
                any::<u8>(),
            ),
        )
            .prop_map(
                |((id, flags, uid, gid), (trigger, step, expire, nonce), (payload, subj, key, fill))| {
                    EntryRecord {
                        id,
                        flags,
                        uid,
                        gid,
                        trigger,
                        step,
                        expire,
                        username: FixedBytes::new(key),
                        session: FixedBytes::new([fill; SESSION_LEN]),
                        payload,
                        subj,
                        reserved: FixedBytes::new([fill.wrapping_add(1); RESERVED_LEN]),
                        context: FixedBytes::new([fill.wrapping_add(2); CONTEXT_LEN]),
                        agreed_key: FixedBytes::new(key),
                        nonce,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn wire_roundtrip_is_lossless(entry in arb_entry()) {
            let bytes = entry.to_bytes().unwrap();
            prop_assert_eq!(bytes.len(), entry.encoded_len());

            let mut buf = bytes;
            let decoded = EntryRecord::decode(&mut buf).unwrap();
            prop_assert!(buf.is_empty());
            prop_assert_eq!(decoded, entry);
        }
    }
}
