//! On-disk record format for data and checkpoint snapshots.
//!
//! A snapshot file is a sequence of self-describing `(header, body)`
//! records terminated by exactly one fixed-size terminal record.
//!
//! ## Record layout
//!
//! ```text
//! +------------------+
//! | Kind (1)         |  ItemLink = 1, CollectionElement = 2,
//! +------------------+  SnapshotDone = 255
//! | Reserved (3)     |
//! +------------------+
//! | Body length (4)  |  Little-endian u32
//! +------------------+
//! | Body (variable)  |
//! +------------------+
//! ```
//!
//! `ItemLink` body: `type(1) reserved(1) key_len(2) flags(4) expiry(8)
//! value_len(4)` followed by the key bytes then the value bytes.
//!
//! `CollectionElement` body: the raw element payload. An element record is
//! only meaningful immediately after the `ItemLink` record of a
//! collection-typed item; file order is significant.
//!
//! `SnapshotDone` body: the 8-byte magic `SNAPDONE`. Its presence at the
//! trailing offset is the sole signal that a snapshot file is complete.

use embercache_core::{Element, Expiry, Item, ItemType, UnknownItemType};
use thiserror::Error;

/// Fixed record header size.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Terminal-record magic bytes.
pub const DONE_MAGIC: &[u8; 8] = b"SNAPDONE";

/// Total size of the fixed terminal record (header + magic).
pub const TERMINAL_RECORD_SIZE: usize = RECORD_HEADER_SIZE + DONE_MAGIC.len();

/// Upper bound on a record body length, enforced on both sides: the
/// writer refuses to emit a larger body, and the replayer treats a header
/// declaring more as corruption.
pub const MAX_RECORD_BODY: usize = 8 * 1024 * 1024;

/// Fixed overhead of an `ItemLink` body before the key and value bytes.
const ITEM_LINK_FIXED: usize = 1 + 1 + 2 + 4 + 8 + 4;

/// Errors from encoding or decoding snapshot records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The byte stream ended before the declared structure did.
    #[error("record truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the structure required.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// The header names a record kind this reader does not know.
    #[error("unknown record kind: {0}")]
    UnknownKind(u8),

    /// The item-type byte does not name a known kind.
    #[error(transparent)]
    UnknownItemType(#[from] UnknownItemType),

    /// The expiry field is outside the encodable range.
    #[error("expiry value out of range: {0}")]
    BadExpiry(i64),

    /// The item key does not fit the 16-bit key-length field.
    #[error("item key of {0} bytes exceeds the record key-length field")]
    KeyTooLong(usize),

    /// The record body is larger than any reader accepts.
    #[error("record body of {0} bytes exceeds the maximum")]
    BodyTooLarge(usize),
}

/// Reject a body length the replayer would refuse to read back. Every
/// writer path checks this before emitting a record.
pub fn check_body_len(len: usize) -> Result<(), RecordError> {
    if len > MAX_RECORD_BODY {
        return Err(RecordError::BodyTooLarge(len));
    }
    Ok(())
}

/// Record kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Full item metadata and payload.
    ItemLink,
    /// One element of the most recently linked collection item.
    CollectionElement,
    /// Fixed terminal marker; no records follow.
    SnapshotDone,
}

impl RecordKind {
    /// Raw byte written to the header.
    pub fn as_u8(&self) -> u8 {
        match self {
            RecordKind::ItemLink => 1,
            RecordKind::CollectionElement => 2,
            RecordKind::SnapshotDone => 255,
        }
    }

    /// Decode the header byte.
    pub fn from_u8(raw: u8) -> Result<Self, RecordError> {
        match raw {
            1 => Ok(RecordKind::ItemLink),
            2 => Ok(RecordKind::CollectionElement),
            255 => Ok(RecordKind::SnapshotDone),
            other => Err(RecordError::UnknownKind(other)),
        }
    }
}

/// Fixed-size header preceding every record body.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    /// Record kind tag.
    pub kind: RecordKind,
    /// Declared body length in bytes.
    pub body_len: u32,
}

impl RecordHeader {
    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[0] = self.kind.as_u8();
        out[4..8].copy_from_slice(&self.body_len.to_le_bytes());
        out
    }

    /// Parse a header from exactly [`RECORD_HEADER_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8; RECORD_HEADER_SIZE]) -> Result<Self, RecordError> {
        let kind = RecordKind::from_u8(bytes[0])?;
        let body_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        Ok(RecordHeader { kind, body_len })
    }
}

/// Encode an `ItemLink` body into `body` (cleared first).
pub fn encode_item_link(item: &Item, body: &mut Vec<u8>) -> Result<(), RecordError> {
    if item.key.len() > usize::from(u16::MAX) {
        return Err(RecordError::KeyTooLong(item.key.len()));
    }
    check_body_len(ITEM_LINK_FIXED + item.key.len() + item.value.len())?;
    body.clear();
    body.push(item.item_type.as_u8());
    body.push(0); // reserved
    body.extend_from_slice(&(item.key.len() as u16).to_le_bytes());
    body.extend_from_slice(&item.flags.to_le_bytes());
    body.extend_from_slice(&item.expiry.to_raw().to_le_bytes());
    body.extend_from_slice(&(item.value.len() as u32).to_le_bytes());
    body.extend_from_slice(&item.key);
    body.extend_from_slice(&item.value);
    Ok(())
}

/// Decode an `ItemLink` body.
pub fn decode_item_link(body: &[u8]) -> Result<Item, RecordError> {
    if body.len() < ITEM_LINK_FIXED {
        return Err(RecordError::Truncated {
            expected: ITEM_LINK_FIXED,
            actual: body.len(),
        });
    }

    let item_type = ItemType::from_u8(body[0])?;
    let key_len = u16::from_le_bytes(body[2..4].try_into().unwrap()) as usize;
    let flags = u32::from_le_bytes(body[4..8].try_into().unwrap());
    let expiry_raw = i64::from_le_bytes(body[8..16].try_into().unwrap());
    let value_len = u32::from_le_bytes(body[16..20].try_into().unwrap()) as usize;

    let expected = ITEM_LINK_FIXED + key_len + value_len;
    if body.len() != expected {
        return Err(RecordError::Truncated {
            expected,
            actual: body.len(),
        });
    }

    let expiry = Expiry::from_raw(expiry_raw).ok_or(RecordError::BadExpiry(expiry_raw))?;
    let key = body[ITEM_LINK_FIXED..ITEM_LINK_FIXED + key_len].to_vec();
    let value = body[ITEM_LINK_FIXED + key_len..].to_vec();

    Ok(Item {
        key,
        item_type,
        flags,
        expiry,
        value,
    })
}

/// Decode a `CollectionElement` body.
pub fn decode_element(body: &[u8]) -> Element {
    Element {
        payload: body.to_vec(),
    }
}

/// Serialize the fixed terminal record.
pub fn terminal_record() -> [u8; TERMINAL_RECORD_SIZE] {
    let header = RecordHeader {
        kind: RecordKind::SnapshotDone,
        body_len: DONE_MAGIC.len() as u32,
    };
    let mut out = [0u8; TERMINAL_RECORD_SIZE];
    out[..RECORD_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    out[RECORD_HEADER_SIZE..].copy_from_slice(DONE_MAGIC);
    out
}

/// Check whether `bytes` is a well-formed terminal record.
pub fn is_terminal_record(bytes: &[u8]) -> bool {
    bytes.len() == TERMINAL_RECORD_SIZE && bytes == terminal_record()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(item_type: ItemType, expiry: Expiry) -> Item {
        Item {
            key: b"tenant:counter".to_vec(),
            item_type,
            flags: 0xDEAD_BEEF,
            expiry,
            value: vec![7u8; 32],
        }
    }

    #[test]
    fn test_header_roundtrip() {
        for kind in [
            RecordKind::ItemLink,
            RecordKind::CollectionElement,
            RecordKind::SnapshotDone,
        ] {
            let header = RecordHeader {
                kind,
                body_len: 12345,
            };
            let parsed = RecordHeader::from_bytes(&header.to_bytes()).unwrap();
            assert_eq!(parsed.kind, kind);
            assert_eq!(parsed.body_len, 12345);
        }
    }

    #[test]
    fn test_header_unknown_kind() {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        bytes[0] = 42;
        let err = RecordHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, RecordError::UnknownKind(42)));
    }

    #[test]
    fn test_item_link_roundtrip() {
        for (ty, expiry) in [
            (ItemType::Kv, Expiry::Never),
            (ItemType::List, Expiry::Sticky),
            (ItemType::Btree, Expiry::At(987_654)),
        ] {
            let item = sample_item(ty, expiry);
            let mut body = Vec::new();
            encode_item_link(&item, &mut body).unwrap();
            let decoded = decode_item_link(&body).unwrap();
            assert_eq!(decoded, item);
        }
    }

    #[test]
    fn test_item_link_empty_key_and_value() {
        let item = Item {
            key: Vec::new(),
            item_type: ItemType::Kv,
            flags: 0,
            expiry: Expiry::Never,
            value: Vec::new(),
        };
        let mut body = Vec::new();
        encode_item_link(&item, &mut body).unwrap();
        assert_eq!(body.len(), ITEM_LINK_FIXED);
        assert_eq!(decode_item_link(&body).unwrap(), item);
    }

    #[test]
    fn test_item_link_truncated_fixed_part() {
        let err = decode_item_link(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { .. }));
    }

    #[test]
    fn test_item_link_truncated_payload() {
        let item = sample_item(ItemType::Kv, Expiry::Never);
        let mut body = Vec::new();
        encode_item_link(&item, &mut body).unwrap();
        body.truncate(body.len() - 1);
        let err = decode_item_link(&body).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { .. }));
    }

    #[test]
    fn test_item_link_bad_expiry() {
        let item = sample_item(ItemType::Kv, Expiry::Never);
        let mut body = Vec::new();
        encode_item_link(&item, &mut body).unwrap();
        body[8..16].copy_from_slice(&(-2i64).to_le_bytes());
        let err = decode_item_link(&body).unwrap_err();
        assert!(matches!(err, RecordError::BadExpiry(-2)));
    }

    #[test]
    fn test_item_link_bad_item_type() {
        let item = sample_item(ItemType::Kv, Expiry::Never);
        let mut body = Vec::new();
        encode_item_link(&item, &mut body).unwrap();
        body[0] = 99;
        let err = decode_item_link(&body).unwrap_err();
        assert!(matches!(err, RecordError::UnknownItemType(_)));
    }

    #[test]
    fn test_item_link_body_too_large() {
        let item = Item {
            key: b"big".to_vec(),
            item_type: ItemType::Kv,
            flags: 0,
            expiry: Expiry::Never,
            value: vec![0u8; MAX_RECORD_BODY + 1],
        };
        let mut body = Vec::new();
        let err = encode_item_link(&item, &mut body).unwrap_err();
        assert!(matches!(err, RecordError::BodyTooLarge(_)));
    }

    #[test]
    fn test_body_len_bound_is_inclusive() {
        assert!(check_body_len(MAX_RECORD_BODY).is_ok());
        let err = check_body_len(MAX_RECORD_BODY + 1).unwrap_err();
        assert!(matches!(err, RecordError::BodyTooLarge(_)));
    }

    #[test]
    fn test_element_decode_copies_payload() {
        let elem = decode_element(b"elem-bytes");
        assert_eq!(elem.payload, b"elem-bytes");
    }

    #[test]
    fn test_terminal_record_shape() {
        let bytes = terminal_record();
        assert_eq!(bytes.len(), TERMINAL_RECORD_SIZE);
        assert!(is_terminal_record(&bytes));

        let header = RecordHeader::from_bytes(
            &bytes[..RECORD_HEADER_SIZE].try_into().unwrap(),
        )
        .unwrap();
        assert_eq!(header.kind, RecordKind::SnapshotDone);
        assert_eq!(header.body_len as usize, DONE_MAGIC.len());
    }

    #[test]
    fn test_terminal_record_rejects_corruption() {
        let mut bytes = terminal_record();
        bytes[TERMINAL_RECORD_SIZE - 1] ^= 0xFF;
        assert!(!is_terminal_record(&bytes));

        assert!(!is_terminal_record(b"short"));
    }
}
