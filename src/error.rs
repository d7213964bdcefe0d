//! Error types
//!
//! Diff and merge never fail: malformed payloads degrade to empty
//! collections. Errors only surface from the codec, the pack, and
//! structural edits of the revision tree.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;
use uuid::Uuid;

/// Binary codec failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of data at byte {0}")]
    Truncated(usize),
    #[error("varint overflow at byte {0}")]
    VarintOverflow(usize),
    #[error("unknown value tag 0x{0:02x}")]
    UnknownValueTag(u8),
    #[error("invalid utf-8 in string at byte {0}")]
    InvalidUtf8(usize),
    #[error("{0} trailing bytes after node")]
    TrailingBytes(usize),
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum VcsError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no payload in pack for item {item} delta {delta}")]
    MissingPayload { item: Uuid, delta: Uuid },
    #[error("revision {0} not found")]
    RevisionNotFound(Uuid),
    #[error("revision {0} is already in the tree")]
    DuplicateRevision(Uuid),
    #[error("expected a `{expected}` node, found `{found}`")]
    UnexpectedNode { expected: &'static str, found: String },
    #[cfg(feature = "json")]
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, VcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_converts() {
        let err: VcsError = CodecError::Truncated(4).into();
        assert!(matches!(err, VcsError::Codec(CodecError::Truncated(4))));
        assert_eq!(err.to_string(), "unexpected end of data at byte 4");
    }

    #[test]
    fn test_missing_payload_message_names_ids() {
        let item = Uuid::from_u128(1);
        let delta = Uuid::from_u128(2);
        let msg = VcsError::MissingPayload { item, delta }.to_string();
        assert!(msg.contains(&item.to_string()));
        assert!(msg.contains(&delta.to_string()));
    }
}
