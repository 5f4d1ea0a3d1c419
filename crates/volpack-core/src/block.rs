use std::fmt;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

type Blake2b256 = Blake2b<U32>;

/// A 32-byte block identifier computed as BLAKE2b-256 of the payload.
/// The unique identity of a block's content across the whole repository.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey(pub [u8; 32]);

impl BlockKey {
    /// Compute a block key from raw payload bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockKey(out)
    }

    /// Hex-encode the full key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Hint passed through to the volume encoder about how well a block's
/// payload is expected to compress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionHint {
    #[default]
    Auto,
    Compressible,
    Incompressible,
}

/// One content-addressed unit of deduplicated payload, as produced by the
/// upstream chunker. Immutable once produced.
#[derive(Debug, Clone)]
pub struct DataBlock {
    pub key: BlockKey,
    pub payload: Vec<u8>,
    /// Payload length in bytes.
    pub size: u32,
    /// Position the payload should occupy within its destination volume.
    pub offset: u64,
    pub hint: CompressionHint,
    /// True when the payload is itself a list of block hashes (metadata
    /// about other blocks) rather than raw file content.
    pub is_blocklist: bool,
}

impl DataBlock {
    /// Build a block from payload bytes, computing its key and size.
    pub fn from_payload(payload: Vec<u8>, offset: u64) -> Self {
        DataBlock {
            key: BlockKey::compute(&payload),
            size: payload.len() as u32,
            payload,
            offset,
            hint: CompressionHint::Auto,
            is_blocklist: false,
        }
    }
}
