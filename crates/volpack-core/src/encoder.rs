//! Seams to the external volume file format. The packer never sees bytes on
//! disk — it drives these traits and ships the finished encoders downstream
//! inside an [`crate::packer::UploadRequest`]. Dropping an encoder disposes
//! any local staging it holds.

use crate::block::{BlockKey, CompressionHint};
use crate::error::Result;

/// Content hash and final length of a closed volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDigest {
    /// Hex-encoded hash of the finished volume file.
    pub hash: String,
    pub length: u64,
}

/// Writer for one block volume file.
pub trait BlockVolumeEncoder: Send {
    /// The filename this volume will have remotely.
    fn remote_filename(&self) -> &str;

    /// Append one block's payload at the given offset.
    fn append_block(
        &mut self,
        key: &BlockKey,
        payload: &[u8],
        offset: u64,
        size: u32,
        hint: CompressionHint,
    ) -> Result<()>;

    /// Finalize the local bytes. No appends after this.
    fn close(&mut self) -> Result<VolumeDigest>;
}

/// Writer for the metadata-only companion of one block volume.
pub trait IndexVolumeEncoder: Send {
    fn remote_filename(&self) -> &str;

    /// Declare which block volume the following entries describe.
    fn start_subject(&mut self, block_volume_filename: &str) -> Result<()>;

    /// Record that a block lives in the subject volume.
    fn add_block_entry(&mut self, key: &BlockKey, size: u32) -> Result<()>;

    /// Write a blocklist payload into the blocklist section.
    fn add_blocklist(&mut self, key: &BlockKey, payload: &[u8]) -> Result<()>;

    /// Finalize with the subject block volume's content hash and length.
    fn close(&mut self, subject_hash: &str, subject_length: u64) -> Result<VolumeDigest>;
}

/// Constructs encoders for new volumes, including their remote filenames.
pub trait EncoderFactory: Send + Sync {
    fn block_volume(&self) -> Result<Box<dyn BlockVolumeEncoder>>;
    fn index_volume(&self) -> Result<Box<dyn IndexVolumeEncoder>>;
}
