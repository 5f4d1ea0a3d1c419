use tracing::debug;

use crate::block::{BlockKey, DataBlock};
use crate::config::IndexFileStrategy;
use crate::encoder::{BlockVolumeEncoder, EncoderFactory, IndexVolumeEncoder, VolumeDigest};
use crate::error::Result;
use crate::store::{MetadataStore, VolumeId, VolumeKind, VolumeState};

/// A size-bounded container accumulating block payloads for one remote
/// upload. Registered with the metadata store as Temporary at open time.
pub struct BlockVolume {
    id: VolumeId,
    encoder: Box<dyn BlockVolumeEncoder>,
    size: u64,
    entries: Vec<(BlockKey, u32)>,
    digest: Option<VolumeDigest>,
}

impl BlockVolume {
    fn open(factory: &dyn EncoderFactory, store: &dyn MetadataStore) -> Result<Self> {
        let encoder = factory.block_volume()?;
        let id = store.register_volume(
            encoder.remote_filename(),
            VolumeKind::Blocks,
            VolumeState::Temporary,
        )?;
        debug!(id = %id, filename = encoder.remote_filename(), "opened block volume");
        Ok(BlockVolume {
            id,
            encoder,
            size: 0,
            entries: Vec::new(),
            digest: None,
        })
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn remote_filename(&self) -> &str {
        self.encoder.remote_filename()
    }

    /// Running total of payload bytes appended so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// (hash, size) pairs in append order.
    pub fn entries(&self) -> &[(BlockKey, u32)] {
        &self.entries
    }

    /// Set once the volume is closed.
    pub fn digest(&self) -> Option<&VolumeDigest> {
        self.digest.as_ref()
    }

    pub(crate) fn append(&mut self, block: &DataBlock) -> Result<()> {
        self.encoder.append_block(
            &block.key,
            &block.payload,
            block.offset,
            block.size,
            block.hint,
        )?;
        self.size += block.size as u64;
        self.entries.push((block.key, block.size));
        Ok(())
    }

    /// Finalize the local bytes. Idempotent — a second call returns the
    /// digest captured by the first.
    pub(crate) fn close(&mut self) -> Result<VolumeDigest> {
        if let Some(digest) = &self.digest {
            return Ok(digest.clone());
        }
        let digest = self.encoder.close()?;
        debug!(
            id = %self.id,
            filename = self.encoder.remote_filename(),
            bytes = digest.length,
            blocks = self.entries.len(),
            "closed block volume"
        );
        self.digest = Some(digest.clone());
        Ok(digest)
    }
}

/// Metadata-only companion of one block volume, paired for its entire
/// lifetime.
pub struct IndexVolume {
    id: VolumeId,
    encoder: Box<dyn IndexVolumeEncoder>,
    digest: Option<VolumeDigest>,
}

impl IndexVolume {
    fn open(factory: &dyn EncoderFactory, store: &dyn MetadataStore) -> Result<Self> {
        let encoder = factory.index_volume()?;
        let id = store.register_volume(
            encoder.remote_filename(),
            VolumeKind::Index,
            VolumeState::Temporary,
        )?;
        debug!(id = %id, filename = encoder.remote_filename(), "opened index volume");
        Ok(IndexVolume {
            id,
            encoder,
            digest: None,
        })
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn remote_filename(&self) -> &str {
        self.encoder.remote_filename()
    }

    pub fn digest(&self) -> Option<&VolumeDigest> {
        self.digest.as_ref()
    }

    pub(crate) fn start_subject(&mut self, block_volume_filename: &str) -> Result<()> {
        self.encoder.start_subject(block_volume_filename)
    }

    pub(crate) fn add_block_entry(&mut self, key: &BlockKey, size: u32) -> Result<()> {
        self.encoder.add_block_entry(key, size)
    }

    pub(crate) fn add_blocklist(&mut self, key: &BlockKey, payload: &[u8]) -> Result<()> {
        self.encoder.add_blocklist(key, payload)
    }

    pub(crate) fn close(&mut self, subject_hash: &str, subject_length: u64) -> Result<VolumeDigest> {
        if let Some(digest) = &self.digest {
            return Ok(digest.clone());
        }
        let digest = self.encoder.close(subject_hash, subject_length)?;
        self.digest = Some(digest.clone());
        Ok(digest)
    }
}

/// The at-most-one in-flight volume pair. The index half exists exactly when
/// index generation is enabled for the run — both halves are created
/// together and released together, so a blocklist write can never find the
/// index missing.
pub(crate) struct VolumePair {
    pub(crate) blocks: BlockVolume,
    pub(crate) index: Option<IndexVolume>,
}

impl VolumePair {
    pub(crate) fn open(
        factory: &dyn EncoderFactory,
        store: &dyn MetadataStore,
        strategy: IndexFileStrategy,
    ) -> Result<Self> {
        let blocks = BlockVolume::open(factory, store)?;
        let index = if strategy.enabled() {
            Some(IndexVolume::open(factory, store)?)
        } else {
            None
        };
        Ok(VolumePair { blocks, index })
    }
}
