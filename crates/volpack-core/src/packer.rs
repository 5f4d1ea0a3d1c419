use std::sync::Arc;

use crossbeam_channel::{Receiver, SendError, Sender};
use tracing::{debug, info};

use crate::block::DataBlock;
use crate::config::{IndexFileStrategy, PackingConfig};
use crate::encoder::{EncoderFactory, VolumeDigest};
use crate::error::{Result, VolpackError};
use crate::store::{MetadataStore, SharedStore, VolumeState};
use crate::volume::{BlockVolume, IndexVolume, VolumePair};

/// One finalized block volume and its optional index companion, handed
/// downstream exactly once. Ownership of both volumes moves with it.
pub struct UploadRequest {
    pub block_volume: BlockVolume,
    pub index_volume: Option<IndexVolume>,
}

/// Packs the incoming block stream into size-bounded volumes and hands
/// finished volumes to the upload stage.
///
/// Strictly sequential: one block at a time, at most one open volume pair.
/// Suspension happens in exactly two places — receiving the next block and
/// sending on the dispatch/spill channels — so backpressure from the upload
/// stage stalls input consumption with no extra buffering.
pub struct VolumePacker {
    config: PackingConfig,
    store: SharedStore,
    factory: Arc<dyn EncoderFactory>,
    dispatch: Sender<UploadRequest>,
    spill: Sender<UploadRequest>,
    current: Option<VolumePair>,
    /// A committed request whose dispatch send failed (receiver retired).
    /// Preserved so drain can spill it instead of dropping it.
    parked: Option<UploadRequest>,
}

impl VolumePacker {
    pub fn new(
        config: PackingConfig,
        store: SharedStore,
        factory: Arc<dyn EncoderFactory>,
        dispatch: Sender<UploadRequest>,
        spill: Sender<UploadRequest>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(VolumePacker {
            config,
            store,
            factory,
            dispatch,
            spill,
            current: None,
            parked: None,
        })
    }

    /// Consume blocks until the input retires, then drain.
    ///
    /// Retirement (input disconnected, or an output receiver gone) spills
    /// any pending pair and returns [`VolpackError::Retired`] so the caller
    /// observes shutdown too. Any other error propagates as-is — a true
    /// fault does not spill.
    pub fn run(mut self, input: &Receiver<DataBlock>) -> Result<()> {
        loop {
            let block = match input.recv() {
                Ok(block) => block,
                Err(_) => return self.drain(),
            };
            match self.process_block(block) {
                Ok(()) => {}
                Err(e) if e.is_retired() => return self.drain(),
                Err(e) => return Err(e),
            }
        }
    }

    /// Handle one incoming block: dedup gate, lazy open, append, threshold.
    fn process_block(&mut self, block: DataBlock) -> Result<()> {
        // The single authoritative dedup checkpoint. Newness is decided
        // independent of any volume; attribution happens after lazy open.
        let is_new = self.store.locked().add_block(&block.key, block.size)?;
        if !is_new {
            debug!(key = %block.key, "known block, no volume mutation");
            return Ok(());
        }

        if self.current.is_none() {
            let store = self.store.locked();
            self.current = Some(VolumePair::open(
                self.factory.as_ref(),
                &*store,
                self.config.index_strategy,
            )?);
        }
        let pair = self
            .current
            .as_mut()
            .ok_or_else(|| VolpackError::Other("BUG: no open volume pair after open".into()))?;

        self.store.locked().assign_block(&block.key, pair.blocks.id())?;
        pair.blocks.append(&block)?;

        // Blocklist metadata goes into the index immediately, not at
        // finalize, so it survives any later reordering of the close path.
        if block.is_blocklist && self.config.index_strategy == IndexFileStrategy::Full {
            if let Some(index) = pair.index.as_mut() {
                index.add_blocklist(&block.key, &block.payload)?;
            }
        }

        if pair.blocks.size() > self.config.fill_threshold() {
            self.finalize_and_dispatch()?;
        }
        Ok(())
    }

    fn finalize_and_dispatch(&mut self) -> Result<()> {
        let pair = self
            .current
            .take()
            .ok_or_else(|| VolpackError::Other("BUG: finalize without an open pair".into()))?;
        if self.config.dry_run {
            self.finalize_dry_run(pair)
        } else {
            self.finalize_real(pair)
        }
    }

    /// Preview path: close locally, log would-upload notices, release.
    /// Never marks records Uploading and never dispatches.
    fn finalize_dry_run(&mut self, pair: VolumePair) -> Result<()> {
        let VolumePair { mut blocks, index } = pair;
        let digest = blocks.close()?;
        info!(
            filename = blocks.remote_filename(),
            size = %human_size(digest.length),
            "would upload block volume"
        );
        if let Some(mut index) = index {
            // In-memory synchronization only: the reconciliation read is
            // fine, but no index link and no state transition.
            index.start_subject(blocks.remote_filename())?;
            let entries = self.store.locked().blocks_of_volume(blocks.id())?;
            for (key, size) in entries {
                index.add_block_entry(&key, size)?;
            }
            let index_digest = index.close(&digest.hash, digest.length)?;
            info!(
                filename = index.remote_filename(),
                size = %human_size(index_digest.length),
                "would upload index volume"
            );
        }
        Ok(())
    }

    /// The crash-consistency sequence. Order matters:
    /// mark-Uploading → close → index sync → log flush → commit → dispatch.
    /// The Uploading record lands before anything else so a crash at any
    /// later point leaves a durable trace that this volume was upload-bound.
    fn finalize_real(&mut self, pair: VolumePair) -> Result<()> {
        let VolumePair { mut blocks, mut index } = pair;

        {
            let store = self.store.locked();
            store.update_volume_state(blocks.remote_filename(), VolumeState::Uploading)?;
        }

        let digest = blocks.close()?;

        {
            let store = self.store.locked();
            if let Some(index) = index.as_mut() {
                sync_index_volume(&*store, index, &blocks, &digest)?;
            }
            store.flush_pending_log()?;
            store.commit("volume-finalized")?;
        }

        debug!(
            filename = blocks.remote_filename(),
            bytes = digest.length,
            blocks = blocks.entries().len(),
            "dispatching block volume"
        );
        self.send_dispatch(UploadRequest {
            block_volume: blocks,
            index_volume: index,
        })
    }

    fn send_dispatch(&mut self, request: UploadRequest) -> Result<()> {
        match self.dispatch.send(request) {
            Ok(()) => Ok(()),
            Err(SendError(request)) => {
                // Receiver retired. The volume is already committed as
                // Uploading — park it for the drain path.
                self.parked = Some(request);
                Err(VolpackError::Retired)
            }
        }
    }

    /// Entered on retirement. A pending pair (open, or committed but not
    /// handed off) goes to the spill channel for consolidation, then the
    /// retirement is re-raised so the caller observes shutdown.
    fn drain(&mut self) -> Result<()> {
        if let Some(request) = self.parked.take() {
            self.send_spill(request)?;
        }
        if let Some(pair) = self.current.take() {
            info!(
                filename = pair.blocks.remote_filename(),
                bytes = pair.blocks.size(),
                "spilling partial volume for consolidation"
            );
            self.send_spill(UploadRequest {
                block_volume: pair.blocks,
                index_volume: pair.index,
            })?;
        }
        Err(VolpackError::Retired)
    }

    fn send_spill(&mut self, request: UploadRequest) -> Result<()> {
        self.spill
            .send(request)
            .map_err(|_| VolpackError::Other("spill consolidator is gone".into()))
    }
}

/// Make the index volume a complete description of its closed block volume,
/// from the store's authoritative view rather than in-memory state, then
/// mark it Uploading alongside its companion.
fn sync_index_volume(
    store: &dyn MetadataStore,
    index: &mut IndexVolume,
    blocks: &BlockVolume,
    digest: &VolumeDigest,
) -> Result<()> {
    store.add_index_link(index.id(), blocks.id())?;
    index.start_subject(blocks.remote_filename())?;
    for (key, size) in store.blocks_of_volume(blocks.id())? {
        index.add_block_entry(&key, size)?;
    }
    index.close(&digest.hash, digest.length)?;
    store.update_volume_state(index.remote_filename(), VolumeState::Uploading)?;
    Ok(())
}

/// Render a byte count for log notices, e.g. "12.00 MiB".
pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
