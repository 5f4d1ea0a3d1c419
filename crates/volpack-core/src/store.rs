use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::block::BlockKey;
use crate::error::Result;

/// Store-assigned identifier for a registered remote volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeId(pub i64);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeKind {
    Blocks,
    Index,
}

/// Durable lifecycle of a remote volume record. Transitions are monotonic:
/// Temporary → Uploading → Uploaded, or → Deleted on abandonment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeState {
    Temporary,
    Uploading,
    Uploaded,
    Deleted,
}

/// Operation contracts of the transactional metadata store.
///
/// All mutations take effect inside the store's current transaction; nothing
/// is durable until `commit`. The store is shared with sibling pipeline
/// stages — callers serialize access through [`SharedStore`].
pub trait MetadataStore: Send + Sync {
    /// Register a remote volume record, returning its assigned id.
    fn register_volume(
        &self,
        filename: &str,
        kind: VolumeKind,
        state: VolumeState,
    ) -> Result<VolumeId>;

    /// Record a block in the dedup ledger. Returns true if the hash was not
    /// known before — the single authoritative dedup checkpoint. The block
    /// is not attributed to any volume by this call.
    fn add_block(&self, key: &BlockKey, size: u32) -> Result<bool>;

    /// Attribute a previously added block to a volume.
    fn assign_block(&self, key: &BlockKey, volume: VolumeId) -> Result<()>;

    /// Authoritative list of (hash, size) pairs currently associated with a
    /// volume, in assignment order.
    fn blocks_of_volume(&self, volume: VolumeId) -> Result<Vec<(BlockKey, u32)>>;

    /// Transition a volume record's state, looked up by remote filename.
    fn update_volume_state(&self, filename: &str, state: VolumeState) -> Result<()>;

    /// Record that an index volume describes a block volume.
    fn add_index_link(&self, index: VolumeId, blocks: VolumeId) -> Result<()>;

    /// Flush auxiliary log/metadata writes buffered by the pipeline. May be
    /// a no-op when nothing is buffered.
    fn flush_pending_log(&self) -> Result<()>;

    /// Commit the current transaction atomically.
    fn commit(&self, label: &str) -> Result<()>;
}

/// A metadata store plus the process-wide exclusion scope guarding it.
///
/// The scope is shared with every other stage that touches the same store;
/// any mutation sequence that must not interleave with other transaction
/// users runs under [`SharedStore::locked`].
#[derive(Clone)]
pub struct SharedStore {
    store: Arc<dyn MetadataStore>,
    scope: Arc<Mutex<()>>,
}

/// Exclusive access to the store for the guard's lifetime.
pub struct StoreGuard<'a> {
    store: &'a dyn MetadataStore,
    _guard: MutexGuard<'a, ()>,
}

impl SharedStore {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        SharedStore {
            store,
            scope: Arc::new(Mutex::new(())),
        }
    }

    /// Share an existing exclusion scope (sibling stages on the same store).
    pub fn with_scope(store: Arc<dyn MetadataStore>, scope: Arc<Mutex<()>>) -> Self {
        SharedStore { store, scope }
    }

    /// Enter the exclusion scope. A poisoned scope is entered anyway; the
    /// store's own transaction keeps the metadata consistent.
    pub fn locked(&self) -> StoreGuard<'_> {
        let guard = match self.scope.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        StoreGuard {
            store: self.store.as_ref(),
            _guard: guard,
        }
    }
}

impl<'a> std::ops::Deref for StoreGuard<'a> {
    type Target = dyn MetadataStore + 'a;

    fn deref(&self) -> &Self::Target {
        self.store
    }
}
