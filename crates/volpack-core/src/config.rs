use serde::{Deserialize, Serialize};

use crate::error::{Result, VolpackError};

fn default_volume_size() -> u64 {
    50 * 1024 * 1024
}

fn default_block_size() -> u32 {
    1024 * 1024
}

/// How much index metadata accompanies each block volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexFileStrategy {
    /// No index volumes at all.
    None,
    /// Index volumes list (hash, size) entries only.
    Lookup,
    /// Index volumes additionally carry blocklist payloads inline.
    #[default]
    Full,
}

impl IndexFileStrategy {
    /// Whether index volumes are generated at all.
    pub fn enabled(&self) -> bool {
        !matches!(self, IndexFileStrategy::None)
    }
}

/// Settings for the packing and dispatch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingConfig {
    /// Upper bound for a block volume, in bytes. The fill threshold fires at
    /// `size > volume_size - block_size`, so a volume never exceeds this by
    /// more than one block.
    #[serde(default = "default_volume_size")]
    pub volume_size: u64,
    /// Upstream block size in bytes — the slack subtracted from
    /// `volume_size` when checking the threshold.
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    #[serde(default)]
    pub index_strategy: IndexFileStrategy,
    /// Preview mode: log would-upload notices, never mark volumes Uploading,
    /// never dispatch.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PackingConfig {
    fn default() -> Self {
        PackingConfig {
            volume_size: default_volume_size(),
            block_size: default_block_size(),
            index_strategy: IndexFileStrategy::default(),
            dry_run: false,
        }
    }
}

impl PackingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(VolpackError::Config("block_size must be non-zero".into()));
        }
        if self.block_size as u64 >= self.volume_size {
            return Err(VolpackError::Config(format!(
                "block_size ({}) must be smaller than volume_size ({})",
                self.block_size, self.volume_size
            )));
        }
        Ok(())
    }

    /// The byte count past which the current volume is considered full.
    pub fn fill_threshold(&self) -> u64 {
        self.volume_size - self.block_size as u64
    }
}
