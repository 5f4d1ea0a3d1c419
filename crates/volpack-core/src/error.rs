use thiserror::Error;

pub type Result<T> = std::result::Result<T, VolpackError>;

#[derive(Debug, Error)]
pub enum VolpackError {
    /// Cooperative shutdown: the input source or an output consumer has
    /// retired. Not a fault — triggers the drain/spill path.
    #[error("pipeline retired")]
    Retired,

    #[error("metadata store error: {0}")]
    Store(String),

    #[error("volume encoder error: {0}")]
    Encoder(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VolpackError {
    /// True for the cooperative-shutdown signal, false for every real fault.
    /// Checked explicitly at suspension points instead of relying on
    /// unwinding.
    pub fn is_retired(&self) -> bool {
        matches!(self, VolpackError::Retired)
    }
}
