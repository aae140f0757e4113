use claimtrie_primitives::Error as PrimitiveError;

/// Claim trie errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected before any state was touched.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Block operation issued for a height other than the open one.
    #[error("Invalid height: {0}")]
    InvalidHeight(String),

    /// No undo record is available for the block being disconnected.
    #[error("Undo data not found for height {0}")]
    UndoNotFound(u32),

    /// The undo record does not match the current state.
    #[error("Reorg inconsistency at height {height}: {reason}")]
    ReorgInconsistency { height: u32, reason: String },

    /// Persisted state does not hash to the recorded root.
    #[error("Inconsistent claim trie: {0}")]
    Inconsistent(String),

    /// Store record could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] codec::Error),

    /// Undo record could not be (de)serialized.
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Storage backend failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<PrimitiveError> for Error {
    fn from(err: PrimitiveError) -> Self {
        match err {
            PrimitiveError::MalformedInput(msg) => Self::MalformedInput(msg),
        }
    }
}
