use crate::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("read failed: {0}")]
    Read(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("transaction rejected by signer")]
    Rejected,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no cached word data available")]
    NoCachedData,

    #[error("slot index {0} is out of range")]
    SlotOutOfRange(usize),

    #[error("slot {0} already has a pending contribution")]
    SlotPending(usize),

    #[error("Please connect your wallet first")]
    ReadOnly,

    #[error("RPC reports chain id {actual}, expected {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected)
    }

    /// Maps a signer or RPC failure on a write into `Rejected` when the
    /// message says the user declined, `Transaction` otherwise.
    pub fn from_write_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("rejected") || lowered.contains("user denied") {
            Error::Rejected
        } else {
            Error::Transaction(message)
        }
    }
}
