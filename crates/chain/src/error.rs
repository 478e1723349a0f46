use thiserror::Error;

use crate::types::TxHash;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error("receipt for {hash:?} not available after {attempts} attempts")]
    ReceiptTimeout { hash: TxHash, attempts: u32 },

    #[error("event {0} not found in transaction receipt")]
    MissingEvent(&'static str),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ChainError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        ChainError::Reverted { reason: reason.into() }
    }

    /// Revert reason when the failure came from the contract itself.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ChainError::Reverted { reason } => Some(reason),
            _ => None,
        }
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
