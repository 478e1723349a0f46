pub use ethers::types::{Address, H256 as TxHash, U256};

use crate::error::{ChainError, ChainResult};

/// Amount of native currency in wei.
pub type Wei = u128;

pub const WEI_PER_ETH: Wei = 1_000_000_000_000_000_000;

/// Full lowercase `0x` form; `Display` on `Address` abbreviates.
pub fn address_hex(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn wei_from_u256(value: U256) -> ChainResult<Wei> {
    if value.bits() > 128 {
        return Err(ChainError::Decode(format!("amount {} does not fit in u128", value)));
    }
    Ok(value.as_u128())
}

pub fn id_from_u256(value: U256) -> ChainResult<u64> {
    if value.bits() > 64 {
        return Err(ChainError::Decode(format!("id {} exceeds u64", value)));
    }
    Ok(value.as_u64())
}
