//! Governance membership token (`GovernanceTokenUpgradeable`, ERC-721).
//! The registry mints and burns it; the backend only reads it.

use ethers::types::TransactionReceipt;

use crate::abi::{encode_call, event_topic, uint};
use crate::types::{id_from_u256, Address, U256};

pub const OWNER_OF: &str = "ownerOf(uint256)";
pub const TOKEN_COMMUNITY: &str = "tokenCommunity(uint256)";

pub const TRANSFER: &str = "Transfer(address,address,uint256)";

pub fn owner_of(token_id: u64) -> Vec<u8> {
    encode_call(OWNER_OF, &[uint(token_id)])
}

pub fn token_community(token_id: u64) -> Vec<u8> {
    encode_call(TOKEN_COMMUNITY, &[uint(token_id)])
}

/// Token id of the first mint (transfer from the zero address) emitted by `token`.
pub fn minted_token_id(receipt: &TransactionReceipt, token: &Address) -> Option<u64> {
    let topic = event_topic(TRANSFER);
    receipt
        .logs
        .iter()
        .filter(|log| log.address == *token && log.topics.first() == Some(&topic))
        .find(|log| log.topics.get(1).map(|from| from.is_zero()).unwrap_or(false))
        .and_then(|log| log.topics.get(3))
        .and_then(|word| id_from_u256(U256::from_big_endian(word.as_bytes())).ok())
}
