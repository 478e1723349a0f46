//! Safe multisig proxy factory and wallet calls.

use ethers::abi::Token;
use ethers::types::H256;
use serde::{Deserialize, Serialize};

use crate::abi::{encode_call, uint};
use crate::types::{Address, Wei};

pub const SETUP: &str = "setup(address[],uint256,address,bytes,address,address,uint256,address)";
pub const CREATE_PROXY_WITH_NONCE: &str = "createProxyWithNonce(address,bytes,uint256)";
pub const EXEC_TRANSACTION: &str =
    "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)";

pub const PROXY_CREATION: &str = "ProxyCreation(address,address)";

/// Safe deployment used to create community treasuries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeDeployment {
    pub proxy_factory: Address,
    pub singleton: Address,
    pub fallback_handler: Address,
}

pub fn setup_initializer(owners: &[Address], threshold: u64, fallback_handler: Address) -> Vec<u8> {
    encode_call(
        SETUP,
        &[
            Token::Array(owners.iter().copied().map(Token::Address).collect()),
            uint(threshold),
            Token::Address(Address::zero()),
            Token::Bytes(Vec::new()),
            Token::Address(fallback_handler),
            Token::Address(Address::zero()),
            uint(0u64),
            Token::Address(Address::zero()),
        ],
    )
}

pub fn create_proxy_with_nonce(singleton: Address, initializer: Vec<u8>, salt_nonce: u128) -> Vec<u8> {
    encode_call(
        CREATE_PROXY_WITH_NONCE,
        &[Token::Address(singleton), Token::Bytes(initializer), uint(salt_nonce)],
    )
}

/// Pre-validated signature (`v = 1`): accepted when the sender is the owner itself.
pub fn sender_owner_signature(owner: Address) -> Vec<u8> {
    let mut signature = Vec::with_capacity(65);
    signature.extend_from_slice(H256::from(owner).as_bytes());
    signature.extend_from_slice(&[0u8; 32]);
    signature.push(1);
    signature
}

/// Plain value transfer executed by a single owner.
pub fn exec_transfer(to: Address, value: Wei, owner: Address) -> Vec<u8> {
    encode_call(
        EXEC_TRANSACTION,
        &[
            Token::Address(to),
            uint(value),
            Token::Bytes(Vec::new()),
            uint(0u8),
            uint(0u64),
            uint(0u64),
            uint(0u64),
            Token::Address(Address::zero()),
            Token::Address(Address::zero()),
            Token::Bytes(sender_owner_signature(owner)),
        ],
    )
}
