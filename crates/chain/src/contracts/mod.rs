//! Call signatures and event decoding for the deployed contracts.

pub mod fund;
pub mod nft;
pub mod registry;
pub mod safe;
pub mod voting;

use ethers::abi::{decode, ParamType, Token};
use ethers::types::{Log, TransactionReceipt, H256, U256};
use serde::{Deserialize, Serialize};

use crate::abi::event_topic;
use crate::error::{ChainError, ChainResult};
use crate::types::{id_from_u256, Address};

/// Deployment addresses of the four governance contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub registry: Address,
    pub governance_token: Address,
    pub voting: Address,
    pub fund_management: Address,
}

/// Finds the log of the event with `topic` emitted by `contract`.
pub fn find_log<'a>(receipt: &'a TransactionReceipt, contract: &Address, topic: H256) -> Option<&'a Log> {
    receipt
        .logs
        .iter()
        .find(|log| log.address == *contract && log.topics.first() == Some(&topic))
}

/// First event argument, read from the first indexed topic or else from the data.
fn first_arg(log: &Log, kind: ParamType) -> ChainResult<Token> {
    let word = match log.topics.get(1) {
        Some(topic) => topic.as_bytes(),
        None => log.data.as_ref(),
    };
    decode(&[kind], word)?
        .pop()
        .ok_or_else(|| ChainError::Decode("empty event data".to_string()))
}

pub fn first_uint_arg(log: &Log) -> ChainResult<U256> {
    first_arg(log, ParamType::Uint(256))?
        .into_uint()
        .ok_or_else(|| ChainError::Decode("event argument is not a uint".to_string()))
}

pub fn first_address_arg(log: &Log) -> ChainResult<Address> {
    first_arg(log, ParamType::Address)?
        .into_address()
        .ok_or_else(|| ChainError::Decode("event argument is not an address".to_string()))
}

/// Id carried as the first argument of `event`, which `contract` must have emitted.
pub fn created_id(receipt: &TransactionReceipt, contract: &Address, event: &'static str) -> ChainResult<u64> {
    let log = find_log(receipt, contract, event_topic(event)).ok_or(ChainError::MissingEvent(event))?;
    id_from_u256(first_uint_arg(log)?)
}

#[cfg(test)]
pub(crate) fn log(address: Address, topics: Vec<H256>, data: Vec<u8>) -> Log {
    Log { address, topics, data: data.into(), ..Default::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{encode, uint};

    fn word(value: u64) -> H256 {
        H256::from_low_u64_be(value)
    }

    #[test]
    fn test_first_uint_arg_indexed_and_plain() {
        let contract = Address::repeat_byte(7);
        let topic = event_topic("ProposalExecuted(uint256)");

        let indexed = log(contract, vec![topic, word(9)], vec![]);
        assert_eq!(first_uint_arg(&indexed).unwrap(), U256::from(9));

        let plain = log(contract, vec![topic], encode(&[uint(4u64), Token::String("x".into())]));
        assert_eq!(first_uint_arg(&plain).unwrap(), U256::from(4));

        let empty = log(contract, vec![topic], vec![]);
        assert!(first_uint_arg(&empty).is_err());
    }

    #[test]
    fn test_find_log_matches_contract_and_topic() {
        let contract = Address::repeat_byte(1);
        let other = Address::repeat_byte(2);
        let wanted = event_topic("MemberAdded(uint256,address)");
        let receipt = TransactionReceipt {
            logs: vec![
                log(other, vec![wanted], vec![]),
                log(contract, vec![event_topic("Other()")], vec![]),
                log(contract, vec![wanted, word(3)], vec![]),
            ],
            ..Default::default()
        };

        let found = find_log(&receipt, &contract, wanted).unwrap();
        assert_eq!(first_uint_arg(found).unwrap(), U256::from(3));
    }

    #[test]
    fn test_find_log_ignores_unrelated_events_of_the_contract() {
        let contract = Address::repeat_byte(1);
        let receipt = TransactionReceipt {
            logs: vec![log(contract, vec![event_topic("OwnershipTransferred(address,address)"), word(1)], vec![])],
            ..Default::default()
        };

        assert!(find_log(&receipt, &contract, event_topic(registry::COMMUNITY_CREATED)).is_none());
        assert!(matches!(
            created_id(&receipt, &contract, registry::COMMUNITY_CREATED),
            Err(ChainError::MissingEvent(registry::COMMUNITY_CREATED))
        ));
    }
}
