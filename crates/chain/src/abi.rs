//! Calldata and event helpers on top of `ethers::abi`.

pub use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{H256, U256};
use ethers::utils::{id, keccak256};

/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

pub fn uint(value: impl Into<U256>) -> Token {
    Token::Uint(value.into())
}

pub fn event_topic(signature: &str) -> H256 {
    H256(keccak256(signature.as_bytes()))
}

/// Calldata for `signature` called with `tokens`.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = id(signature).to_vec();
    data.extend(encode(tokens));
    data
}

/// Extracts the message of an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR)?;
    decode(&[ParamType::String], payload).ok()?.pop()?.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(id("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(id("Error(string)"), ERROR_STRING_SELECTOR);
        assert_eq!(
            format!("{:#x}", event_topic("Transfer(address,address,uint256)")),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_encode_call_prefixes_selector() {
        let data = encode_call("createCommunity(string,uint8)", &[Token::String("Test Community".into()), uint(0u8)]);
        assert_eq!(data[..4], id("createCommunity(string,uint8)"));
        // offset word, kind word, length word, one padded word of text
        assert_eq!(data.len(), 4 + 128);
        assert_eq!(data[4 + 31], 64);
        assert_eq!(&data[4 + 96..4 + 110], b"Test Community");
    }

    #[test]
    fn test_revert_reason() {
        let mut payload = ERROR_STRING_SELECTOR.to_vec();
        payload.extend(encode(&[Token::String("Already voted".to_string())]));
        assert_eq!(decode_revert_reason(&payload).as_deref(), Some("Already voted"));
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);
    }
}
