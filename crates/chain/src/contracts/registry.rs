//! Community registry (`CommunityDAOUpgradeable`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use ethers::abi::Token;

use crate::abi::{encode_call, uint};
use crate::types::Address;

pub const CREATE_COMMUNITY: &str = "createCommunity(string,uint8)";
pub const ADD_MEMBER: &str = "addMember(uint256,address)";
pub const REMOVE_MEMBER: &str = "removeMember(uint256,address)";
pub const IS_MEMBER: &str = "isMember(uint256,address)";
pub const GET_COMMUNITY_MEMBERS: &str = "getCommunityMembers(uint256)";
pub const GET_COMMUNITY_COUNT: &str = "getCommunityCount()";

pub const COMMUNITY_CREATED: &str = "CommunityCreated(uint256,string,uint8,address)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityKind {
    Residential,
    Commercial,
}

impl CommunityKind {
    /// Enum value used by the contract.
    pub fn code(self) -> u8 {
        match self {
            CommunityKind::Residential => 0,
            CommunityKind::Commercial => 1,
        }
    }
}

impl fmt::Display for CommunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityKind::Residential => write!(f, "residential"),
            CommunityKind::Commercial => write!(f, "commercial"),
        }
    }
}

impl FromStr for CommunityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "residential" => Ok(CommunityKind::Residential),
            "commercial" => Ok(CommunityKind::Commercial),
            other => Err(format!("unknown community type {}", other)),
        }
    }
}

pub fn create_community(name: &str, kind: CommunityKind) -> Vec<u8> {
    encode_call(CREATE_COMMUNITY, &[Token::String(name.to_string()), uint(kind.code())])
}

pub fn add_member(community_id: u64, member: Address) -> Vec<u8> {
    encode_call(ADD_MEMBER, &[uint(community_id), Token::Address(member)])
}

pub fn remove_member(community_id: u64, member: Address) -> Vec<u8> {
    encode_call(REMOVE_MEMBER, &[uint(community_id), Token::Address(member)])
}

pub fn is_member(community_id: u64, member: Address) -> Vec<u8> {
    encode_call(IS_MEMBER, &[uint(community_id), Token::Address(member)])
}

pub fn community_members(community_id: u64) -> Vec<u8> {
    encode_call(GET_COMMUNITY_MEMBERS, &[uint(community_id)])
}

pub fn community_count() -> Vec<u8> {
    encode_call(GET_COMMUNITY_COUNT, &[])
}
