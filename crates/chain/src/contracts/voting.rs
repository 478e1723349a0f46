//! Voting mechanism (`VotingMechanismUpgradeable`).

use ethers::abi::Token;

use crate::abi::{encode_call, uint};

pub const CREATE_PROPOSAL: &str = "createProposal(uint256,string,uint256)";
pub const VOTE: &str = "vote(uint256,bool)";
pub const EXECUTE_PROPOSAL: &str = "executeProposal(uint256)";

pub const PROPOSAL_CREATED: &str = "ProposalCreated(uint256,uint256,string,uint256,uint256)";

pub fn create_proposal(community_id: u64, description: &str, voting_period_secs: u64) -> Vec<u8> {
    encode_call(
        CREATE_PROPOSAL,
        &[uint(community_id), Token::String(description.to_string()), uint(voting_period_secs)],
    )
}

pub fn vote(proposal_id: u64, support: bool) -> Vec<u8> {
    encode_call(VOTE, &[uint(proposal_id), Token::Bool(support)])
}

pub fn execute_proposal(proposal_id: u64) -> Vec<u8> {
    encode_call(EXECUTE_PROPOSAL, &[uint(proposal_id)])
}
