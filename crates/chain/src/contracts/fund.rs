//! Fund management (`FundManagementUpgradeable`).

use ethers::abi::Token;

use crate::abi::{encode_call, uint};
use crate::types::Wei;

pub const CREATE_FUNDING_PROPOSAL: &str = "createFundingProposal(uint256,string,uint256,uint256)";
pub const CONTRIBUTE_FUNDS: &str = "contributeFunds(uint256)";
pub const EXECUTE_PROPOSAL: &str = "executeProposal(uint256)";
pub const PROPOSAL_EXISTS: &str = "proposalExists(uint256)";

pub const FUNDING_PROPOSAL_CREATED: &str = "FundingProposalCreated(uint256,uint256,uint256)";

pub fn create_funding_proposal(community_id: u64, description: &str, amount: Wei, voting_period_secs: u64) -> Vec<u8> {
    encode_call(
        CREATE_FUNDING_PROPOSAL,
        &[
            uint(community_id),
            Token::String(description.to_string()),
            uint(amount),
            uint(voting_period_secs),
        ],
    )
}

pub fn contribute_funds(proposal_id: u64) -> Vec<u8> {
    encode_call(CONTRIBUTE_FUNDS, &[uint(proposal_id)])
}

pub fn execute_proposal(proposal_id: u64) -> Vec<u8> {
    encode_call(EXECUTE_PROPOSAL, &[uint(proposal_id)])
}

pub fn proposal_exists(proposal_id: u64) -> Vec<u8> {
    encode_call(PROPOSAL_EXISTS, &[uint(proposal_id)])
}
