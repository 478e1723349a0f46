use molc_chain::{TxHash, Wei};
use serde::{Deserialize, Serialize};

use crate::pricing::{deserialize_optional_amount, UsdCents};

pub const PROPOSALS: &str = "proposals";
/// `{community}/{proposal}` -> proposal id (JSON number).
pub const COMMUNITY_PROPOSALS: &str = "community_proposals";
/// `{proposal}/{user}` -> vote.
pub const VOTES: &str = "votes";
/// `{proposal}/{sequence}` -> contribution.
pub const CONTRIBUTIONS: &str = "contributions";

pub const PROPOSAL_SEQUENCE: &str = "proposals";
pub const CONTRIBUTION_SEQUENCE: &str = "contributions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    Funding,
    Voting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Active,
    Executed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub community_id: u64,
    pub proposer_id: String,
    pub kind: ProposalKind,
    pub description: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub amount_usd_cents: Option<UsdCents>,
    #[serde(default)]
    pub amount_received_usd_cents: UsdCents,
    pub votes_for: u64,
    pub votes_against: u64,
    pub status: ProposalStatus,
    pub chain_proposal_id: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
    pub voting_end_time: u64,
    #[serde(default)]
    pub execution_tx: Option<TxHash>,
}

impl Proposal {
    pub fn is_executed(&self) -> bool {
        self.status == ProposalStatus::Executed
    }

    /// Stored status with expiry applied at `now`.
    pub fn effective_status(&self, now: u64) -> ProposalStatus {
        match self.status {
            ProposalStatus::Active if now >= self.voting_end_time => ProposalStatus::Expired,
            status => status,
        }
    }

    pub fn is_open(&self, now: u64) -> bool {
        self.effective_status(now) == ProposalStatus::Active
    }

    pub fn is_funded(&self) -> bool {
        self.amount_usd_cents
            .map(|target| self.amount_received_usd_cents >= target)
            .unwrap_or(false)
    }

    pub fn tally(&self) -> Tally {
        Tally {
            votes_for: self.votes_for,
            votes_against: self.votes_against,
            passed: self.votes_for > self.votes_against,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProposal {
    pub community_id: u64,
    pub kind: ProposalKind,
    pub description: String,
    /// Decimal USD amount, funding proposals only.
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub amount: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub voting_period_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: u64,
    pub user_id: String,
    pub support: bool,
    pub cast_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub proposal_id: u64,
    pub user_id: String,
    pub amount_usd_cents: UsdCents,
    pub amount_wei: Wei,
    pub tx_hash: TxHash,
    pub contributed_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub votes_for: u64,
    pub votes_against: u64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoterSummary {
    pub user_id: String,
    pub name: String,
    pub support: bool,
}

/// Proposal as returned to clients: status resolved and voters named.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub voters: Vec<VoterSummary>,
}

pub fn proposal_key(id: u64) -> String {
    format!("{:020}", id)
}

pub fn community_proposal_key(community_id: u64, proposal_id: u64) -> String {
    format!("{:020}/{:020}", community_id, proposal_id)
}

pub fn community_proposal_prefix(community_id: u64) -> String {
    format!("{:020}/", community_id)
}

pub fn vote_key(proposal_id: u64, user_id: &str) -> String {
    format!("{:020}/{}", proposal_id, user_id)
}

pub fn vote_prefix(proposal_id: u64) -> String {
    format!("{:020}/", proposal_id)
}

pub fn contribution_key(proposal_id: u64, sequence: u64) -> String {
    format!("{:020}/{:020}", proposal_id, sequence)
}

pub fn contribution_prefix(proposal_id: u64) -> String {
    format!("{:020}/", proposal_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(status: ProposalStatus, end: u64) -> Proposal {
        Proposal {
            id: 1,
            community_id: 1,
            proposer_id: "alice".into(),
            kind: ProposalKind::Funding,
            description: "New roof".into(),
            options: vec![],
            amount_usd_cents: Some(UsdCents::from_dollars(10)),
            amount_received_usd_cents: UsdCents::ZERO,
            votes_for: 2,
            votes_against: 1,
            status,
            chain_proposal_id: Some(1),
            created_at: 0,
            updated_at: 0,
            voting_end_time: end,
            execution_tx: None,
        }
    }

    #[test]
    fn test_effective_status() {
        assert_eq!(proposal(ProposalStatus::Active, 100).effective_status(99), ProposalStatus::Active);
        assert_eq!(proposal(ProposalStatus::Active, 100).effective_status(100), ProposalStatus::Expired);
        assert_eq!(proposal(ProposalStatus::Executed, 100).effective_status(500), ProposalStatus::Executed);
    }

    #[test]
    fn test_funded_and_tally() {
        let mut p = proposal(ProposalStatus::Active, 100);
        assert!(!p.is_funded());
        p.amount_received_usd_cents = UsdCents::from_dollars(10);
        assert!(p.is_funded());
        assert_eq!(p.tally(), Tally { votes_for: 2, votes_against: 1, passed: true });
    }

    #[test]
    fn test_vote_keys_group_by_proposal() {
        assert!(vote_key(7, "bob").starts_with(&vote_prefix(7)));
        assert!(!vote_key(70, "bob").starts_with(&vote_prefix(7)));
    }
}
