//! In-process chain with the same observable behavior as the deployed
//! contracts. Backs `chain.mode = "local"` and the test suites.

use async_trait::async_trait;
use ethers::utils::keccak256;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::contracts::registry::CommunityKind;
use crate::error::{ChainError, ChainResult};
use crate::gateway::{validate_threshold, ChainGateway, CreatedCommunity, SafeGateway};
use crate::types::{Address, TxHash, Wei};

struct LocalCommunity {
    admin: Address,
    members: Vec<Address>,
}

struct LocalToken {
    owner: Address,
    community_id: u64,
}

struct LocalProposal {
    community_id: u64,
    end_time: u64,
    executed: bool,
    funding: bool,
    voters: HashSet<Address>,
    votes_for: u64,
    votes_against: u64,
}

struct LocalSafe {
    owners: Vec<Address>,
    threshold: u64,
}

#[derive(Default)]
struct State {
    communities: BTreeMap<u64, LocalCommunity>,
    tokens: BTreeMap<u64, LocalToken>,
    next_token: u64,
    proposals: BTreeMap<u64, LocalProposal>,
    safes: HashMap<Address, LocalSafe>,
    balances: HashMap<Address, Wei>,
    nonce: u64,
}

impl State {
    fn next_hash(&mut self) -> TxHash {
        self.nonce += 1;
        TxHash::from(keccak256(self.nonce.to_be_bytes()))
    }

    fn community(&self, id: u64) -> ChainResult<&LocalCommunity> {
        self.communities.get(&id).ok_or_else(|| ChainError::reverted("Community does not exist"))
    }

    fn community_mut(&mut self, id: u64) -> ChainResult<&mut LocalCommunity> {
        self.communities.get_mut(&id).ok_or_else(|| ChainError::reverted("Community does not exist"))
    }

    fn is_member(&self, community_id: u64, account: &Address) -> bool {
        self.communities
            .get(&community_id)
            .map(|c| c.members.contains(account))
            .unwrap_or(false)
    }

    fn mint(&mut self, to: Address, community_id: u64) -> u64 {
        let id = self.next_token;
        self.next_token += 1;
        self.tokens.insert(id, LocalToken { owner: to, community_id });
        id
    }

    fn token_of(&self, community_id: u64, owner: &Address) -> Option<u64> {
        self.tokens
            .iter()
            .find(|(_, t)| t.community_id == community_id && t.owner == *owner)
            .map(|(id, _)| *id)
    }

    fn credit(&mut self, to: Address, value: Wei) {
        *self.balances.entry(to).or_default() += value;
    }

    /// Senders are treated as funded accounts; only tracked balances are debited.
    fn debit(&mut self, from: &Address, value: Wei) {
        if let Some(balance) = self.balances.get_mut(from) {
            *balance = balance.saturating_sub(value);
        }
    }

    fn new_proposal(&mut self, community_id: u64, period: u64, funding: bool) -> u64 {
        let id = self.proposals.keys().next_back().copied().unwrap_or(0) + 1;
        self.proposals.insert(
            id,
            LocalProposal {
                community_id,
                end_time: now_secs().saturating_add(period),
                executed: false,
                funding,
                voters: HashSet::new(),
                votes_for: 0,
                votes_against: 0,
            },
        );
        id
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Shared in-memory contract state. Clones observe the same chain.
#[derive(Clone, Default)]
pub struct LocalChain {
    state: Arc<Mutex<State>>,
}

impl LocalChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> ChainResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ChainError::Transport("local chain state poisoned".to_string()))
    }

    /// Vote counts recorded by the voting contract for `proposal_id`.
    pub fn tally(&self, proposal_id: u64) -> ChainResult<(u64, u64)> {
        let state = self.state()?;
        let proposal = state
            .proposals
            .get(&proposal_id)
            .ok_or_else(|| ChainError::reverted("Proposal does not exist"))?;
        Ok((proposal.votes_for, proposal.votes_against))
    }

    pub fn is_executed(&self, proposal_id: u64) -> ChainResult<bool> {
        let state = self.state()?;
        Ok(state.proposals.get(&proposal_id).map(|p| p.executed).unwrap_or(false))
    }

    /// Native balance tracked for `address`; untracked accounts report zero.
    pub fn balance(&self, address: Address) -> ChainResult<Wei> {
        Ok(self.state()?.balances.get(&address).copied().unwrap_or(0))
    }
}

#[async_trait]
impl ChainGateway for LocalChain {
    async fn create_community(&self, from: Address, name: &str, kind: CommunityKind) -> ChainResult<CreatedCommunity> {
        let mut state = self.state()?;
        let id = state.communities.keys().next_back().copied().unwrap_or(0) + 1;
        state.communities.insert(id, LocalCommunity { admin: from, members: vec![from] });
        let token = state.mint(from, id);
        debug!(community_id = id, name, %kind, ?from, "local community created");
        Ok(CreatedCommunity { id, founder_token: Some(token) })
    }

    async fn add_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<Option<u64>> {
        let mut state = self.state()?;
        let community = state.community_mut(community_id)?;
        if community.admin != from {
            return Err(ChainError::reverted("Not community admin"));
        }
        if community.members.contains(&member) {
            return Err(ChainError::reverted("Already a member"));
        }
        community.members.push(member);
        let token = state.mint(member, community_id);
        state.next_hash();
        Ok(Some(token))
    }

    async fn remove_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<()> {
        let mut state = self.state()?;
        let community = state.community_mut(community_id)?;
        if community.admin != from {
            return Err(ChainError::reverted("Not community admin"));
        }
        let position = community
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or_else(|| ChainError::reverted("Not a member"))?;
        community.members.remove(position);
        if let Some(token) = state.token_of(community_id, &member) {
            state.tokens.remove(&token);
        }
        state.next_hash();
        Ok(())
    }

    async fn is_member(&self, community_id: u64, member: Address) -> ChainResult<bool> {
        Ok(self.state()?.is_member(community_id, &member))
    }

    async fn community_members(&self, community_id: u64) -> ChainResult<Vec<Address>> {
        Ok(self.state()?.community(community_id)?.members.clone())
    }

    async fn community_count(&self) -> ChainResult<u64> {
        Ok(self.state()?.communities.len() as u64)
    }

    async fn owner_of(&self, token_id: u64) -> ChainResult<Address> {
        let state = self.state()?;
        state
            .tokens
            .get(&token_id)
            .map(|t| t.owner)
            .ok_or_else(|| ChainError::reverted("ERC721: invalid token ID"))
    }

    async fn token_community(&self, token_id: u64) -> ChainResult<u64> {
        let state = self.state()?;
        state
            .tokens
            .get(&token_id)
            .map(|t| t.community_id)
            .ok_or_else(|| ChainError::reverted("ERC721: invalid token ID"))
    }

    async fn create_proposal(&self, from: Address, community_id: u64, _description: &str, voting_period_secs: u64) -> ChainResult<u64> {
        let mut state = self.state()?;
        state.community(community_id)?;
        if !state.is_member(community_id, &from) {
            return Err(ChainError::reverted("Not a community member"));
        }
        Ok(state.new_proposal(community_id, voting_period_secs, false))
    }

    async fn vote(&self, from: Address, proposal_id: u64, support: bool) -> ChainResult<TxHash> {
        let mut state = self.state()?;
        let community_id = state
            .proposals
            .get(&proposal_id)
            .map(|p| p.community_id)
            .ok_or_else(|| ChainError::reverted("Proposal does not exist"))?;
        if !state.is_member(community_id, &from) {
            return Err(ChainError::reverted("Not a community member"));
        }

        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| ChainError::reverted("Proposal does not exist"))?;
        if now_secs() >= proposal.end_time {
            return Err(ChainError::reverted("Voting period has ended"));
        }
        if !proposal.voters.insert(from) {
            return Err(ChainError::reverted("Already voted"));
        }
        if support {
            proposal.votes_for += 1;
        } else {
            proposal.votes_against += 1;
        }
        Ok(state.next_hash())
    }

    async fn execute_proposal(&self, _from: Address, proposal_id: u64) -> ChainResult<TxHash> {
        let mut state = self.state()?;
        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .ok_or_else(|| ChainError::reverted("Proposal does not exist"))?;
        if proposal.executed {
            return Err(ChainError::reverted("Proposal already executed"));
        }
        if now_secs() < proposal.end_time {
            return Err(ChainError::reverted("Voting period not ended"));
        }
        proposal.executed = true;
        Ok(state.next_hash())
    }

    async fn create_funding_proposal(
        &self,
        from: Address,
        community_id: u64,
        _description: &str,
        _amount: Wei,
        voting_period_secs: u64,
    ) -> ChainResult<u64> {
        let mut state = self.state()?;
        state.community(community_id)?;
        if !state.is_member(community_id, &from) {
            return Err(ChainError::reverted("Not a community member"));
        }
        Ok(state.new_proposal(community_id, voting_period_secs, true))
    }

    async fn contribute(&self, from: Address, proposal_id: u64, value: Wei) -> ChainResult<TxHash> {
        let mut state = self.state()?;
        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .filter(|p| p.funding)
            .ok_or_else(|| ChainError::reverted("Not a funding proposal"))?;
        if proposal.executed || now_secs() >= proposal.end_time {
            return Err(ChainError::reverted("Funding period not active"));
        }
        state.debit(&from, value);
        Ok(state.next_hash())
    }

    async fn execute_funding(&self, _from: Address, proposal_id: u64) -> ChainResult<TxHash> {
        let mut state = self.state()?;
        let proposal = state
            .proposals
            .get_mut(&proposal_id)
            .filter(|p| p.funding)
            .ok_or_else(|| ChainError::reverted("Not a funding proposal"))?;
        if proposal.executed {
            return Err(ChainError::reverted("Proposal already executed"));
        }
        proposal.executed = true;
        Ok(state.next_hash())
    }

    async fn funding_proposal_exists(&self, proposal_id: u64) -> ChainResult<bool> {
        Ok(self.state()?.proposals.get(&proposal_id).map(|p| p.funding).unwrap_or(false))
    }

    async fn send_value(&self, from: Address, to: Address, value: Wei) -> ChainResult<TxHash> {
        let mut state = self.state()?;
        state.debit(&from, value);
        state.credit(to, value);
        Ok(state.next_hash())
    }
}

#[async_trait]
impl SafeGateway for LocalChain {
    async fn create_wallet(&self, _from: Address, owners: &[Address], threshold: u64) -> ChainResult<Address> {
        validate_threshold(owners, threshold)?;
        let mut state = self.state()?;
        let address = Address::from(state.next_hash());
        state.safes.insert(address, LocalSafe { owners: owners.to_vec(), threshold });
        Ok(address)
    }

    async fn safe_balance(&self, wallet: Address) -> ChainResult<Wei> {
        Ok(self.state()?.balances.get(&wallet).copied().unwrap_or(0))
    }

    async fn transfer(&self, from: Address, wallet: Address, to: Address, value: Wei) -> ChainResult<TxHash> {
        let mut state = self.state()?;
        let safe = state
            .safes
            .get(&wallet)
            .ok_or_else(|| ChainError::Transport(format!("no contract at {:?}", wallet)))?;
        if !safe.owners.contains(&from) {
            return Err(ChainError::reverted("GS026"));
        }
        // one pre-validated signature only satisfies a threshold of one
        if safe.threshold > 1 {
            return Err(ChainError::reverted("GS020"));
        }
        let available = state.balances.get(&wallet).copied().unwrap_or(0);
        if available < value {
            return Err(ChainError::reverted("GS013"));
        }
        state.debit(&wallet, value);
        state.credit(to, value);
        Ok(state.next_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[tokio::test]
    async fn test_community_membership_and_tokens() -> Result<(), Box<dyn std::error::Error>> {
        let chain = LocalChain::new();
        let owner = account(1);
        let member = account(2);

        let created = chain.create_community(owner, "Test Community", CommunityKind::Residential).await?;
        assert_eq!(created, CreatedCommunity { id: 1, founder_token: Some(0) });
        let id = created.id;
        assert_eq!(chain.owner_of(0).await?, owner);

        let token = chain.add_member(owner, id, member).await?;
        assert_eq!(token, Some(1));
        assert_eq!(chain.community_members(id).await?, vec![owner, member]);
        assert_eq!(chain.token_community(1).await?, id);

        let err = chain.add_member(owner, id, member).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Already a member"));

        chain.remove_member(owner, id, member).await?;
        assert!(!chain.is_member(id, member).await?);
        let err = chain.token_community(1).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("ERC721: invalid token ID"));

        let err = chain.remove_member(owner, id, account(3)).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Not a member"));

        let err = chain.community_members(2).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Community does not exist"));
        assert_eq!(chain.community_count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_voting_rules() -> Result<(), Box<dyn std::error::Error>> {
        let chain = LocalChain::new();
        let owner = account(1);
        let id = chain.create_community(owner, "Test Community", CommunityKind::Residential).await?.id;

        let err = chain.create_proposal(account(9), id, "Test Proposal", 86400).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Not a community member"));

        let proposal = chain.create_proposal(owner, id, "Test Proposal", 86400).await?;
        assert_eq!(proposal, 1);
        chain.vote(owner, proposal, true).await?;
        let err = chain.vote(owner, proposal, false).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Already voted"));
        assert_eq!(chain.tally(proposal)?, (1, 0));

        let err = chain.execute_proposal(owner, proposal).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Voting period not ended"));
        Ok(())
    }

    #[tokio::test]
    async fn test_funding_rules() -> Result<(), Box<dyn std::error::Error>> {
        let chain = LocalChain::new();
        let owner = account(1);
        let id = chain.create_community(owner, "Test Community", CommunityKind::Commercial).await?.id;

        let proposal = chain.create_funding_proposal(owner, id, "Roof", 1_000, 86400).await?;
        assert!(chain.funding_proposal_exists(proposal).await?);
        chain.contribute(owner, proposal, 500).await?;

        let err = chain.contribute(owner, proposal + 1, 500).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Not a funding proposal"));

        chain.execute_funding(owner, proposal).await?;
        let err = chain.execute_funding(owner, proposal).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Proposal already executed"));

        let err = chain.contribute(owner, proposal, 1).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("Funding period not active"));
        Ok(())
    }

    #[tokio::test]
    async fn test_safe_transfers() -> Result<(), Box<dyn std::error::Error>> {
        let chain = LocalChain::new();
        let owner = account(1);
        let recipient = account(5);

        let safe = chain.create_wallet(owner, &[owner], 1).await?;
        chain.send_value(account(7), safe, 1_000).await?;
        assert_eq!(chain.safe_balance(safe).await?, 1_000);

        chain.transfer(owner, safe, recipient, 400).await?;
        assert_eq!(chain.safe_balance(safe).await?, 600);
        assert_eq!(chain.balance(recipient)?, 400);

        let err = chain.transfer(owner, safe, recipient, 601).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("GS013"));
        let err = chain.transfer(account(2), safe, recipient, 1).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("GS026"));

        let shared = chain.create_wallet(owner, &[owner, account(2), account(3)], 2).await?;
        chain.send_value(owner, shared, 10).await?;
        let err = chain.transfer(owner, shared, recipient, 1).await.unwrap_err();
        assert_eq!(err.revert_reason(), Some("GS020"));
        Ok(())
    }
}
