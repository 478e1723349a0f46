use async_trait::async_trait;
use molc_chain::{
    Address, ChainError, ChainGateway, ChainResult, CommunityKind, CreatedCommunity, LocalChain, TxHash, Wei,
};
use molc_database::{InnerDatabase, SafeDatabase};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::context::{GovernanceSettings, ServiceContext};
use crate::error::ServiceResult;
use crate::identity;
use crate::parser::profile::{User, UserInput};
use crate::pricing::ExchangeRate;

pub fn wallet(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Store in a temporary directory wired to an in-process chain.
pub struct TestEnv {
    _dir: TempDir,
    pub ctx: ServiceContext<InnerDatabase>,
    pub chain: LocalChain,
}

impl TestEnv {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let chain = LocalChain::new();
        Self::with_gateway(chain.clone(), Arc::new(chain))
    }

    /// Routes contract calls through `gateway`; Safe calls still go to `chain`.
    pub fn with_gateway(chain: LocalChain, gateway: Arc<dyn ChainGateway>) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let db = InnerDatabase::new(dir.path().join("molc_db"))?;
        let settings = GovernanceSettings { nft_contract: wallet(0xee), ..GovernanceSettings::default() };
        let ctx = ServiceContext::new(db, gateway, Arc::new(chain.clone()), ExchangeRate::default(), settings);
        Ok(Self { _dir: dir, ctx, chain })
    }

    /// Registers `id` with wallet `wallet(n)`.
    pub fn user(&self, id: &str, n: u8) -> ServiceResult<User> {
        identity::create_or_update_user(
            &self.ctx,
            UserInput {
                id: id.to_string(),
                email: format!("{}@example.com", id),
                display_name: id.to_string(),
                bio: None,
                wallet_address: Some(wallet(n)),
            },
        )
    }
}

/// Holds `create_community` until released, then fails it or forwards it.
#[derive(Clone, Default)]
pub struct GatedChain {
    inner: LocalChain,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    pub fail: Arc<AtomicBool>,
}

impl GatedChain {
    pub fn new(inner: LocalChain) -> Self {
        Self { inner, ..Self::default() }
    }
}

#[async_trait]
impl ChainGateway for GatedChain {
    async fn create_community(&self, from: Address, name: &str, kind: CommunityKind) -> ChainResult<CreatedCommunity> {
        self.entered.notify_one();
        self.release.notified().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChainError::reverted("Community creation failed"));
        }
        self.inner.create_community(from, name, kind).await
    }

    async fn add_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<Option<u64>> {
        self.inner.add_member(from, community_id, member).await
    }

    async fn remove_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<()> {
        self.inner.remove_member(from, community_id, member).await
    }

    async fn is_member(&self, community_id: u64, member: Address) -> ChainResult<bool> {
        self.inner.is_member(community_id, member).await
    }

    async fn community_members(&self, community_id: u64) -> ChainResult<Vec<Address>> {
        self.inner.community_members(community_id).await
    }

    async fn community_count(&self) -> ChainResult<u64> {
        self.inner.community_count().await
    }

    async fn owner_of(&self, token_id: u64) -> ChainResult<Address> {
        self.inner.owner_of(token_id).await
    }

    async fn token_community(&self, token_id: u64) -> ChainResult<u64> {
        self.inner.token_community(token_id).await
    }

    async fn create_proposal(&self, from: Address, community_id: u64, description: &str, voting_period_secs: u64) -> ChainResult<u64> {
        self.inner.create_proposal(from, community_id, description, voting_period_secs).await
    }

    async fn vote(&self, from: Address, proposal_id: u64, support: bool) -> ChainResult<TxHash> {
        self.inner.vote(from, proposal_id, support).await
    }

    async fn execute_proposal(&self, from: Address, proposal_id: u64) -> ChainResult<TxHash> {
        self.inner.execute_proposal(from, proposal_id).await
    }

    async fn create_funding_proposal(
        &self,
        from: Address,
        community_id: u64,
        description: &str,
        amount: Wei,
        voting_period_secs: u64,
    ) -> ChainResult<u64> {
        self.inner
            .create_funding_proposal(from, community_id, description, amount, voting_period_secs)
            .await
    }

    async fn contribute(&self, from: Address, proposal_id: u64, value: Wei) -> ChainResult<TxHash> {
        self.inner.contribute(from, proposal_id, value).await
    }

    async fn execute_funding(&self, from: Address, proposal_id: u64) -> ChainResult<TxHash> {
        self.inner.execute_funding(from, proposal_id).await
    }

    async fn funding_proposal_exists(&self, proposal_id: u64) -> ChainResult<bool> {
        self.inner.funding_proposal_exists(proposal_id).await
    }

    async fn send_value(&self, from: Address, to: Address, value: Wei) -> ChainResult<TxHash> {
        self.inner.send_value(from, to, value).await
    }
}
