use async_trait::async_trait;
use ethers::abi::{decode, ParamType, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionReceipt, TransactionRequest};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::contracts::{self, fund, nft, registry, safe, voting, ContractAddresses};
use crate::contracts::registry::CommunityKind;
use crate::contracts::safe::SafeDeployment;
use crate::error::{ChainError, ChainResult};
use crate::rpc::RpcClient;
use crate::types::{id_from_u256, Address, TxHash, Wei};

/// Gas limit used for every contract transaction.
pub const DEFAULT_GAS_LIMIT: u128 = 500_000;

/// Result of `createCommunity`: the new id and the founder's membership token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedCommunity {
    pub id: u64,
    pub founder_token: Option<u64>,
}

/// Entry points of the four governance contracts plus native transfers.
/// Transactions are sent from `from`, which the signing endpoint must control.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn create_community(&self, from: Address, name: &str, kind: CommunityKind) -> ChainResult<CreatedCommunity>;

    /// Adds `member` and returns the membership token minted for it, if seen.
    async fn add_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<Option<u64>>;

    /// Removes `member`; the registry burns its membership token.
    async fn remove_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<()>;

    async fn is_member(&self, community_id: u64, member: Address) -> ChainResult<bool>;

    async fn community_members(&self, community_id: u64) -> ChainResult<Vec<Address>>;

    async fn community_count(&self) -> ChainResult<u64>;

    async fn owner_of(&self, token_id: u64) -> ChainResult<Address>;

    async fn token_community(&self, token_id: u64) -> ChainResult<u64>;

    async fn create_proposal(&self, from: Address, community_id: u64, description: &str, voting_period_secs: u64) -> ChainResult<u64>;

    async fn vote(&self, from: Address, proposal_id: u64, support: bool) -> ChainResult<TxHash>;

    async fn execute_proposal(&self, from: Address, proposal_id: u64) -> ChainResult<TxHash>;

    async fn create_funding_proposal(
        &self,
        from: Address,
        community_id: u64,
        description: &str,
        amount: Wei,
        voting_period_secs: u64,
    ) -> ChainResult<u64>;

    async fn contribute(&self, from: Address, proposal_id: u64, value: Wei) -> ChainResult<TxHash>;

    async fn execute_funding(&self, from: Address, proposal_id: u64) -> ChainResult<TxHash>;

    async fn funding_proposal_exists(&self, proposal_id: u64) -> ChainResult<bool>;

    async fn send_value(&self, from: Address, to: Address, value: Wei) -> ChainResult<TxHash>;
}

/// Multisig treasury operations.
#[async_trait]
pub trait SafeGateway: Send + Sync {
    async fn create_wallet(&self, from: Address, owners: &[Address], threshold: u64) -> ChainResult<Address>;

    async fn safe_balance(&self, wallet: Address) -> ChainResult<Wei>;

    /// Single-recipient transfer signed by `from`, which must own the Safe.
    async fn transfer(&self, from: Address, wallet: Address, to: Address, value: Wei) -> ChainResult<TxHash>;
}

/// Gateway over a node that signs for the users' wallets.
#[derive(Clone)]
pub struct RpcGateway {
    rpc: RpcClient,
    contracts: ContractAddresses,
    safe: SafeDeployment,
    gas_limit: u128,
}

impl RpcGateway {
    pub fn new(rpc: RpcClient, contracts: ContractAddresses, safe: SafeDeployment, gas_limit: u128) -> Self {
        Self { rpc, contracts, safe, gas_limit }
    }

    fn request(&self, from: Option<Address>, to: Address, data: Vec<u8>, value: Wei) -> TypedTransaction {
        build_request(from, to, data, value, self.gas_limit)
    }

    async fn send(&self, from: Address, to: Address, data: Vec<u8>, value: Wei) -> ChainResult<TransactionReceipt> {
        self.rpc.transact(self.request(Some(from), to, data, value)).await
    }

    async fn view(&self, to: Address, data: Vec<u8>, kind: ParamType) -> ChainResult<Token> {
        let output = self.rpc.call(&self.request(None, to, data, 0)).await?;
        decode(&[kind], &output)?
            .pop()
            .ok_or_else(|| ChainError::Decode("empty return data".to_string()))
    }
}

fn build_request(from: Option<Address>, to: Address, data: Vec<u8>, value: Wei, gas_limit: u128) -> TypedTransaction {
    let mut tx = TransactionRequest::new().to(to).data(data).value(value).gas(gas_limit);
    if let Some(from) = from {
        tx = tx.from(from);
    }
    tx.into()
}

fn unexpected(kind: &str) -> ChainError {
    ChainError::Decode(format!("return value is not {}", kind))
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn create_community(&self, from: Address, name: &str, kind: CommunityKind) -> ChainResult<CreatedCommunity> {
        let receipt = self.send(from, self.contracts.registry, registry::create_community(name, kind), 0).await?;
        let id = contracts::created_id(&receipt, &self.contracts.registry, registry::COMMUNITY_CREATED)?;
        let founder_token = nft::minted_token_id(&receipt, &self.contracts.governance_token);
        info!(community_id = id, tx_hash = ?receipt.transaction_hash, "community created on-chain");
        Ok(CreatedCommunity { id, founder_token })
    }

    async fn add_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<Option<u64>> {
        let receipt = self.send(from, self.contracts.registry, registry::add_member(community_id, member), 0).await?;
        let token_id = nft::minted_token_id(&receipt, &self.contracts.governance_token);
        if token_id.is_none() {
            warn!(community_id, ?member, "member added without a visible token mint");
        }
        info!(community_id, ?member, tx_hash = ?receipt.transaction_hash, "member added on-chain");
        Ok(token_id)
    }

    async fn remove_member(&self, from: Address, community_id: u64, member: Address) -> ChainResult<()> {
        let receipt = self.send(from, self.contracts.registry, registry::remove_member(community_id, member), 0).await?;
        info!(community_id, ?member, tx_hash = ?receipt.transaction_hash, "member removed on-chain");
        Ok(())
    }

    async fn is_member(&self, community_id: u64, member: Address) -> ChainResult<bool> {
        self.view(self.contracts.registry, registry::is_member(community_id, member), ParamType::Bool)
            .await?
            .into_bool()
            .ok_or_else(|| unexpected("a bool"))
    }

    async fn community_members(&self, community_id: u64) -> ChainResult<Vec<Address>> {
        let kind = ParamType::Array(Box::new(ParamType::Address));
        self.view(self.contracts.registry, registry::community_members(community_id), kind)
            .await?
            .into_array()
            .ok_or_else(|| unexpected("an address array"))?
            .into_iter()
            .map(|token| token.into_address().ok_or_else(|| unexpected("an address")))
            .collect()
    }

    async fn community_count(&self) -> ChainResult<u64> {
        let count = self.view(self.contracts.registry, registry::community_count(), ParamType::Uint(256))
            .await?
            .into_uint()
            .ok_or_else(|| unexpected("a uint"))?;
        id_from_u256(count)
    }

    async fn owner_of(&self, token_id: u64) -> ChainResult<Address> {
        self.view(self.contracts.governance_token, nft::owner_of(token_id), ParamType::Address)
            .await?
            .into_address()
            .ok_or_else(|| unexpected("an address"))
    }

    async fn token_community(&self, token_id: u64) -> ChainResult<u64> {
        let id = self.view(self.contracts.governance_token, nft::token_community(token_id), ParamType::Uint(256))
            .await?
            .into_uint()
            .ok_or_else(|| unexpected("a uint"))?;
        id_from_u256(id)
    }

    async fn create_proposal(&self, from: Address, community_id: u64, description: &str, voting_period_secs: u64) -> ChainResult<u64> {
        let data = voting::create_proposal(community_id, description, voting_period_secs);
        let receipt = self.send(from, self.contracts.voting, data, 0).await?;
        let id = contracts::created_id(&receipt, &self.contracts.voting, voting::PROPOSAL_CREATED)?;
        info!(community_id, proposal_id = id, tx_hash = ?receipt.transaction_hash, "voting proposal created on-chain");
        Ok(id)
    }

    async fn vote(&self, from: Address, proposal_id: u64, support: bool) -> ChainResult<TxHash> {
        let receipt = self.send(from, self.contracts.voting, voting::vote(proposal_id, support), 0).await?;
        Ok(receipt.transaction_hash)
    }

    async fn execute_proposal(&self, from: Address, proposal_id: u64) -> ChainResult<TxHash> {
        let receipt = self.send(from, self.contracts.voting, voting::execute_proposal(proposal_id), 0).await?;
        Ok(receipt.transaction_hash)
    }

    async fn create_funding_proposal(
        &self,
        from: Address,
        community_id: u64,
        description: &str,
        amount: Wei,
        voting_period_secs: u64,
    ) -> ChainResult<u64> {
        let data = fund::create_funding_proposal(community_id, description, amount, voting_period_secs);
        let receipt = self.send(from, self.contracts.fund_management, data, 0).await?;
        let id = contracts::created_id(&receipt, &self.contracts.fund_management, fund::FUNDING_PROPOSAL_CREATED)?;
        info!(community_id, proposal_id = id, tx_hash = ?receipt.transaction_hash, "funding proposal created on-chain");
        Ok(id)
    }

    async fn contribute(&self, from: Address, proposal_id: u64, value: Wei) -> ChainResult<TxHash> {
        let receipt = self.send(from, self.contracts.fund_management, fund::contribute_funds(proposal_id), value).await?;
        Ok(receipt.transaction_hash)
    }

    async fn execute_funding(&self, from: Address, proposal_id: u64) -> ChainResult<TxHash> {
        let receipt = self.send(from, self.contracts.fund_management, fund::execute_proposal(proposal_id), 0).await?;
        Ok(receipt.transaction_hash)
    }

    async fn funding_proposal_exists(&self, proposal_id: u64) -> ChainResult<bool> {
        self.view(self.contracts.fund_management, fund::proposal_exists(proposal_id), ParamType::Bool)
            .await?
            .into_bool()
            .ok_or_else(|| unexpected("a bool"))
    }

    async fn send_value(&self, from: Address, to: Address, value: Wei) -> ChainResult<TxHash> {
        let receipt = self.send(from, to, Vec::new(), value).await?;
        info!(?from, ?to, value = %value, tx_hash = ?receipt.transaction_hash, "value transferred");
        Ok(receipt.transaction_hash)
    }
}

#[async_trait]
impl SafeGateway for RpcGateway {
    async fn create_wallet(&self, from: Address, owners: &[Address], threshold: u64) -> ChainResult<Address> {
        validate_threshold(owners, threshold)?;

        let salt_nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let initializer = safe::setup_initializer(owners, threshold, self.safe.fallback_handler);
        let data = safe::create_proxy_with_nonce(self.safe.singleton, initializer, salt_nonce);

        let receipt = self.send(from, self.safe.proxy_factory, data, 0).await?;
        let topic = crate::abi::event_topic(safe::PROXY_CREATION);
        let log = contracts::find_log(&receipt, &self.safe.proxy_factory, topic)
            .ok_or(ChainError::MissingEvent(safe::PROXY_CREATION))?;
        let address = contracts::first_address_arg(log)?;

        info!(safe = ?address, owners = owners.len(), threshold, "safe wallet deployed");
        Ok(address)
    }

    async fn safe_balance(&self, wallet: Address) -> ChainResult<Wei> {
        self.rpc.get_balance(wallet).await
    }

    async fn transfer(&self, from: Address, wallet: Address, to: Address, value: Wei) -> ChainResult<TxHash> {
        let receipt = self.send(from, wallet, safe::exec_transfer(to, value, from), 0).await?;
        info!(safe = ?wallet, ?to, value = %value, tx_hash = ?receipt.transaction_hash, "safe transfer executed");
        Ok(receipt.transaction_hash)
    }
}

pub fn validate_threshold(owners: &[Address], threshold: u64) -> ChainResult<()> {
    if owners.is_empty() {
        return Err(ChainError::InvalidArgument("a safe needs at least one owner".to_string()));
    }
    if threshold == 0 || threshold > owners.len() as u64 {
        return Err(ChainError::InvalidArgument(format!(
            "threshold {} must be between 1 and {}",
            threshold,
            owners.len()
        )));
    }
    Ok(())
}
