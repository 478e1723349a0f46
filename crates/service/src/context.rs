use molc_chain::{Address, ChainGateway, SafeGateway};
use molc_database::SafeDatabase;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pricing::ExchangeRate;

pub const DEFAULT_VOTING_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_MAX_FUNDING_USD: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct GovernanceSettings {
    pub default_voting_period_secs: u64,
    pub max_funding_usd: u64,
    /// Address of the governance NFT recorded on each community.
    pub nft_contract: Address,
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            default_voting_period_secs: DEFAULT_VOTING_PERIOD_SECS,
            max_funding_usd: DEFAULT_MAX_FUNDING_USD,
            nft_contract: Address::zero(),
        }
    }
}

/// Everything a service operation needs, passed explicitly per request.
#[derive(Clone)]
pub struct ServiceContext<T: SafeDatabase> {
    pub db: T,
    pub chain: Arc<dyn ChainGateway>,
    pub safe: Arc<dyn SafeGateway>,
    pub rate: ExchangeRate,
    pub settings: GovernanceSettings,
}

impl<T: SafeDatabase> ServiceContext<T> {
    pub fn new(
        db: T,
        chain: Arc<dyn ChainGateway>,
        safe: Arc<dyn SafeGateway>,
        rate: ExchangeRate,
        settings: GovernanceSettings,
    ) -> Self {
        Self { db, chain, safe, rate, settings }
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
