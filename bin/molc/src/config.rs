//! `molc.toml` loading. Every field has a default reproducing the Base
//! Sepolia deployment, so an empty file yields a runnable configuration.

use anyhow::{Context, Result};
use molc_chain::{Address, ContractAddresses, SafeDeployment, DEFAULT_GAS_LIMIT};
use molc_service::ExchangeRate;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub chain: ChainSection,
    pub safe: SafeSection,
    pub pricing: PricingSection,
    pub governance: GovernanceSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: String,
    pub db_path: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8080".to_string(), db_path: PathBuf::from("molc_db") }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    #[default]
    Rpc,
    /// In-process chain, nothing leaves the host.
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    pub mode: ChainMode,
    pub rpc_url: String,
    pub chain_id: u64,
    pub gas_limit: u128,
    pub receipt_poll_ms: u64,
    pub receipt_attempts: u32,
    pub request_timeout_secs: u64,
    pub contracts: ContractsSection,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            mode: ChainMode::Rpc,
            rpc_url: "https://sepolia.base.org".to_string(),
            chain_id: 84532,
            gas_limit: DEFAULT_GAS_LIMIT,
            receipt_poll_ms: 1_000,
            receipt_attempts: 60,
            request_timeout_secs: 30,
            contracts: ContractsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContractsSection {
    pub registry: String,
    pub governance_token: String,
    pub voting: String,
    pub fund_management: String,
}

impl Default for ContractsSection {
    fn default() -> Self {
        Self {
            registry: "0x86D6AaCDe1a30D634Ff7A41Acab3540ed62430A7".to_string(),
            governance_token: "0x2D250e173172F0C67763bb70ed4a2C59273856a2".to_string(),
            voting: "0xA7637215687454dA2715905a651B423113d82971".to_string(),
            fund_management: "0x8206E238b2dE3711A005518a0addF9c9e2cf4426".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafeSection {
    pub proxy_factory: String,
    pub singleton: String,
    pub fallback_handler: String,
}

impl Default for SafeSection {
    fn default() -> Self {
        Self {
            proxy_factory: "0xa6B71E26C5e0845f74c812102Ca7114b6a896AB2".to_string(),
            singleton: "0x3E5c63644E683549055b9Be8653de26E0B4CD36E".to_string(),
            fallback_handler: "0xf48f2B2d2a534e402487b3ee7C18c33Aec0Fe5e4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingSection {
    pub eth_per_usd: f64,
    pub max_funding_usd: u64,
}

impl Default for PricingSection {
    fn default() -> Self {
        Self {
            eth_per_usd: molc_service::pricing::DEFAULT_ETH_PER_USD,
            max_funding_usd: molc_service::context::DEFAULT_MAX_FUNDING_USD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceSection {
    pub default_voting_period_secs: u64,
}

impl Default for GovernanceSection {
    fn default() -> Self {
        Self { default_voting_period_secs: molc_service::context::DEFAULT_VOTING_PERIOD_SECS }
    }
}

fn address(field: &str, value: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .map_err(|e| anyhow::anyhow!("invalid address for {}: {} ({})", field, value, e))
}

impl Config {
    /// Reads `path` when it exists, then applies `MOLC_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the service would otherwise misprice or loop on.
    pub fn validate(&self) -> Result<()> {
        ExchangeRate::from_eth_per_usd(self.pricing.eth_per_usd).context("pricing.eth_per_usd")?;
        if self.pricing.max_funding_usd == 0 {
            anyhow::bail!("pricing.max_funding_usd must be positive");
        }
        if self.governance.default_voting_period_secs == 0 {
            anyhow::bail!("governance.default_voting_period_secs must be positive");
        }
        if self.chain.receipt_attempts == 0 {
            anyhow::bail!("chain.receipt_attempts must be positive");
        }
        Ok(())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("MOLC_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(path) = lookup("MOLC_DB_PATH") {
            self.server.db_path = PathBuf::from(path);
        }
        if let Some(listen) = lookup("MOLC_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(mode) = lookup("MOLC_CHAIN_MODE") {
            self.chain.mode = match mode.trim().to_ascii_lowercase().as_str() {
                "rpc" => ChainMode::Rpc,
                "local" => ChainMode::Local,
                other => anyhow::bail!("MOLC_CHAIN_MODE must be rpc or local, got {}", other),
            };
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen
            .parse()
            .with_context(|| format!("invalid listen address {}", self.server.listen))
    }

    pub fn contracts(&self) -> Result<ContractAddresses> {
        let c = &self.chain.contracts;
        Ok(ContractAddresses {
            registry: address("chain.contracts.registry", &c.registry)?,
            governance_token: address("chain.contracts.governance_token", &c.governance_token)?,
            voting: address("chain.contracts.voting", &c.voting)?,
            fund_management: address("chain.contracts.fund_management", &c.fund_management)?,
        })
    }

    pub fn safe_deployment(&self) -> Result<SafeDeployment> {
        Ok(SafeDeployment {
            proxy_factory: address("safe.proxy_factory", &self.safe.proxy_factory)?,
            singleton: address("safe.singleton", &self.safe.singleton)?,
            fallback_handler: address("safe.fallback_handler", &self.safe.fallback_handler)?,
        })
    }

    pub fn rpc_settings(&self) -> molc_chain::RpcSettings {
        molc_chain::RpcSettings {
            url: self.chain.rpc_url.clone(),
            receipt_poll: Duration::from_millis(self.chain.receipt_poll_ms),
            receipt_attempts: self.chain.receipt_attempts,
            request_timeout: Duration::from_secs(self.chain.request_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_deployment_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.chain.mode, ChainMode::Rpc);
        assert_eq!(config.chain.chain_id, 84532);
        assert_eq!(config.chain.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(config.pricing.max_funding_usd, 1_000_000);
        assert_eq!(config.governance.default_voting_period_secs, 604_800);
        assert_eq!(
            config.contracts().unwrap().registry,
            "0x86d6aacde1a30d634ff7a41acab3540ed62430a7".parse().unwrap()
        );
        assert!(config.safe_deployment().is_ok());
        assert!(config.listen_addr().is_ok());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unusable_rates_are_rejected() {
        for rate in ["0.0", "-0.0005", "nan", "inf", "1e30"] {
            let config = Config::parse(&format!("[pricing]\neth_per_usd = {}", rate)).unwrap();
            let err = config.validate().unwrap_err();
            assert!(format!("{:#}", err).contains("pricing.eth_per_usd"), "rate {} accepted", rate);
        }

        let config = Config::parse("[governance]\ndefault_voting_period_secs = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sections_and_overrides() {
        let mut config = Config::parse(
            r#"
            [server]
            listen = "127.0.0.1:9000"

            [chain]
            mode = "local"
            receipt_attempts = 5

            [pricing]
            eth_per_usd = 0.001
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.mode, ChainMode::Local);
        assert_eq!(config.chain.receipt_attempts, 5);
        assert_eq!(config.pricing.eth_per_usd, 0.001);
        assert_eq!(config.server.db_path, PathBuf::from("molc_db"));

        config
            .apply_overrides(|key| match key {
                "MOLC_LISTEN" => Some("127.0.0.1:7000".to_string()),
                "MOLC_CHAIN_MODE" => Some("RPC".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 7000);
        assert_eq!(config.chain.mode, ChainMode::Rpc);

        assert!(config.apply_overrides(|key| (key == "MOLC_CHAIN_MODE").then(|| "mainnet".to_string())).is_err());
    }

    #[test]
    fn test_bad_address_is_reported() {
        let config = Config::parse("[chain.contracts]\nvoting = \"0x1234\"").unwrap();
        let err = config.contracts().unwrap_err();
        assert!(err.to_string().contains("chain.contracts.voting"));
    }
}
