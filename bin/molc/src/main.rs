mod config;

use anyhow::{Context, Result};
use clap::Parser;
use molc_chain::{ChainGateway, LocalChain, RpcClient, RpcGateway, SafeGateway};
use molc_database::{InnerDatabase, SafeDatabase};
use molc_service::{ExchangeRate, GovernanceSettings, ServiceContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ChainMode, Config};

#[derive(Debug, Parser)]
#[command(name = "molc", version, about = "Community governance API backed by on-chain contracts")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "molc.toml")]
    config: PathBuf,
}

type Gateways = (Arc<dyn ChainGateway>, Arc<dyn SafeGateway>);

async fn connect(config: &Config) -> Result<Gateways> {
    match config.chain.mode {
        ChainMode::Local => {
            warn!("using the in-process chain, no transactions leave this host");
            let chain = LocalChain::new();
            let gateway: Arc<dyn ChainGateway> = Arc::new(chain.clone());
            let safe: Arc<dyn SafeGateway> = Arc::new(chain);
            Ok((gateway, safe))
        }
        ChainMode::Rpc => {
            let rpc = RpcClient::new(config.rpc_settings())?;
            match rpc.chain_id().await {
                Ok(id) => {
                    if id != config.chain.chain_id {
                        anyhow::bail!("RPC endpoint serves chain {} but {} is configured", id, config.chain.chain_id);
                    }
                }
                Err(e) => warn!(url = %config.chain.rpc_url, error = %e, "could not verify chain id"),
            }
            let gateway: Arc<RpcGateway> = Arc::new(RpcGateway::new(
                rpc,
                config.contracts()?,
                config.safe_deployment()?,
                config.chain.gas_limit,
            ));
            info!(url = %config.chain.rpc_url, chain_id = config.chain.chain_id, "connected to chain");
            let safe: Arc<dyn SafeGateway> = gateway.clone();
            let chain: Arc<dyn ChainGateway> = gateway;
            Ok((chain, safe))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,molc=debug".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let db = InnerDatabase::new(&config.server.db_path)
        .with_context(|| format!("opening database at {}", config.server.db_path.display()))?;
    let (chain, safe) = connect(&config).await?;
    match chain.community_count().await {
        Ok(count) => info!(communities = count, "registry reachable"),
        Err(e) => warn!(error = %e, "could not read the community registry"),
    }

    let rate = ExchangeRate::from_eth_per_usd(config.pricing.eth_per_usd)?;
    let settings = GovernanceSettings {
        default_voting_period_secs: config.governance.default_voting_period_secs,
        max_funding_usd: config.pricing.max_funding_usd,
        nft_contract: config.contracts()?.governance_token,
    };
    info!(wei_per_cent = %rate.wei_per_cent(), max_funding_usd = settings.max_funding_usd, "governance settings loaded");

    let ctx = ServiceContext::new(db, chain, safe, rate, settings);
    molc_net::serve(config.listen_addr()?, ctx).await?;
    Ok(())
}
