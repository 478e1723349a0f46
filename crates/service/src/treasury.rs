use molc_chain::{gateway::validate_threshold, Address, TxHash, Wei};
use molc_database::SafeDatabase;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::context::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::identity::{get_user, require_wallet};
use crate::parser::community::{community_key, Community, COMMUNITIES};
use crate::parser::profile::{User, USERS};
use crate::pricing::{deserialize_amount, UsdCents};
use crate::registry::load_community;

#[derive(Debug, Clone, Serialize)]
pub struct TreasuryBalance {
    pub community_id: u64,
    pub safe_wallet_address: Option<Address>,
    pub balance_wei: Option<Wei>,
    pub balance_usd_cents: Option<UsdCents>,
    /// Contributions minus transfers as recorded by this service.
    pub recorded_fund_balance_wei: Wei,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub recipient: Address,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub community_id: u64,
    pub safe_wallet_address: Address,
    pub recipient: Address,
    pub amount_usd_cents: UsdCents,
    pub amount_wei: Wei,
    pub tx_hash: TxHash,
}

/// Majority of `owners`, at least one.
pub fn majority_threshold(owners: usize) -> u64 {
    (owners as u64).div_ceil(2).max(1)
}

pub async fn provision_safe<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    from: Address,
    owners: &[Address],
    threshold: u64,
) -> ServiceResult<Address> {
    validate_threshold(owners, threshold).map_err(|e| ServiceError::validation(e.to_string()))?;
    let address = ctx.safe.create_wallet(from, owners, threshold).await?;
    info!(safe = ?address, owners = owners.len(), threshold, "treasury provisioned");
    Ok(address)
}

pub async fn treasury_balance<T: SafeDatabase>(ctx: &ServiceContext<T>, community_id: u64) -> ServiceResult<TreasuryBalance> {
    let community = load_community(ctx, community_id)?;

    let balance_wei = match community.safe_wallet_address {
        Some(safe) => Some(ctx.safe.safe_balance(safe).await?),
        None => {
            warn!(community_id, "community has no safe wallet address");
            None
        }
    };

    Ok(TreasuryBalance {
        community_id,
        safe_wallet_address: community.safe_wallet_address,
        balance_wei,
        balance_usd_cents: balance_wei.map(|wei| ctx.rate.wei_to_usd_cents(wei)),
        recorded_fund_balance_wei: community.fund_balance_wei,
    })
}

/// Sends `amount` USD worth of ETH from the community Safe. Creates the Safe
/// for the current members first when the community has none and a single
/// signature can still operate it.
pub async fn transfer_funds<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    admin_id: &str,
    community_id: u64,
    request: TransferRequest,
) -> ServiceResult<TransferReceipt> {
    let community = load_community(ctx, community_id)?;
    if !community.is_admin(admin_id) {
        return Err(ServiceError::forbidden("Only the community admin can transfer funds"));
    }
    if request.recipient.is_zero() {
        return Err(ServiceError::validation("Recipient address is required"));
    }
    let amount: UsdCents = request
        .amount
        .parse()
        .ok()
        .filter(|a: &UsdCents| !a.is_zero())
        .ok_or_else(|| ServiceError::validation("Invalid transfer amount"))?;

    let admin_wallet = require_wallet(&get_user(ctx, admin_id)?)?;
    let safe = match community.safe_wallet_address {
        Some(safe) => safe,
        None => ensure_safe(ctx, &community, admin_wallet).await?,
    };

    let amount_wei = ctx.rate.usd_cents_to_wei(amount);
    let tx_hash = ctx.safe.transfer(admin_wallet, safe, request.recipient, amount_wei).await?;

    let recorded = ctx.db.transact(|batch| -> ServiceResult<()> {
        let key = community_key(community_id);
        let mut community: Community = batch
            .get_json(COMMUNITIES, &key)?
            .ok_or_else(|| ServiceError::not_found(format!("Community {} not found", community_id)))?;
        community.fund_balance_wei = community.fund_balance_wei.saturating_sub(amount_wei);
        batch.put_json(COMMUNITIES, &key, &community)?;
        Ok(())
    });
    if let Err(e) = recorded {
        error!(community_id, ?tx_hash, error = %e, "transfer executed but fund balance not updated");
        return Err(e);
    }

    info!(community_id, ?safe, recipient = ?request.recipient, amount = %amount, ?tx_hash, "treasury transfer executed");
    Ok(TransferReceipt {
        community_id,
        safe_wallet_address: safe,
        recipient: request.recipient,
        amount_usd_cents: amount,
        amount_wei,
        tx_hash,
    })
}

/// Creates and records a Safe for the registered members' wallets. Refused
/// when the majority threshold exceeds one: transfers carry only the
/// admin's signature and could never execute.
async fn ensure_safe<T: SafeDatabase>(ctx: &ServiceContext<T>, community: &Community, from: Address) -> ServiceResult<Address> {
    let registered = ctx.chain.community_members(community.id).await?;
    let mut owners = Vec::with_capacity(community.member_ids.len());
    for member_id in &community.member_ids {
        match ctx.db.read_json::<User>(member_id, USERS)?.and_then(|u| u.wallet_address) {
            Some(wallet) if !registered.contains(&wallet) => {
                warn!(community_id = community.id, user_id = %member_id, "member not registered on-chain left out of safe owners")
            }
            Some(wallet) if !owners.contains(&wallet) => owners.push(wallet),
            Some(_) => {}
            None => warn!(community_id = community.id, user_id = %member_id, "member without wallet left out of safe owners"),
        }
    }

    let threshold = majority_threshold(owners.len());
    if threshold > 1 {
        warn!(community_id = community.id, owners = owners.len(), threshold, "treasury would need more than one signature");
        return Err(ServiceError::conflict(format!(
            "Community {} has no treasury wallet and a new one would need {} signatures per transfer",
            community.id, threshold
        )));
    }

    let created = provision_safe(ctx, from, &owners, threshold).await?;

    ctx.db.transact(|batch| -> ServiceResult<Address> {
        let key = community_key(community.id);
        let mut stored: Community = batch
            .get_json(COMMUNITIES, &key)?
            .ok_or_else(|| ServiceError::not_found(format!("Community {} not found", community.id)))?;
        if let Some(existing) = stored.safe_wallet_address {
            return Ok(existing);
        }
        stored.safe_wallet_address = Some(created);
        batch.put_json(COMMUNITIES, &key, &stored)?;
        Ok(created)
    })
}
