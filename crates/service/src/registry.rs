//! Community records, mirrored against the on-chain registry.
//!
//! Every membership change is submitted on-chain first and only then applied
//! to the store in one transaction, so a rejected call leaves the store
//! untouched.

use molc_chain::Address;
use molc_database::SafeDatabase;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::context::{now_secs, ServiceContext};
use crate::error::{ServiceError, ServiceResult};
use crate::identity::{get_user, require_wallet};
use crate::parser::community::{
    community_key, name_key, Community, CommunityDetails, NewCommunity, COMMUNITIES, COMMUNITY_NAMES,
};
use crate::parser::profile::{User, USERS};

pub const DUPLICATE_NAME: &str = "A community with this name already exists";
const PENDING_NAME: &str = "pending";

pub async fn create_community<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    creator_id: &str,
    input: NewCommunity,
) -> ServiceResult<Community> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::validation("Community name is required"));
    }

    let creator = get_user(ctx, creator_id)?;
    let wallet = require_wallet(&creator)?;

    // held until the record lands so a concurrent create cannot reach the chain
    let reservation = name_key(&name);
    ctx.db.transact(|batch| -> ServiceResult<()> {
        if batch.contains(COMMUNITY_NAMES, &reservation)? {
            return Err(ServiceError::conflict(DUPLICATE_NAME));
        }
        batch.put(COMMUNITY_NAMES, &reservation, PENDING_NAME);
        Ok(())
    })?;

    let created = match ctx.chain.create_community(wallet, &name, input.community_type).await {
        Ok(created) => created,
        Err(e) => {
            release_name(ctx, &reservation);
            return Err(e.into());
        }
    };

    let safe_wallet_address = match ctx.safe.create_wallet(wallet, &[wallet], 1).await {
        Ok(address) => Some(address),
        Err(e) => {
            warn!(community_id = created.id, error = %e, "safe wallet creation failed, continuing without one");
            None
        }
    };

    let mut member_tokens = BTreeMap::new();
    if let Some(token) = created.founder_token {
        member_tokens.insert(creator.id.clone(), token);
    }

    let community = Community {
        id: created.id,
        name,
        community_type: input.community_type,
        description: input.description,
        member_ids: vec![creator.id.clone()],
        admin: creator.id.clone(),
        nft_contract: ctx.settings.nft_contract,
        member_tokens,
        fund_balance_wei: 0,
        safe_wallet_address,
        created_at: now_secs(),
    };

    let recorded = ctx.db.transact(|batch| -> ServiceResult<()> {
        batch.put(COMMUNITY_NAMES, &reservation, community_key(community.id));
        batch.put_json(COMMUNITIES, &community_key(community.id), &community)?;

        let mut user: User = batch.get_json(USERS, &creator.id)?.unwrap_or(creator);
        if !user.communities.contains(&community.id) {
            user.communities.push(community.id);
        }
        batch.put_json(USERS, &user.id, &user)?;
        Ok(())
    });
    if let Err(e) = recorded {
        error!(
            community_id = community.id,
            safe = ?community.safe_wallet_address,
            error = %e,
            "community created on-chain but not recorded"
        );
        release_name(ctx, &reservation);
        return Err(e);
    }

    info!(community_id = community.id, name = %community.name, admin = %community.admin, "community created");
    Ok(community)
}

/// Drops a reservation that never became a community.
fn release_name<T: SafeDatabase>(ctx: &ServiceContext<T>, reservation: &str) {
    let released = ctx.db.transact(|batch| -> ServiceResult<()> {
        if batch.get(COMMUNITY_NAMES, reservation)?.as_deref() == Some(PENDING_NAME.as_bytes()) {
            batch.delete(COMMUNITY_NAMES, reservation);
        }
        Ok(())
    });
    if let Err(e) = released {
        error!(name = reservation, error = %e, "could not release community name reservation");
    }
}

pub fn load_community<T: SafeDatabase>(ctx: &ServiceContext<T>, id: u64) -> ServiceResult<Community> {
    ctx.db
        .read_json::<Community>(&community_key(id), COMMUNITIES)?
        .ok_or_else(|| ServiceError::not_found(format!("Community {} not found", id)))
}

/// Community with member summaries. A failed admin lookup is logged and
/// reported as a missing admin profile.
pub fn get_community<T: SafeDatabase>(ctx: &ServiceContext<T>, id: u64) -> ServiceResult<CommunityDetails> {
    let community = load_community(ctx, id)?;

    let mut members = Vec::with_capacity(community.member_ids.len());
    for member_id in &community.member_ids {
        match ctx.db.read_json::<User>(member_id, USERS)? {
            Some(user) => members.push(user.summary()),
            None => warn!(community_id = id, user_id = %member_id, "member has no profile"),
        }
    }

    let admin_profile = match get_user(ctx, &community.admin) {
        Ok(admin) => Some(admin.summary()),
        Err(e) => {
            warn!(community_id = id, admin = %community.admin, error = %e, "admin lookup failed");
            None
        }
    };

    Ok(CommunityDetails { community, members, admin_profile })
}

pub fn list_communities<T: SafeDatabase>(ctx: &ServiceContext<T>) -> ServiceResult<Vec<Community>> {
    Ok(ctx
        .db
        .scan_prefix::<Community>("", COMMUNITIES)?
        .into_iter()
        .map(|(_, community)| community)
        .collect())
}

pub fn user_communities<T: SafeDatabase>(ctx: &ServiceContext<T>, user_id: &str) -> ServiceResult<Vec<Community>> {
    let user = get_user(ctx, user_id)?;
    let mut communities = Vec::with_capacity(user.communities.len());
    for id in user.communities {
        match ctx.db.read_json::<Community>(&community_key(id), COMMUNITIES)? {
            Some(community) => communities.push(community),
            None => warn!(user_id, community_id = id, "user lists a community that no longer exists"),
        }
    }
    Ok(communities)
}

pub fn is_member<T: SafeDatabase>(ctx: &ServiceContext<T>, community_id: u64, user_id: &str) -> ServiceResult<bool> {
    Ok(load_community(ctx, community_id)?.is_member(user_id))
}

fn admin_wallet<T: SafeDatabase>(ctx: &ServiceContext<T>, community: &Community) -> ServiceResult<Address> {
    let admin = get_user(ctx, &community.admin)?;
    admin
        .wallet_address
        .ok_or_else(|| ServiceError::validation("Community admin wallet address not found"))
}

/// Adds the user to the community. Joining twice returns the community
/// unchanged.
pub async fn join_community<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    user_id: &str,
    community_id: u64,
) -> ServiceResult<Community> {
    let community = load_community(ctx, community_id)?;
    if community.is_member(user_id) {
        return Ok(community);
    }

    let user = get_user(ctx, user_id)?;
    let wallet = require_wallet(&user)?;
    let admin = admin_wallet(ctx, &community)?;

    let token = ctx.chain.add_member(admin, community_id, wallet).await?;

    let community = ctx.db.transact(|batch| -> ServiceResult<Community> {
        let key = community_key(community_id);
        let mut community: Community = batch
            .get_json(COMMUNITIES, &key)?
            .ok_or_else(|| ServiceError::not_found(format!("Community {} not found", community_id)))?;
        if community.is_member(user_id) {
            return Ok(community);
        }
        community.member_ids.push(user_id.to_string());
        if let Some(token) = token {
            community.member_tokens.insert(user_id.to_string(), token);
        }
        batch.put_json(COMMUNITIES, &key, &community)?;

        let mut user: User = batch.get_json(USERS, user_id)?.unwrap_or(user);
        if !user.communities.contains(&community_id) {
            user.communities.push(community_id);
        }
        batch.put_json(USERS, user_id, &user)?;
        Ok(community)
    })?;

    info!(community_id, user_id, token = ?token, "member joined");
    Ok(community)
}

/// Admin-only variant of [`join_community`] acting on another user.
pub async fn add_member<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    admin_id: &str,
    community_id: u64,
    user_id: &str,
) -> ServiceResult<Community> {
    let community = load_community(ctx, community_id)?;
    if !community.is_admin(admin_id) {
        return Err(ServiceError::forbidden("Only the community admin can add members"));
    }
    join_community(ctx, user_id, community_id).await
}

/// Logs when the stored membership token no longer matches the chain. The
/// registry burns whatever token it holds for the wallet regardless.
async fn check_member_token<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    community_id: u64,
    user_id: &str,
    token: u64,
    wallet: Address,
) {
    let owner = ctx.chain.owner_of(token).await;
    let token_community = ctx.chain.token_community(token).await;
    match (owner, token_community) {
        (Ok(owner), Ok(id)) if owner == wallet && id == community_id => {}
        (Ok(owner), Ok(id)) => {
            warn!(community_id, user_id, token, ?owner, token_community = id, "stored membership token does not match the chain")
        }
        (Err(e), _) | (_, Err(e)) => warn!(community_id, user_id, token, error = %e, "membership token lookup failed"),
    }
}

pub async fn leave_community<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    user_id: &str,
    community_id: u64,
) -> ServiceResult<Community> {
    let community = load_community(ctx, community_id)?;
    if !community.is_member(user_id) {
        return Err(ServiceError::forbidden("User is not a member of this community"));
    }
    if community.is_admin(user_id) {
        return Err(ServiceError::forbidden("The community admin cannot leave the community"));
    }

    let user = get_user(ctx, user_id)?;
    let wallet = require_wallet(&user)?;
    let admin = admin_wallet(ctx, &community)?;

    if let Some(token) = community.member_tokens.get(user_id).copied() {
        check_member_token(ctx, community_id, user_id, token, wallet).await;
    }
    ctx.chain.remove_member(admin, community_id, wallet).await?;

    let community = ctx.db.transact(|batch| -> ServiceResult<Community> {
        let key = community_key(community_id);
        let mut community: Community = batch
            .get_json(COMMUNITIES, &key)?
            .ok_or_else(|| ServiceError::not_found(format!("Community {} not found", community_id)))?;
        community.member_ids.retain(|m| m != user_id);
        community.member_tokens.remove(user_id);
        batch.put_json(COMMUNITIES, &key, &community)?;

        let mut user: User = batch.get_json(USERS, user_id)?.unwrap_or(user);
        user.communities.retain(|c| *c != community_id);
        batch.put_json(USERS, user_id, &user)?;
        Ok(community)
    })?;

    info!(community_id, user_id, "member left");
    Ok(community)
}
