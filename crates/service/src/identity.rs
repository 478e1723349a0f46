//! Users and the wallets bound to them.

use molc_chain::Address;
use molc_database::{Batch, SafeDatabase};
use tracing::info;

use crate::context::{now_secs, ServiceContext};
use crate::error::{ServiceError, ServiceResult};
use crate::parser::profile::{wallet_key, User, UserInput, USERS, WALLET_INDEX};

pub const WALLET_NOT_FOUND: &str = "User wallet address not found";

/// Upserts the profile sent on login. Creation time and memberships survive
/// updates; a wallet given here is bound like [`link_wallet`] would.
pub fn create_or_update_user<T: SafeDatabase>(ctx: &ServiceContext<T>, input: UserInput) -> ServiceResult<User> {
    let id = input.id.trim().to_string();
    if id.is_empty() {
        return Err(ServiceError::validation("User id is required"));
    }

    let user = ctx.db.transact(|batch| -> ServiceResult<User> {
        let now = now_secs();
        let existing: Option<User> = batch.get_json(USERS, &id)?;

        let mut user = match existing {
            Some(mut user) => {
                user.email = input.email;
                user.display_name = input.display_name;
                if input.bio.is_some() {
                    user.bio = input.bio;
                }
                user.updated_at = now;
                user
            }
            None => User {
                id: id.clone(),
                email: input.email,
                display_name: input.display_name,
                bio: input.bio,
                wallet_address: None,
                communities: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        };

        if let Some(wallet) = input.wallet_address {
            bind_wallet(batch, &mut user, wallet)?;
        }
        batch.put_json(USERS, &user.id, &user)?;
        Ok(user)
    })?;

    info!(user_id = %user.id, "user profile saved");
    Ok(user)
}

pub fn get_user<T: SafeDatabase>(ctx: &ServiceContext<T>, id: &str) -> ServiceResult<User> {
    ctx.db
        .read_json::<User>(id, USERS)?
        .ok_or_else(|| ServiceError::not_found(format!("User {} not found", id)))
}

pub fn get_user_by_wallet<T: SafeDatabase>(ctx: &ServiceContext<T>, address: &Address) -> ServiceResult<User> {
    let not_found = || ServiceError::not_found(format!("No user with wallet {:?}", address));

    let id = ctx.db.read(&wallet_key(address), WALLET_INDEX)?.ok_or_else(not_found)?;
    let id = String::from_utf8(id).map_err(|_| not_found())?;
    get_user(ctx, &id)
}

/// Attaches `address` to the user. An address already bound to someone else
/// is rejected.
pub fn link_wallet<T: SafeDatabase>(ctx: &ServiceContext<T>, id: &str, address: Address) -> ServiceResult<User> {
    if address.is_zero() {
        return Err(ServiceError::validation("Wallet address cannot be the zero address"));
    }

    let user = ctx.db.transact(|batch| -> ServiceResult<User> {
        let mut user: User = batch
            .get_json(USERS, id)?
            .ok_or_else(|| ServiceError::not_found(format!("User {} not found", id)))?;
        bind_wallet(batch, &mut user, address)?;
        user.updated_at = now_secs();
        batch.put_json(USERS, &user.id, &user)?;
        Ok(user)
    })?;

    info!(user_id = %user.id, wallet = ?address, "wallet linked");
    Ok(user)
}

pub fn require_wallet(user: &User) -> ServiceResult<Address> {
    user.wallet_address.ok_or_else(|| ServiceError::validation(WALLET_NOT_FOUND))
}

fn bind_wallet(batch: &mut Batch<'_>, user: &mut User, wallet: Address) -> ServiceResult<()> {
    let key = wallet_key(&wallet);
    if let Some(owner) = batch.get(WALLET_INDEX, &key)? {
        if owner != user.id.as_bytes() {
            return Err(ServiceError::conflict(format!("Wallet {} is already linked to another user", wallet)));
        }
    }

    if let Some(previous) = user.wallet_address.filter(|w| *w != wallet) {
        batch.delete(WALLET_INDEX, &wallet_key(&previous));
    }
    batch.put(WALLET_INDEX, &key, user.id.as_bytes());
    user.wallet_address = Some(wallet);
    Ok(())
}
