//! Proposal lifecycle: create, vote, contribute, execute.
//!
//! The store holds the authoritative tallies and received totals. Each
//! change is applied in one transaction and mirrored on-chain; a vote whose
//! mirror call fails is rolled back by a compensating transaction.

use molc_chain::Address;
use molc_database::SafeDatabase;
use tracing::{debug, error, info, warn};

use crate::context::{now_secs, ServiceContext};
use crate::error::{ServiceError, ServiceResult};
use crate::identity::{get_user, require_wallet};
use crate::parser::community::{community_key, Community, COMMUNITIES};
use crate::parser::profile::{User, UNKNOWN_USER, USERS};
use crate::parser::proposal::{
    community_proposal_key, community_proposal_prefix, contribution_key, contribution_prefix, proposal_key, vote_key, vote_prefix,
    Contribution, NewProposal, Proposal, ProposalKind, ProposalStatus, ProposalView, Tally, Vote, VoterSummary,
    COMMUNITY_PROPOSALS, CONTRIBUTIONS, CONTRIBUTION_SEQUENCE, PROPOSALS, PROPOSAL_SEQUENCE, VOTES,
};
use crate::pricing::UsdCents;
use crate::registry::load_community;

pub const INVALID_CONTRIBUTION: &str = "Invalid contribution amount";
pub const ALREADY_EXECUTED: &str = "Proposal already executed";
pub const NOT_REGISTERED_ON_CHAIN: &str = "Voter is not a registered member on-chain";

fn invalid_amount(max_usd: u64) -> ServiceError {
    ServiceError::validation(format!(
        "Invalid amount for funding proposal. Please enter a positive number not exceeding ${}.",
        max_usd
    ))
}

/// Parses a funding target: positive and at most `max_usd` dollars.
pub fn parse_funding_amount(raw: &str, max_usd: u64) -> ServiceResult<UsdCents> {
    match raw.parse::<UsdCents>() {
        Ok(amount) if !amount.is_zero() && amount <= UsdCents::from_dollars(max_usd) => Ok(amount),
        _ => Err(invalid_amount(max_usd)),
    }
}

fn normalize_options(options: Option<Vec<String>>) -> ServiceResult<Vec<String>> {
    let Some(options) = options else {
        return Ok(Vec::new());
    };
    if options.is_empty() {
        return Ok(Vec::new());
    }
    let filled: Vec<String> = options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if filled.len() < 2 {
        return Err(ServiceError::validation("Voting proposals need at least two non-empty options"));
    }
    Ok(filled)
}

fn load_proposal<T: SafeDatabase>(ctx: &ServiceContext<T>, id: u64) -> ServiceResult<Proposal> {
    ctx.db
        .read_json::<Proposal>(&proposal_key(id), PROPOSALS)?
        .ok_or_else(|| ServiceError::not_found(format!("Proposal {} not found", id)))
}

fn member_wallet<T: SafeDatabase>(ctx: &ServiceContext<T>, community: &Community, user_id: &str, action: &str) -> ServiceResult<Address> {
    if !community.is_member(user_id) {
        return Err(ServiceError::forbidden(format!("Only community members can {}", action)));
    }
    require_wallet(&get_user(ctx, user_id)?)
}

pub async fn create_proposal<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    proposer_id: &str,
    input: NewProposal,
) -> ServiceResult<Proposal> {
    let description = input.description.trim().to_string();
    if description.is_empty() {
        return Err(ServiceError::validation("Proposal description is required"));
    }

    let period = input.voting_period_secs.unwrap_or(ctx.settings.default_voting_period_secs);
    if period == 0 {
        return Err(ServiceError::validation("Voting period must be positive"));
    }

    let (amount, options) = match input.kind {
        ProposalKind::Funding => {
            let raw = input.amount.as_deref().unwrap_or_default();
            (Some(parse_funding_amount(raw, ctx.settings.max_funding_usd)?), Vec::new())
        }
        ProposalKind::Voting => (None, normalize_options(input.options)?),
    };

    let community = load_community(ctx, input.community_id)?;
    let wallet = member_wallet(ctx, &community, proposer_id, "create proposals")?;

    let chain_id = match amount {
        Some(amount) => {
            let wei = ctx.rate.usd_cents_to_wei(amount);
            ctx.chain
                .create_funding_proposal(wallet, community.id, &description, wei, period)
                .await?
        }
        None => ctx.chain.create_proposal(wallet, community.id, &description, period).await?,
    };

    let now = now_secs();
    let proposal = ctx.db.transact(|batch| -> ServiceResult<Proposal> {
        let id = batch.next_sequence(PROPOSAL_SEQUENCE)?;
        let proposal = Proposal {
            id,
            community_id: community.id,
            proposer_id: proposer_id.to_string(),
            kind: input.kind,
            description,
            options,
            amount_usd_cents: amount,
            amount_received_usd_cents: UsdCents::ZERO,
            votes_for: 0,
            votes_against: 0,
            status: ProposalStatus::Active,
            chain_proposal_id: Some(chain_id),
            created_at: now,
            updated_at: now,
            voting_end_time: now.saturating_add(period),
            execution_tx: None,
        };
        batch.put_json(PROPOSALS, &proposal_key(id), &proposal)?;
        batch.put_json(COMMUNITY_PROPOSALS, &community_proposal_key(community.id, id), &id)?;
        Ok(proposal)
    })?;

    info!(
        proposal_id = proposal.id,
        chain_proposal_id = chain_id,
        community_id = proposal.community_id,
        kind = ?proposal.kind,
        "proposal created"
    );
    Ok(proposal)
}

fn view<T: SafeDatabase>(ctx: &ServiceContext<T>, mut proposal: Proposal, now: u64) -> ServiceResult<ProposalView> {
    let mut voters = Vec::new();
    for (_, vote) in ctx.db.scan_prefix::<Vote>(&vote_prefix(proposal.id), VOTES)? {
        let name = ctx
            .db
            .read_json::<User>(&vote.user_id, USERS)?
            .map(|u| u.label())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        voters.push(VoterSummary { user_id: vote.user_id, name, support: vote.support });
    }
    proposal.status = proposal.effective_status(now);
    Ok(ProposalView { proposal, voters })
}

pub fn get_proposal<T: SafeDatabase>(ctx: &ServiceContext<T>, id: u64) -> ServiceResult<ProposalView> {
    view(ctx, load_proposal(ctx, id)?, now_secs())
}

pub fn list_proposals<T: SafeDatabase>(ctx: &ServiceContext<T>, community_id: u64) -> ServiceResult<Vec<ProposalView>> {
    load_community(ctx, community_id)?;
    let now = now_secs();

    let mut proposals = Vec::new();
    for (_, id) in ctx.db.scan_prefix::<u64>(&community_proposal_prefix(community_id), COMMUNITY_PROPOSALS)? {
        match ctx.db.read_json::<Proposal>(&proposal_key(id), PROPOSALS)? {
            Some(proposal) => proposals.push(view(ctx, proposal, now)?),
            None => warn!(community_id, proposal_id = id, "indexed proposal is missing"),
        }
    }
    proposals.sort_by(|a, b| {
        b.proposal
            .created_at
            .cmp(&a.proposal.created_at)
            .then(b.proposal.id.cmp(&a.proposal.id))
    });
    Ok(proposals)
}

pub fn tally<T: SafeDatabase>(ctx: &ServiceContext<T>, proposal_id: u64) -> ServiceResult<Tally> {
    Ok(load_proposal(ctx, proposal_id)?.tally())
}

/// Records one vote per member. The vote and its tally increment commit
/// together; a second vote fails with [`ServiceError::AlreadyVoted`] and
/// leaves the tallies untouched.
pub async fn vote<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    proposal_id: u64,
    voter_id: &str,
    support: bool,
) -> ServiceResult<Proposal> {
    let proposal = load_proposal(ctx, proposal_id)?;
    let community = load_community(ctx, proposal.community_id)?;
    let wallet = member_wallet(ctx, &community, voter_id, "vote")?;

    if proposal.is_executed() {
        return Err(ServiceError::conflict(ALREADY_EXECUTED));
    }
    if !proposal.is_open(now_secs()) {
        return Err(ServiceError::validation("Voting period has ended"));
    }
    if proposal.chain_proposal_id.is_some() && !ctx.chain.is_member(community.id, wallet).await? {
        warn!(proposal_id, voter_id, community_id = community.id, "voter is a stored member but not registered on-chain");
        return Err(ServiceError::forbidden(NOT_REGISTERED_ON_CHAIN));
    }

    let key = vote_key(proposal_id, voter_id);
    let updated = ctx.db.transact(|batch| -> ServiceResult<Proposal> {
        if batch.contains(VOTES, &key)? {
            return Err(ServiceError::AlreadyVoted);
        }
        let mut proposal: Proposal = batch
            .get_json(PROPOSALS, &proposal_key(proposal_id))?
            .ok_or_else(|| ServiceError::not_found(format!("Proposal {} not found", proposal_id)))?;
        let now = now_secs();
        let vote = Vote { proposal_id, user_id: voter_id.to_string(), support, cast_at: now };
        batch.put_json(VOTES, &key, &vote)?;
        if support {
            proposal.votes_for += 1;
        } else {
            proposal.votes_against += 1;
        }
        proposal.updated_at = now;
        batch.put_json(PROPOSALS, &proposal_key(proposal_id), &proposal)?;
        Ok(proposal)
    })?;

    if let Some(chain_id) = proposal.chain_proposal_id {
        if let Err(e) = ctx.chain.vote(wallet, chain_id, support).await {
            warn!(proposal_id, voter_id, error = %e, "on-chain vote failed, withdrawing stored vote");
            withdraw_vote(ctx, proposal_id, &key, support)?;
            return Err(e.into());
        }
    }

    debug!(proposal_id, voter_id, support, "vote recorded");
    Ok(updated)
}

fn withdraw_vote<T: SafeDatabase>(ctx: &ServiceContext<T>, proposal_id: u64, key: &str, support: bool) -> ServiceResult<()> {
    ctx.db.transact(|batch| -> ServiceResult<()> {
        if !batch.contains(VOTES, key)? {
            return Ok(());
        }
        batch.delete(VOTES, key);
        if let Some(mut proposal) = batch.get_json::<Proposal>(PROPOSALS, &proposal_key(proposal_id))? {
            if support {
                proposal.votes_for = proposal.votes_for.saturating_sub(1);
            } else {
                proposal.votes_against = proposal.votes_against.saturating_sub(1);
            }
            proposal.updated_at = now_secs();
            batch.put_json(PROPOSALS, &proposal_key(proposal_id), &proposal)?;
        }
        Ok(())
    })
}

/// Sends `amount_usd` worth of ETH from the contributor to the community
/// Safe and adds it to the proposal's received total.
pub async fn contribute<T: SafeDatabase>(
    ctx: &ServiceContext<T>,
    proposal_id: u64,
    contributor_id: &str,
    amount_usd: &str,
) -> ServiceResult<Contribution> {
    let amount = amount_usd
        .parse::<UsdCents>()
        .ok()
        .filter(|a| !a.is_zero())
        .ok_or_else(|| ServiceError::validation(INVALID_CONTRIBUTION))?;

    let proposal = load_proposal(ctx, proposal_id)?;
    if proposal.kind != ProposalKind::Funding {
        return Err(ServiceError::validation("Not a funding proposal"));
    }
    if proposal.is_executed() {
        return Err(ServiceError::conflict(ALREADY_EXECUTED));
    }
    if !proposal.is_open(now_secs()) {
        return Err(ServiceError::validation("Funding period not active"));
    }
    if let Some(chain_id) = proposal.chain_proposal_id {
        if !ctx.chain.funding_proposal_exists(chain_id).await? {
            warn!(proposal_id, chain_id, "funding proposal missing from the fund contract");
            return Err(ServiceError::conflict("Funding proposal is not registered on-chain"));
        }
    }

    let community = load_community(ctx, proposal.community_id)?;
    let safe = community
        .safe_wallet_address
        .ok_or_else(|| ServiceError::validation("Community has no treasury wallet"))?;
    let wallet = require_wallet(&get_user(ctx, contributor_id)?)?;

    let amount_wei = ctx.rate.usd_cents_to_wei(amount);
    let tx_hash = ctx.chain.send_value(wallet, safe, amount_wei).await?;

    let recorded = ctx.db.transact(|batch| -> ServiceResult<Contribution> {
        let mut proposal: Proposal = batch
            .get_json(PROPOSALS, &proposal_key(proposal_id))?
            .ok_or_else(|| ServiceError::not_found(format!("Proposal {} not found", proposal_id)))?;
        proposal.amount_received_usd_cents = proposal
            .amount_received_usd_cents
            .checked_add(amount)
            .ok_or_else(|| ServiceError::validation(INVALID_CONTRIBUTION))?;
        let now = now_secs();
        proposal.updated_at = now;
        batch.put_json(PROPOSALS, &proposal_key(proposal_id), &proposal)?;

        let contribution = Contribution {
            proposal_id,
            user_id: contributor_id.to_string(),
            amount_usd_cents: amount,
            amount_wei,
            tx_hash,
            contributed_at: now,
        };
        let sequence = batch.next_sequence(CONTRIBUTION_SEQUENCE)?;
        batch.put_json(CONTRIBUTIONS, &contribution_key(proposal_id, sequence), &contribution)?;

        let key = community_key(proposal.community_id);
        if let Some(mut community) = batch.get_json::<Community>(COMMUNITIES, &key)? {
            community.fund_balance_wei = community.fund_balance_wei.saturating_add(amount_wei);
            batch.put_json(COMMUNITIES, &key, &community)?;
        }
        Ok(contribution)
    });

    match recorded {
        Ok(contribution) => {
            info!(proposal_id, contributor_id, amount = %amount, ?tx_hash, "contribution received");
            Ok(contribution)
        }
        Err(e) => {
            error!(proposal_id, contributor_id, ?tx_hash, error = %e, "transfer sent but contribution not recorded");
            Err(e)
        }
    }
}

pub fn list_contributions<T: SafeDatabase>(ctx: &ServiceContext<T>, proposal_id: u64) -> ServiceResult<Vec<Contribution>> {
    Ok(ctx
        .db
        .scan_prefix::<Contribution>(&contribution_prefix(proposal_id), CONTRIBUTIONS)?
        .into_iter()
        .map(|(_, c)| c)
        .collect())
}

/// Executes a funded funding proposal, or a voting proposal whose period has
/// ended, on-chain and then marks it executed.
pub async fn execute<T: SafeDatabase>(ctx: &ServiceContext<T>, proposal_id: u64, caller_id: &str) -> ServiceResult<Proposal> {
    let proposal = load_proposal(ctx, proposal_id)?;
    let community = load_community(ctx, proposal.community_id)?;
    let wallet = member_wallet(ctx, &community, caller_id, "execute proposals")?;

    if proposal.is_executed() {
        return Err(ServiceError::conflict(ALREADY_EXECUTED));
    }
    match proposal.kind {
        ProposalKind::Funding if !proposal.is_funded() => {
            return Err(ServiceError::validation("Funding target has not been reached"));
        }
        ProposalKind::Voting if proposal.is_open(now_secs()) => {
            return Err(ServiceError::validation("Voting period has not ended"));
        }
        _ => {}
    }

    let tx_hash = match (proposal.kind, proposal.chain_proposal_id) {
        (ProposalKind::Funding, Some(chain_id)) => Some(ctx.chain.execute_funding(wallet, chain_id).await?),
        (ProposalKind::Voting, Some(chain_id)) => Some(ctx.chain.execute_proposal(wallet, chain_id).await?),
        (_, None) => None,
    };

    let marked = ctx.db.transact(|batch| -> ServiceResult<Proposal> {
        let mut stored: Proposal = batch
            .get_json(PROPOSALS, &proposal_key(proposal_id))?
            .ok_or_else(|| ServiceError::not_found(format!("Proposal {} not found", proposal_id)))?;
        if stored.is_executed() {
            return Err(ServiceError::conflict(ALREADY_EXECUTED));
        }
        stored.status = ProposalStatus::Executed;
        stored.execution_tx = tx_hash;
        stored.updated_at = now_secs();
        batch.put_json(PROPOSALS, &proposal_key(proposal_id), &stored)?;
        Ok(stored)
    });

    match marked {
        Ok(proposal) => {
            info!(proposal_id, caller_id, tx_hash = ?tx_hash, "proposal executed");
            Ok(proposal)
        }
        Err(e) => {
            error!(proposal_id, tx_hash = ?tx_hash, error = %e, "proposal executed on-chain but not marked in store");
            Err(e)
        }
    }
}
