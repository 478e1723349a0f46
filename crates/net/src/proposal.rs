use axum::extract::{Query, State};
use axum::Json;
use molc_database::SafeDatabase;
use molc_service::parser::proposal::{Contribution, NewProposal, Proposal, ProposalView};
use molc_service::pricing::deserialize_amount;
use molc_service::{proposal, ServiceContext};
use serde::Deserialize;

use crate::error::{ApiResult, Caller};

#[derive(Deserialize)]
pub struct ProposalIdQuery {
    id: u64,
}

#[derive(Deserialize)]
pub struct CommunityQuery {
    community: u64,
}

#[derive(Deserialize)]
pub struct VoteBody {
    support: bool,
}

#[derive(Deserialize)]
pub struct ContributeBody {
    #[serde(deserialize_with = "deserialize_amount")]
    amount: String,
}

pub async fn create_proposal<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Json(input): Json<NewProposal>,
) -> ApiResult<Proposal> {
    Ok(Json(proposal::create_proposal(&ctx, &user_id, input).await?))
}

pub async fn list_proposals<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<CommunityQuery>,
) -> ApiResult<Vec<ProposalView>> {
    Ok(Json(proposal::list_proposals(&ctx, query.community)?))
}

pub async fn get_proposal<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<ProposalIdQuery>,
) -> ApiResult<ProposalView> {
    Ok(Json(proposal::get_proposal(&ctx, query.id)?))
}

pub async fn vote<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Query(query): Query<ProposalIdQuery>,
    Json(body): Json<VoteBody>,
) -> ApiResult<Proposal> {
    Ok(Json(proposal::vote(&ctx, query.id, &user_id, body.support).await?))
}

pub async fn contribute<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Query(query): Query<ProposalIdQuery>,
    Json(body): Json<ContributeBody>,
) -> ApiResult<Contribution> {
    Ok(Json(proposal::contribute(&ctx, query.id, &user_id, &body.amount).await?))
}

pub async fn list_contributions<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<ProposalIdQuery>,
) -> ApiResult<Vec<Contribution>> {
    Ok(Json(proposal::list_contributions(&ctx, query.id)?))
}

pub async fn execute<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Query(query): Query<ProposalIdQuery>,
) -> ApiResult<Proposal> {
    Ok(Json(proposal::execute(&ctx, query.id, &user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestApp;
    use axum::http::StatusCode;
    use molc_chain::CommunityKind;
    use molc_service::parser::community::NewCommunity;
    use molc_service::parser::proposal::ProposalKind;
    use molc_service::{registry, UsdCents};

    async fn community(app: &TestApp) -> Result<u64, Box<dyn std::error::Error>> {
        app.user("alice", 1)?;
        app.user("bob", 2)?;
        let community = registry::create_community(
            &app.ctx,
            "alice",
            NewCommunity {
                name: "Cedar Lane".into(),
                description: String::new(),
                community_type: CommunityKind::Commercial,
            },
        )
        .await?;
        registry::join_community(&app.ctx, "bob", community.id).await?;
        Ok(community.id)
    }

    fn funding(community_id: u64, amount: &str) -> NewProposal {
        NewProposal {
            community_id,
            kind: ProposalKind::Funding,
            description: "Repave the lane".into(),
            amount: Some(amount.into()),
            options: None,
            voting_period_secs: None,
        }
    }

    #[tokio::test]
    async fn test_funding_bounds() -> Result<(), Box<dyn std::error::Error>> {
        let app = TestApp::new()?;
        let community_id = community(&app).await?;

        for amount in ["0", "-20", "1500000"] {
            let err = create_proposal(State(app.ctx.clone()), Caller("alice".into()), Json(funding(community_id, amount)))
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{}", amount);
        }
        let Json(created) =
            create_proposal(State(app.ctx.clone()), Caller("alice".into()), Json(funding(community_id, "500000"))).await?;
        assert_eq!(created.amount_usd_cents, Some(UsdCents::from_dollars(500_000)));

        let Json(listed) = list_proposals(State(app.ctx.clone()), Query(CommunityQuery { community: community_id })).await?;
        assert_eq!(listed.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_vote_conflicts() -> Result<(), Box<dyn std::error::Error>> {
        let app = TestApp::new()?;
        let community_id = community(&app).await?;
        let Json(created) =
            create_proposal(State(app.ctx.clone()), Caller("alice".into()), Json(funding(community_id, "100"))).await?;

        let query = || Query(ProposalIdQuery { id: created.id });
        let Json(after) = vote(State(app.ctx.clone()), Caller("bob".into()), query(), Json(VoteBody { support: true })).await?;
        assert_eq!(after.votes_for, 1);

        let err = vote(State(app.ctx.clone()), Caller("bob".into()), query(), Json(VoteBody { support: false }))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let Json(view) = get_proposal(State(app.ctx.clone()), query()).await?;
        assert_eq!((view.proposal.votes_for, view.proposal.votes_against), (1, 0));
        assert_eq!(view.voters.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_contribute_then_execute() -> Result<(), Box<dyn std::error::Error>> {
        let app = TestApp::new()?;
        let community_id = community(&app).await?;
        let Json(created) =
            create_proposal(State(app.ctx.clone()), Caller("alice".into()), Json(funding(community_id, "100"))).await?;
        let query = || Query(ProposalIdQuery { id: created.id });

        let err = execute(State(app.ctx.clone()), Caller("alice".into()), query()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        contribute(State(app.ctx.clone()), Caller("bob".into()), query(), Json(ContributeBody { amount: "60".into() })).await?;
        contribute(State(app.ctx.clone()), Caller("alice".into()), query(), Json(ContributeBody { amount: "40".into() }))
            .await?;
        let Json(contributions) = list_contributions(State(app.ctx.clone()), query()).await?;
        assert_eq!(contributions.len(), 2);

        let Json(executed) = execute(State(app.ctx.clone()), Caller("alice".into()), query()).await?;
        assert!(executed.is_executed());
        assert!(executed.execution_tx.is_some());

        let err = execute(State(app.ctx.clone()), Caller("alice".into()), query()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        Ok(())
    }
}
