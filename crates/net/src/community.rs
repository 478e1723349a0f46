use axum::extract::{Query, State};
use axum::Json;
use molc_database::SafeDatabase;
use molc_service::parser::community::{Community, CommunityDetails, NewCommunity};
use molc_service::treasury::{self, TransferReceipt, TransferRequest, TreasuryBalance};
use molc_service::{registry, ServiceContext};
use serde::Deserialize;

use crate::error::{ApiResult, Caller};

#[derive(Deserialize)]
pub struct CommunityIdQuery {
    id: u64,
}

#[derive(Deserialize)]
pub struct AddMemberBody {
    user_id: String,
}

pub async fn create_community<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Json(input): Json<NewCommunity>,
) -> ApiResult<Community> {
    Ok(Json(registry::create_community(&ctx, &user_id, input).await?))
}

pub async fn list_communities<T: SafeDatabase>(State(ctx): State<ServiceContext<T>>) -> ApiResult<Vec<Community>> {
    Ok(Json(registry::list_communities(&ctx)?))
}

pub async fn get_community<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<CommunityIdQuery>,
) -> ApiResult<CommunityDetails> {
    Ok(Json(registry::get_community(&ctx, query.id)?))
}

pub async fn my_communities<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
) -> ApiResult<Vec<Community>> {
    Ok(Json(registry::user_communities(&ctx, &user_id)?))
}

pub async fn join_community<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Query(query): Query<CommunityIdQuery>,
) -> ApiResult<Community> {
    Ok(Json(registry::join_community(&ctx, &user_id, query.id).await?))
}

pub async fn leave_community<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Query(query): Query<CommunityIdQuery>,
) -> ApiResult<Community> {
    Ok(Json(registry::leave_community(&ctx, &user_id, query.id).await?))
}

pub async fn add_member<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(admin_id): Caller,
    Query(query): Query<CommunityIdQuery>,
    Json(body): Json<AddMemberBody>,
) -> ApiResult<Community> {
    Ok(Json(registry::add_member(&ctx, &admin_id, query.id, &body.user_id).await?))
}

pub async fn treasury_balance<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<CommunityIdQuery>,
) -> ApiResult<TreasuryBalance> {
    Ok(Json(treasury::treasury_balance(&ctx, query.id).await?))
}

pub async fn transfer_funds<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(admin_id): Caller,
    Query(query): Query<CommunityIdQuery>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<TransferReceipt> {
    Ok(Json(treasury::transfer_funds(&ctx, &admin_id, query.id, request).await?))
}
