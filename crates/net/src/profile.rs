use axum::extract::{Query, State};
use axum::Json;
use molc_chain::Address;
use molc_database::SafeDatabase;
use molc_service::identity;
use molc_service::parser::profile::{User, UserInput};
use molc_service::ServiceContext;
use serde::Deserialize;

use crate::error::{ApiResult, Caller};

#[derive(Deserialize)]
pub struct UserIdQuery {
    id: String,
}

#[derive(Deserialize)]
pub struct AddressQuery {
    address: Address,
}

#[derive(Deserialize)]
pub struct LinkWalletBody {
    wallet_address: Address,
}

pub async fn save_user<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Json(input): Json<UserInput>,
) -> ApiResult<User> {
    Ok(Json(identity::create_or_update_user(&ctx, input)?))
}

pub async fn get_user_by_id<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<User> {
    Ok(Json(identity::get_user(&ctx, &query.id)?))
}

pub async fn get_user_by_wallet<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Query(query): Query<AddressQuery>,
) -> ApiResult<User> {
    Ok(Json(identity::get_user_by_wallet(&ctx, &query.address)?))
}

pub async fn link_wallet<T: SafeDatabase>(
    State(ctx): State<ServiceContext<T>>,
    Caller(user_id): Caller,
    Json(body): Json<LinkWalletBody>,
) -> ApiResult<User> {
    Ok(Json(identity::link_wallet(&ctx, &user_id, body.wallet_address)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wallet, TestApp};
    use axum::http::StatusCode;

    fn input(id: &str, wallet_address: Option<Address>) -> UserInput {
        UserInput {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            display_name: String::new(),
            bio: Some("hello".to_string()),
            wallet_address,
        }
    }

    #[tokio::test]
    async fn test_save_and_fetch_user() -> Result<(), Box<dyn std::error::Error>> {
        let app = TestApp::new()?;

        let Json(saved) = save_user(State(app.ctx.clone()), Json(input("alice", Some(wallet(1))))).await?;
        assert_eq!(saved.id, "alice");

        let Json(by_id) = get_user_by_id(State(app.ctx.clone()), Query(UserIdQuery { id: "alice".into() })).await?;
        assert_eq!(by_id, saved);

        let Json(by_wallet) =
            get_user_by_wallet(State(app.ctx.clone()), Query(AddressQuery { address: wallet(1) })).await?;
        assert_eq!(by_wallet.id, "alice");
        Ok(())
    }

    #[tokio::test]
    async fn test_link_wallet_conflict() -> Result<(), Box<dyn std::error::Error>> {
        let app = TestApp::new()?;
        save_user(State(app.ctx.clone()), Json(input("alice", Some(wallet(1))))).await?;
        save_user(State(app.ctx.clone()), Json(input("bob", None))).await?;

        let err = link_wallet(
            State(app.ctx.clone()),
            Caller("bob".into()),
            Json(LinkWalletBody { wallet_address: wallet(1) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let Json(bob) = link_wallet(
            State(app.ctx.clone()),
            Caller("bob".into()),
            Json(LinkWalletBody { wallet_address: wallet(2) }),
        )
        .await?;
        assert_eq!(bob.wallet_address, Some(wallet(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let app = TestApp::new()?;
        let err = get_user_by_id(State(app.ctx.clone()), Query(UserIdQuery { id: "nobody".into() }))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}
