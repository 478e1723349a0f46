use axum::{http, Json, Router};
use molc_database::SafeDatabase;
use molc_service::ServiceContext;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::community::*;
use crate::profile::*;
use crate::proposal::*;
use crate::router::*;

pub fn build_app<T: SafeDatabase>(ctx: ServiceContext<T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false);

    main_router(collect_components::<T>(), ctx)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn serve<T: SafeDatabase>(listen: SocketAddr, ctx: ServiceContext<T>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(address = %listener.local_addr()?, "molc api listening");
    axum::serve(listener, build_app(ctx)).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn collect_components<T: SafeDatabase>() -> Vec<(String, Router<ServiceContext<T>>)> {
    vec![
        get_router_builder("/health", health),
        // users
        post_router_builder("/api/users", save_user::<T>),
        get_router_builder("/api/users", get_user_by_id::<T>),
        get_router_builder("/api/users/by-wallet", get_user_by_wallet::<T>),
        post_router_builder("/api/users/wallet", link_wallet::<T>),
        // communities
        post_router_builder("/api/communities", create_community::<T>),
        get_router_builder("/api/communities", list_communities::<T>),
        get_router_builder("/api/communities/mine", my_communities::<T>),
        get_router_builder("/api/community", get_community::<T>),
        post_router_builder("/api/community/join", join_community::<T>),
        post_router_builder("/api/community/leave", leave_community::<T>),
        post_router_builder("/api/community/members", add_member::<T>),
        get_router_builder("/api/community/treasury", treasury_balance::<T>),
        post_router_builder("/api/community/treasury/transfer", transfer_funds::<T>),
        // proposals
        post_router_builder("/api/proposals", create_proposal::<T>),
        get_router_builder("/api/proposals", list_proposals::<T>),
        get_router_builder("/api/proposal", get_proposal::<T>),
        post_router_builder("/api/proposal/vote", vote::<T>),
        post_router_builder("/api/proposal/contribute", contribute::<T>),
        get_router_builder("/api/proposal/contributions", list_contributions::<T>),
        post_router_builder("/api/proposal/execute", execute::<T>),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CALLER_HEADER;
    use crate::testing::TestApp;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value), Box<dyn std::error::Error>> {
        let response = app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, body))
    }

    fn post(uri: &str, caller: Option<&str>, body: Value) -> Result<Request<Body>, http::Error> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(caller) = caller {
            builder = builder.header(CALLER_HEADER, caller);
        }
        builder.body(Body::from(body.to_string()))
    }

    fn get(uri: &str) -> Result<Request<Body>, http::Error> {
        Request::builder().uri(uri).body(Body::empty())
    }

    #[tokio::test]
    async fn test_health() -> Result<(), Box<dyn std::error::Error>> {
        let app = build_app(TestApp::new()?.ctx);
        let (status, body) = send(&app, get("/health")?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_governance_flow_over_http() -> Result<(), Box<dyn std::error::Error>> {
        let env = TestApp::new()?;
        let app = build_app(env.ctx.clone());

        for (id, wallet) in [("alice", "0x0101010101010101010101010101010101010101"), ("bob", "0x0202020202020202020202020202020202020202")] {
            let (status, _) = send(
                &app,
                post("/api/users", None, json!({ "id": id, "email": format!("{}@example.com", id), "wallet_address": wallet }))?,
            )
            .await?;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, _) = send(
            &app,
            post("/api/communities", None, json!({ "name": "Oak Row", "community_type": "residential" }))?,
        )
        .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, community) = send(
            &app,
            post("/api/communities", Some("alice"), json!({ "name": "Oak Row", "community_type": "residential" }))?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let community_id = community["id"].as_u64().ok_or("community id")?;

        let (status, _) = send(&app, post(&format!("/api/community/join?id={}", community_id), Some("bob"), json!({}))?).await?;
        assert_eq!(status, StatusCode::OK);

        let (_, details) = send(&app, get(&format!("/api/community?id={}", community_id))?).await?;
        assert_eq!(details["members"].as_array().map(Vec::len), Some(2));

        let (status, proposal) = send(
            &app,
            post(
                "/api/proposals",
                Some("alice"),
                json!({ "community_id": community_id, "kind": "funding", "description": "Fence", "amount": 250 }),
            )?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let proposal_id = proposal["id"].as_u64().ok_or("proposal id")?;

        let vote_uri = format!("/api/proposal/vote?id={}", proposal_id);
        let (status, _) = send(&app, post(&vote_uri, Some("bob"), json!({ "support": true }))?).await?;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, post(&vote_uri, Some("bob"), json!({ "support": true }))?).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "User has already voted on this proposal");

        let (_, listed) = send(&app, get(&format!("/api/proposals?community={}", community_id))?).await?;
        assert_eq!(listed[0]["votes_for"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_ids_map_to_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let app = build_app(TestApp::new()?.ctx);
        let (status, body) = send(&app, get("/api/community?id=42")?).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        let (status, _) = send(&app, get("/api/proposal?id=7")?).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        Ok(())
    }
}
