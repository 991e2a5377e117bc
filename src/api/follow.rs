/// Follow request, unfollow, block and search endpoints
use crate::{
    api::ApiResponse,
    auth::AuthContext,
    context::AppContext,
    db::models::AccountSummary,
    error::AppResult,
    relationship::{IncomingRequest, RelationshipStatus, ReviewDecision},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// Build follow routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/follow-requests", get(incoming_requests))
        .route(
            "/follow-requests/:user_id",
            post(send_request).delete(cancel_request),
        )
        .route("/follow-requests/review/:id/:status", patch(review_request))
        .route("/follow-requests/unfollow/:user_id", patch(unfollow))
        .route("/follow-requests/search", get(search))
        .route("/follow-requests/check/:user_id", get(check_status))
        .route("/follow-request/block/:user_id", patch(block))
        .route("/follow-request/unblock/:user_id", patch(unblock))
}

async fn send_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    let outcome = ctx.relationships.request_follow(auth.id(), &user_id).await?;
    Ok(Json(ApiResponse::message(outcome.message())))
}

/// Withdraw the caller's own pending request
async fn cancel_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    ctx.relationships.cancel_request(auth.id(), &user_id).await?;
    Ok(Json(ApiResponse::message("Follow request withdrawn")))
}

async fn incoming_requests(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<ApiResponse<Vec<IncomingRequest>>>> {
    let requests = ctx.relationships.incoming_requests(auth.id()).await?;
    Ok(Json(ApiResponse::data(requests)))
}

async fn review_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, status)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<()>>> {
    let msg = match ctx.relationships.review(&id, auth.id(), &status).await? {
        ReviewDecision::Accepted => "Follow Request Accepted",
        ReviewDecision::Rejected => "Request Rejected & Deleted",
    };
    Ok(Json(ApiResponse::message(msg)))
}

async fn unfollow(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    ctx.relationships.unfollow(auth.id(), &user_id).await?;
    Ok(Json(ApiResponse::message("Unfollow Done")))
}

async fn block(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    let username = ctx.relationships.block(auth.id(), &user_id).await?;
    Ok(Json(ApiResponse::message(format!(
        "User {} blocked successfully",
        username
    ))))
}

async fn unblock(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    ctx.relationships.unblock(auth.id(), &user_id).await?;
    Ok(Json(ApiResponse::message("User unblocked successfully")))
}

async fn search(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<AccountSummary>>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let results = ctx.relationships.search(auth.id(), &query.q, limit).await?;
    Ok(Json(ApiResponse::data(results)))
}

async fn check_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<RelationshipStatus>>> {
    let status = ctx
        .relationships
        .relationship_status(auth.id(), &user_id)
        .await?;
    Ok(Json(ApiResponse::data(status)))
}
