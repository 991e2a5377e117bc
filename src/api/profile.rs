/// Profile endpoints
use crate::{
    account::{PrivacyRequest, ProfilePictureRequest, ProfileView, UpdateProfileRequest},
    api::{ApiResponse, AppJson},
    auth::AuthContext,
    context::AppContext,
    db::models::{Account, AccountSummary},
    error::{AppError, AppResult},
    relationship::{can_view, is_blocked_between},
    validation::validate_request,
};
use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;

/// What a viewer who may not see the content gets: identity and counts only
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCard {
    #[serde(flatten)]
    pub account: AccountSummary,
    pub bio: Option<String>,
    pub followers_count: usize,
    pub following_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProfileResponse {
    Full(ProfileView),
    Card(ProfileCard),
}

/// Build profile routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/profile/:user_id", get(get_profile).patch(update_profile))
        .route("/profile/:user_id/profile-picture", patch(update_profile_picture))
        .route("/profile/:user_id/privacy", patch(update_privacy))
}

/// Full profile of `account` with its relationship lists and posts
pub(crate) async fn profile_view(
    ctx: &AppContext,
    account: Account,
    is_owner: bool,
) -> AppResult<ProfileView> {
    let relations = ctx.relationships.relations(&account.id).await?;
    let posts = ctx.posts.list_by_author(&account.id).await?;

    Ok(ProfileView::new(account, relations, posts, is_owner))
}

fn ensure_self(auth: &AuthContext, user_id: &str) -> AppResult<()> {
    if auth.id() != user_id {
        return Err(AppError::Authorization(
            "Invalid Operation / Access Denied".to_string(),
        ));
    }
    Ok(())
}

async fn get_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<ProfileResponse>>> {
    if auth.id() == user_id {
        let profile = profile_view(&ctx, auth.account, true).await?;
        return Ok(Json(ApiResponse::data(ProfileResponse::Full(profile))));
    }

    let account = ctx.account_manager.get_account(&user_id).await?;
    let viewer = ctx.relationships.relations(auth.id()).await?;
    let owner = ctx.relationships.relations(&user_id).await?;

    // Blocked accounts do not exist for each other
    if is_blocked_between(&viewer, &owner) {
        return Err(AppError::NotFound("User does not exist".to_string()));
    }

    if can_view(&viewer, &owner) {
        let posts = ctx.posts.list_by_author(&user_id).await?;
        let profile = ProfileView::new(account, owner, posts, false);
        return Ok(Json(ApiResponse::data(ProfileResponse::Full(profile))));
    }

    let card = ProfileCard {
        account: AccountSummary {
            id: account.id,
            username: account.username,
            first_name: account.first_name,
            last_name: account.last_name,
            profile_picture: account.profile_picture,
            is_private: account.is_private,
        },
        bio: account.bio,
        followers_count: owner.followers.len(),
        following_count: owner.following.len(),
    };

    Ok(Json(ApiResponse::data(ProfileResponse::Card(card))))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<ProfileView>>> {
    ensure_self(&auth, &user_id)?;
    validate_request(&req)?;

    let account = ctx
        .account_manager
        .update_profile(auth.id(), req.first_name, req.last_name, req.bio)
        .await?;
    let profile = profile_view(&ctx, account, true).await?;

    Ok(Json(ApiResponse::with("Profile updated successfully", profile)))
}

async fn update_profile_picture(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<ProfilePictureRequest>,
) -> AppResult<Json<ApiResponse<ProfileView>>> {
    ensure_self(&auth, &user_id)?;
    validate_request(&req)?;

    let account = ctx
        .account_manager
        .update_profile_picture(auth.id(), req.profile_picture)
        .await?;
    let profile = profile_view(&ctx, account, true).await?;

    Ok(Json(ApiResponse::with(
        "Profile picture updated successfully",
        profile,
    )))
}

async fn update_privacy(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<PrivacyRequest>,
) -> AppResult<Json<ApiResponse<ProfileView>>> {
    ensure_self(&auth, &user_id)?;

    let account = ctx
        .account_manager
        .set_privacy(auth.id(), req.is_private)
        .await?;
    let profile = profile_view(&ctx, account, true).await?;

    Ok(Json(ApiResponse::with(
        "Privacy setting updated successfully",
        profile,
    )))
}
