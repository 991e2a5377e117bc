/// Sign-up, sign-in and session endpoints
use crate::{
    account::{ChangePasswordRequest, ProfileView, SigninRequest, SignupRequest},
    api::{profile::profile_view, ApiResponse, AppJson},
    auth::{self, AuthContext},
    context::AppContext,
    error::{AppError, AppResult},
    validation::validate_request,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/logout", post(logout))
        .route("/auth/change-password", patch(change_password))
        .route("/auth/get-user-data", get(get_user_data))
}

async fn signup(
    State(ctx): State<AppContext>,
    AppJson(req): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<()>>)> {
    validate_request(&req)?;
    tracing::debug!("signup: creating account for {}", req.username);

    ctx.account_manager.create_account(req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::message("User registered successfully")),
    ))
}

async fn signin(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    AppJson(req): AppJson<SigninRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<ProfileView>>)> {
    let identifier = match req.identifier() {
        Some(identifier) if !req.password.is_empty() => identifier,
        _ => {
            return Err(AppError::Validation(
                "Please provide username/email and password".to_string(),
            ))
        }
    };

    let account = ctx.account_manager.login(identifier, &req.password).await?;
    let token = auth::issue_token(&account.id, &ctx.config.authentication)?;
    tracing::info!("signin: {} signed in", account.username);

    let profile = profile_view(&ctx, account, true).await?;
    let jar = jar.add(auth::session_cookie(&ctx.config.authentication, token));

    Ok((jar, Json(ApiResponse::with("Signin successfully", profile))))
}

async fn logout(
    State(ctx): State<AppContext>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<()>>) {
    (
        auth::clear_session_cookie(jar, &ctx.config.authentication),
        Json(ApiResponse::message("User logged out successfully")),
    )
}

/// Change the password and hand out a fresh session, since earlier tokens
/// stop validating
async fn change_password(
    State(ctx): State<AppContext>,
    caller: AuthContext,
    jar: CookieJar,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> AppResult<(CookieJar, Json<ApiResponse<()>>)> {
    ctx.account_manager
        .change_password(caller.id(), &req.current_password, &req.new_password)
        .await?;

    let token = auth::issue_token(caller.id(), &ctx.config.authentication)?;
    let jar = jar.add(auth::session_cookie(&ctx.config.authentication, token));

    Ok((jar, Json(ApiResponse::message("Password updated successfully"))))
}

async fn get_user_data(
    State(ctx): State<AppContext>,
    caller: AuthContext,
) -> AppResult<Json<ApiResponse<ProfileView>>> {
    let profile = profile_view(&ctx, caller.account, true).await?;
    Ok(Json(ApiResponse::data(profile)))
}
