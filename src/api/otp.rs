/// Email verification endpoints
use crate::{
    api::{ApiResponse, AppJson},
    context::AppContext,
    error::{AppError, AppResult},
    rate_limit::otp_rate_limit_middleware,
};
use axum::{extract::State, middleware, routing::post, Json, Router};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

/// Build OTP routes. Sending is limited per client address.
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    Router::new()
        .route(
            "/otp/send-otp",
            post(send_otp).route_layer(middleware::from_fn_with_state(
                ctx,
                otp_rate_limit_middleware,
            )),
        )
        .route("/otp/verify-otp", post(verify_otp))
}

async fn send_otp(
    State(ctx): State<AppContext>,
    AppJson(req): AppJson<SendOtpRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    ctx.otp_manager.send_otp(&req.email).await?;
    Ok(Json(ApiResponse::message("OTP sent successfully!")))
}

async fn verify_otp(
    State(ctx): State<AppContext>,
    AppJson(req): AppJson<VerifyOtpRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    if req.email.trim().is_empty() || req.otp.trim().is_empty() {
        return Err(AppError::Validation("Email and OTP are required".to_string()));
    }

    ctx.otp_manager.verify_otp(&req.email, &req.otp).await?;
    Ok(Json(ApiResponse::message("Email verified successfully")))
}
