/// API routes and handlers
pub mod auth;
pub mod comments;
pub mod follow;
pub mod health;
pub mod middleware;
pub mod otp;
pub mod posts;
pub mod profile;

use crate::{context::AppContext, error::AppError};
use axum::{extract::FromRequest, Router};
use serde::Serialize;

/// Build API routes
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(otp::routes(ctx))
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(follow::routes())
        .merge(profile::routes())
}

/// JSON body extractor whose rejections become `AppError::Validation`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Success body: `{ "msg"?: string, "data"?: any }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl ApiResponse<()> {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            msg: Some(msg.into()),
            data: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            msg: None,
            data: Some(data),
        }
    }

    pub fn with(msg: impl Into<String>, data: T) -> Self {
        Self {
            msg: Some(msg.into()),
            data: Some(data),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_skips_empty_fields() {
        let json = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(json, serde_json::json!({ "msg": "done" }));

        let json = serde_json::to_value(ApiResponse::data(vec![1, 2])).unwrap();
        assert_eq!(json, serde_json::json!({ "data": [1, 2] }));
    }
}
