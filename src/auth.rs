/// Credential service: password hashing, token issuance and the
/// authentication extractor used by protected handlers.
use crate::{
    api::middleware::extract_token,
    config::AuthConfig,
    context::AppContext,
    db::models::Account,
    error::{AppError, AppResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// Issue time in milliseconds, compared against password changes
    pub iat_ms: i64,
}

/// Hash a password with Argon2id
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AppError::Internal(format!("Stored password hash is invalid: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Issue a signed session token for an account
pub fn issue_token(account_id: &str, config: &AuthConfig) -> AppResult<String> {
    let issued_at = Utc::now();
    let now = issued_at.timestamp();
    let claims = Claims {
        sub: account_id.to_string(),
        iat: now,
        exp: now + config.token_ttl,
        iat_ms: issued_at.timestamp_millis(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Jwt(format!("Failed to generate token: {}", e)))
}

/// Verify a session token signature and expiry
pub fn verify_token(token: &str, jwt_secret: &str) -> AppResult<Claims> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 30;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Authentication("Session expired, please log in".to_string())
                }
                _ => AppError::Authentication("Please log in".to_string()),
            }
        })
}

/// Cookie carrying a freshly issued token
pub fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Remove the session cookie from a jar
pub fn clear_session_cookie(jar: CookieJar, config: &AuthConfig) -> CookieJar {
    jar.remove(Cookie::build((config.cookie_name.clone(), "")).path("/"))
}

/// Authenticated caller - extracted from the session cookie or bearer token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
}

impl AuthContext {
    pub fn id(&self) -> &str {
        &self.account.id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, &state.config.authentication.cookie_name)
            .ok_or_else(|| AppError::Authentication("No token, please log in".to_string()))?;

        let claims = verify_token(&token, &state.config.authentication.jwt_secret)?;
        let account = state.account_manager.authenticate(&claims).await?;

        Ok(AuthContext { account })
    }
}
