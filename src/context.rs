/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    content::{CommentManager, PostManager},
    db,
    error::AppResult,
    mailer::Mailer,
    otp::OtpManager,
    rate_limit::RateLimiter,
    relationship::RelationshipEngine,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub otp_manager: Arc<OtpManager>,
    // Follow graph, blocks and the visibility gate
    pub relationships: Arc<RelationshipEngine>,
    pub posts: Arc<PostManager>,
    pub comments: Arc<CommentManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let mailer = Arc::new(Mailer::new(config.email.clone())?);
        if !mailer.is_configured() {
            tracing::warn!("No SMTP server configured, OTP codes will only be logged");
        }

        Ok(Self::assemble(config, db, mailer))
    }

    /// Context over an existing pool. Mail goes to the log.
    #[cfg(test)]
    pub fn for_tests(config: ServerConfig, db: SqlitePool) -> Self {
        let mailer = Arc::new(Mailer::with_transport(
            "noreply@hearth.test".to_string(),
            Arc::new(crate::mailer::LogTransport),
        ));
        Self::assemble(config, db, mailer)
    }

    fn assemble(config: ServerConfig, db: SqlitePool, mailer: Arc<Mailer>) -> Self {
        let account_manager = Arc::new(AccountManager::new(db.clone()));
        let otp_manager = Arc::new(OtpManager::new(db.clone(), mailer.clone(), config.otp.ttl));

        let relationships = Arc::new(RelationshipEngine::new(db.clone()));
        let posts = Arc::new(PostManager::new(db.clone(), relationships.clone()));
        let comments = Arc::new(CommentManager::new(db.clone(), relationships.clone()));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            db,
            account_manager,
            otp_manager,
            relationships,
            posts,
            comments,
            rate_limiter,
            mailer,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
