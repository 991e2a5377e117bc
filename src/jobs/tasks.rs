/// Background task implementations
use crate::{context::AppContext, db, error::AppResult};

/// Delete OTP codes past their validity window
pub async fn purge_expired_otps(ctx: &AppContext) -> AppResult<u64> {
    ctx.otp_manager.purge_expired().await
}

/// Forget client addresses whose OTP limit has recovered
pub fn prune_rate_limits(ctx: &AppContext) -> usize {
    ctx.rate_limiter.retain_recent()
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> AppResult<()> {
    db::test_connection(&ctx.db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, db};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_purge_removes_only_expired_codes() {
        let ctx = AppContext::for_tests(ServerConfig::for_tests(), db::memory_pool().await);
        let now = Utc::now();

        for (mail, expires_at) in [
            ("old@hearth.test", now - Duration::seconds(5)),
            ("fresh@hearth.test", now + Duration::seconds(60)),
        ] {
            sqlx::query(
                "INSERT INTO otp (mail, code, created_at, expires_at) VALUES (?1, '123456', ?2, ?3)",
            )
            .bind(mail)
            .bind(now)
            .bind(expires_at)
            .execute(&ctx.db)
            .await
            .unwrap();
        }

        assert_eq!(purge_expired_otps(&ctx).await.unwrap(), 1);

        let left: Vec<String> = sqlx::query_scalar("SELECT mail FROM otp")
            .fetch_all(&ctx.db)
            .await
            .unwrap();
        assert_eq!(left, vec!["fresh@hearth.test".to_string()]);

        health_check(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_rate_limits_keeps_active_addresses() {
        let mut config = ServerConfig::for_tests();
        config.rate_limit.enabled = true;
        let ctx = AppContext::for_tests(config, db::memory_pool().await);

        ctx.rate_limiter
            .check_otp("203.0.113.5".parse().unwrap())
            .unwrap();

        // Still inside the 120 s window
        assert_eq!(prune_rate_limits(&ctx), 1);
    }
}
