/// Email verification workflow
///
/// A mail address becomes eligible for signup once the owner proves control
/// of it by echoing back a six-digit code that was sent to it.
use crate::{
    db::models::OtpRecord,
    error::{AppError, AppResult},
    mailer::Mailer,
};
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Generate a uniformly random, zero-padded six-digit code
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// OTP issuance and verification
pub struct OtpManager {
    db: SqlitePool,
    mailer: Arc<Mailer>,
    ttl: Duration,
}

impl OtpManager {
    pub fn new(db: SqlitePool, mailer: Arc<Mailer>, ttl_secs: i64) -> Self {
        Self {
            db,
            mailer,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Whether `mail` already completed verification
    pub async fn is_verified(&self, mail: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verified_email WHERE mail = ?1")
            .bind(mail)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Issue a fresh code for `mail` and deliver it.
    ///
    /// Replaces any outstanding code for the same address. When delivery
    /// fails the stored code is withdrawn again.
    pub async fn send_otp(&self, mail: &str) -> AppResult<()> {
        let mail = normalize_mail(mail)?;

        if self.is_verified(&mail).await? {
            return Err(AppError::Validation("Mail already verified".to_string()));
        }

        let code = generate_code();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        sqlx::query(
            "INSERT INTO otp (mail, code, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(mail) DO UPDATE SET code = excluded.code,
                 created_at = excluded.created_at, expires_at = excluded.expires_at",
        )
        .bind(&mail)
        .bind(&code)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        #[cfg(debug_assertions)]
        if !self.mailer.is_configured() {
            tracing::trace!("OTP for {}: {}", mail, code);
        }

        if let Err(e) = self
            .mailer
            .send_otp_email(&mail, &code, self.ttl.num_seconds())
            .await
        {
            tracing::warn!("OTP delivery to {} failed: {}", mail, e);
            sqlx::query("DELETE FROM otp WHERE mail = ?1 AND code = ?2")
                .bind(&mail)
                .bind(&code)
                .execute(&self.db)
                .await?;
            return Err(e);
        }

        tracing::info!("OTP sent to {}", mail);
        Ok(())
    }

    /// Check a code and mark `mail` as verified
    pub async fn verify_otp(&self, mail: &str, code: &str) -> AppResult<()> {
        let mail = normalize_mail(mail)?;
        let code = code.trim();

        if self.is_verified(&mail).await? {
            return Err(AppError::Validation("Mail already verified".to_string()));
        }

        let record = sqlx::query_as::<_, OtpRecord>(
            "SELECT mail, code, created_at, expires_at FROM otp WHERE mail = ?1 AND code = ?2",
        )
        .bind(&mail)
        .bind(code)
        .fetch_optional(&self.db)
        .await?;

        let record = match record {
            Some(record) if record.expires_at > Utc::now() => record,
            _ => return Err(AppError::Validation("Invalid or expired OTP".to_string())),
        };

        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO verified_email (mail, created_at) VALUES (?1, ?2)")
            .bind(&record.mail)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM otp WHERE mail = ?1")
            .bind(&record.mail)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Email verified: {}", record.mail);
        Ok(())
    }

    /// Remove codes past their validity window
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM otp WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Trim and lowercase a mail address, rejecting obviously malformed input
pub fn normalize_mail(mail: &str) -> AppResult<String> {
    let mail = mail.trim().to_lowercase();

    if mail.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }

    if !validator::ValidateEmail::validate_email(&mail) {
        return Err(AppError::Validation("Please enter a valid email address".to_string()));
    }

    Ok(mail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, mailer::RecordingTransport};

    async fn setup(transport: Arc<RecordingTransport>) -> OtpManager {
        let pool = db::memory_pool().await;
        let mailer = Arc::new(Mailer::with_transport(
            "noreply@hearth.test".to_string(),
            transport,
        ));
        OtpManager::new(pool, mailer, 120)
    }

    async fn stored_code(manager: &OtpManager, mail: &str) -> String {
        sqlx::query_scalar("SELECT code FROM otp WHERE mail = ?1")
            .bind(mail)
            .fetch_one(&manager.db)
            .await
            .unwrap()
    }

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_send_and_verify() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = setup(transport.clone()).await;

        manager.send_otp("A@B.com").await.unwrap();
        let code = stored_code(&manager, "a@b.com").await;

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html_body.contains(&code));
        drop(sent);

        assert!(!manager.is_verified("a@b.com").await.unwrap());
        manager.verify_otp("a@b.com", &code).await.unwrap();
        assert!(manager.is_verified("a@b.com").await.unwrap());

        // Already verified: both operations refuse
        assert!(matches!(
            manager.send_otp("a@b.com").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            manager.verify_otp("a@b.com", &code).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_code_rejected() {
        let manager = setup(Arc::new(RecordingTransport::default())).await;

        manager.send_otp("a@b.com").await.unwrap();
        let code = stored_code(&manager, "a@b.com").await;
        let wrong = if code == "000000" { "000001" } else { "000000" };

        let result = manager.verify_otp("a@b.com", wrong).await;
        match result {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Invalid or expired OTP"),
            other => panic!("Expected validation error, got {:?}", other),
        }
        assert!(!manager.is_verified("a@b.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_rejected_and_purged() {
        let manager = setup(Arc::new(RecordingTransport::default())).await;

        manager.send_otp("a@b.com").await.unwrap();
        let code = stored_code(&manager, "a@b.com").await;

        sqlx::query("UPDATE otp SET expires_at = ?1 WHERE mail = ?2")
            .bind(Utc::now() - Duration::seconds(1))
            .bind("a@b.com")
            .execute(&manager.db)
            .await
            .unwrap();

        assert!(manager.verify_otp("a@b.com", &code).await.is_err());
        assert_eq!(manager.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resend_replaces_previous_code() {
        let manager = setup(Arc::new(RecordingTransport::default())).await;

        manager.send_otp("a@b.com").await.unwrap();
        manager.send_otp("a@b.com").await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM otp WHERE mail = 'a@b.com'")
            .fetch_one(&manager.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_withdraws_code() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let manager = setup(transport).await;

        assert!(matches!(
            manager.send_otp("a@b.com").await,
            Err(AppError::Mail(_))
        ));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM otp")
            .fetch_one(&manager.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_normalize_mail() {
        assert_eq!(normalize_mail(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_mail("").is_err());
        assert!(normalize_mail("not-an-email").is_err());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unsent_code_stays_out_of_debug_logs() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter("hearth=debug")
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();

        let code = tracing::subscriber::with_default(subscriber, || {
            tokio_test::block_on(async {
                let pool = db::memory_pool().await;
                let manager = OtpManager::new(pool, Arc::new(Mailer::new(None).unwrap()), 120);
                manager.send_otp("quiet@hearth.test").await.unwrap();
                stored_code(&manager, "quiet@hearth.test").await
            })
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("quiet@hearth.test"));
        assert!(!output.contains(&code));
    }
}
