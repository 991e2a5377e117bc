/// Account manager implementation using runtime queries
use crate::{
    account::NewAccount,
    auth::{self, Claims},
    db::models::{Account, AccountSummary, ACCOUNT_COLUMNS},
    error::{AppError, AppResult},
    otp::normalize_mail,
    validation,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new account.
    ///
    /// The mail must have completed OTP verification beforehand.
    pub async fn create_account(&self, new: NewAccount) -> AppResult<Account> {
        let mail = normalize_mail(&new.mail)?;
        let username = validation::normalize_username(&new.username)?;

        // Email verification check
        let verified: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM verified_email WHERE mail = ?1")
                .bind(&mail)
                .fetch_one(&self.db)
                .await?;
        if verified == 0 {
            return Err(AppError::Validation(
                "Please verify your email before signup".to_string(),
            ));
        }

        if self.username_exists(&username).await? {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        if self.mail_exists(&mail).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        validation::ensure_adult(new.date_of_birth, Utc::now().date_naive())?;
        validation::ensure_strong_password(&new.password)?;

        let password_hash = auth::hash_password(&new.password)?;

        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            username,
            mail,
            password_hash,
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            bio: None,
            profile_picture: None,
            is_private: false,
            created_at: now,
            updated_at: now,
            password_changed_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO account (id, first_name, last_name, username, mail, password_hash,
                 date_of_birth, gender, bio, profile_picture, is_private, created_at, updated_at,
                 password_changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&account.id)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.username)
        .bind(&account.mail)
        .bind(&account.password_hash)
        .bind(account.date_of_birth)
        .bind(account.gender.as_str())
        .bind(&account.bio)
        .bind(&account.profile_picture)
        .bind(account.is_private)
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(account.password_changed_at)
        .execute(&self.db)
        .await;

        // A concurrent signup can still win the unique index
        if let Err(sqlx::Error::Database(e)) = &result {
            if e.is_unique_violation() {
                return Err(AppError::Conflict(
                    "Username or email already registered".to_string(),
                ));
            }
        }
        result?;

        tracing::info!("Account created: {} ({})", account.username, account.id);

        Ok(account)
    }

    /// Authenticate by username or mail and password
    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<Account> {
        let account = self.get_account_by_identifier(identifier).await?;

        if !auth::verify_password(password, &account.password_hash)? {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        Ok(account)
    }

    /// Resolve the account behind verified token claims.
    ///
    /// Tokens issued before the last password change are refused.
    pub async fn authenticate(&self, claims: &Claims) -> AppResult<Account> {
        let account = self.get_account(&claims.sub).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Authentication("Please log in".to_string()),
            other => other,
        })?;

        if claims.iat_ms < account.password_changed_at.timestamp_millis() {
            return Err(AppError::Authentication(
                "Session expired, please log in".to_string(),
            ));
        }

        Ok(account)
    }

    /// Get account by id
    pub async fn get_account(&self, id: &str) -> AppResult<Account> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE id = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))
    }

    /// Find account by username or mail
    pub async fn get_account_by_identifier(&self, identifier: &str) -> AppResult<Account> {
        let identifier = identifier.trim().to_lowercase();

        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE username = ?1 OR mail = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(&identifier)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))
    }

    /// Public summary card of an account
    pub async fn get_summary(&self, id: &str) -> AppResult<AccountSummary> {
        sqlx::query_as::<_, AccountSummary>(
            "SELECT id, username, first_name, last_name, profile_picture, is_private
             FROM account WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))
    }

    /// Replace the password after checking the current one
    pub async fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let account = self.get_account(id).await?;

        if !auth::verify_password(current_password, &account.password_hash)? {
            return Err(AppError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        if current_password == new_password {
            return Err(AppError::Validation(
                "New password must differ from the current one".to_string(),
            ));
        }

        validation::ensure_strong_password(new_password)?;
        let password_hash = auth::hash_password(new_password)?;
        let now = Utc::now();

        sqlx::query(
            "UPDATE account SET password_hash = ?1, password_changed_at = ?2, updated_at = ?2
             WHERE id = ?3",
        )
        .bind(&password_hash)
        .bind(now)
        .bind(id)
        .execute(&self.db)
        .await?;

        tracing::info!("Password changed for account {}", id);

        Ok(())
    }

    /// Update names and bio. `None` leaves a field unchanged.
    pub async fn update_profile(
        &self,
        id: &str,
        first_name: Option<String>,
        last_name: Option<String>,
        bio: Option<String>,
    ) -> AppResult<Account> {
        let account = self.get_account(id).await?;

        let first_name = first_name
            .map(|s| s.trim().to_string())
            .unwrap_or(account.first_name);
        let last_name = last_name
            .map(|s| s.trim().to_string())
            .unwrap_or(account.last_name);
        let bio = match bio {
            Some(bio) => Some(bio.trim().to_string()),
            None => account.bio,
        };

        sqlx::query(
            "UPDATE account SET first_name = ?1, last_name = ?2, bio = ?3, updated_at = ?4
             WHERE id = ?5",
        )
        .bind(&first_name)
        .bind(&last_name)
        .bind(&bio)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        self.get_account(id).await
    }

    /// Set or clear the profile picture reference
    pub async fn update_profile_picture(
        &self,
        id: &str,
        profile_picture: Option<String>,
    ) -> AppResult<Account> {
        let result = sqlx::query(
            "UPDATE account SET profile_picture = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&profile_picture)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User does not exist".to_string()));
        }

        self.get_account(id).await
    }

    /// Set the privacy flag
    pub async fn set_privacy(&self, id: &str, is_private: bool) -> AppResult<Account> {
        let result =
            sqlx::query("UPDATE account SET is_private = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(is_private)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User does not exist".to_string()));
        }

        tracing::info!("Account {} privacy set to {}", id, is_private);

        self.get_account(id).await
    }

    /// Check if username exists
    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE username = ?1")
            .bind(username)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Check if mail exists
    async fn mail_exists(&self, mail: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE mail = ?1")
            .bind(mail)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, db::models::Gender};
    use chrono::{Duration, NaiveDate};

    async fn setup_test_db() -> AccountManager {
        AccountManager::new(db::memory_pool().await)
    }

    async fn verify_mail(manager: &AccountManager, mail: &str) {
        sqlx::query("INSERT INTO verified_email (mail, created_at) VALUES (?1, ?2)")
            .bind(mail)
            .bind(Utc::now())
            .execute(&manager.db)
            .await
            .unwrap();
    }

    fn new_account(username: &str, mail: &str) -> NewAccount {
        NewAccount {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: username.to_string(),
            mail: mail.to_string(),
            password: "Sup3r$ecret".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
            gender: Gender::Female,
        }
    }

    #[tokio::test]
    async fn test_signup_requires_verified_mail() {
        let manager = setup_test_db().await;

        let result = manager.create_account(new_account("ada", "a@b.com")).await;
        match result {
            Err(AppError::Validation(msg)) => {
                assert_eq!(msg, "Please verify your email before signup")
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        verify_mail(&manager, "a@b.com").await;
        let account = manager
            .create_account(new_account("Ada", "a@b.com"))
            .await
            .unwrap();
        assert_eq!(account.username, "ada");
        assert!(!account.is_private);

        // Second signup with the same mail conflicts
        let result = manager.create_account(new_account("ada2", "a@b.com")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_signup_rejects_taken_username() {
        let manager = setup_test_db().await;
        verify_mail(&manager, "a@b.com").await;
        verify_mail(&manager, "c@d.com").await;

        manager
            .create_account(new_account("ada", "a@b.com"))
            .await
            .unwrap();

        match manager.create_account(new_account("ada", "c@d.com")).await {
            Err(AppError::Conflict(msg)) => assert_eq!(msg, "Username already taken"),
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signup_rejects_minor_and_weak_password() {
        let manager = setup_test_db().await;
        verify_mail(&manager, "a@b.com").await;

        let mut minor = new_account("young", "a@b.com");
        minor.date_of_birth = Utc::now().date_naive() - Duration::days(365 * 10);
        assert!(matches!(
            manager.create_account(minor).await,
            Err(AppError::Validation(_))
        ));

        let mut weak = new_account("weak", "a@b.com");
        weak.password = "password".to_string();
        assert!(matches!(
            manager.create_account(weak).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_login_by_username_or_mail() {
        let manager = setup_test_db().await;
        verify_mail(&manager, "a@b.com").await;
        let account = manager
            .create_account(new_account("ada", "a@b.com"))
            .await
            .unwrap();

        assert_eq!(manager.login("ada", "Sup3r$ecret").await.unwrap().id, account.id);
        assert_eq!(
            manager.login("A@B.com", "Sup3r$ecret").await.unwrap().id,
            account.id
        );
        assert!(matches!(
            manager.login("ada", "wrong").await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            manager.login("nobody", "Sup3r$ecret").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password_invalidates_old_tokens() {
        let manager = setup_test_db().await;
        verify_mail(&manager, "a@b.com").await;
        let account = manager
            .create_account(new_account("ada", "a@b.com"))
            .await
            .unwrap();

        // Issued moments before the change, usually within the same second
        let issued = Utc::now();
        let stale = Claims {
            sub: account.id.clone(),
            iat: issued.timestamp(),
            exp: issued.timestamp() + 3600,
            iat_ms: issued.timestamp_millis(),
        };
        assert!(manager.authenticate(&stale).await.is_ok());

        assert!(matches!(
            manager
                .change_password(&account.id, "wrong", "N3w$ecret!")
                .await,
            Err(AppError::Authentication(_))
        ));

        manager
            .change_password(&account.id, "Sup3r$ecret", "N3w$ecret!")
            .await
            .unwrap();

        assert!(manager.authenticate(&stale).await.is_err());
        assert!(manager.login("ada", "N3w$ecret!").await.is_ok());

        // Same second as the change, one millisecond earlier
        let changed = manager.get_account(&account.id).await.unwrap().password_changed_at;
        let same_second = Claims {
            sub: account.id.clone(),
            iat: changed.timestamp(),
            exp: changed.timestamp() + 3600,
            iat_ms: changed.timestamp_millis() - 1,
        };
        assert!(matches!(
            manager.authenticate(&same_second).await,
            Err(AppError::Authentication(_))
        ));

        let now = Utc::now();
        let fresh = Claims {
            sub: account.id.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + 3600,
            iat_ms: now.timestamp_millis(),
        };
        assert!(manager.authenticate(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_updates() {
        let manager = setup_test_db().await;
        verify_mail(&manager, "a@b.com").await;
        let account = manager
            .create_account(new_account("ada", "a@b.com"))
            .await
            .unwrap();

        let updated = manager
            .update_profile(&account.id, None, Some("Byron".to_string()), Some("Analyst".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.last_name, "Byron");
        assert_eq!(updated.bio.as_deref(), Some("Analyst"));

        let updated = manager
            .update_profile_picture(&account.id, Some("https://cdn.test/ada.png".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.profile_picture.as_deref(), Some("https://cdn.test/ada.png"));

        let updated = manager.set_privacy(&account.id, true).await.unwrap();
        assert!(updated.is_private);

        assert!(matches!(
            manager.set_privacy("missing", true).await,
            Err(AppError::NotFound(_))
        ));
    }
}
