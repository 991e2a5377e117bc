/// Row models shared by the managers
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::error::AppError;

/// Gender as stored on the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(AppError::Validation(format!(
                "{} is not a valid gender",
                other
            ))),
        }
    }
}

/// Account record in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub mail: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub password_changed_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Account {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let gender: String = row.try_get("gender")?;
        let gender = gender.parse().map_err(|e: AppError| sqlx::Error::ColumnDecode {
            index: "gender".to_string(),
            source: e.to_string().into(),
        })?;

        Ok(Account {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            username: row.try_get("username")?,
            mail: row.try_get("mail")?,
            password_hash: row.try_get("password_hash")?,
            date_of_birth: row.try_get("date_of_birth")?,
            gender,
            bio: row.try_get("bio")?,
            profile_picture: row.try_get("profile_picture")?,
            is_private: row.try_get("is_private")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            password_changed_at: row.try_get("password_changed_at")?,
        })
    }
}

/// Column list matching `Account::from_row`
pub const ACCOUNT_COLUMNS: &str = "id, first_name, last_name, username, mail, password_hash, \
     date_of_birth, gender, bio, profile_picture, is_private, created_at, updated_at, \
     password_changed_at";

/// Minimal public identity of an account, embedded in content responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub is_private: bool,
}

/// Follow request status. Rejected requests are deleted, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Pending,
    Accepted,
}

impl FollowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowStatus::Pending => "pending",
            FollowStatus::Accepted => "accepted",
        }
    }
}

/// Follow request record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequest {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: FollowStatus,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for FollowRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = match status.as_str() {
            "pending" => FollowStatus::Pending,
            "accepted" => FollowStatus::Accepted,
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "status".to_string(),
                    source: format!("unknown follow status {}", other).into(),
                })
            }
        };

        Ok(FollowRequest {
            id: row.try_get("id")?,
            from_user_id: row.try_get("from_id")?,
            to_user_id: row.try_get("to_id")?,
            status,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Post record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub caption: Option<String>,
    pub location: Option<String>,
    pub media: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Post {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let media: String = row.try_get("media")?;
        let media = serde_json::from_str(&media).map_err(|e| sqlx::Error::ColumnDecode {
            index: "media".to_string(),
            source: Box::new(e),
        })?;

        Ok(Post {
            id: row.try_get("id")?,
            author_id: row.try_get("author_id")?,
            caption: row.try_get("caption")?,
            location: row.try_get("location")?,
            media,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Comment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Reply record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub comment_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Email address that completed OTP verification
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VerifiedEmail {
    pub mail: String,
    pub created_at: DateTime<Utc>,
}

/// Outstanding one-time password
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OtpRecord {
    pub mail: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_parsing() {
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert!("robot".parse::<Gender>().is_err());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let now = Utc::now();
        let account = Account {
            id: "a".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "ada".to_string(),
            mail: "ada@example.com".to_string(),
            password_hash: "secret-hash".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: Gender::Female,
            bio: None,
            profile_picture: None,
            is_private: false,
            created_at: now,
            updated_at: now,
            password_changed_at: now,
        };

        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
