/// Account management system
///
/// Handles account creation, sign-in, password changes and profile edits.

mod manager;

pub use manager::AccountManager;

use crate::{
    db::models::{Account, Gender, Post},
    relationship::Relations,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Validated input for `AccountManager::create_account`
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub mail: String,
    pub password: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
}

/// Account creation request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 50, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 2, max = 15, message = "Username must be 2-15 characters"))]
    pub username: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub mail: String,
    pub password: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
}

impl From<SignupRequest> for NewAccount {
    fn from(req: SignupRequest) -> Self {
        NewAccount {
            first_name: req.first_name,
            last_name: req.last_name,
            username: req.username,
            mail: req.mail,
            password: req.password,
            date_of_birth: req.date_of_birth,
            gender: req.gender,
        }
    }
}

/// Sign-in request: either username or mail identifies the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninRequest {
    pub username: Option<String>,
    pub mail: Option<String>,
    pub password: String,
}

impl SigninRequest {
    pub fn identifier(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or(self.mail.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Password change request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Profile edit request; absent fields stay unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(length(max = 150, message = "Bio must be at most 150 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePictureRequest {
    #[validate(url(message = "Profile picture must be a URL"))]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyRequest {
    pub is_private: bool,
}

/// Profile as seen by a viewer allowed to see it.
///
/// Private fields (mail, birth date, block list) are only filled for the
/// owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub is_private: bool,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<Vec<String>>,
    pub posts: Vec<Post>,
    pub created_at: DateTime<Utc>,
}

impl ProfileView {
    pub fn new(account: Account, relations: Relations, posts: Vec<Post>, is_owner: bool) -> Self {
        ProfileView {
            id: account.id,
            first_name: account.first_name,
            last_name: account.last_name,
            username: account.username,
            mail: is_owner.then_some(account.mail),
            date_of_birth: is_owner.then_some(account.date_of_birth),
            gender: account.gender,
            bio: account.bio,
            profile_picture: account.profile_picture,
            is_private: account.is_private,
            followers: relations.followers.into_iter().collect(),
            following: relations.following.into_iter().collect(),
            blocked: is_owner.then(|| relations.blocked.into_iter().collect()),
            posts,
            created_at: account.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signin_identifier() {
        let req = SigninRequest {
            username: None,
            mail: Some(" a@b.com ".to_string()),
            password: "x".to_string(),
        };
        assert_eq!(req.identifier(), Some("a@b.com"));

        let req = SigninRequest {
            username: Some("  ".to_string()),
            mail: None,
            password: "x".to_string(),
        };
        assert_eq!(req.identifier(), None);
    }

    #[test]
    fn test_signup_request_parses_camel_case() {
        let req: SignupRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "username": "ada",
            "mail": "ada@example.com",
            "password": "Sup3r$ecret",
            "dateOfBirth": "1990-12-10",
            "gender": "female"
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.gender, Gender::Female);

        let bad = SignupRequest {
            mail: "nope".to_string(),
            ..req
        };
        assert!(bad.validate().is_err());
    }
}
