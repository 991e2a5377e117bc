/// Content service
///
/// Posts, post likes, comments, comment likes and replies. Every read and
/// interaction is checked against the relationship engine's visibility
/// rules for the content's author.

mod comments;
mod posts;

pub use comments::CommentManager;
pub use posts::PostManager;

use crate::db::models::AccountSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default and maximum page size of the feed
pub const DEFAULT_FEED_LIMIT: u32 = 20;
pub const MAX_FEED_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(max = 2200, message = "Caption must be at most 2200 characters"))]
    pub caption: Option<String>,
    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,
    #[serde(default)]
    pub media: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(max = 2200, message = "Caption must be at most 2200 characters"))]
    pub caption: Option<String>,
    #[validate(length(max = 100, message = "Location must be at most 100 characters"))]
    pub location: Option<String>,
}

/// Body of a comment or reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// Feed paging: newest first, optionally strictly older than `before`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
    pub before: Option<DateTime<Utc>>,
}

impl FeedQuery {
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_FEED_LIMIT)
            .clamp(1, MAX_FEED_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub id: String,
    pub text: String,
    pub author: AccountSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub text: String,
    pub author: AccountSummary,
    pub likes_count: i64,
    pub is_liked_by_me: bool,
    pub replies: Vec<ReplyView>,
    pub created_at: DateTime<Utc>,
}

/// A post enriched for a particular viewer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub caption: Option<String>,
    pub location: Option<String>,
    pub media: Vec<String>,
    pub author: AccountSummary,
    pub likes_count: i64,
    pub comments_count: i64,
    pub is_liked_by_me: bool,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_limit_is_clamped() {
        assert_eq!(FeedQuery::default().limit(), DEFAULT_FEED_LIMIT);
        assert_eq!(
            FeedQuery {
                limit: Some(0),
                before: None
            }
            .limit(),
            1
        );
        assert_eq!(
            FeedQuery {
                limit: Some(10_000),
                before: None
            }
            .limit(),
            MAX_FEED_LIMIT
        );
    }

    #[test]
    fn test_create_post_media_defaults_empty() {
        let req: CreatePostRequest =
            serde_json::from_value(serde_json::json!({ "caption": "hi" })).unwrap();
        assert!(req.media.is_empty());
        assert!(req.validate().is_ok());
    }
}
