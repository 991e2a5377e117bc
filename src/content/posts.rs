/// Post manager and the view builders shared with comments
use super::{CommentView, CreatePostRequest, FeedQuery, PostView, ReplyView, UpdatePostRequest};
use crate::{
    db::models::{AccountSummary, Comment, Post, Reply},
    error::{AppError, AppResult},
    relationship::RelationshipEngine,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const POST_COLUMNS: &str = "id, author_id, caption, location, media, created_at, updated_at";

pub struct PostManager {
    db: SqlitePool,
    relationships: Arc<RelationshipEngine>,
}

impl PostManager {
    pub fn new(db: SqlitePool, relationships: Arc<RelationshipEngine>) -> Self {
        Self { db, relationships }
    }

    /// Create a post. At least one media reference is required.
    pub async fn create(&self, author_id: &str, req: CreatePostRequest) -> AppResult<Post> {
        let media: Vec<String> = req.media.iter().map(|m| m.trim().to_string()).collect();

        if media.is_empty() {
            return Err(AppError::Validation(
                "Posts must contain at least one media file".to_string(),
            ));
        }
        if media.iter().any(String::is_empty) {
            return Err(AppError::Validation(
                "Media references cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            caption: trimmed(req.caption),
            location: trimmed(req.location),
            media,
            created_at: now,
            updated_at: now,
        };

        let media_json = serde_json::to_string(&post.media)
            .map_err(|e| AppError::Internal(format!("Failed to encode media: {}", e)))?;

        sqlx::query(
            "INSERT INTO post (id, author_id, caption, location, media, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(&post.caption)
        .bind(&post.location)
        .bind(&media_json)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.db)
        .await?;

        tracing::info!("Post {} created by {}", post.id, author_id);

        Ok(post)
    }

    /// All posts of an author, newest first
    pub async fn list_by_author(&self, author_id: &str) -> AppResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM post WHERE author_id = ?1 ORDER BY created_at DESC",
            POST_COLUMNS
        ))
        .bind(author_id)
        .fetch_all(&self.db)
        .await?;

        Ok(posts)
    }

    /// Load a post row without any visibility check
    pub async fn find(&self, id: &str) -> AppResult<Post> {
        sqlx::query_as::<_, Post>(&format!("SELECT {} FROM post WHERE id = ?1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    /// A single post as seen by `viewer_id`
    pub async fn get(&self, viewer_id: &str, id: &str) -> AppResult<PostView> {
        let post = self.find(id).await?;
        self.relationships
            .ensure_can_view(viewer_id, &post.author_id)
            .await?;

        self.view(viewer_id, post).await
    }

    /// Change caption and location; author only
    pub async fn update(
        &self,
        actor_id: &str,
        id: &str,
        req: UpdatePostRequest,
    ) -> AppResult<Post> {
        let post = self.find(id).await?;
        ensure_author(actor_id, &post)?;

        let caption = match req.caption {
            Some(caption) => trimmed(Some(caption)),
            None => post.caption,
        };
        let location = match req.location {
            Some(location) => trimmed(Some(location)),
            None => post.location,
        };

        sqlx::query("UPDATE post SET caption = ?1, location = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(&caption)
            .bind(&location)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        self.find(id).await
    }

    /// Delete a post with its likes, comments and replies; author only
    pub async fn delete(&self, actor_id: &str, id: &str) -> AppResult<()> {
        let post = self.find(id).await?;
        ensure_author(actor_id, &post)?;

        sqlx::query("DELETE FROM post WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!("Post {} deleted by {}", id, actor_id);

        Ok(())
    }

    pub async fn like(&self, actor_id: &str, id: &str) -> AppResult<PostView> {
        let post = self.find(id).await?;
        self.relationships
            .ensure_can_interact(actor_id, &post.author_id)
            .await?;

        let result =
            sqlx::query("INSERT INTO post_like (post_id, account_id, created_at) VALUES (?1, ?2, ?3)")
                .bind(id)
                .bind(actor_id)
                .bind(Utc::now())
                .execute(&self.db)
                .await;

        if let Err(sqlx::Error::Database(e)) = &result {
            if e.is_unique_violation() {
                return Err(AppError::Conflict("Post already liked".to_string()));
            }
        }
        result?;

        self.view(actor_id, post).await
    }

    pub async fn unlike(&self, actor_id: &str, id: &str) -> AppResult<PostView> {
        let post = self.find(id).await?;
        self.relationships
            .ensure_can_interact(actor_id, &post.author_id)
            .await?;

        let result = sqlx::query("DELETE FROM post_like WHERE post_id = ?1 AND account_id = ?2")
            .bind(id)
            .bind(actor_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Post not liked yet".to_string()));
        }

        self.view(actor_id, post).await
    }

    /// The viewer's own posts plus posts of everyone they follow, newest first
    pub async fn feed(&self, viewer_id: &str, query: &FeedQuery) -> AppResult<Vec<PostView>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM post
             WHERE (author_id = ?1
                    OR author_id IN (SELECT followee_id FROM follow WHERE follower_id = ?1))
               AND (?2 IS NULL OR created_at < ?2)
             ORDER BY created_at DESC
             LIMIT ?3",
            POST_COLUMNS
        ))
        .bind(viewer_id)
        .bind(query.before)
        .bind(query.limit())
        .fetch_all(&self.db)
        .await?;

        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            views.push(self.view(viewer_id, post).await?);
        }

        Ok(views)
    }

    /// Enrich a post with author, counts and comments for `viewer_id`
    pub async fn view(&self, viewer_id: &str, post: Post) -> AppResult<PostView> {
        build_post_view(&self.db, viewer_id, post).await
    }
}

fn ensure_author(actor_id: &str, post: &Post) -> AppResult<()> {
    if post.author_id != actor_id {
        return Err(AppError::Authorization(
            "Only the author can modify this post".to_string(),
        ));
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) async fn account_summary(db: &SqlitePool, id: &str) -> AppResult<AccountSummary> {
    sqlx::query_as::<_, AccountSummary>(
        "SELECT id, username, first_name, last_name, profile_picture, is_private
         FROM account WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))
}

pub(super) async fn build_post_view(
    db: &SqlitePool,
    viewer_id: &str,
    post: Post,
) -> AppResult<PostView> {
    let author = account_summary(db, &post.author_id).await?;

    let likes_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_like WHERE post_id = ?1")
        .bind(&post.id)
        .fetch_one(db)
        .await?;

    let liked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM post_like WHERE post_id = ?1 AND account_id = ?2",
    )
    .bind(&post.id)
    .bind(viewer_id)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, Comment>(
        "SELECT id, post_id, author_id, text, created_at FROM comment
         WHERE post_id = ?1 ORDER BY created_at, id",
    )
    .bind(&post.id)
    .fetch_all(db)
    .await?;

    let mut comments = Vec::with_capacity(rows.len());
    for comment in rows {
        comments.push(build_comment_view(db, viewer_id, comment).await?);
    }

    Ok(PostView {
        id: post.id,
        caption: post.caption,
        location: post.location,
        media: post.media,
        author,
        likes_count,
        comments_count: comments.len() as i64,
        is_liked_by_me: liked > 0,
        comments,
        created_at: post.created_at,
        updated_at: post.updated_at,
    })
}

pub(super) async fn build_comment_view(
    db: &SqlitePool,
    viewer_id: &str,
    comment: Comment,
) -> AppResult<CommentView> {
    let author = account_summary(db, &comment.author_id).await?;

    let likes_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM comment_like WHERE comment_id = ?1")
            .bind(&comment.id)
            .fetch_one(db)
            .await?;

    let liked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM comment_like WHERE comment_id = ?1 AND account_id = ?2",
    )
    .bind(&comment.id)
    .bind(viewer_id)
    .fetch_one(db)
    .await?;

    let rows = sqlx::query_as::<_, Reply>(
        "SELECT id, comment_id, author_id, text, created_at FROM reply
         WHERE comment_id = ?1 ORDER BY created_at, id",
    )
    .bind(&comment.id)
    .fetch_all(db)
    .await?;

    let mut replies = Vec::with_capacity(rows.len());
    for reply in rows {
        replies.push(ReplyView {
            author: account_summary(db, &reply.author_id).await?,
            id: reply.id,
            text: reply.text,
            created_at: reply.created_at,
        });
    }

    Ok(CommentView {
        id: comment.id,
        post_id: comment.post_id,
        text: comment.text,
        author,
        likes_count,
        is_liked_by_me: liked > 0,
        replies,
        created_at: comment.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> (PostManager, Arc<RelationshipEngine>, SqlitePool) {
        let pool = db::memory_pool().await;
        let relationships = Arc::new(RelationshipEngine::new(pool.clone()));
        (
            PostManager::new(pool.clone(), relationships.clone()),
            relationships,
            pool,
        )
    }

    fn photo(caption: &str) -> CreatePostRequest {
        CreatePostRequest {
            caption: Some(caption.to_string()),
            location: None,
            media: vec!["https://cdn.test/1.jpg".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_requires_media() {
        let (posts, _, pool) = setup().await;
        let a = db::insert_test_account(&pool, "alice", false).await;

        let result = posts
            .create(
                &a,
                CreatePostRequest {
                    caption: Some("no media".to_string()),
                    location: None,
                    media: vec![],
                },
            )
            .await;
        match result {
            Err(AppError::Validation(msg)) => {
                assert_eq!(msg, "Posts must contain at least one media file")
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        let post = posts.create(&a, photo("  sunset ")).await.unwrap();
        assert_eq!(post.caption.as_deref(), Some("sunset"));
        assert_eq!(posts.list_by_author(&a).await.unwrap(), vec![post]);
    }

    #[tokio::test]
    async fn test_like_is_strict() {
        let (posts, _, pool) = setup().await;
        let a = db::insert_test_account(&pool, "alice", false).await;
        let b = db::insert_test_account(&pool, "bob", false).await;
        let post = posts.create(&a, photo("hello")).await.unwrap();

        let view = posts.like(&b, &post.id).await.unwrap();
        assert_eq!(view.likes_count, 1);
        assert!(view.is_liked_by_me);

        assert!(matches!(
            posts.like(&b, &post.id).await,
            Err(AppError::Conflict(_))
        ));

        let view = posts.unlike(&b, &post.id).await.unwrap();
        assert_eq!(view.likes_count, 0);
        assert!(!view.is_liked_by_me);

        assert!(matches!(
            posts.unlike(&b, &post.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_private_post_gated_by_follow() {
        let (posts, relationships, pool) = setup().await;
        let a = db::insert_test_account(&pool, "alice", true).await;
        let b = db::insert_test_account(&pool, "bob", false).await;
        let post = posts.create(&a, photo("secret")).await.unwrap();

        assert!(matches!(
            posts.get(&b, &post.id).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            posts.like(&b, &post.id).await,
            Err(AppError::Authorization(_))
        ));

        relationships.request_follow(&b, &a).await.unwrap();
        let request_id: String = sqlx::query_scalar("SELECT id FROM follow_request")
            .fetch_one(&pool)
            .await
            .unwrap();
        relationships.review(&request_id, &a, "accepted").await.unwrap();

        assert_eq!(posts.get(&b, &post.id).await.unwrap().id, post.id);
        assert!(posts.like(&b, &post.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_only_author_updates_and_deletes() {
        let (posts, _, pool) = setup().await;
        let a = db::insert_test_account(&pool, "alice", false).await;
        let b = db::insert_test_account(&pool, "bob", false).await;
        let post = posts.create(&a, photo("draft")).await.unwrap();

        let edit = UpdatePostRequest {
            caption: Some("final".to_string()),
            location: Some("Lisbon".to_string()),
        };
        assert!(matches!(
            posts.update(&b, &post.id, edit.clone()).await,
            Err(AppError::Authorization(_))
        ));

        let updated = posts.update(&a, &post.id, edit).await.unwrap();
        assert_eq!(updated.caption.as_deref(), Some("final"));
        assert_eq!(updated.location.as_deref(), Some("Lisbon"));
        assert_eq!(updated.media, post.media);

        posts.like(&b, &post.id).await.unwrap();
        assert!(matches!(
            posts.delete(&b, &post.id).await,
            Err(AppError::Authorization(_))
        ));
        posts.delete(&a, &post.id).await.unwrap();

        assert!(matches!(
            posts.find(&post.id).await,
            Err(AppError::NotFound(_))
        ));
        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_like")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(likes, 0);
    }

    #[tokio::test]
    async fn test_feed_contains_own_and_followed_posts() {
        let (posts, relationships, pool) = setup().await;
        let a = db::insert_test_account(&pool, "alice", false).await;
        let b = db::insert_test_account(&pool, "bob", false).await;
        let c = db::insert_test_account(&pool, "carol", false).await;

        let own = posts.create(&a, photo("mine")).await.unwrap();
        let followed = posts.create(&b, photo("bob's")).await.unwrap();
        posts.create(&c, photo("stranger")).await.unwrap();

        relationships.request_follow(&a, &b).await.unwrap();

        let feed = posts.feed(&a, &FeedQuery::default()).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![followed.id.as_str(), own.id.as_str()]);
        assert_eq!(feed[0].author.username, "bob");

        let older = posts
            .feed(
                &a,
                &FeedQuery {
                    limit: Some(10),
                    before: Some(followed.created_at),
                },
            )
            .await
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, own.id);
    }
}
