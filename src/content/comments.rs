/// Comments, comment likes and replies
use super::{
    posts::{build_comment_view, build_post_view},
    CommentView, PostView,
};
use crate::{
    db::models::{Comment, Post},
    error::{AppError, AppResult},
    relationship::RelationshipEngine,
    validation::clean_text,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

pub struct CommentManager {
    db: SqlitePool,
    relationships: Arc<RelationshipEngine>,
}

impl CommentManager {
    pub fn new(db: SqlitePool, relationships: Arc<RelationshipEngine>) -> Self {
        Self { db, relationships }
    }

    /// Comment on a post. Returns the post with the new comment attached.
    pub async fn add_comment(&self, actor_id: &str, post_id: &str, text: &str) -> AppResult<PostView> {
        let text = clean_text(text)?;
        let post = self.find_post(post_id).await?;
        self.relationships
            .ensure_can_interact(actor_id, &post.author_id)
            .await?;

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO comment (id, post_id, author_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&id)
        .bind(post_id)
        .bind(actor_id)
        .bind(&text)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        tracing::debug!("Comment {} added to post {}", id, post_id);

        build_post_view(&self.db, actor_id, post).await
    }

    /// A comment with its replies, as seen by `viewer_id`
    pub async fn get(&self, viewer_id: &str, post_id: &str, comment_id: &str) -> AppResult<CommentView> {
        let (post, comment) = self.find_chain(post_id, comment_id).await?;
        self.relationships
            .ensure_can_view(viewer_id, &post.author_id)
            .await?;

        build_comment_view(&self.db, viewer_id, comment).await
    }

    pub async fn like(&self, actor_id: &str, post_id: &str, comment_id: &str) -> AppResult<CommentView> {
        let (post, comment) = self.find_chain(post_id, comment_id).await?;
        self.relationships
            .ensure_can_interact(actor_id, &post.author_id)
            .await?;

        let result = sqlx::query(
            "INSERT INTO comment_like (comment_id, account_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(comment_id)
        .bind(actor_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        if let Err(sqlx::Error::Database(e)) = &result {
            if e.is_unique_violation() {
                return Err(AppError::Conflict("Comment already liked".to_string()));
            }
        }
        result?;

        build_comment_view(&self.db, actor_id, comment).await
    }

    pub async fn unlike(&self, actor_id: &str, post_id: &str, comment_id: &str) -> AppResult<CommentView> {
        let (post, comment) = self.find_chain(post_id, comment_id).await?;
        self.relationships
            .ensure_can_interact(actor_id, &post.author_id)
            .await?;

        let result =
            sqlx::query("DELETE FROM comment_like WHERE comment_id = ?1 AND account_id = ?2")
                .bind(comment_id)
                .bind(actor_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Comment not liked yet".to_string()));
        }

        build_comment_view(&self.db, actor_id, comment).await
    }

    /// Reply to a comment. Returns the comment with its replies.
    pub async fn reply(
        &self,
        actor_id: &str,
        post_id: &str,
        comment_id: &str,
        text: &str,
    ) -> AppResult<CommentView> {
        let text = clean_text(text)?;
        let (post, comment) = self.find_chain(post_id, comment_id).await?;
        self.relationships
            .ensure_can_interact(actor_id, &post.author_id)
            .await?;

        sqlx::query(
            "INSERT INTO reply (id, comment_id, author_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(comment_id)
        .bind(actor_id)
        .bind(&text)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        build_comment_view(&self.db, actor_id, comment).await
    }

    /// Delete a comment with its likes and replies. Allowed for the comment
    /// author and the post author.
    pub async fn delete(&self, actor_id: &str, post_id: &str, comment_id: &str) -> AppResult<()> {
        let (post, comment) = self.find_chain(post_id, comment_id).await?;

        if actor_id != comment.author_id && actor_id != post.author_id {
            return Err(AppError::Authorization(
                "Only the comment author or the post author can delete this comment".to_string(),
            ));
        }

        sqlx::query("DELETE FROM comment WHERE id = ?1")
            .bind(comment_id)
            .execute(&self.db)
            .await?;

        tracing::info!("Comment {} deleted by {}", comment_id, actor_id);

        Ok(())
    }

    async fn find_post(&self, post_id: &str) -> AppResult<Post> {
        sqlx::query_as::<_, Post>(
            "SELECT id, author_id, caption, location, media, created_at, updated_at
             FROM post WHERE id = ?1",
        )
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    /// Load a comment together with the post it belongs to
    async fn find_chain(&self, post_id: &str, comment_id: &str) -> AppResult<(Post, Comment)> {
        let post = self.find_post(post_id).await?;

        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, author_id, text, created_at FROM comment
             WHERE id = ?1 AND post_id = ?2",
        )
        .bind(comment_id)
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

        Ok((post, comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::{CreatePostRequest, PostManager},
        db,
    };

    struct Fixture {
        comments: CommentManager,
        posts: PostManager,
        relationships: Arc<RelationshipEngine>,
        pool: SqlitePool,
    }

    async fn setup() -> Fixture {
        let pool = db::memory_pool().await;
        let relationships = Arc::new(RelationshipEngine::new(pool.clone()));
        Fixture {
            comments: CommentManager::new(pool.clone(), relationships.clone()),
            posts: PostManager::new(pool.clone(), relationships.clone()),
            relationships,
            pool,
        }
    }

    async fn create_post(posts: &PostManager, author: &str) -> Post {
        posts
            .create(
                author,
                CreatePostRequest {
                    caption: None,
                    location: None,
                    media: vec!["https://cdn.test/p.jpg".to_string()],
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_comment_on_private_post_requires_follow() {
        let f = setup().await;
        let owner = db::insert_test_account(&f.pool, "owner", true).await;
        let fan = db::insert_test_account(&f.pool, "fan", false).await;
        let post = create_post(&f.posts, &owner).await;

        assert!(matches!(
            f.comments.add_comment(&fan, &post.id, "nice").await,
            Err(AppError::Authorization(_))
        ));

        f.relationships.request_follow(&fan, &owner).await.unwrap();
        let request_id: String = sqlx::query_scalar("SELECT id FROM follow_request")
            .fetch_one(&f.pool)
            .await
            .unwrap();
        f.relationships
            .review(&request_id, &owner, "accepted")
            .await
            .unwrap();

        let view = f.comments.add_comment(&fan, &post.id, " nice ").await.unwrap();
        assert_eq!(view.comments_count, 1);
        assert_eq!(view.comments[0].text, "nice");
        assert_eq!(view.comments[0].author.username, "fan");
    }

    #[tokio::test]
    async fn test_comment_text_is_validated() {
        let f = setup().await;
        let a = db::insert_test_account(&f.pool, "alice", false).await;
        let post = create_post(&f.posts, &a).await;

        assert!(matches!(
            f.comments.add_comment(&a, &post.id, "   ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            f.comments.add_comment(&a, "missing", "hi").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_like_and_reply() {
        let f = setup().await;
        let a = db::insert_test_account(&f.pool, "alice", false).await;
        let b = db::insert_test_account(&f.pool, "bob", false).await;
        let post = create_post(&f.posts, &a).await;

        let view = f.comments.add_comment(&b, &post.id, "first").await.unwrap();
        let comment_id = view.comments[0].id.clone();

        let comment = f.comments.like(&a, &post.id, &comment_id).await.unwrap();
        assert_eq!(comment.likes_count, 1);
        assert!(matches!(
            f.comments.like(&a, &post.id, &comment_id).await,
            Err(AppError::Conflict(_))
        ));

        let comment = f
            .comments
            .reply(&a, &post.id, &comment_id, "thanks")
            .await
            .unwrap();
        assert_eq!(comment.replies.len(), 1);
        assert_eq!(comment.replies[0].author.username, "alice");

        let comment = f.comments.unlike(&a, &post.id, &comment_id).await.unwrap();
        assert_eq!(comment.likes_count, 0);
        assert!(matches!(
            f.comments.unlike(&a, &post.id, &comment_id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_checks_actor() {
        let f = setup().await;
        let a = db::insert_test_account(&f.pool, "alice", false).await;
        let b = db::insert_test_account(&f.pool, "bob", false).await;
        let c = db::insert_test_account(&f.pool, "carol", false).await;
        let post = create_post(&f.posts, &a).await;

        let view = f.comments.add_comment(&b, &post.id, "hello").await.unwrap();
        let comment_id = view.comments[0].id.clone();
        f.comments.like(&c, &post.id, &comment_id).await.unwrap();
        f.comments
            .reply(&c, &post.id, &comment_id, "hi")
            .await
            .unwrap();

        assert!(matches!(
            f.comments.delete(&c, &post.id, &comment_id).await,
            Err(AppError::Authorization(_))
        ));

        // Post author may remove comments on their post
        f.comments.delete(&a, &post.id, &comment_id).await.unwrap();

        assert!(matches!(
            f.comments.get(&a, &post.id, &comment_id).await,
            Err(AppError::NotFound(_))
        ));

        for table in ["comment_like", "reply"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&f.pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} rows left behind", table);
        }
    }

    #[tokio::test]
    async fn test_comment_must_belong_to_post() {
        let f = setup().await;
        let a = db::insert_test_account(&f.pool, "alice", false).await;
        let first = create_post(&f.posts, &a).await;
        let second = create_post(&f.posts, &a).await;

        let view = f.comments.add_comment(&a, &first.id, "here").await.unwrap();
        let comment_id = view.comments[0].id.clone();

        assert!(matches!(
            f.comments.like(&a, &second.id, &comment_id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
