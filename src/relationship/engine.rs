/// Follow requests, follow edges and blocks
use super::visibility::{can_interact, can_view, is_blocked_between, Relations};
use crate::{
    db::models::{AccountSummary, FollowStatus},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

/// Result of sending a follow request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Target is public, the follow took effect immediately
    Following { username: String },
    /// Target is private, a pending request awaits review
    Requested { username: String },
}

impl FollowOutcome {
    pub fn message(&self) -> String {
        match self {
            FollowOutcome::Following { username } => format!("Now following user: {}", username),
            FollowOutcome::Requested { username } => {
                format!("Follow request sent to user: {}", username)
            }
        }
    }
}

/// Decision taken on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Accepted,
    Rejected,
}

impl FromStr for ReviewDecision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(ReviewDecision::Accepted),
            "rejected" => Ok(ReviewDecision::Rejected),
            _ => Err(AppError::Validation(
                "Invalid Status - Allowed values: accepted/rejected".to_string(),
            )),
        }
    }
}

/// Pending request addressed to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRequest {
    pub id: String,
    pub from: AccountSummary,
    pub created_at: DateTime<Utc>,
}

/// How the caller relates to another account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipStatus {
    /// Status of the caller's request to the target, if any
    pub request: Option<FollowStatus>,
    pub following: bool,
    pub followed_by: bool,
    pub blocked: bool,
    pub blocked_by: bool,
}

/// Owner of every relationship mutation
pub struct RelationshipEngine {
    db: SqlitePool,
}

impl RelationshipEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Load the privacy flag and relationship sets of an account
    pub async fn relations(&self, id: &str) -> AppResult<Relations> {
        let is_private: bool = sqlx::query_scalar("SELECT is_private FROM account WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        let followers = self
            .id_set("SELECT follower_id FROM follow WHERE followee_id = ?1", id)
            .await?;
        let following = self
            .id_set("SELECT followee_id FROM follow WHERE follower_id = ?1", id)
            .await?;
        let blocked = self
            .id_set("SELECT blocked_id FROM block WHERE blocker_id = ?1", id)
            .await?;

        Ok(Relations {
            id: id.to_string(),
            is_private,
            followers,
            following,
            blocked,
        })
    }

    async fn id_set(&self, query: &str, id: &str) -> AppResult<BTreeSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(query)
            .bind(id)
            .fetch_all(&self.db)
            .await?;

        Ok(ids.into_iter().collect())
    }

    /// Fail unless `viewer_id` may see `owner_id`'s content
    pub async fn ensure_can_view(&self, viewer_id: &str, owner_id: &str) -> AppResult<()> {
        if viewer_id == owner_id {
            return Ok(());
        }

        let viewer = self.relations(viewer_id).await?;
        let owner = self.relations(owner_id).await?;

        if can_view(&viewer, &owner) {
            Ok(())
        } else {
            Err(denied(&viewer, &owner))
        }
    }

    /// Fail unless `viewer_id` may like or comment on `owner_id`'s content
    pub async fn ensure_can_interact(&self, viewer_id: &str, owner_id: &str) -> AppResult<()> {
        if viewer_id == owner_id {
            return Ok(());
        }

        let viewer = self.relations(viewer_id).await?;
        let owner = self.relations(owner_id).await?;

        if can_interact(&viewer, &owner) {
            Ok(())
        } else {
            Err(denied(&viewer, &owner))
        }
    }

    /// Send a follow request. Public targets are followed at once.
    pub async fn request_follow(&self, from_id: &str, to_id: &str) -> AppResult<FollowOutcome> {
        if from_id == to_id {
            return Err(AppError::Validation("You cannot follow yourself".to_string()));
        }

        let target = sqlx::query("SELECT username, is_private FROM account WHERE id = ?1")
            .bind(to_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;
        let username: String = target.get("username");
        let is_private: bool = target.get("is_private");

        if self.is_blocking(to_id, from_id).await? {
            return Err(AppError::Authorization("You are blocked".to_string()));
        }
        if self.is_blocking(from_id, to_id).await? {
            return Err(AppError::Validation(
                "Unblock this user before following them".to_string(),
            ));
        }

        if let Some(status) = self.request_status(from_id, to_id).await? {
            return Err(AppError::Conflict(match status {
                FollowStatus::Pending => "Follow request already pending".to_string(),
                FollowStatus::Accepted => "You are already following this user".to_string(),
            }));
        }

        let status = if is_private {
            FollowStatus::Pending
        } else {
            FollowStatus::Accepted
        };
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO follow_request (id, from_id, to_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(from_id)
        .bind(to_id)
        .bind(status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(e)) = &inserted {
            if e.is_unique_violation() {
                return Err(AppError::Conflict(
                    "Follow request already pending".to_string(),
                ));
            }
        }
        inserted?;

        if status == FollowStatus::Accepted {
            insert_follow_edge(&mut tx, from_id, to_id, now).await?;
        }

        tx.commit().await?;

        tracing::info!("{} -> {} follow request {}", from_id, to_id, status.as_str());

        Ok(match status {
            FollowStatus::Pending => FollowOutcome::Requested { username },
            FollowStatus::Accepted => FollowOutcome::Following { username },
        })
    }

    /// Accept or reject a pending request addressed to `actor_id`
    pub async fn review(
        &self,
        request_id: &str,
        actor_id: &str,
        decision: &str,
    ) -> AppResult<ReviewDecision> {
        let decision: ReviewDecision = decision.parse()?;

        let row = sqlx::query(
            "SELECT from_id, status FROM follow_request WHERE id = ?1 AND to_id = ?2",
        )
        .bind(request_id)
        .bind(actor_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Request does not exist or Invalid Operation".to_string())
        })?;

        let from_id: String = row.get("from_id");
        let status: String = row.get("status");
        if status != FollowStatus::Pending.as_str() {
            return Err(AppError::Conflict("Request already handled".to_string()));
        }

        let mut tx = self.db.begin().await?;

        match decision {
            ReviewDecision::Rejected => {
                sqlx::query("DELETE FROM follow_request WHERE id = ?1")
                    .bind(request_id)
                    .execute(&mut *tx)
                    .await?;
            }
            ReviewDecision::Accepted => {
                sqlx::query("UPDATE follow_request SET status = ?1 WHERE id = ?2")
                    .bind(FollowStatus::Accepted.as_str())
                    .bind(request_id)
                    .execute(&mut *tx)
                    .await?;

                insert_follow_edge(&mut tx, &from_id, actor_id, Utc::now()).await?;
            }
        }

        tx.commit().await?;

        tracing::info!("Follow request {} reviewed: {:?}", request_id, decision);

        Ok(decision)
    }

    /// Stop following `target_id`
    pub async fn unfollow(&self, actor_id: &str, target_id: &str) -> AppResult<()> {
        self.ensure_exists(target_id).await?;

        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM follow WHERE follower_id = ?1 AND followee_id = ?2")
            .bind(actor_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            return Err(AppError::Validation(
                "You are not following this user".to_string(),
            ));
        }

        sqlx::query("DELETE FROM follow_request WHERE from_id = ?1 AND to_id = ?2")
            .bind(actor_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("{} unfollowed {}", actor_id, target_id);

        Ok(())
    }

    /// Withdraw the caller's own pending request to `target_id`
    pub async fn cancel_request(&self, actor_id: &str, target_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "DELETE FROM follow_request WHERE from_id = ?1 AND to_id = ?2 AND status = ?3",
        )
        .bind(actor_id)
        .bind(target_id)
        .bind(FollowStatus::Pending.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "No pending request to this user".to_string(),
            ));
        }

        Ok(())
    }

    /// Block `target_id`, severing follows and requests in both directions.
    /// Returns the blocked account's username.
    pub async fn block(&self, actor_id: &str, target_id: &str) -> AppResult<String> {
        if actor_id == target_id {
            return Err(AppError::Validation("You cannot block yourself".to_string()));
        }

        let username: String = sqlx::query_scalar("SELECT username FROM account WHERE id = ?1")
            .bind(target_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if self.is_blocking(actor_id, target_id).await? {
            return Err(AppError::Conflict("User already blocked".to_string()));
        }

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM follow WHERE (follower_id = ?1 AND followee_id = ?2)
                OR (follower_id = ?2 AND followee_id = ?1)",
        )
        .bind(actor_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM follow_request WHERE (from_id = ?1 AND to_id = ?2)
                OR (from_id = ?2 AND to_id = ?1)",
        )
        .bind(actor_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO block (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(actor_id)
            .bind(target_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("{} blocked {}", actor_id, target_id);

        Ok(username)
    }

    /// Lift a block. Earlier follows are not restored.
    pub async fn unblock(&self, actor_id: &str, target_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM block WHERE blocker_id = ?1 AND blocked_id = ?2")
            .bind(actor_id)
            .bind(target_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("User is not blocked".to_string()));
        }

        tracing::info!("{} unblocked {}", actor_id, target_id);

        Ok(())
    }

    /// Pending requests addressed to `actor_id`, newest first
    pub async fn incoming_requests(&self, actor_id: &str) -> AppResult<Vec<IncomingRequest>> {
        let rows = sqlx::query(
            "SELECT r.id AS request_id, r.created_at AS requested_at,
                    a.id, a.username, a.first_name, a.last_name, a.profile_picture, a.is_private
             FROM follow_request r
             JOIN account a ON a.id = r.from_id
             WHERE r.to_id = ?1 AND r.status = ?2
             ORDER BY r.created_at DESC",
        )
        .bind(actor_id)
        .bind(FollowStatus::Pending.as_str())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .iter()
            .map(|row| IncomingRequest {
                id: row.get("request_id"),
                from: AccountSummary {
                    id: row.get("id"),
                    username: row.get("username"),
                    first_name: row.get("first_name"),
                    last_name: row.get("last_name"),
                    profile_picture: row.get("profile_picture"),
                    is_private: row.get("is_private"),
                },
                created_at: row.get("requested_at"),
            })
            .collect())
    }

    /// How `actor_id` relates to `target_id`
    pub async fn relationship_status(
        &self,
        actor_id: &str,
        target_id: &str,
    ) -> AppResult<RelationshipStatus> {
        let actor = self.relations(actor_id).await?;
        let target = self.relations(target_id).await?;

        Ok(RelationshipStatus {
            request: self.request_status(actor_id, target_id).await?,
            following: target.is_followed_by(actor_id),
            followed_by: actor.is_followed_by(target_id),
            blocked: actor.has_blocked(target_id),
            blocked_by: target.has_blocked(actor_id),
        })
    }

    /// Find accounts by username or name. The caller and anyone blocked in
    /// either direction are left out.
    pub async fn search(
        &self,
        actor_id: &str,
        query: &str,
        limit: u32,
    ) -> AppResult<Vec<AccountSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }

        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        let results = sqlx::query_as::<_, AccountSummary>(
            r"SELECT id, username, first_name, last_name, profile_picture, is_private
             FROM account
             WHERE id <> ?1
               AND (username LIKE ?2 ESCAPE '\'
                    OR lower(first_name) LIKE ?2 ESCAPE '\'
                    OR lower(last_name) LIKE ?2 ESCAPE '\'
                    OR lower(first_name || ' ' || last_name) LIKE ?2 ESCAPE '\')
               AND id NOT IN (SELECT blocked_id FROM block WHERE blocker_id = ?1)
               AND id NOT IN (SELECT blocker_id FROM block WHERE blocked_id = ?1)
             ORDER BY username
             LIMIT ?3",
        )
        .bind(actor_id)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(results)
    }

    async fn ensure_exists(&self, id: &str) -> AppResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.db)
            .await?;

        if count == 0 {
            return Err(AppError::NotFound("User does not exist".to_string()));
        }
        Ok(())
    }

    async fn is_blocking(&self, blocker_id: &str, blocked_id: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM block WHERE blocker_id = ?1 AND blocked_id = ?2",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }

    async fn request_status(&self, from_id: &str, to_id: &str) -> AppResult<Option<FollowStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM follow_request WHERE from_id = ?1 AND to_id = ?2",
        )
        .bind(from_id)
        .bind(to_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(match status.as_deref() {
            Some("pending") => Some(FollowStatus::Pending),
            Some("accepted") => Some(FollowStatus::Accepted),
            _ => None,
        })
    }
}

async fn insert_follow_edge(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    follower_id: &str,
    followee_id: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO follow (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)")
        .bind(follower_id)
        .bind(followee_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn denied(viewer: &Relations, owner: &Relations) -> AppError {
    if is_blocked_between(viewer, owner) {
        AppError::Authorization("You cannot interact with this user".to_string())
    } else {
        AppError::Authorization(
            "This account is private. Follow them to see their posts".to_string(),
        )
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
