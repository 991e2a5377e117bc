/// Comment, comment-like and reply endpoints
use crate::{
    api::{ApiResponse, AppJson},
    auth::AuthContext,
    content::{CommentView, PostView, TextRequest},
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};

/// Build comment routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/comments/:post_id", post(add_comment))
        .route(
            "/comments/:post_id/:comment_id",
            get(get_comment).delete(delete_comment),
        )
        .route("/comments/:post_id/:comment_id/like", post(like_comment))
        .route("/comments/:post_id/:comment_id/unlike", patch(unlike_comment))
        .route("/comments/:post_id/:comment_id/reply", post(reply))
}

async fn add_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(post_id): Path<String>,
    AppJson(req): AppJson<TextRequest>,
) -> AppResult<Json<ApiResponse<PostView>>> {
    let post = ctx.comments.add_comment(auth.id(), &post_id, &req.text).await?;
    Ok(Json(ApiResponse::with("Comment Done", post)))
}

async fn get_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    let comment = ctx.comments.get(auth.id(), &post_id, &comment_id).await?;
    Ok(Json(ApiResponse::data(comment)))
}

async fn like_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    let comment = ctx.comments.like(auth.id(), &post_id, &comment_id).await?;
    Ok(Json(ApiResponse::with("Comment liked", comment)))
}

async fn unlike_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    let comment = ctx.comments.unlike(auth.id(), &post_id, &comment_id).await?;
    Ok(Json(ApiResponse::with("Comment unliked", comment)))
}

async fn reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(String, String)>,
    AppJson(req): AppJson<TextRequest>,
) -> AppResult<Json<ApiResponse<CommentView>>> {
    let comment = ctx
        .comments
        .reply(auth.id(), &post_id, &comment_id, &req.text)
        .await?;
    Ok(Json(ApiResponse::with("Reply Done", comment)))
}

async fn delete_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<()>>> {
    ctx.comments.delete(auth.id(), &post_id, &comment_id).await?;
    Ok(Json(ApiResponse::message("Comment deleted successfully")))
}
