/// Post endpoints
use crate::{
    api::{ApiResponse, AppJson},
    auth::AuthContext,
    content::{CreatePostRequest, FeedQuery, PostView, UpdatePostRequest},
    context::AppContext,
    db::models::Post,
    error::AppResult,
    validation::validate_request,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};

/// Build post routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/posts/create", post(create_post))
        .route("/posts", get(list_posts))
        .route("/posts/feed", get(feed))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/posts/:id/like", patch(like_post))
        .route("/posts/:id/unlike", patch(unlike_post))
}

async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    AppJson(req): AppJson<CreatePostRequest>,
) -> AppResult<Json<ApiResponse<Post>>> {
    validate_request(&req)?;
    let post = ctx.posts.create(auth.id(), req).await?;
    Ok(Json(ApiResponse::with("Post created successfully", post)))
}

/// The caller's own posts
async fn list_posts(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<ApiResponse<Vec<Post>>>> {
    let posts = ctx.posts.list_by_author(auth.id()).await?;
    Ok(Json(ApiResponse::with("Fetched all posts", posts)))
}

async fn feed(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<ApiResponse<Vec<PostView>>>> {
    let posts = ctx.posts.feed(auth.id(), &query).await?;
    Ok(Json(ApiResponse::data(posts)))
}

async fn get_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<PostView>>> {
    let post = ctx.posts.get(auth.id(), &id).await?;
    Ok(Json(ApiResponse::with("Fetched single post", post)))
}

async fn update_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdatePostRequest>,
) -> AppResult<Json<ApiResponse<Post>>> {
    validate_request(&req)?;
    let post = ctx.posts.update(auth.id(), &id, req).await?;
    Ok(Json(ApiResponse::with("Post updated successfully", post)))
}

async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    ctx.posts.delete(auth.id(), &id).await?;
    Ok(Json(ApiResponse::message("Post deleted successfully")))
}

async fn like_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<PostView>>> {
    let post = ctx.posts.like(auth.id(), &id).await?;
    Ok(Json(ApiResponse::with("Like Done", post)))
}

async fn unlike_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<PostView>>> {
    let post = ctx.posts.unlike(auth.id(), &id).await?;
    Ok(Json(ApiResponse::with("Unlike Done", post)))
}
