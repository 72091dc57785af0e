/// Post handlers: listing, creation, toggles, comments, search, tags
use super::form::MultipartForm;
use super::{ok, respond, AppState};
use crate::error::Result;
use crate::middleware::AuthenticatedUser;
use crate::services::posts::CreatePost;
use actix_multipart::Multipart;
use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Deserialize;

const MAX_POST_FILES: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub caption: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub text: String,
}

/// GET /api/v1/posts
pub async fn list_posts(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let posts = state.posts.list(&user.viewer()).await?;
    Ok(ok(posts))
}

/// GET /api/v1/posts/{id}
pub async fn get_post(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    let post = state.posts.get(&user.viewer(), &id).await?;
    Ok(ok(post))
}

/// POST /api/v1/posts (multipart: `files`, `caption`, `tags`)
pub async fn create_post(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse> {
    let mut form = MultipartForm::read(payload, state.max_upload_bytes, MAX_POST_FILES).await?;
    let req = CreatePost {
        caption: form.text("caption").unwrap_or_default().to_string(),
        tags: form.list("tags")?,
        files: form.take_files("files"),
    };

    let post = state.posts.create(&user.viewer(), req).await?;
    Ok(respond(StatusCode::CREATED, post))
}

/// POST /api/v1/posts/{id}/togglelike
pub async fn toggle_like(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    Ok(ok(state.posts.toggle_like(&user.viewer(), &id).await?))
}

/// POST /api/v1/posts/{id}/toggleRetweet
pub async fn toggle_retweet(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    Ok(ok(state.posts.toggle_retweet(&user.viewer(), &id).await?))
}

/// POST /api/v1/posts/{id}/toggleSave
pub async fn toggle_save(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<String>,
) -> Result<HttpResponse> {
    Ok(ok(state.posts.toggle_save(&user.viewer(), &id).await?))
}

/// POST /api/v1/posts/{id}/comments
pub async fn add_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<String>,
    body: web::Json<CommentBody>,
) -> Result<HttpResponse> {
    let comment = state
        .posts
        .add_comment(&user.viewer(), &id, &body.text)
        .await?;
    Ok(respond(StatusCode::CREATED, comment))
}

/// GET /api/v1/posts/search?caption=&tag=
pub async fn search_posts(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let posts = state
        .posts
        .search(query.caption.as_deref(), query.tag.as_deref())
        .await?;
    Ok(ok(posts))
}

/// GET /api/v1/posts/tags
pub async fn list_tags(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(ok(state.posts.tags().await?))
}
