/// User handlers: directory, profiles, follow edges, feed, profile edits
use super::form::MultipartForm;
use super::{ok, AppState};
use crate::error::Result;
use crate::middleware::AuthenticatedUser;
use crate::services::feed::FeedRequest;
use crate::services::users::EditProfileRequest;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// GET /api/v1/users
pub async fn list_users(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let users = state.users.list(&user.viewer()).await?;
    Ok(ok(users))
}

/// PUT /api/v1/users
pub async fn edit_profile(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    req: web::Json<EditProfileRequest>,
) -> Result<HttpResponse> {
    let updated = state.users.edit(&user.viewer(), req.into_inner()).await?;
    Ok(ok(updated))
}

/// GET /api/v1/users/feed
pub async fn feed(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let page = state
        .feed
        .assemble(
            &user.viewer(),
            &FeedRequest {
                limit: query.limit,
                cursor: query.cursor,
            },
        )
        .await?;
    Ok(ok(page))
}

/// GET /api/v1/users/{username}
pub async fn get_profile(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let profile = state.profiles.compose(&user.viewer(), &username).await?;
    Ok(ok(profile))
}

/// POST /api/v1/users/{id}/follow
pub async fn follow(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    target: web::Path<String>,
) -> Result<HttpResponse> {
    state.follows.follow(&user.viewer(), &target).await?;
    Ok(ok(json!({ "following": true })))
}

/// POST /api/v1/users/{id}/unfollow
pub async fn unfollow(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    target: web::Path<String>,
) -> Result<HttpResponse> {
    state.follows.unfollow(&user.viewer(), &target).await?;
    Ok(ok(json!({ "following": false })))
}

/// PUT /api/v1/users/updateAvatar (multipart field `avatar`)
pub async fn update_avatar(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse> {
    let mut form = MultipartForm::read(payload, state.max_upload_bytes, 1).await?;
    let updated = state
        .users
        .update_avatar(&user.viewer(), form.take_file("avatar"))
        .await?;
    Ok(ok(updated))
}

/// PUT /api/v1/users/updateCover (multipart field `cover`)
pub async fn update_cover(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    payload: Multipart,
) -> Result<HttpResponse> {
    let mut form = MultipartForm::read(payload, state.max_upload_bytes, 1).await?;
    let updated = state
        .users
        .update_cover(&user.viewer(), form.take_file("cover"))
        .await?;
    Ok(ok(updated))
}
