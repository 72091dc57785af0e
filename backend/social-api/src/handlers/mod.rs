/// HTTP handlers for social-api
///
/// - `auth`: signup, login, current user
/// - `users`: directory, profiles, follow edges, feed, profile edits
/// - `posts`: posts, toggles, comments, search, tags
///
/// Successful responses use `{ "success": true, "data": ... }`; failures are
/// rendered by `AppError`.
pub mod auth;
pub mod form;
pub mod posts;
pub mod users;

use crate::db::SocialStore;
use crate::error::AppError;
use crate::metrics::serve_metrics;
use crate::middleware::JwtAuthMiddleware;
use crate::services::{
    AuthService, DirectoryPolicy, FeedAssembler, FollowService, IdentityResolver, MediaStore,
    PostService, ProfileComposer, UserService,
};
use actix_web::{http::StatusCode, web, HttpResponse};
use crypto_core::JwtCodec;
use serde::Serialize;
use std::sync::Arc;

/// Shared, per-process service graph handed to every handler.
pub struct AppState {
    pub store: Arc<dyn SocialStore>,
    pub resolver: Arc<IdentityResolver>,
    pub auth: AuthService,
    pub users: UserService,
    pub posts: PostService,
    pub follows: FollowService,
    pub feed: FeedAssembler,
    pub profiles: ProfileComposer,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SocialStore>,
        media: Arc<dyn MediaStore>,
        codec: JwtCodec,
        policy: DirectoryPolicy,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            resolver: Arc::new(IdentityResolver::new(codec.clone(), store.clone())),
            auth: AuthService::new(codec, store.clone()),
            users: UserService::new(store.clone(), media.clone(), policy, max_upload_bytes),
            posts: PostService::new(store.clone(), media, max_upload_bytes),
            follows: FollowService::new(store.clone()),
            feed: FeedAssembler::new(store.clone()),
            profiles: ProfileComposer::new(store.clone()),
            store,
            max_upload_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

pub fn respond<T: Serialize>(status: StatusCode, data: T) -> HttpResponse {
    HttpResponse::build(status).json(ApiResponse {
        success: true,
        data,
    })
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    respond(StatusCode::OK, data)
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => ok(serde_json::json!({ "status": "ok" })),
        Err(err) => {
            tracing::warn!("store health check failed: {}", err);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "success": false,
                "error": "unavailable",
                "message": "Store is unreachable",
                "status": 503,
            }))
        }
    }
}

/// Register every route. Public resources are registered ahead of the
/// authenticated scopes that share their prefix.
pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let auth = JwtAuthMiddleware::new(state.resolver.clone());

    cfg.app_data(state)
        .app_data(
            web::JsonConfig::default()
                .limit(64 * 1024)
                .error_handler(|err, _| AppError::ValidationFailed(err.to_string()).into()),
        )
        .app_data(
            web::QueryConfig::default()
                .error_handler(|err, _| AppError::ValidationFailed(err.to_string()).into()),
        )
        .app_data(
            web::PathConfig::default()
                .error_handler(|err, _| AppError::ValidationFailed(err.to_string()).into()),
        )
        .route("/metrics", web::get().to(serve_metrics))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health))
                .route("/auth/signup", web::post().to(auth::signup))
                .route("/auth/login", web::post().to(auth::login))
                .service(
                    web::resource("/auth/me")
                        .wrap(auth.clone())
                        .route(web::get().to(auth::me)),
                )
                .route("/posts/tags", web::get().to(posts::list_tags))
                .route("/posts/search", web::get().to(posts::search_posts))
                .service(
                    web::scope("/users")
                        .wrap(auth.clone())
                        .service(
                            web::resource("")
                                .route(web::get().to(users::list_users))
                                .route(web::put().to(users::edit_profile)),
                        )
                        .route("/feed", web::get().to(users::feed))
                        .route("/updateAvatar", web::put().to(users::update_avatar))
                        .route("/updateCover", web::put().to(users::update_cover))
                        .route("/{username}", web::get().to(users::get_profile))
                        .route("/{id}/follow", web::post().to(users::follow))
                        .route("/{id}/unfollow", web::post().to(users::unfollow)),
                )
                .service(
                    web::scope("/posts")
                        .wrap(auth)
                        .service(
                            web::resource("")
                                .route(web::get().to(posts::list_posts))
                                .route(web::post().to(posts::create_post)),
                        )
                        .route("/{id}", web::get().to(posts::get_post))
                        .route("/{id}/togglelike", web::post().to(posts::toggle_like))
                        .route("/{id}/toggleRetweet", web::post().to(posts::toggle_retweet))
                        .route("/{id}/toggleSave", web::post().to(posts::toggle_save))
                        .route("/{id}/comments", web::post().to(posts::add_comment)),
                ),
        );
}
