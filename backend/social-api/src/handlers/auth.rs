/// Authentication handlers
use super::{ok, respond, AppState};
use crate::error::Result;
use crate::middleware::AuthenticatedUser;
use crate::services::auth::{LoginRequest, SignupRequest};
use actix_web::{http::StatusCode, web, HttpResponse};

/// POST /api/v1/auth/signup
pub async fn signup(
    state: web::Data<AppState>,
    req: web::Json<SignupRequest>,
) -> Result<HttpResponse> {
    let session = state.auth.signup(req.into_inner()).await?;
    Ok(respond(StatusCode::CREATED, session))
}

/// POST /api/v1/auth/login
pub async fn login(
    state: web::Data<AppState>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let session = state.auth.login(req.into_inner()).await?;
    Ok(ok(session))
}

/// GET /api/v1/auth/me
pub async fn me(user: AuthenticatedUser) -> HttpResponse {
    ok(user.0)
}
