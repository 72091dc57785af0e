/// Authentication: account signup/login and bearer-token resolution
///
/// `IdentityResolver` turns an `Authorization` header into the viewer's user
/// record. `AuthService` creates accounts and issues tokens.
use crate::db::{SocialStore, StoreError};
use crate::error::{AppError, Result};
use crate::models::{canonical_id, NewUser, User};
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use crypto_core::{JwtCodec, JwtError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use validator::Validate;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization token is required")]
    MissingCredential,

    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedCredential,

    #[error("Invalid token")]
    InvalidCredential,

    #[error("Token has expired")]
    ExpiredCredential,

    #[error("No user found for this token")]
    UnknownUser,

    #[error("Invalid email or password")]
    InvalidLogin,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Malformed => AuthError::MalformedCredential,
            JwtError::Expired => AuthError::ExpiredCredential,
            JwtError::InvalidSignature | JwtError::Invalid(_) => AuthError::InvalidCredential,
            other => AuthError::Signing(other.to_string()),
        }
    }
}

/// Resolves a bearer credential to the user it was issued for.
pub struct IdentityResolver {
    codec: JwtCodec,
    store: Arc<dyn SocialStore>,
}

impl IdentityResolver {
    pub fn new(codec: JwtCodec, store: Arc<dyn SocialStore>) -> Self {
        Self { codec, store }
    }

    /// Verify an `Authorization` header value and load the viewer.
    pub async fn verify(&self, header: Option<&str>) -> std::result::Result<User, AuthError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        let token = header
            .split_once(' ')
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MalformedCredential)?;

        let claims = self.codec.validate(token)?;
        let user_id = canonical_id(&claims.sub).ok_or(AuthError::MalformedCredential)?;

        match self.store.find_user_by_id(user_id).await? {
            Some(user) => Ok(user),
            None => {
                debug!(%user_id, "token subject no longer exists");
                Err(AuthError::UnknownUser)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 30, message = "must be 3-30 characters"))]
    pub username: String,
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub fullname: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "must be 8-128 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

pub struct AuthService {
    codec: JwtCodec,
    store: Arc<dyn SocialStore>,
}

/// Path segments under `/users` that would shadow a profile route.
const RESERVED_USERNAMES: &[&str] = &["feed", "updateAvatar", "updateCover"];

impl AuthService {
    pub fn new(codec: JwtCodec, store: Arc<dyn SocialStore>) -> Self {
        Self { codec, store }
    }

    pub async fn signup(&self, req: SignupRequest) -> Result<AuthSession> {
        req.validate()?;
        let username = req.username.trim().to_string();
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(AppError::ValidationFailed(
                "username may only contain letters, digits, '_' and '.'".to_string(),
            ));
        }
        if RESERVED_USERNAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(&username))
        {
            return Err(AppError::Conflict(format!(
                "username '{username}' is reserved"
            )));
        }

        let password_hash = hash_password(&req.password)?;
        let user = self
            .store
            .create_user(NewUser {
                username,
                fullname: req.fullname.trim().to_string(),
                email: req.email.trim().to_lowercase(),
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "account created");
        self.session_for(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthSession> {
        req.validate()?;

        let credentials = self
            .store
            .find_credentials_by_email(&req.email.trim().to_lowercase())
            .await?
            .ok_or(AuthError::InvalidLogin)?;

        verify_password(&req.password, &credentials.password_hash)?;

        let user = self
            .store
            .find_user_by_id(credentials.user_id)
            .await?
            .ok_or(AuthError::InvalidLogin)?;

        debug!(user_id = %user.id, "login succeeded");
        self.session_for(user)
    }

    fn session_for(&self, user: User) -> Result<AuthSession> {
        let token = self
            .codec
            .issue_access_token(user.id, &user.username)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        Ok(AuthSession { token, user })
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> std::result::Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidLogin)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidLogin)
}
