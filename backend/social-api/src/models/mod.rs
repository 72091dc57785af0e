/// Data models for social-api
///
/// Typed records the store hands out. Whatever shape the backing database
/// uses, rows are mapped into these structures before any service sees them.
///
/// - `User`, `UserSummary`: accounts and the compact author card
/// - `Post`, `Comment`: content
/// - `PostDetail`, `CommentDetail`: content joined with author summaries
/// - `NewUser`, `NewPost`, `NewComment`, `ProfileUpdate`: write payloads
pub mod ids;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use ids::{canonical_id, contains_id, IdSet};

pub const DEFAULT_AVATAR: &str =
    "https://res.cloudinary.com/murmur/image/upload/v1/defaults/avatar.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts: Vec<Uuid>,
    pub saved_posts: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            fullname: self.fullname.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Compact author card embedded in posts, comments and follower lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub avatar: String,
}

/// Password material, only returned by the credentials lookup.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub files: Vec<String>,
    pub tags: Vec<String>,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub likes: Vec<Uuid>,
    /// `None` for posts written before retweets existed; read as empty.
    pub retweets: Option<Vec<Uuid>>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub retweet_count: i64,
}

impl Post {
    pub fn retweets(&self) -> &[Uuid] {
        self.retweets.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A comment joined with its author's summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentDetail {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
}

/// A post joined with its author and its comments, oldest comment first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub user: UserSummary,
    pub comments: Vec<CommentDetail>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Uuid,
    pub caption: String,
    pub files: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
}

/// Fields an owner may change on their own profile; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
}

/// Result of a toggle on a per-user membership (like, retweet, bookmark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Added,
    Removed,
}

impl Toggle {
    pub fn is_added(self) -> bool {
        matches!(self, Toggle::Added)
    }
}
