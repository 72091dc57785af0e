/// Store layer
///
/// `SocialStore` is the single persistence seam. Users, follow edges, posts,
/// comments, likes, retweets and bookmarks all live behind it.
///
/// - `postgres::PgStore`: production implementation on sqlx/PostgreSQL
/// - `memory::MemoryStore`: process-local implementation for tests and local runs
///
/// Every multi-record write (follow edge + both counters, like + counter,
/// comment + counter) is applied atomically by the implementation.
pub mod memory;
pub mod postgres;

use crate::models::{
    Comment, NewComment, NewPost, NewUser, Post, ProfileUpdate, Toggle, User, UserCredentials,
    UserSummary,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate value: {0}")]
    Duplicate(String),

    #[error("Edge already exists")]
    EdgeExists,

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SocialStore: Send + Sync {
    // ========== Users ==========

    /// Insert a user; `Duplicate` when the username or email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>>;

    /// All users, oldest account first.
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Users for the given ids; unknown ids are skipped.
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<User>>;

    /// Summaries for the given ids, in the order of `ids`; unknown ids are skipped.
    async fn find_user_summaries(&self, ids: &[Uuid]) -> StoreResult<Vec<UserSummary>>;

    /// Apply a profile update; `None` when the user does not exist.
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<Option<User>>;

    // ========== Follow edges ==========

    /// Add `follower -> followee`, bumping both counters in the same unit.
    /// `EdgeExists` when the edge is already present; nothing changes then.
    async fn add_follow_edge(&self, follower: Uuid, followee: Uuid) -> StoreResult<()>;

    /// Remove `follower -> followee`, dropping both counters in the same unit.
    /// Returns false when there was no edge; counters stay untouched then.
    async fn remove_follow_edge(&self, follower: Uuid, followee: Uuid) -> StoreResult<bool>;

    // ========== Posts ==========

    async fn create_post(&self, post: NewPost) -> StoreResult<Post>;

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>>;

    /// Posts for the given ids in no particular order; unknown ids are skipped.
    async fn find_posts_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Post>>;

    /// Every post, newest first.
    async fn list_posts(&self) -> StoreResult<Vec<Post>>;

    /// Posts whose caption contains `caption` (case-insensitive).
    async fn search_posts_by_caption(&self, caption: &str) -> StoreResult<Vec<Post>>;

    /// Posts carrying exactly `tag`.
    async fn search_posts_by_tag(&self, tag: &str) -> StoreResult<Vec<Post>>;

    /// Distinct tags across all posts, sorted.
    async fn list_tags(&self) -> StoreResult<Vec<String>>;

    /// Flip `user`'s like on `post`; `NotFound` when the post does not exist.
    async fn toggle_like(&self, post: Uuid, user: Uuid) -> StoreResult<Toggle>;

    /// Flip `user`'s retweet on `post`; `NotFound` when the post does not exist.
    async fn toggle_retweet(&self, post: Uuid, user: Uuid) -> StoreResult<Toggle>;

    /// Flip `post` in `user`'s saved posts; `NotFound` when the post does not exist.
    async fn toggle_saved(&self, user: Uuid, post: Uuid) -> StoreResult<Toggle>;

    // ========== Comments ==========

    /// Insert a comment and bump the post's comment counter in one unit.
    async fn add_comment(&self, comment: NewComment) -> StoreResult<Comment>;

    /// Comments for all given posts, oldest first.
    async fn find_comments_for_posts(&self, post_ids: &[Uuid]) -> StoreResult<Vec<Comment>>;

    // ========== Health ==========

    async fn ping(&self) -> StoreResult<()>;
}
