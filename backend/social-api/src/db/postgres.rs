use super::{SocialStore, StoreError, StoreResult};
use crate::models::{
    Comment, NewComment, NewPost, NewUser, Post, ProfileUpdate, Toggle, User, UserCredentials,
    UserSummary, DEFAULT_AVATAR,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Relational projection of a user; membership arrays are aggregated from
/// the edge tables so callers see the same shape as any other store.
const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.fullname, u.email, u.bio, u.avatar, u.cover_image,
           u.followers_count, u.following_count, u.created_at,
           ARRAY(SELECT f.follower_id FROM follows f
                 WHERE f.followee_id = u.id ORDER BY f.created_at, f.follower_id) AS followers,
           ARRAY(SELECT f.followee_id FROM follows f
                 WHERE f.follower_id = u.id ORDER BY f.created_at, f.followee_id) AS following,
           ARRAY(SELECT p.id FROM posts p
                 WHERE p.user_id = u.id ORDER BY p.created_at DESC, p.id) AS posts,
           ARRAY(SELECT s.post_id FROM saved_posts s
                 WHERE s.user_id = u.id ORDER BY s.created_at DESC, s.post_id) AS saved_posts
    FROM users u
"#;

const POST_SELECT: &str = r#"
    SELECT p.id, p.user_id, p.files, p.tags, p.caption, p.created_at,
           p.likes_count, p.comments_count, p.retweet_count,
           ARRAY(SELECT l.user_id FROM post_likes l
                 WHERE l.post_id = p.id ORDER BY l.created_at, l.user_id) AS likes,
           CASE WHEN p.retweets_tracked
                THEN ARRAY(SELECT r.user_id FROM post_retweets r
                           WHERE r.post_id = p.id ORDER BY r.created_at, r.user_id)
           END AS retweets
    FROM posts p
"#;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    fullname: String,
    email: String,
    bio: Option<String>,
    avatar: String,
    cover_image: Option<String>,
    followers_count: i64,
    following_count: i64,
    created_at: DateTime<Utc>,
    followers: Vec<Uuid>,
    following: Vec<Uuid>,
    posts: Vec<Uuid>,
    saved_posts: Vec<Uuid>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            fullname: row.fullname,
            email: row.email,
            bio: row.bio,
            avatar: row.avatar,
            cover_image: row.cover_image,
            followers: row.followers,
            following: row.following,
            followers_count: row.followers_count,
            following_count: row.following_count,
            posts: row.posts,
            saved_posts: row.saved_posts,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    user_id: Uuid,
    files: Vec<String>,
    tags: Vec<String>,
    caption: String,
    created_at: DateTime<Utc>,
    likes_count: i64,
    comments_count: i64,
    retweet_count: i64,
    likes: Vec<Uuid>,
    retweets: Option<Vec<Uuid>>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            user_id: row.user_id,
            files: row.files,
            tags: row.tags,
            caption: row.caption,
            created_at: row.created_at,
            likes: row.likes,
            retweets: row.retweets,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
            retweet_count: row.retweet_count,
        }
    }
}

fn map_unique(err: sqlx::Error, what: impl Into<String>) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(what.into())
        }
        other => StoreError::Database(other),
    }
}

/// Escape LIKE metacharacters so user input only ever matches literally.
fn like_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Lock both endpoints of a follow edge in id order, so crossed follows
    /// between the same pair queue instead of deadlocking. Returns how many
    /// of the two users exist.
    async fn lock_edge_users(
        tx: &mut Transaction<'_, Postgres>,
        follower: Uuid,
        followee: Uuid,
    ) -> StoreResult<usize> {
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE",
        )
        .bind(vec![follower, followee])
        .fetch_all(&mut **tx)
        .await?;
        Ok(locked.len())
    }

    async fn lock_post(tx: &mut Transaction<'_, Postgres>, post: Uuid) -> StoreResult<()> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post)
            .fetch_optional(&mut **tx)
            .await?;
        found
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("post {post}")))
    }
}

#[async_trait]
impl SocialStore for PgStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (id, username, fullname, email, password_hash, avatar)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.fullname)
        .bind(new.email.to_lowercase())
        .bind(&new.password_hash)
        .bind(DEFAULT_AVATAR)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, format!("username '{}' or email", new.username)))?;

        self.find_user_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE u.username = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, password_hash FROM users WHERE email = $1",
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, password_hash)| UserCredentials {
            user_id,
            password_hash,
        }))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("{USER_SELECT} ORDER BY u.created_at, u.id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{USER_SELECT} WHERE u.id = ANY($1)");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_user_summaries(&self, ids: &[Uuid]) -> StoreResult<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT id, username, fullname, avatar FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: HashMap<Uuid, UserSummary> = rows.into_iter().map(|s| (s.id, s)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<Option<User>> {
        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
            SET fullname = COALESCE($2, fullname),
                bio = COALESCE($3, bio),
                avatar = COALESCE($4, avatar),
                cover_image = COALESCE($5, cover_image)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(update.fullname)
        .bind(update.bio)
        .bind(update.avatar)
        .bind(update.cover_image)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.find_user_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn add_follow_edge(&self, follower: Uuid, followee: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        if Self::lock_edge_users(&mut tx, follower, followee).await? < 2 {
            return Err(StoreError::NotFound(format!("user {followee}")));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id)
            VALUES ($1, $2)
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            "#,
        )
        .bind(follower)
        .bind(followee)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::EdgeExists);
        }

        sqlx::query("UPDATE users SET followers_count = followers_count + 1 WHERE id = $1")
            .bind(followee)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = $1")
            .bind(follower)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_follow_edge(&self, follower: Uuid, followee: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        Self::lock_edge_users(&mut tx, follower, followee).await?;

        let deleted = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower)
            .bind(followee)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE users SET followers_count = GREATEST(followers_count - 1, 0) WHERE id = $1",
        )
        .bind(followee)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE users SET following_count = GREATEST(following_count - 1, 0) WHERE id = $1",
        )
        .bind(follower)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_post(&self, new: NewPost) -> StoreResult<Post> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO posts (id, user_id, caption, files, tags)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.caption)
        .bind(&new.files)
        .bind(&new.tags)
        .fetch_one(&self.pool)
        .await?;

        self.find_post(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        let sql = format!("{POST_SELECT} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Post::from))
    }

    async fn find_posts_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{POST_SELECT} WHERE p.id = ANY($1)");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let sql = format!("{POST_SELECT} ORDER BY p.created_at DESC, p.id");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn search_posts_by_caption(&self, caption: &str) -> StoreResult<Vec<Post>> {
        let sql = format!(
            "{POST_SELECT} WHERE p.caption ILIKE $1 ESCAPE '\\' ORDER BY p.created_at DESC, p.id"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(like_pattern(caption))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn search_posts_by_tag(&self, tag: &str) -> StoreResult<Vec<Post>> {
        let sql = format!("{POST_SELECT} WHERE $1 = ANY(p.tags) ORDER BY p.created_at DESC, p.id");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(tag)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn list_tags(&self) -> StoreResult<Vec<String>> {
        let tags = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT t FROM posts, UNNEST(posts.tags) AS t ORDER BY t",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }

    async fn toggle_like(&self, post: Uuid, user: Uuid) -> StoreResult<Toggle> {
        let mut tx = self.pool.begin().await?;
        Self::lock_post(&mut tx, post).await?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post)
            .bind(user)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let outcome = if removed {
            sqlx::query(
                "UPDATE posts SET likes_count = GREATEST(likes_count - 1, 0) WHERE id = $1",
            )
            .bind(post)
            .execute(&mut *tx)
            .await?;
            Toggle::Removed
        } else {
            sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
                .bind(post)
                .bind(user)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE posts SET likes_count = likes_count + 1 WHERE id = $1")
                .bind(post)
                .execute(&mut *tx)
                .await?;
            Toggle::Added
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn toggle_retweet(&self, post: Uuid, user: Uuid) -> StoreResult<Toggle> {
        let mut tx = self.pool.begin().await?;
        Self::lock_post(&mut tx, post).await?;

        let removed = sqlx::query("DELETE FROM post_retweets WHERE post_id = $1 AND user_id = $2")
            .bind(post)
            .bind(user)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let outcome = if removed {
            sqlx::query(
                r#"
                UPDATE posts
                SET retweet_count = GREATEST(retweet_count - 1, 0), retweets_tracked = TRUE
                WHERE id = $1
                "#,
            )
            .bind(post)
            .execute(&mut *tx)
            .await?;
            Toggle::Removed
        } else {
            sqlx::query("INSERT INTO post_retweets (post_id, user_id) VALUES ($1, $2)")
                .bind(post)
                .bind(user)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                UPDATE posts
                SET retweet_count = retweet_count + 1, retweets_tracked = TRUE
                WHERE id = $1
                "#,
            )
            .bind(post)
            .execute(&mut *tx)
            .await?;
            Toggle::Added
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn toggle_saved(&self, user: Uuid, post: Uuid) -> StoreResult<Toggle> {
        let mut tx = self.pool.begin().await?;
        Self::lock_post(&mut tx, post).await?;

        let removed = sqlx::query("DELETE FROM saved_posts WHERE user_id = $1 AND post_id = $2")
            .bind(user)
            .bind(post)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query("INSERT INTO saved_posts (user_id, post_id) VALUES ($1, $2)")
                .bind(user)
                .bind(post)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(if removed { Toggle::Removed } else { Toggle::Added })
    }

    async fn add_comment(&self, new: NewComment) -> StoreResult<Comment> {
        let mut tx = self.pool.begin().await?;
        Self::lock_post(&mut tx, new.post_id).await?;

        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, post_id, user_id, text)
            VALUES ($1, $2, $3, $4)
            RETURNING id, post_id, user_id, text, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.post_id)
        .bind(new.user_id)
        .bind(&new.text)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1")
            .bind(new.post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn find_comments_for_posts(&self, post_ids: &[Uuid]) -> StoreResult<Vec<Comment>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, user_id, text, created_at
            FROM comments
            WHERE post_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
