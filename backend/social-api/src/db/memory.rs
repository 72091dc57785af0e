use super::{SocialStore, StoreError, StoreResult};
use crate::models::{
    contains_id, Comment, NewComment, NewPost, NewUser, Post, ProfileUpdate, Toggle, User,
    UserCredentials, UserSummary, DEFAULT_AVATAR,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

struct UserRecord {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserRecord>,
    user_order: Vec<Uuid>,
    posts: HashMap<Uuid, Post>,
    comments: Vec<Comment>,
}

impl State {
    fn user_mut(&mut self, id: Uuid) -> StoreResult<&mut User> {
        self.users
            .get_mut(&id)
            .map(|r| &mut r.user)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    fn post_mut(&mut self, id: Uuid) -> StoreResult<&mut Post> {
        self.posts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))
    }

    fn sorted_posts<'a>(&self, posts: impl Iterator<Item = &'a Post>) -> Vec<Post> {
        let mut posts: Vec<Post> = posts.cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        posts
    }
}

/// Process-local store.
///
/// A single `RwLock` guards all state, so every trait method is one critical
/// section and multi-record writes are trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a post with an explicit creation time.
    pub async fn insert_post_at(&self, post: NewPost, created_at: DateTime<Utc>) -> StoreResult<Post> {
        let mut state = self.state.write().await;
        let record = Post {
            id: Uuid::new_v4(),
            user_id: post.user_id,
            files: post.files,
            tags: post.tags,
            caption: post.caption,
            created_at,
            likes: Vec::new(),
            retweets: Some(Vec::new()),
            likes_count: 0,
            comments_count: 0,
            retweet_count: 0,
        };
        state.user_mut(post.user_id)?.posts.insert(0, record.id);
        state.posts.insert(record.id, record.clone());
        Ok(record)
    }

    /// Replace a stored post wholesale, e.g. to seed legacy shapes.
    pub async fn put_post(&self, post: Post) {
        self.state.write().await.posts.insert(post.id, post);
    }

    /// Drop a user record without touching anything that references it.
    pub async fn remove_user(&self, id: Uuid) {
        let mut state = self.state.write().await;
        state.users.remove(&id);
        state.user_order.retain(|u| *u != id);
    }
}

#[async_trait]
impl SocialStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;

        if state.users.values().any(|r| r.user.username == new.username) {
            return Err(StoreError::Duplicate(format!("username '{}'", new.username)));
        }
        if state
            .users
            .values()
            .any(|r| r.user.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Duplicate(format!("email '{}'", new.email)));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            fullname: new.fullname,
            email: new.email,
            bio: None,
            avatar: DEFAULT_AVATAR.to_string(),
            cover_image: None,
            followers: Vec::new(),
            following: Vec::new(),
            followers_count: 0,
            following_count: 0,
            posts: Vec::new(),
            saved_posts: Vec::new(),
            created_at: Utc::now(),
        };

        state.user_order.push(user.id);
        state.users.insert(
            user.id,
            UserRecord {
                user: user.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).map(|r| r.user.clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|r| r.user.username == username)
            .map(|r| r.user.clone()))
    }

    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|r| r.user.email.eq_ignore_ascii_case(email))
            .map(|r| UserCredentials {
                user_id: r.user.id,
                password_hash: r.password_hash.clone(),
            }))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        Ok(state
            .user_order
            .iter()
            .filter_map(|id| state.users.get(id).map(|r| r.user.clone()))
            .collect())
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        let wanted: BTreeSet<Uuid> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| state.users.get(id).map(|r| r.user.clone()))
            .collect())
    }

    async fn find_user_summaries(&self, ids: &[Uuid]) -> StoreResult<Vec<UserSummary>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|r| r.user.summary()))
            .collect())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<Option<User>> {
        let mut state = self.state.write().await;
        let Some(record) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        let user = &mut record.user;
        if let Some(fullname) = update.fullname {
            user.fullname = fullname;
        }
        if let Some(bio) = update.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar) = update.avatar {
            user.avatar = avatar;
        }
        if let Some(cover) = update.cover_image {
            user.cover_image = Some(cover);
        }
        Ok(Some(user.clone()))
    }

    async fn add_follow_edge(&self, follower: Uuid, followee: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;

        // Validate both sides before mutating either.
        let target = state.users.get(&followee).map(|r| &r.user);
        match target {
            None => return Err(StoreError::NotFound(format!("user {followee}"))),
            Some(t) if contains_id(&t.followers, &follower) => return Err(StoreError::EdgeExists),
            Some(_) => {}
        }
        if !state.users.contains_key(&follower) {
            return Err(StoreError::NotFound(format!("user {follower}")));
        }

        let target = state.user_mut(followee)?;
        target.followers.push(follower);
        target.followers_count += 1;

        let viewer = state.user_mut(follower)?;
        viewer.following.push(followee);
        viewer.following_count += 1;
        Ok(())
    }

    async fn remove_follow_edge(&self, follower: Uuid, followee: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;

        let present = state
            .users
            .get(&followee)
            .map(|r| contains_id(&r.user.followers, &follower))
            .unwrap_or(false);
        if !present || !state.users.contains_key(&follower) {
            return Ok(false);
        }

        let target = state.user_mut(followee)?;
        target.followers.retain(|id| *id != follower);
        target.followers_count = target.followers.len() as i64;

        let viewer = state.user_mut(follower)?;
        viewer.following.retain(|id| *id != followee);
        viewer.following_count = viewer.following.len() as i64;
        Ok(true)
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        self.insert_post_at(post, Utc::now()).await
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        Ok(self.state.read().await.posts.get(&id).cloned())
    }

    async fn find_posts_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Post>> {
        let state = self.state.read().await;
        let wanted: BTreeSet<Uuid> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .filter_map(|id| state.posts.get(id).cloned())
            .collect())
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let state = self.state.read().await;
        Ok(state.sorted_posts(state.posts.values()))
    }

    async fn search_posts_by_caption(&self, caption: &str) -> StoreResult<Vec<Post>> {
        let needle = caption.to_lowercase();
        let state = self.state.read().await;
        Ok(state.sorted_posts(
            state
                .posts
                .values()
                .filter(|p| p.caption.to_lowercase().contains(&needle)),
        ))
    }

    async fn search_posts_by_tag(&self, tag: &str) -> StoreResult<Vec<Post>> {
        let state = self.state.read().await;
        Ok(state.sorted_posts(
            state
                .posts
                .values()
                .filter(|p| p.tags.iter().any(|t| t == tag)),
        ))
    }

    async fn list_tags(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let tags: BTreeSet<String> = state
            .posts
            .values()
            .flat_map(|p| p.tags.iter().cloned())
            .collect();
        Ok(tags.into_iter().collect())
    }

    async fn toggle_like(&self, post: Uuid, user: Uuid) -> StoreResult<Toggle> {
        let mut state = self.state.write().await;
        let post = state.post_mut(post)?;
        if contains_id(&post.likes, &user) {
            post.likes.retain(|id| *id != user);
            post.likes_count = post.likes.len() as i64;
            Ok(Toggle::Removed)
        } else {
            post.likes.push(user);
            post.likes_count = post.likes.len() as i64;
            Ok(Toggle::Added)
        }
    }

    async fn toggle_retweet(&self, post: Uuid, user: Uuid) -> StoreResult<Toggle> {
        let mut state = self.state.write().await;
        let post = state.post_mut(post)?;
        let retweets = post.retweets.get_or_insert_with(Vec::new);
        let outcome = if contains_id(retweets, &user) {
            retweets.retain(|id| *id != user);
            Toggle::Removed
        } else {
            retweets.push(user);
            Toggle::Added
        };
        post.retweet_count = retweets.len() as i64;
        Ok(outcome)
    }

    async fn toggle_saved(&self, user: Uuid, post: Uuid) -> StoreResult<Toggle> {
        let mut state = self.state.write().await;
        if !state.posts.contains_key(&post) {
            return Err(StoreError::NotFound(format!("post {post}")));
        }
        let user = state.user_mut(user)?;
        if contains_id(&user.saved_posts, &post) {
            user.saved_posts.retain(|id| *id != post);
            Ok(Toggle::Removed)
        } else {
            user.saved_posts.insert(0, post);
            Ok(Toggle::Added)
        }
    }

    async fn add_comment(&self, new: NewComment) -> StoreResult<Comment> {
        let mut state = self.state.write().await;
        let post = state.post_mut(new.post_id)?;
        post.comments_count += 1;

        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: new.post_id,
            user_id: new.user_id,
            text: new.text,
            created_at: Utc::now(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    async fn find_comments_for_posts(&self, post_ids: &[Uuid]) -> StoreResult<Vec<Comment>> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .iter()
            .filter(|c| contains_id(post_ids, &c.post_id))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
