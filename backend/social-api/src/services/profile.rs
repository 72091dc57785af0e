/// Profile composition: one user's page as seen by the viewer.
use crate::db::SocialStore;
use crate::error::{AppError, Result};
use crate::models::{contains_id, Post};
use crate::services::posts::{sort_newest_first, PostHydrator};
use crate::services::projector::{project_all, ProfileView, ViewerContext};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct ProfileComposer {
    store: Arc<dyn SocialStore>,
    hydrator: PostHydrator,
}

impl ProfileComposer {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self {
            hydrator: PostHydrator::new(store.clone()),
            store,
        }
    }

    /// Compose the profile of `username`. `NotFound` when no such user exists.
    pub async fn compose(&self, viewer: &ViewerContext, username: &str) -> Result<ProfileView> {
        let target = self
            .store
            .find_user_by_username(username.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("The user {username} is not found")))?;

        let mut wanted: Vec<Uuid> = target.posts.clone();
        wanted.extend(target.saved_posts.iter().copied());
        let mut by_id: HashMap<Uuid, Post> = self
            .store
            .find_posts_by_ids(&wanted)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let own: Vec<Post> = target
            .posts
            .iter()
            .filter_map(|id| by_id.get(id).cloned())
            .collect();
        // Saved posts keep the order they were saved in, most recent first.
        let saved: Vec<Post> = target
            .saved_posts
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let mut posts = self.hydrator.hydrate(own).await?;
        sort_newest_first(&mut posts);
        let saved_posts = self.hydrator.hydrate(saved).await?;

        let followers = self.store.find_user_summaries(&target.followers).await?;
        let following = self.store.find_user_summaries(&target.following).await?;

        Ok(ProfileView {
            id: target.id,
            is_following: contains_id(&target.followers, &viewer.id()),
            is_me: viewer.is(&target.id),
            posts_count: posts.len(),
            posts: project_all(&posts, viewer),
            saved_posts: project_all(&saved_posts, viewer),
            followers: project_all(&followers, viewer),
            following: project_all(&following, viewer),
            username: target.username,
            fullname: target.fullname,
            bio: target.bio,
            avatar: target.avatar,
            cover_image: target.cover_image,
            followers_count: target.followers_count,
            following_count: target.following_count,
            created_at: target.created_at,
        })
    }
}
