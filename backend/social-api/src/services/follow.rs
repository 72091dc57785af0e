/// Follow / unfollow
///
/// Preconditions are checked here, before any mutation. The edge itself and
/// both counters are written by the store in one atomic unit.
use crate::db::{SocialStore, StoreError};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{canonical_id, User};
use crate::services::projector::ViewerContext;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct FollowService {
    store: Arc<dyn SocialStore>,
}

impl FollowService {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self { store }
    }

    /// Start following `raw_target`.
    ///
    /// `NotFound` if the target does not exist; `Conflict` on self-follow or
    /// when the edge already exists. A rejected call changes nothing.
    pub async fn follow(&self, viewer: &ViewerContext, raw_target: &str) -> Result<()> {
        let result = self.try_follow(viewer, raw_target).await;
        metrics::record_edge_operation("follow", outcome(&result));
        result
    }

    /// Stop following `raw_target`. Unfollowing someone not followed is a no-op.
    pub async fn unfollow(&self, viewer: &ViewerContext, raw_target: &str) -> Result<()> {
        let result = self.try_unfollow(viewer, raw_target).await;
        metrics::record_edge_operation("unfollow", outcome(&result));
        result
    }

    async fn try_follow(&self, viewer: &ViewerContext, raw_target: &str) -> Result<()> {
        let target = self.resolve_target(viewer, raw_target).await?;

        match self.store.add_follow_edge(viewer.id(), target.id).await {
            Ok(()) => {
                info!(follower = %viewer.id(), followee = %target.id, "follow edge added");
                Ok(())
            }
            Err(StoreError::EdgeExists) => Err(AppError::Conflict(format!(
                "You are already following {}",
                target.username
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn try_unfollow(&self, viewer: &ViewerContext, raw_target: &str) -> Result<()> {
        let target = self.resolve_target(viewer, raw_target).await?;

        if self.store.remove_follow_edge(viewer.id(), target.id).await? {
            info!(follower = %viewer.id(), followee = %target.id, "follow edge removed");
        } else {
            debug!(follower = %viewer.id(), followee = %target.id, "unfollow without edge");
        }
        Ok(())
    }

    async fn resolve_target(&self, viewer: &ViewerContext, raw_target: &str) -> Result<User> {
        let not_found = || AppError::NotFound(format!("No user found for id {raw_target}"));

        let target_id: Uuid = canonical_id(raw_target).ok_or_else(not_found)?;
        let target = self
            .store
            .find_user_by_id(target_id)
            .await?
            .ok_or_else(not_found)?;

        if viewer.is(&target.id) {
            return Err(AppError::Conflict(
                "You can't follow/unfollow yourself".to_string(),
            ));
        }
        Ok(target)
    }
}

fn outcome(result: &Result<()>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(AppError::Conflict(_)) => "conflict",
        Err(AppError::NotFound(_)) => "not_found",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::NewUser;

    async fn user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(NewUser {
                username: name.into(),
                fullname: name.into(),
                email: format!("{name}@example.com"),
                password_hash: "x".into(),
            })
            .await
            .unwrap()
    }

    async fn reload(store: &MemoryStore, id: Uuid) -> User {
        store.find_user_by_id(id).await.unwrap().unwrap()
    }

    fn assert_counts_consistent(user: &User) {
        assert_eq!(user.followers_count, user.followers.len() as i64);
        assert_eq!(user.following_count, user.following.len() as i64);
    }

    #[tokio::test]
    async fn double_follow_conflicts_without_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let a = user(&store, "ann").await;
        let b = user(&store, "ben").await;
        let svc = FollowService::new(store.clone());
        let viewer = ViewerContext::from_user(&a);

        svc.follow(&viewer, &b.id.to_string()).await.unwrap();
        let before = (reload(&store, a.id).await, reload(&store, b.id).await);

        let err = svc.follow(&viewer, &b.id.to_string()).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let after = (reload(&store, a.id).await, reload(&store, b.id).await);
        assert_eq!(before, after);
        assert_eq!(after.1.followers, vec![a.id]);
        assert_eq!(after.1.followers_count, 1);
    }

    #[tokio::test]
    async fn self_follow_always_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let a = user(&store, "ann").await;
        let b = user(&store, "ben").await;
        let svc = FollowService::new(store.clone());
        let viewer = ViewerContext::from_user(&a);

        for _ in 0..2 {
            let err = svc.follow(&viewer, &a.id.to_string()).await.unwrap_err();
            assert_eq!(err.kind(), "conflict");
            svc.follow(&viewer, &b.id.to_string()).await.ok();
        }
        let err = svc.unfollow(&viewer, &a.id.simple().to_string()).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let a = reload(&store, a.id).await;
        assert!(!a.followers.contains(&a.id));
        assert!(!a.following.contains(&a.id));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let a = user(&store, "ann").await;
        let svc = FollowService::new(store.clone());
        let viewer = ViewerContext::from_user(&a);

        for raw in [Uuid::new_v4().to_string(), "5f8d0d55b54764421b7156c3".to_string()] {
            assert_eq!(svc.follow(&viewer, &raw).await.unwrap_err().kind(), "not_found");
            assert_eq!(svc.unfollow(&viewer, &raw).await.unwrap_err().kind(), "not_found");
        }
    }

    #[tokio::test]
    async fn unfollow_without_edge_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let a = user(&store, "ann").await;
        let b = user(&store, "ben").await;
        let svc = FollowService::new(store.clone());

        svc.unfollow(&ViewerContext::from_user(&a), &b.id.to_string())
            .await
            .unwrap();
        let b = reload(&store, b.id).await;
        assert_eq!(b.followers_count, 0);
        assert!(b.followers.is_empty());
    }

    #[tokio::test]
    async fn counts_match_edges_after_any_sequence() {
        let store = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for name in ["ann", "ben", "cat", "dan"] {
            users.push(user(&store, name).await);
        }
        let svc = FollowService::new(store.clone());

        // Deterministic pseudo-random walk over follow/unfollow pairs.
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..200 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let from = &users[(seed % 4) as usize];
            let to = &users[((seed >> 8) % 4) as usize];
            let viewer = ViewerContext::from_user(from);
            let target = to.id.to_string();
            if (seed >> 16) % 2 == 0 {
                let _ = svc.follow(&viewer, &target).await;
            } else {
                let _ = svc.unfollow(&viewer, &target).await;
            }
        }

        let mut edges_out = 0;
        let mut edges_in = 0;
        for u in &users {
            let u = reload(&store, u.id).await;
            assert_counts_consistent(&u);
            edges_out += u.following.len();
            edges_in += u.followers.len();
        }
        assert_eq!(edges_out, edges_in);
    }

    #[tokio::test]
    async fn concurrent_follows_of_same_pair_add_one_edge() {
        let store = Arc::new(MemoryStore::new());
        let a = user(&store, "ann").await;
        let b = user(&store, "ben").await;
        let svc = Arc::new(FollowService::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            let viewer = ViewerContext::from_user(&a);
            let target = b.id.to_string();
            handles.push(tokio::spawn(async move { svc.follow(&viewer, &target).await.is_ok() }));
        }
        let mut successes = 0;
        for h in handles {
            if h.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        let b = reload(&store, b.id).await;
        assert_eq!(b.followers, vec![a.id]);
        assert_counts_consistent(&b);
    }
}
