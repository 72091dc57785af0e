/// Feed assembly
///
/// The feed is every post authored by the viewer or by someone the viewer
/// follows, newest first, projected for the viewer. Pages are addressed by an
/// opaque cursor.
use crate::db::SocialStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::services::posts::{sort_newest_first, PostHydrator};
use crate::services::projector::{project_all, ProjectedPost, ViewerContext};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_FEED_LIMIT: usize = 20;
pub const MAX_FEED_LIMIT: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl FeedRequest {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_FEED_LIMIT)
            .clamp(1, MAX_FEED_LIMIT)
    }

    fn offset(&self) -> Result<usize> {
        match &self.cursor {
            Some(cursor) => decode_cursor(cursor),
            None => Ok(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<ProjectedPost>,
    pub next_cursor: Option<String>,
}

pub fn encode_cursor(offset: usize) -> String {
    general_purpose::STANDARD.encode(offset.to_string())
}

pub fn decode_cursor(cursor: &str) -> Result<usize> {
    let decoded = general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| AppError::ValidationFailed("Invalid cursor format".to_string()))?;

    let offset = String::from_utf8(decoded)
        .map_err(|_| AppError::ValidationFailed("Invalid cursor encoding".to_string()))?;

    offset
        .parse::<usize>()
        .map_err(|_| AppError::ValidationFailed("Invalid cursor value".to_string()))
}

pub struct FeedAssembler {
    store: Arc<dyn SocialStore>,
    hydrator: PostHydrator,
}

impl FeedAssembler {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self {
            hydrator: PostHydrator::new(store.clone()),
            store,
        }
    }

    pub async fn assemble(&self, viewer: &ViewerContext, req: &FeedRequest) -> Result<FeedPage> {
        let limit = req.limit();
        let offset = req.offset()?;

        let mut scope: Vec<Uuid> = viewer.following().iter().copied().collect();
        if !viewer.follows(&viewer.id()) {
            scope.push(viewer.id());
        }

        let authors = self.store.find_users_by_ids(&scope).await?;
        let post_ids: Vec<Uuid> = authors
            .iter()
            .flat_map(|u| u.posts.iter().copied())
            .collect();
        let posts = self.store.find_posts_by_ids(&post_ids).await?;

        let mut details = self.hydrator.hydrate(posts).await?;
        sort_newest_first(&mut details);

        let total = details.len();
        let page: Vec<_> = details.into_iter().skip(offset).take(limit).collect();
        let next_offset = offset + page.len();
        let next_cursor = (next_offset < total).then(|| encode_cursor(next_offset));

        debug!(
            viewer = %viewer.id(),
            scope = scope.len(),
            total,
            offset,
            returned = page.len(),
            "feed assembled"
        );
        metrics::observe_feed_size(offset == 0, page.len());

        Ok(FeedPage {
            posts: project_all(&page, viewer),
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewComment, NewPost, NewUser, User};
    use chrono::{Duration, Utc};

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

    fn new_post(owner: Uuid, caption: &str) -> NewPost {
        NewPost {
            user_id: owner,
            caption: caption.into(),
            files: vec![],
            tags: vec![],
        }
    }

    async fn viewer_of(store: &MemoryStore, id: Uuid) -> ViewerContext {
        ViewerContext::from_user(&store.find_user_by_id(id).await.unwrap().unwrap())
    }

    #[test]
    fn cursor_roundtrip_and_garbage() {
        assert_eq!(decode_cursor(&encode_cursor(40)).unwrap(), 40);
        assert!(decode_cursor("!!!").is_err());
        assert!(decode_cursor(&general_purpose::STANDARD.encode("abc")).is_err());
    }

    #[tokio::test]
    async fn feed_orders_newest_first_within_scope() {
        let store = Arc::new(MemoryStore::new());
        let ann = user(&store, "ann").await;
        let ben = user(&store, "ben").await;
        let cat = user(&store, "cat").await;
        store.add_follow_edge(ann.id, ben.id).await.unwrap();

        let t1 = Utc::now() - Duration::hours(3);
        let t2 = Utc::now() - Duration::hours(2);
        let t3 = Utc::now() - Duration::hours(1);

        let p3 = store.insert_post_at(new_post(ben.id, "t3"), t3).await.unwrap();
        let p1 = store.insert_post_at(new_post(ann.id, "t1"), t1).await.unwrap();
        let p2 = store.insert_post_at(new_post(ben.id, "t2"), t2).await.unwrap();
        store
            .insert_post_at(new_post(cat.id, "out of scope"), Utc::now())
            .await
            .unwrap();

        let feed = FeedAssembler::new(store.clone());
        let page = feed
            .assemble(&viewer_of(&store, ann.id).await, &FeedRequest::default())
            .await
            .unwrap();

        let ids: Vec<_> = page.posts.iter().map(|p| p.post.id).collect();
        assert_eq!(ids, vec![p3.id, p2.id, p1.id]);
        assert!(page.next_cursor.is_none());
        assert!(page.posts[2].is_mine);
        assert!(!page.posts[0].is_mine);
    }

    #[tokio::test]
    async fn equal_timestamps_break_ties_by_id() {
        let store = Arc::new(MemoryStore::new());
        let ann = user(&store, "ann").await;
        let at = Utc::now();
        let mut expected = Vec::new();
        for i in 0..4 {
            let p = store
                .insert_post_at(new_post(ann.id, &format!("p{i}")), at)
                .await
                .unwrap();
            expected.push(p.id);
        }
        expected.sort();

        let feed = FeedAssembler::new(store.clone());
        let viewer = viewer_of(&store, ann.id).await;
        for _ in 0..3 {
            let page = feed.assemble(&viewer, &FeedRequest::default()).await.unwrap();
            let ids: Vec<_> = page.posts.iter().map(|p| p.post.id).collect();
            assert_eq!(ids, expected);
        }
    }

    #[tokio::test]
    async fn empty_scope_yields_empty_feed() {
        let store = Arc::new(MemoryStore::new());
        let ann = user(&store, "ann").await;
        let page = FeedAssembler::new(store.clone())
            .assemble(&viewer_of(&store, ann.id).await, &FeedRequest::default())
            .await
            .unwrap();
        assert!(page.posts.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn pages_follow_the_cursor() {
        let store = Arc::new(MemoryStore::new());
        let ann = user(&store, "ann").await;
        let now = Utc::now();
        for i in 0..5 {
            store
                .insert_post_at(new_post(ann.id, &format!("p{i}")), now - Duration::minutes(i))
                .await
                .unwrap();
        }

        let feed = FeedAssembler::new(store.clone());
        let viewer = viewer_of(&store, ann.id).await;
        let first = feed
            .assemble(
                &viewer,
                &FeedRequest {
                    limit: Some(2),
                    cursor: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.posts.len(), 2);
        assert_eq!(first.posts[0].post.caption, "p0");

        let second = feed
            .assemble(
                &viewer,
                &FeedRequest {
                    limit: Some(2),
                    cursor: first.next_cursor.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(second.posts[0].post.caption, "p2");

        let last = feed
            .assemble(
                &viewer,
                &FeedRequest {
                    limit: Some(2),
                    cursor: second.next_cursor.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(last.posts.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn nested_comments_are_projected_and_removed_authors_skipped() {
        let store = Arc::new(MemoryStore::new());
        let ann = user(&store, "ann").await;
        let ben = user(&store, "ben").await;
        store.add_follow_edge(ann.id, ben.id).await.unwrap();

        let kept = store.create_post(new_post(ann.id, "mine")).await.unwrap();
        store
            .add_comment(NewComment {
                post_id: kept.id,
                user_id: ann.id,
                text: "self".into(),
            })
            .await
            .unwrap();
        store.create_post(new_post(ben.id, "gone")).await.unwrap();
        let viewer = viewer_of(&store, ann.id).await;
        store.remove_user(ben.id).await;

        let page = FeedAssembler::new(store.clone())
            .assemble(&viewer, &FeedRequest::default())
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 1);
        assert!(page.posts[0].comments[0].is_comment_mine);
    }
}
