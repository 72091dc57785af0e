/// Post service - listing, creation, toggles, comments and search
///
/// Every read path goes through `PostHydrator`, which joins posts with their
/// authors and comment authors before any projection happens.
use crate::db::{SocialStore, StoreResult};
use crate::error::{AppError, Result};
use crate::models::{
    canonical_id, CommentDetail, NewComment, NewPost, Post, PostDetail, Toggle, UserSummary,
};
use crate::services::media::{self, MediaStore, UploadConstraints, UploadedFile};
use crate::services::projector::{project_all, Project, ProjectedComment, ProjectedPost, ViewerContext};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_CAPTION_CHARS: usize = 2_200;
pub const MAX_COMMENT_CHARS: usize = 1_000;
pub const MAX_TAGS: usize = 30;

/// Joins posts with author and comment-author summaries.
#[derive(Clone)]
pub struct PostHydrator {
    store: Arc<dyn SocialStore>,
}

impl PostHydrator {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self { store }
    }

    /// Hydrate posts, preserving input order.
    ///
    /// Posts whose author no longer exists are dropped; so are comments whose
    /// author no longer exists.
    pub async fn hydrate(&self, posts: Vec<Post>) -> StoreResult<Vec<PostDetail>> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let comments = self.store.find_comments_for_posts(&post_ids).await?;

        let mut author_ids: Vec<Uuid> = Vec::new();
        let mut seen = HashSet::new();
        for id in posts
            .iter()
            .map(|p| p.user_id)
            .chain(comments.iter().map(|c| c.user_id))
        {
            if seen.insert(id) {
                author_ids.push(id);
            }
        }

        let authors: HashMap<Uuid, UserSummary> = self
            .store
            .find_user_summaries(&author_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut comments_by_post: HashMap<Uuid, Vec<CommentDetail>> = HashMap::new();
        for comment in comments {
            let Some(user) = authors.get(&comment.user_id) else {
                debug!(comment_id = %comment.id, "skipping comment with missing author");
                continue;
            };
            comments_by_post
                .entry(comment.post_id)
                .or_default()
                .push(CommentDetail {
                    user: user.clone(),
                    comment,
                });
        }

        let mut details = Vec::with_capacity(posts.len());
        for mut post in posts {
            let Some(user) = authors.get(&post.user_id) else {
                debug!(post_id = %post.id, user_id = %post.user_id, "skipping post with missing author");
                continue;
            };
            let comments = comments_by_post.remove(&post.id).unwrap_or_default();
            // Counts what is rendered, not what is stored.
            post.comments_count = comments.len() as i64;
            details.push(PostDetail {
                user: user.clone(),
                comments,
                post,
            });
        }
        Ok(details)
    }
}

/// Newest first; equal timestamps fall back to identifier order.
pub fn sort_newest_first(details: &mut [PostDetail]) {
    details.sort_by(|a, b| {
        b.post
            .created_at
            .cmp(&a.post.created_at)
            .then_with(|| a.post.id.cmp(&b.post.id))
    });
}

/// Parse a post identifier from a path segment. Garbage reads as "no such post".
pub fn parse_post_id(raw: &str) -> Result<Uuid> {
    canonical_id(raw).ok_or_else(|| AppError::NotFound(format!("No post found for id {raw}")))
}

#[derive(Debug, Clone, Default)]
pub struct CreatePost {
    pub caption: String,
    pub tags: Vec<String>,
    pub files: Vec<UploadedFile>,
}

/// State of one per-user toggle on a post after flipping it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleState {
    pub post_id: Uuid,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

pub struct PostService {
    store: Arc<dyn SocialStore>,
    media: Arc<dyn MediaStore>,
    hydrator: PostHydrator,
    max_upload_bytes: usize,
}

impl PostService {
    pub fn new(store: Arc<dyn SocialStore>, media: Arc<dyn MediaStore>, max_upload_bytes: usize) -> Self {
        Self {
            hydrator: PostHydrator::new(store.clone()),
            store,
            media,
            max_upload_bytes,
        }
    }

    /// All posts, newest first, as the viewer sees them.
    pub async fn list(&self, viewer: &ViewerContext) -> Result<Vec<ProjectedPost>> {
        let posts = self.store.list_posts().await?;
        let mut details = self.hydrator.hydrate(posts).await?;
        sort_newest_first(&mut details);
        Ok(project_all(&details, viewer))
    }

    pub async fn get(&self, viewer: &ViewerContext, raw_id: &str) -> Result<ProjectedPost> {
        let detail = self.load_detail(raw_id).await?;
        Ok(detail.project(viewer))
    }

    pub async fn create(&self, viewer: &ViewerContext, req: CreatePost) -> Result<ProjectedPost> {
        let caption = req.caption.trim().to_string();
        if caption.chars().count() > MAX_CAPTION_CHARS {
            return Err(AppError::ValidationFailed(format!(
                "caption must be at most {MAX_CAPTION_CHARS} characters"
            )));
        }
        if caption.is_empty() && req.files.is_empty() {
            return Err(AppError::ValidationFailed(
                "A post needs a caption or at least one file".to_string(),
            ));
        }
        let tags = normalize_tags(req.tags);
        if tags.len() > MAX_TAGS {
            return Err(AppError::ValidationFailed(format!(
                "A post may carry at most {MAX_TAGS} tags"
            )));
        }

        let files = media::upload_all(
            self.media.as_ref(),
            req.files,
            &UploadConstraints::posts(self.max_upload_bytes),
        )
        .await?;

        let post = self
            .store
            .create_post(NewPost {
                user_id: viewer.id(),
                caption,
                files,
                tags,
            })
            .await?;
        info!(post_id = %post.id, user_id = %post.user_id, "post created");

        let detail = self.require_detail(post).await?;
        Ok(detail.project(viewer))
    }

    pub async fn toggle_like(&self, viewer: &ViewerContext, raw_id: &str) -> Result<ToggleState> {
        let post_id = parse_post_id(raw_id)?;
        let toggle = self.store.toggle_like(post_id, viewer.id()).await?;
        let count = self.current(post_id).await?.likes_count;
        debug!(%post_id, user_id = %viewer.id(), ?toggle, "like toggled");
        Ok(ToggleState {
            post_id,
            active: toggle.is_added(),
            count: Some(count),
        })
    }

    pub async fn toggle_retweet(&self, viewer: &ViewerContext, raw_id: &str) -> Result<ToggleState> {
        let post_id = parse_post_id(raw_id)?;
        let toggle = self.store.toggle_retweet(post_id, viewer.id()).await?;
        let count = self.current(post_id).await?.retweet_count;
        debug!(%post_id, user_id = %viewer.id(), ?toggle, "retweet toggled");
        Ok(ToggleState {
            post_id,
            active: toggle.is_added(),
            count: Some(count),
        })
    }

    pub async fn toggle_save(&self, viewer: &ViewerContext, raw_id: &str) -> Result<ToggleState> {
        let post_id = parse_post_id(raw_id)?;
        let toggle: Toggle = self.store.toggle_saved(viewer.id(), post_id).await?;
        debug!(%post_id, user_id = %viewer.id(), ?toggle, "save toggled");
        Ok(ToggleState {
            post_id,
            active: toggle.is_added(),
            count: None,
        })
    }

    pub async fn add_comment(
        &self,
        viewer: &ViewerContext,
        raw_id: &str,
        text: &str,
    ) -> Result<ProjectedComment> {
        let post_id = parse_post_id(raw_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::ValidationFailed("text is required".to_string()));
        }
        if text.chars().count() > MAX_COMMENT_CHARS {
            return Err(AppError::ValidationFailed(format!(
                "text must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        let comment = self
            .store
            .add_comment(NewComment {
                post_id,
                user_id: viewer.id(),
                text: text.to_string(),
            })
            .await?;

        let user = self
            .store
            .find_user_summaries(&[viewer.id()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Commenting user no longer exists".to_string()))?;

        Ok(CommentDetail { comment, user }.project(viewer))
    }

    /// Caption matches (case-insensitive substring) united with exact tag
    /// matches, newest first. Viewer-agnostic.
    pub async fn search(&self, caption: Option<&str>, tag: Option<&str>) -> Result<Vec<PostDetail>> {
        let caption = caption.map(str::trim).filter(|c| !c.is_empty());
        let tag = tag
            .map(|t| t.trim().trim_start_matches('#'))
            .filter(|t| !t.is_empty());
        if caption.is_none() && tag.is_none() {
            return Err(AppError::ValidationFailed(
                "Provide a caption or tag to search".to_string(),
            ));
        }

        let mut posts = Vec::new();
        if let Some(caption) = caption {
            posts.extend(self.store.search_posts_by_caption(caption).await?);
        }
        if let Some(tag) = tag {
            posts.extend(self.store.search_posts_by_tag(tag).await?);
        }

        let mut seen = HashSet::new();
        posts.retain(|p| seen.insert(p.id));

        let mut details = self.hydrator.hydrate(posts).await?;
        sort_newest_first(&mut details);
        Ok(details)
    }

    pub async fn tags(&self) -> Result<Vec<String>> {
        Ok(self.store.list_tags().await?)
    }

    async fn current(&self, post_id: Uuid) -> Result<Post> {
        self.store
            .find_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No post found for id {post_id}")))
    }

    async fn load_detail(&self, raw_id: &str) -> Result<PostDetail> {
        let post_id = parse_post_id(raw_id)?;
        let post = self.current(post_id).await?;
        self.require_detail(post).await
    }

    async fn require_detail(&self, post: Post) -> Result<PostDetail> {
        let post_id = post.id;
        self.hydrator
            .hydrate(vec![post])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("No post found for id {post_id}")))
    }
}

/// Trim, drop a leading '#', drop empties and duplicates; first spelling wins.
pub fn normalize_tags(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
