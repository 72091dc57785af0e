//! Viewer-relative projection.
//!
//! Turns viewer-agnostic records into the shapes a particular viewer sees,
//! adding relationship flags (`isFollowing`, `isLiked`, `isMine`, ...).
//! Projection is pure: it reads the record and the [`ViewerContext`], never
//! the store, and returns the same output for the same inputs.
//!
//! All membership questions are answered by [`IdSet`] or [`contains_id`] on
//! canonical identifiers.

use crate::models::{
    contains_id, Comment, CommentDetail, IdSet, Post, PostDetail, User, UserSummary,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Who is looking. Built once per request from the authenticated user and
/// passed explicitly to everything that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    id: Uuid,
    following: IdSet,
    saved_posts: IdSet,
}

impl ViewerContext {
    pub fn new(id: Uuid, following: IdSet, saved_posts: IdSet) -> Self {
        Self {
            id,
            following,
            saved_posts,
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(
            user.id,
            user.following.iter().collect(),
            user.saved_posts.iter().collect(),
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is(&self, id: &Uuid) -> bool {
        self.id == *id
    }

    pub fn follows(&self, id: &Uuid) -> bool {
        self.following.contains(id)
    }

    pub fn has_saved(&self, post: &Uuid) -> bool {
        self.saved_posts.contains(post)
    }

    pub fn following(&self) -> &IdSet {
        &self.following
    }
}

/// A record that can be rendered for a specific viewer.
pub trait Project {
    type Output: Serialize;

    fn project(&self, viewer: &ViewerContext) -> Self::Output;
}

/// Project every item with the same viewer, preserving order.
pub fn project_all<T: Project>(items: &[T], viewer: &ViewerContext) -> Vec<T::Output> {
    items.iter().map(|item| item.project(viewer)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedUser {
    #[serde(flatten)]
    pub user: User,
    /// The viewer follows this user.
    pub is_following: bool,
    pub is_me: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedUserSummary {
    #[serde(flatten)]
    pub user: UserSummary,
    pub is_following: bool,
    pub is_me: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
    pub is_comment_mine: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedPost {
    #[serde(flatten)]
    pub post: Post,
    pub user: UserSummary,
    pub comments: Vec<ProjectedComment>,
    pub is_liked: bool,
    pub is_retweeted: bool,
    pub is_saved: bool,
    pub is_mine: bool,
}

/// One user's profile as seen by the viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: Uuid,
    pub username: String,
    pub fullname: String,
    pub bio: Option<String>,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: usize,
    pub created_at: DateTime<Utc>,
    pub posts: Vec<ProjectedPost>,
    pub saved_posts: Vec<ProjectedPost>,
    pub followers: Vec<ProjectedUserSummary>,
    pub following: Vec<ProjectedUserSummary>,
    pub is_following: bool,
    pub is_me: bool,
}

impl Project for User {
    type Output = ProjectedUser;

    fn project(&self, viewer: &ViewerContext) -> ProjectedUser {
        ProjectedUser {
            user: self.clone(),
            is_following: contains_id(&self.followers, &viewer.id),
            is_me: viewer.is(&self.id),
        }
    }
}

/// Summaries come from follower/following lists, which carry no edge data of
/// their own; the relationship is read from the viewer's side.
impl Project for UserSummary {
    type Output = ProjectedUserSummary;

    fn project(&self, viewer: &ViewerContext) -> ProjectedUserSummary {
        ProjectedUserSummary {
            user: self.clone(),
            is_following: viewer.follows(&self.id),
            is_me: viewer.is(&self.id),
        }
    }
}

impl Project for CommentDetail {
    type Output = ProjectedComment;

    fn project(&self, viewer: &ViewerContext) -> ProjectedComment {
        ProjectedComment {
            comment: self.comment.clone(),
            user: self.user.clone(),
            is_comment_mine: viewer.is(&self.comment.user_id),
        }
    }
}

impl Project for PostDetail {
    type Output = ProjectedPost;

    fn project(&self, viewer: &ViewerContext) -> ProjectedPost {
        let mut post = self.post.clone();
        let is_retweeted = contains_id(post.retweets(), &viewer.id);
        if post.retweets.is_none() {
            post.retweets = Some(Vec::new());
        }

        ProjectedPost {
            is_liked: contains_id(&post.likes, &viewer.id),
            is_retweeted,
            is_saved: viewer.has_saved(&post.id),
            is_mine: viewer.is(&post.user_id),
            comments: project_all(&self.comments, viewer),
            user: self.user.clone(),
            post,
        }
    }
}
