//! social-api: viewer-relative social graph and post service
//!
//! Users follow each other, publish posts with images, and interact through
//! likes, retweets, comments and bookmarks. Every read is annotated for the
//! requesting viewer (`isFollowing`, `isLiked`, `isMine`, ...).

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;
