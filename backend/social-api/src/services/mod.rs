/// Business logic layer for social-api
///
/// - `projector`: viewer-relative flags on users, posts and comments
/// - `feed`, `profile`: read-side assembly on top of the projector
/// - `follow`, `posts`, `users`: write-side operations and their preconditions
/// - `auth`: credentials, tokens and identity resolution
/// - `media`: uploads to the image host
pub mod auth;
pub mod feed;
pub mod follow;
pub mod media;
pub mod posts;
pub mod profile;
pub mod projector;
pub mod users;

pub use auth::{AuthService, IdentityResolver};
pub use feed::FeedAssembler;
pub use follow::FollowService;
pub use media::{CloudinaryStore, MediaStore, MemoryMediaStore};
pub use posts::{PostHydrator, PostService};
pub use profile::ProfileComposer;
pub use projector::{project_all, Project, ViewerContext};
pub use users::{DirectoryPolicy, UserService};
