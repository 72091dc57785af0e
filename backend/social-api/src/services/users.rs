/// User service - directory listing and profile maintenance
use crate::db::SocialStore;
use crate::error::{AppError, Result};
use crate::models::{ProfileUpdate, User};
use crate::services::media::{self, MediaStore, UploadConstraints, UploadedFile};
use crate::services::projector::{project_all, ProjectedUser, ViewerContext};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

/// Which users the directory listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryPolicy {
    pub exclude_viewer: bool,
}

impl Default for DirectoryPolicy {
    fn default() -> Self {
        Self {
            exclude_viewer: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EditProfileRequest {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub fullname: Option<String>,
    #[validate(length(max = 160, message = "must be at most 160 characters"))]
    pub bio: Option<String>,
}

pub struct UserService {
    store: Arc<dyn SocialStore>,
    media: Arc<dyn MediaStore>,
    policy: DirectoryPolicy,
    max_upload_bytes: usize,
}

impl UserService {
    pub fn new(
        store: Arc<dyn SocialStore>,
        media: Arc<dyn MediaStore>,
        policy: DirectoryPolicy,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            media,
            policy,
            max_upload_bytes,
        }
    }

    /// Every user, oldest account first, annotated for the viewer.
    pub async fn list(&self, viewer: &ViewerContext) -> Result<Vec<ProjectedUser>> {
        let mut users = self.store.list_users().await?;
        if self.policy.exclude_viewer {
            users.retain(|u| !viewer.is(&u.id));
        }
        Ok(project_all(&users, viewer))
    }

    pub async fn edit(&self, viewer: &ViewerContext, req: EditProfileRequest) -> Result<User> {
        let req = EditProfileRequest {
            fullname: req.fullname.map(|s| s.trim().to_string()),
            bio: req.bio.map(|s| s.trim().to_string()),
        };
        if req.fullname.is_none() && req.bio.is_none() {
            return Err(AppError::ValidationFailed(
                "Provide fullname or bio to update".to_string(),
            ));
        }
        req.validate()?;

        let user = self
            .apply(
                viewer,
                ProfileUpdate {
                    fullname: req.fullname,
                    bio: req.bio,
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    pub async fn update_avatar(
        &self,
        viewer: &ViewerContext,
        file: Option<UploadedFile>,
    ) -> Result<User> {
        let file = file
            .ok_or_else(|| AppError::ValidationFailed("No avatar file uploaded.".to_string()))?;
        let url = media::upload(
            self.media.as_ref(),
            file,
            &UploadConstraints::avatars(self.max_upload_bytes),
        )
        .await?;

        self.apply(
            viewer,
            ProfileUpdate {
                avatar: Some(url),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn update_cover(
        &self,
        viewer: &ViewerContext,
        file: Option<UploadedFile>,
    ) -> Result<User> {
        let file = file
            .ok_or_else(|| AppError::ValidationFailed("No cover file uploaded.".to_string()))?;
        let url = media::upload(
            self.media.as_ref(),
            file,
            &UploadConstraints::covers(self.max_upload_bytes),
        )
        .await?;

        self.apply(
            viewer,
            ProfileUpdate {
                cover_image: Some(url),
                ..Default::default()
            },
        )
        .await
    }

    async fn apply(&self, viewer: &ViewerContext, update: ProfileUpdate) -> Result<User> {
        self.store
            .update_profile(viewer.id(), update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No user found for id {}", viewer.id())))
    }
}
