use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::{repo::UserStore, repo_types::User};
use crate::{error::AppError, storage::BlobStore};

pub struct AvatarUpload {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn avatar_key(user_id: Uuid, ext: &str) -> String {
    format!("avatars/{}/{}.{}", user_id, Uuid::new_v4(), ext)
}

/// Sets the display name and, when an avatar is supplied, uploads it and
/// points `image` at the stored object. Email is never touched.
pub async fn update_profile(
    users: &dyn UserStore,
    blobs: &dyn BlobStore,
    user_id: Uuid,
    name: &str,
    avatar: Option<AvatarUpload>,
) -> Result<User, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "Name is required"));
    }

    let image_url = match avatar {
        Some(upload) => {
            let ext = ext_from_mime(&upload.content_type)
                .ok_or_else(|| AppError::validation("file", "Unsupported image type"))?;
            if users.find_by_id(user_id).await?.is_none() {
                warn!(%user_id, "avatar upload for a user that no longer exists");
                return Err(AppError::Unauthenticated);
            }
            let key = avatar_key(user_id, ext);
            let url = blobs
                .upload(&key, upload.body, &upload.content_type)
                .await
                .with_context(|| format!("upload avatar for {user_id}"))?;
            Some(url)
        }
        None => None,
    };

    let Some(user) = users
        .update_profile(user_id, name, image_url.as_deref())
        .await?
    else {
        warn!(%user_id, "profile edit for a user that no longer exists");
        return Err(AppError::Unauthenticated);
    };

    info!(%user_id, avatar = image_url.is_some(), "profile updated");
    Ok(user)
}
