use anyhow::Context;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Largest accepted request body, image included.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const KEY_PREFIX: &str = "users";

/// A file received in the `profileImage` multipart field.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn object_key(filename: &str) -> String {
    format!("{KEY_PREFIX}/{filename}")
}

/// Stores the image and returns the filename kept on the user record.
pub async fn store_profile_image(st: &AppState, image: UploadedImage) -> Result<String, AppError> {
    let ext = ext_from_mime(&image.content_type)
        .ok_or_else(|| AppError::invalid("profileImage", "Only images allowed"))?;
    if image.body.is_empty() {
        return Err(AppError::invalid("profileImage", "Empty image upload"));
    }

    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let filename = format!("user-{}-{}.{}", Uuid::new_v4(), millis, ext);
    let key = object_key(&filename);
    st.storage
        .put_object(&key, image.body, &image.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    info!(%key, "profile image stored");
    Ok(filename)
}

/// Best effort: a failure is logged and otherwise ignored.
pub async fn remove_profile_image(st: &AppState, filename: &str) {
    let key = object_key(filename);
    if let Err(e) = st.storage.delete_object(&key).await {
        warn!(%key, error = %e, "could not remove profile image");
    }
}
