use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{error::AppError, images::services::UploadedImage};

const IMAGE_FIELDS: [&str; 2] = ["profileImage", "profileImg"];

/// Request body given either as JSON or as `multipart/form-data`.
///
/// Multipart text parts are gathered into a JSON object and deserialized into
/// `T`; a file part named `profileImage` (or `profileImg`) becomes `image`.
#[derive(Debug)]
pub struct UserForm<T> {
    pub fields: T,
    pub image: Option<UploadedImage>,
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

#[async_trait]
impl<T, S> FromRequest<S> for UserForm<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            let Json(fields) = Json::<T>::from_request(req, state).await?;
            return Ok(Self { fields, image: None });
        }

        let mut mp = Multipart::from_request(req, state).await?;
        let mut map = Map::new();
        let mut image = None;
        while let Some(field) = mp.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if IMAGE_FIELDS.contains(&name.as_str()) && field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await?;
                debug!(bytes = body.len(), %content_type, "profile image received");
                image = Some(UploadedImage { body, content_type });
            } else {
                let text = field.text().await?;
                map.insert(name, Value::String(text));
            }
        }

        let fields = serde_json::from_value(Value::Object(map))
            .map_err(|e| AppError::invalid("body", format!("Invalid form fields: {e}")))?;
        Ok(Self { fields, image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::dto::UpdateUserRequest;
    use crate::users::model::Role;
    use axum::{body::Body, http};

    const BOUNDARY: &str = "X-BOUNDARY";

    fn multipart_body() -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nBob Builder\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"role\"\r\n\r\nadmin\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"profileImg\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = BOUNDARY
        )
    }

    #[tokio::test]
    async fn reads_multipart_fields_and_image() {
        let req = http::Request::builder()
            .method("PUT")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body()))
            .unwrap();
        let form = UserForm::<UpdateUserRequest>::from_request(req, &()).await.unwrap();

        assert_eq!(form.fields.name.as_deref(), Some("Bob Builder"));
        assert_eq!(form.fields.role, Some(Role::Admin));
        let image = form.image.unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(&image.body[..], b"PNGDATA");
    }

    #[tokio::test]
    async fn reads_json_without_image() {
        let req = http::Request::builder()
            .method("PUT")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"phone":"+961 1 234 567"}"#))
            .unwrap();
        let form = UserForm::<UpdateUserRequest>::from_request(req, &()).await.unwrap();
        assert_eq!(form.fields.phone.as_deref(), Some("+961 1 234 567"));
        assert!(form.image.is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let req = http::Request::builder()
            .method("PUT")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{nope"))
            .unwrap();
        let err = UserForm::<UpdateUserRequest>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
