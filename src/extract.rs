//! Request extractors whose rejections use the `AppError` envelope.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON request body.
#[derive(Debug)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Typed path parameters.
#[derive(Debug)]
pub struct AppPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Query string parameters.
#[derive(Debug)]
pub struct AppQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        email: String,
    }

    #[tokio::test]
    async fn json_rejections_become_validation_errors() {
        let req = http::Request::builder()
            .method("POST")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from("{nope"))
            .unwrap();
        let err = AppJson::<Payload>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let req = http::Request::builder()
            .method("POST")
            .body(Body::from(r#"{"email":"a@x.com"}"#))
            .unwrap();
        let err = AppJson::<Payload>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let req = http::Request::builder()
            .method("POST")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"a@x.com"}"#))
            .unwrap();
        let AppJson(payload) = AppJson::<Payload>::from_request(req, &()).await.unwrap();
        assert_eq!(payload.email, "a@x.com");
    }

    #[tokio::test]
    async fn query_rejections_become_validation_errors() {
        #[derive(Debug, Deserialize)]
        struct Page {
            #[allow(dead_code)]
            limit: i64,
        }
        let (mut parts, _) = http::Request::builder()
            .uri("/users?limit=many")
            .body(())
            .unwrap()
            .into_parts();
        let err = AppQuery::<Page>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
