//! Custom Axum extractors.
//!
//! Axum's own `Json` and `Query` reject bad input with a mix of 400, 415 and
//! 422 and a plain-text body. These wrappers reject every malformed request
//! with a 400 and the usual [`AppError`] JSON body.
//!
//! # Examples
//!
//! ```ignore
//! use msgflow_web::extractors::{JsonBody, QueryParams};
//!
//! async fn handler(
//!     QueryParams(params): QueryParams<ListParams>,
//! ) -> Result<Json<Vec<Message>>, AppError> {
//!     // ...
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

/// JSON request body that rejects with a 400 [`AppError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string that rejects with a 400 [`AppError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Params {
        page: Option<u64>,
    }

    #[tokio::test]
    async fn test_query_params_parse() {
        let request = HttpRequest::builder()
            .uri("/?page=3")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let QueryParams(params) = QueryParams::<Params>::from_request_parts(&mut parts, &())
            .await
            .unwrap();

        assert_eq!(params.page, Some(3));
    }

    #[tokio::test]
    async fn test_query_params_reject_with_400() {
        let request = HttpRequest::builder()
            .uri("/?page=-1")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let err = QueryParams::<Params>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_json_body_rejects_missing_content_type_with_400() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"page": 1}"#))
            .unwrap();

        let err = JsonBody::<Params>::from_request(request, &()).await.unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
