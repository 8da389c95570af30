//! Query-string extraction with rejections in the JSON error envelope.

use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Like [`Query`], but a malformed query string (`page=abc`, `type=xyz`) is an
/// [`AppError::BadRequest`] instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|e| AppError::BadRequest(format!("Invalid query string: {}", e.body_text())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Paging {
        page: Option<i64>,
    }

    async fn extract(uri: &str) -> Result<ApiQuery<Paging>, AppError> {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        ApiQuery::<Paging>::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_api_query_maps_rejection_to_bad_request() {
        let ApiQuery(paging) = extract("/books?page=3").await.unwrap();
        assert_eq!(paging.page, Some(3));

        match extract("/books?page=abc").await {
            Err(AppError::BadRequest(msg)) => assert!(msg.starts_with("Invalid query string")),
            other => panic!("expected BadRequest, got {:?}", other.map(|q| q.0)),
        }
    }
}
