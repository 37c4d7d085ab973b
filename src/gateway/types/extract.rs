//! Validating extractors
//!
//! Deserialize with axum's `Json` / `Query`, then run `validator` checks.
//! Both failure kinds are rejected as `ApiError::bad_request`, so malformed input
//! gets the same `ApiResponse` envelope as every other error.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use super::requests::describe;
use super::response::ApiError;

/// JSON body that passed `Validate`
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(describe(&e)))?;
        Ok(Self(value))
    }
}

/// Query string that passed `Validate`
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e.body_text())))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(describe(&e)))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::{PageQuery, TransferRequest, error_codes};
    use axum::body::Body;
    use axum::http::{self, StatusCode};

    fn json_request(body: &str) -> Request {
        http::Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validated_json_accepts_valid_body() {
        let req = json_request(
            r#"{"from_account_id":1,"to_account_id":2,"amount":10,"currency":"USD"}"#,
        );
        let ValidatedJson(body) = ValidatedJson::<TransferRequest>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(body.amount, 10);
    }

    #[tokio::test]
    async fn test_validated_json_rejects_malformed_body() {
        let err = ValidatedJson::<TransferRequest>::from_request(json_request("{not json"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, error_codes::INVALID_PARAMETER);
        assert!(err.msg.starts_with("Invalid JSON"), "{}", err.msg);
    }

    #[tokio::test]
    async fn test_validated_json_rejects_out_of_range_field() {
        let req = json_request(
            r#"{"from_account_id":1,"to_account_id":2,"amount":0,"currency":"USD"}"#,
        );
        let err = ValidatedJson::<TransferRequest>::from_request(req, &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.msg.contains("amount"), "{}", err.msg);
    }

    #[tokio::test]
    async fn test_validated_query() {
        let (mut parts, _) = http::Request::builder()
            .uri("/accounts?page_id=2&page_size=5")
            .body(())
            .unwrap()
            .into_parts();
        let ValidatedQuery(page) = ValidatedQuery::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(page.offset(), 5);

        let (mut parts, _) = http::Request::builder()
            .uri("/accounts?page_size=5")
            .body(())
            .unwrap()
            .into_parts();
        let err = ValidatedQuery::<PageQuery>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.msg.starts_with("Invalid query"), "{}", err.msg);
    }
}
