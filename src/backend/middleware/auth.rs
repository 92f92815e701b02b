/**
 * Caller Identity Extraction
 *
 * `CallerId` resolves the authenticated user for a request. The token is
 * read from `Authorization: Bearer <token>`, or from a `?token=` query
 * parameter for websocket upgrades where browsers cannot set headers.
 */

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use tracing::warn;

use crate::backend::auth::sessions::{user_id_from_token, JwtSecret};
use crate::backend::error::BackendError;
use crate::shared::UserId;

/// The authenticated caller's user id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub UserId);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
}

impl<S> FromRequestParts<S> for CallerId
where
    JwtSecret: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = BackendError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| query_token(parts))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!(path = %parts.uri.path(), "missing credentials");
                BackendError::unauthorized("User ID not found in session")
            })?;

        let secret = JwtSecret::from_ref(state);
        let user_id = user_id_from_token(&token, &secret).inspect_err(|e| {
            warn!(path = %parts.uri.path(), error = %e, "rejected credentials");
        })?;
        Ok(CallerId(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::auth::sessions::create_token;
    use axum::http::Request;

    #[derive(Clone)]
    struct TestState(JwtSecret);

    impl FromRef<TestState> for JwtSecret {
        fn from_ref(state: &TestState) -> Self {
            state.0.clone()
        }
    }

    fn state() -> TestState {
        TestState(JwtSecret::new("middleware-secret"))
    }

    async fn extract(request: Request<()>) -> Result<CallerId, BackendError> {
        let (mut parts, _) = request.into_parts();
        CallerId::from_request_parts(&mut parts, &state()).await
    }

    #[tokio::test]
    async fn test_bearer_header() {
        let token = create_token(7, &state().0).unwrap();
        let request = Request::builder()
            .uri("/api/messages")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), CallerId(7));
    }

    #[tokio::test]
    async fn test_query_token() {
        let token = create_token(3, &state().0).unwrap();
        let request = Request::builder()
            .uri(format!("/ws/chat?token={}", token))
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), CallerId(3));
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let request = Request::builder().uri("/api/messages").body(()).unwrap();
        assert!(matches!(
            extract(request).await,
            Err(BackendError::Unauthorized(_))
        ));
    }
}
