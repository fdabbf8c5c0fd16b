//! HTTP rejections and axum integration.
//!
//! Mount [`require_bearer`] with `axum::middleware::from_fn_with_state`
//! on the protected routes, then take [`Claims`] in the handlers:
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/me", get(me))
//!     .route_layer(middleware::from_fn_with_state(tokens.clone(), require_bearer));
//!
//! async fn me(Claims(claims): Claims) -> Json<ClaimSet> {
//!     Json(claims)
//! }
//! ```

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::WWW_AUTHENTICATE;
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use rogalik_token::{AuthFailure, ClaimSet, ErrorKind, TokenService};

use crate::context::authorization;

/// Error returned to an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {detail}")]
pub struct HttpRejection {
    pub status: StatusCode,
    pub detail: &'static str,
}

impl From<AuthFailure> for HttpRejection {
    fn from(failure: AuthFailure) -> Self {
        let status = match failure {
            AuthFailure::MissingCredentials => StatusCode::UNAUTHORIZED,
            AuthFailure::RevokedToken
            | AuthFailure::SignatureInvalid
            | AuthFailure::ExpiredToken => StatusCode::FORBIDDEN,
            AuthFailure::KeyUnavailable
            | AuthFailure::EncryptionFailure
            | AuthFailure::CacheUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            detail: failure.reason(),
        }
    }
}

impl IntoResponse for HttpRejection {
    fn into_response(self) -> Response {
        let mut response =
            (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Maps failures to [`HttpRejection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpKind;

impl ErrorKind for HttpKind {
    type Error = HttpRejection;

    fn reject(&self, failure: AuthFailure) -> HttpRejection {
        failure.into()
    }
}

/// Claims of the validated bearer, placed in request extensions by
/// [`require_bearer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Claims(pub ClaimSet);

impl<S: Send + Sync> FromRequestParts<S> for Claims {
    type Rejection = HttpRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| AuthFailure::MissingCredentials.into())
    }
}

/// Middleware that rejects requests without a valid bearer token.
pub async fn require_bearer(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, HttpRejection> {
    let bearer = authorization(request.headers()).to_owned();
    let claims = tokens
        .validate_token(&bearer, HttpKind)
        .await
        .inspect_err(|rejection| {
            tracing::debug!(
                status = rejection.status.as_u16(),
                detail = rejection.detail,
                path = %request.uri().path(),
                "request rejected"
            );
        })?;
    request.extensions_mut().insert(Claims(claims));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |f: AuthFailure| HttpKind.reject(f).status;
        assert_eq!(status(AuthFailure::MissingCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthFailure::RevokedToken), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthFailure::SignatureInvalid), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthFailure::ExpiredToken), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthFailure::KeyUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(AuthFailure::EncryptionFailure), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unauthorized_response_carries_challenge() {
        let response = HttpKind.reject(AuthFailure::MissingCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn test_forbidden_response_has_no_challenge() {
        let response = HttpKind.reject(AuthFailure::ExpiredToken).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
