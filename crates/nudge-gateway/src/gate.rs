//! Auth Gate: resolves the caller's identity from the bearer header.
//!
//! The gate never rejects a request for lacking a credential; it only
//! attaches an [`Identity`] when one verifies. Handlers that need a caller
//! take `Identity` as an extractor, which answers 401 when none is attached.
//! A header that is not valid visible ASCII is the one case the gate answers
//! itself, with 401.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::auth::TokenProvider;

pub const ROLE_PREFIX: &str = "ROLE_";
const BEARER: &str = "Bearer ";

/// Authenticated caller: subject plus `ROLE_`-prefixed authorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub authorities: Vec<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, roles: &[String]) -> Self {
        Self {
            subject: subject.into(),
            authorities: roles.iter().map(|r| format!("{ROLE_PREFIX}{r}")).collect(),
        }
    }

    /// `role` is given without the prefix, e.g. `has_role("ADMIN")`.
    pub fn has_role(&self, role: &str) -> bool {
        self.authorities
            .iter()
            .any(|a| a.strip_prefix(ROLE_PREFIX) == Some(role))
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("authorization header is not valid ASCII")]
    MalformedHeader,
}

/// Resolve the caller from request headers.
///
/// `Ok(None)` for a missing header, a non-Bearer scheme, or a token that
/// fails verification.
pub fn resolve_identity(
    tokens: &TokenProvider,
    headers: &HeaderMap,
) -> Result<Option<Identity>, GateError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header = value.to_str().map_err(|_| GateError::MalformedHeader)?;
    let Some(token) = header.strip_prefix(BEARER) else {
        return Ok(None);
    };
    match tokens.claims(token) {
        Ok(claims) => Ok(Some(Identity::new(claims.sub, &claims.roles))),
        Err(e) => {
            tracing::debug!("Bearer token failed verification: {e}");
            Ok(None)
        }
    }
}

pub(crate) fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"ok": false, "error": "Unauthorized: invalid or missing bearer token"})),
    )
        .into_response()
}

/// Middleware: attach the caller's [`Identity`] when the bearer token verifies.
pub async fn authenticate(
    State(tokens): State<Arc<TokenProvider>>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_identity(&tokens, req.headers()) {
        Ok(Some(identity)) => {
            tracing::debug!("Authenticated {}", identity.subject);
            req.extensions_mut().insert(identity);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Auth gate rejected request to {}: {e}", req.uri().path());
            return unauthorized();
        }
    }
    next.run(req).await
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use nudge_core::config::AuthConfig;

    fn tokens() -> TokenProvider {
        TokenProvider::new(&AuthConfig {
            secret: "gate-test-secret-at-least-32-bytes!!".into(),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn headers_with(value: HeaderValue) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        headers
    }

    #[test]
    fn test_valid_bearer_yields_identity() {
        let tokens = tokens();
        let token = tokens.issue("ana@example.com", &["USER"]).unwrap();
        let headers = headers_with(HeaderValue::from_str(&format!("Bearer {token}")).unwrap());

        let identity = resolve_identity(&tokens, &headers).unwrap().unwrap();
        assert_eq!(identity.subject, "ana@example.com");
        assert_eq!(identity.authorities, vec!["ROLE_USER"]);
        assert!(identity.has_role("USER"));
        assert!(!identity.has_role("ADMIN"));
    }

    #[test]
    fn test_missing_or_foreign_scheme_is_anonymous() {
        let tokens = tokens();
        assert!(resolve_identity(&tokens, &HeaderMap::new()).unwrap().is_none());

        let basic = headers_with(HeaderValue::from_static("Basic YW5hOnB3"));
        assert!(resolve_identity(&tokens, &basic).unwrap().is_none());
    }

    #[test]
    fn test_invalid_token_is_anonymous() {
        let headers = headers_with(HeaderValue::from_static("Bearer not.a.token"));
        assert!(resolve_identity(&tokens(), &headers).unwrap().is_none());
    }

    #[test]
    fn test_expired_token_is_anonymous() {
        let expired = TokenProvider::new(&AuthConfig {
            secret: "gate-test-secret-at-least-32-bytes!!".into(),
            ttl_secs: 0,
            ..AuthConfig::default()
        })
        .unwrap();
        let token = expired.issue("ana@example.com", &["USER"]).unwrap();
        let headers = headers_with(HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        assert!(resolve_identity(&expired, &headers).unwrap().is_none());
    }

    #[test]
    fn test_non_ascii_header_is_malformed() {
        let headers = headers_with(HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap());
        assert!(matches!(
            resolve_identity(&tokens(), &headers),
            Err(GateError::MalformedHeader)
        ));
    }

    #[test]
    fn test_authorities_are_prefixed() {
        let identity = Identity::new("ops@example.com", &["ADMIN".into(), "USER".into()]);
        assert_eq!(identity.authorities, vec!["ROLE_ADMIN", "ROLE_USER"]);
        assert!(identity.has_role("ADMIN"));
    }
}
