use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use billforge_core::UserId;

use crate::context::CurrentUser;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: UserId,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token could not be encoded: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token subject is the nil user")]
    NilSubject,
}

/// Mints and verifies HS256 bearer tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::hours(12),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, user: UserId) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    /// Mint a token as if issued at `now` (tests use this for expired tokens).
    pub fn issue_at(&self, user: UserId, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: user,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Encode)
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(TokenError::Invalid)?;
        if data.claims.sub.is_nil() {
            return Err(TokenError::NilSubject);
        }
        Ok(data.claims)
    }
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenIssuer>,
}

/// Attach the caller's identity to the request when a valid bearer token is
/// present.
///
/// Never rejects: a missing or invalid token just leaves [`CurrentUser`]
/// out of the extensions, and the gating middleware decides what that means
/// for the route.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let user = extract_bearer(req.headers()).and_then(|token| match state.tokens.verify(token) {
        Ok(claims) => Some(CurrentUser::new(claims.sub)),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring bearer token");
            None
        }
    });

    if let Some(user) = user {
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let tokens = TokenIssuer::new(b"secret");
        let user = UserId::new();
        let token = tokens.issue(user).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, user);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = TokenIssuer::new(b"one").issue(UserId::new()).unwrap();
        let err = TokenIssuer::new(b"two").verify(&token).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let tokens = TokenIssuer::new(b"secret").with_ttl(Duration::minutes(5));
        let token = tokens
            .issue_at(UserId::new(), Utc::now() - Duration::hours(1))
            .unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn nil_subject_is_rejected() {
        let tokens = TokenIssuer::new(b"secret");
        let token = tokens.issue(UserId::nil()).unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::NilSubject)));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }
}
