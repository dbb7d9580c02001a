//! Render caller authentication.
//!
//! Internal services present a static key in `x-api-key`; end users present
//! an HS256-signed bearer token whose `sub` claim names them. Only the
//! SHA-256 hash of each key is held in memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use docforge_core::auth::{bearer_token, CallerIdentity, RenderAuthenticator, RequestHeaders};
use docforge_core::error::CoreError;
use docforge_core::hashing::sha256_hex;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

/// Header carrying an internal caller's key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Copy request headers into the lowercase map the core expects.
/// Headers that are not valid UTF-8 are skipped.
pub fn request_headers(headers: &HeaderMap) -> RequestHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------------

pub struct ApiKeyAuthenticator {
    /// Key hash to client name.
    clients: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: &[(String, String)]) -> Self {
        let clients = keys
            .iter()
            .map(|(client, key)| (sha256_hex(key.as_bytes()), client.clone()))
            .collect();
        Self { clients }
    }
}

#[async_trait]
impl RenderAuthenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, headers: &RequestHeaders) -> Result<CallerIdentity, CoreError> {
        let Some(key) = headers.get(API_KEY_HEADER) else {
            return Ok(CallerIdentity::Anonymous);
        };
        match self.clients.get(&sha256_hex(key.trim().as_bytes())) {
            Some(client) => Ok(CallerIdentity::internal(client.clone())),
            None => {
                tracing::warn!("Rejected unknown API key");
                Err(CoreError::Unauthorized("Invalid API key".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JWT
// ---------------------------------------------------------------------------

/// Claims of an end-user token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject, the end user's identifier in the case service.
    pub sub: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
}

/// Sign an HS256 end-user token valid for `ttl_mins` minutes.
pub fn issue_token(
    subject: &str,
    ttl_mins: i64,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        exp: now + ttl_mins * 60,
        iat: now,
    };
    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub struct JwtAuthenticator {
    key: DecodingKey,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl RenderAuthenticator for JwtAuthenticator {
    async fn authenticate(&self, headers: &RequestHeaders) -> Result<CallerIdentity, CoreError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(CallerIdentity::Anonymous);
        };
        // HS256, validates exp.
        let data = decode::<Claims>(token, &self.key, &Validation::default()).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            CoreError::Unauthorized("Invalid or expired token".into())
        })?;
        Ok(CallerIdentity::end_user(data.claims.sub))
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Tries each authenticator in order; the first identified caller wins.
/// Presented but invalid credentials fail immediately.
pub struct ChainAuthenticator {
    authenticators: Vec<Arc<dyn RenderAuthenticator>>,
    allow_anonymous: bool,
}

impl ChainAuthenticator {
    pub fn new(authenticators: Vec<Arc<dyn RenderAuthenticator>>, allow_anonymous: bool) -> Self {
        Self {
            authenticators,
            allow_anonymous,
        }
    }

    /// Build the chain described by `config`.
    pub fn from_config(config: &AuthConfig) -> Self {
        let mut authenticators: Vec<Arc<dyn RenderAuthenticator>> = Vec::new();
        if !config.api_keys.is_empty() {
            authenticators.push(Arc::new(ApiKeyAuthenticator::new(&config.api_keys)));
        }
        if let Some(secret) = &config.jwt_secret {
            authenticators.push(Arc::new(JwtAuthenticator::new(secret)));
        }
        Self::new(authenticators, config.allow_anonymous)
    }
}

#[async_trait]
impl RenderAuthenticator for ChainAuthenticator {
    async fn authenticate(&self, headers: &RequestHeaders) -> Result<CallerIdentity, CoreError> {
        for authenticator in &self.authenticators {
            let identity = authenticator.authenticate(headers).await?;
            if identity != CallerIdentity::Anonymous {
                return Ok(identity);
            }
        }
        if self.allow_anonymous {
            Ok(CallerIdentity::Anonymous)
        } else {
            Err(CoreError::Unauthorized("Credentials required".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SECRET: &str = "test-secret-for-render-tokens";

    fn headers(pairs: &[(&str, &str)]) -> RequestHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn chain(allow_anonymous: bool) -> ChainAuthenticator {
        ChainAuthenticator::from_config(&AuthConfig {
            api_keys: vec![("billing".into(), "k-123".into())],
            jwt_secret: Some(SECRET.into()),
            allow_anonymous,
        })
    }

    #[tokio::test]
    async fn api_key_identifies_internal_client() {
        let identity = chain(false)
            .authenticate(&headers(&[("x-api-key", "k-123")]))
            .await
            .unwrap();
        assert_eq!(identity, CallerIdentity::internal("billing"));
    }

    #[tokio::test]
    async fn wrong_api_key_is_rejected() {
        assert_matches!(
            chain(true).authenticate(&headers(&[("x-api-key", "nope")])).await,
            Err(CoreError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn bearer_token_identifies_end_user() {
        let token = issue_token("user-7", 5, SECRET).unwrap();
        let auth = format!("Bearer {token}");
        let identity = chain(false)
            .authenticate(&headers(&[("authorization", &auth)]))
            .await
            .unwrap();
        assert_eq!(identity, CallerIdentity::end_user("user-7"));
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token("user-7", 5, "another-secret").unwrap();
        let auth = format!("Bearer {token}");
        assert_matches!(
            chain(true).authenticate(&headers(&[("authorization", &auth)])).await,
            Err(CoreError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = issue_token("user-7", -10, SECRET).unwrap();
        let auth = format!("Bearer {token}");
        assert_matches!(
            chain(true).authenticate(&headers(&[("authorization", &auth)])).await,
            Err(CoreError::Unauthorized(_))
        );
    }

    #[tokio::test]
    async fn missing_credentials_depend_on_anonymous_flag() {
        assert_matches!(
            chain(false).authenticate(&headers(&[])).await,
            Err(CoreError::Unauthorized(_))
        );
        assert_eq!(
            chain(true).authenticate(&headers(&[])).await.unwrap(),
            CallerIdentity::Anonymous
        );
    }

    #[test]
    fn header_names_are_lowercased() {
        let mut map = HeaderMap::new();
        map.insert("X-Api-Key", "k".parse().unwrap());
        let headers = request_headers(&map);
        assert_eq!(headers.get("x-api-key").map(String::as_str), Some("k"));
    }
}
