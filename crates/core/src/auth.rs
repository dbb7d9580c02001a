//! Caller identity for render requests.
//!
//! Render callers are authenticated independently of the admin panel: the
//! HTTP layer hands the request headers to a [`RenderAuthenticator`] and
//! gets back a [`CallerIdentity`], which then travels inside the
//! [`InjectorContext`](crate::injectable::InjectorContext).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;

/// Request headers with lowercase names.
pub type RequestHeaders = HashMap<String, String>;

/// Who is asking for a render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No credentials were presented.
    #[default]
    Anonymous,
    /// A trusted backend service. Skips per-case ownership checks.
    Internal { client: String },
    /// An end user. Access to case data must be verified per request.
    EndUser { subject: String },
}

impl CallerIdentity {
    pub fn internal(client: impl Into<String>) -> Self {
        Self::Internal {
            client: client.into(),
        }
    }

    pub fn end_user(subject: impl Into<String>) -> Self {
        Self::EndUser {
            subject: subject.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Authenticates render callers from their request headers.
#[async_trait]
pub trait RenderAuthenticator: Send + Sync {
    /// Return the caller identity, or `Unauthorized` when the presented
    /// credentials are missing or invalid.
    async fn authenticate(&self, headers: &RequestHeaders) -> Result<CallerIdentity, CoreError>;
}

/// Extract the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &RequestHeaders) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
