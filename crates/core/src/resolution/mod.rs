//! Injectable resolution.
//!
//! [`ResolutionEngine::resolve`] turns a list of requested codes into a
//! [`ResolvedValues`](crate::injectable::ResolvedValues) map: it plans the
//! dependency levels ([`graph`]), filters codes by scope, delegates foreign
//! codes to the provider, runs the init hook and then every injector level
//! concurrently under per-injector timeouts.

pub mod engine;
pub mod graph;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CoreError, ErrorKind};
use crate::injectable::InjectorError;
use crate::provider::ProviderError;
use crate::types::DbId;

pub use engine::{DegradedCode, Resolution, ResolutionEngine};
pub use graph::{plan, ResolutionPlan};

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Init hook failed: {0}")]
    InitFailed(InjectorError),

    #[error("Init hook timed out after {0:?}")]
    InitTimeout(Duration),

    #[error("Circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("Missing injectables: {}", .codes.join(", "))]
    MissingInjectables { codes: Vec<String> },

    #[error("Critical injector '{code}' failed: {source}")]
    InjectorFailed { code: String, source: InjectorError },

    #[error("Critical injector '{code}' timed out after {timeout:?}")]
    InjectorTimeout { code: String, timeout: Duration },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Scope check failed: {0}")]
    Scope(CoreError),

    #[error("Resolution cancelled")]
    Cancelled,
}

impl ResolutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InitFailed(e) | Self::InjectorFailed { source: e, .. } => e.kind(),
            Self::InitTimeout(_) | Self::InjectorTimeout { .. } => ErrorKind::Timeout,
            Self::CircularDependency(_) => ErrorKind::Validation,
            Self::MissingInjectables { .. } => ErrorKind::NotFound,
            Self::Provider(e) => e.kind(),
            Self::Scope(e) => e.kind(),
            Self::Cancelled => ErrorKind::Unavailable,
        }
    }
}

impl From<ResolutionError> for CoreError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::MissingInjectables { codes } => CoreError::MissingInjectables(codes),
            ResolutionError::Scope(e) => e,
            other => CoreError::from_kind(other.kind(), other.to_string()),
        }
    }
}

/// Engine-wide resolution settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Timeout for injectors that declare none.
    pub default_timeout: Duration,
    /// Upper bound for the init hook.
    pub init_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            init_timeout: Duration::from_secs(10),
        }
    }
}

impl ResolverConfig {
    /// Load from environment variables, falling back to the defaults.
    ///
    /// | Env var                        | Default |
    /// |--------------------------------|---------|
    /// | `RESOLVER_DEFAULT_TIMEOUT_MS`  | `5000`  |
    /// | `RESOLVER_INIT_TIMEOUT_MS`     | `10000` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |var: &str, fallback: Duration| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        Self {
            default_timeout: millis("RESOLVER_DEFAULT_TIMEOUT_MS", defaults.default_timeout),
            init_timeout: millis("RESOLVER_INIT_TIMEOUT_MS", defaults.init_timeout),
        }
    }
}

/// Decides which registry codes are switched off for a scope.
#[async_trait]
pub trait ScopeFilter: Send + Sync {
    /// The subset of `codes` that are inactive for `(tenant_id,
    /// workspace_id)`. Codes the filter does not govern count as active.
    async fn inactive_codes(
        &self,
        codes: &[String],
        tenant_id: Option<DbId>,
        workspace_id: Option<DbId>,
    ) -> Result<Vec<String>, CoreError>;
}
