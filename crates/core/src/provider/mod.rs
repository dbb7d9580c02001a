//! Bridge to external, workspace-scoped injectable providers.
//!
//! Codes that no registered injector owns are handed to a
//! [`WorkspaceInjectableProvider`]. The stock implementation,
//! [`CatalogProvider`], reads question catalogs from a [`CatalogSource`]
//! and recorded answers from an [`AnswerSource`].

pub mod bridge;
pub mod catalog;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{CoreError, ErrorKind};
use crate::injectable::{DataType, I18nLabels, InjectableValue, InjectorContext};

pub use bridge::{answer_to_value, AnswerSource, CatalogProvider, OwnershipChecker};
pub use catalog::{
    merge_catalogs, CatalogDocument, CatalogGroup, CatalogQuestion, CatalogSource,
    HttpCatalogSource, OperationCatalog,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Caller is not authenticated: {0}")]
    Unauthorized(String),

    #[error("Caller may not access this case: {0}")]
    Forbidden(String),

    #[error("Invalid provider request: {0}")]
    InvalidRequest(String),

    #[error("Provider upstream unavailable: {0}")]
    Upstream(String),

    #[error("Provider upstream timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidRequest(_) => ErrorKind::Validation,
            Self::Upstream(_) => ErrorKind::Unavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        CoreError::from_kind(err.kind(), err.to_string())
    }
}

/// Which catalog to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub environment: String,
    /// Workspace whose override document is merged over the default one.
    pub workspace_key: Option<String>,
}

/// Shape of a provider-owned code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCodeKind {
    Virtual,
    Composite,
}

/// Catalog entry for a provider-owned code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderInjectable {
    pub code: String,
    pub kind: ProviderCodeKind,
    pub data_type: DataType,
    /// Operation (template type) the code belongs to.
    pub operation: String,
    pub group: String,
    pub labels: I18nLabels,
}

/// Result of resolving provider-owned codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResolution {
    pub values: HashMap<String, InjectableValue>,
    /// Codes the provider does not own. Unanswered questions are not
    /// listed here; they are simply absent from `values`.
    pub unknown: Vec<String>,
}

#[async_trait]
pub trait WorkspaceInjectableProvider: Send + Sync {
    async fn get_injectables(
        &self,
        request: &CatalogRequest,
    ) -> Result<Vec<ProviderInjectable>, ProviderError>;

    async fn resolve_injectables(
        &self,
        ctx: &InjectorContext,
        codes: &[String],
    ) -> Result<ProviderResolution, ProviderError>;
}

/// Append `segments` to `base`, percent-encoding each one as a single path
/// segment. Empty, `.` and `..` segments are rejected.
pub fn segment_url(base: &reqwest::Url, segments: &[&str]) -> Result<reqwest::Url, ProviderError> {
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || **s == "." || **s == "..")
    {
        return Err(ProviderError::InvalidRequest(format!(
            "'{bad}' is not a valid path segment"
        )));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidRequest(format!("'{base}' cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Parse a configured upstream base URL.
pub fn parse_base_url(raw: &str) -> Result<reqwest::Url, ProviderError> {
    reqwest::Url::parse(raw)
        .map_err(|e| ProviderError::InvalidRequest(format!("Invalid base URL '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn segments_are_encoded_one_by_one() {
        let base = parse_base_url("https://cases.local/api/").unwrap();
        let url = segment_url(&base, &["cases", "c-1/owners/user-7?", "owners", "user 8"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cases.local/api/cases/c-1%2Fowners%2Fuser-7%3F/owners/user%208"
        );
    }

    #[test]
    fn dot_segments_are_rejected() {
        let base = parse_base_url("https://cases.local").unwrap();
        assert_matches!(segment_url(&base, &["cases", ".."]), Err(ProviderError::InvalidRequest(_)));
        assert_matches!(segment_url(&base, &["cases", ""]), Err(ProviderError::InvalidRequest(_)));
    }
}
