//! Question catalogs and their default/override merge.
//!
//! A catalog document maps operation keys (template types) to an operation
//! definition. Operations are kept as raw JSON until merge time so that a
//! malformed operation in one document does not poison the others.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::injectable::{DataType, I18nLabels};

use super::{parse_base_url, segment_url, ProviderError};

/// A whole catalog document as stored upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub operations: BTreeMap<String, serde_json::Value>,
}

/// One operation, parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCatalog {
    #[serde(default)]
    pub labels: I18nLabels,
    pub groups: Vec<CatalogGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogGroup {
    pub key: String,
    #[serde(default)]
    pub labels: I18nLabels,
    #[serde(default)]
    pub questions: Vec<CatalogQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuestion {
    pub code: String,
    #[serde(default)]
    pub labels: I18nLabels,
    #[serde(default = "default_question_type")]
    pub data_type: DataType,
}

fn default_question_type() -> DataType {
    DataType::Text
}

fn parse_operation(key: &str, raw: &serde_json::Value, origin: &str) -> Option<OperationCatalog> {
    match serde_json::from_value::<OperationCatalog>(raw.clone()) {
        Ok(op) => Some(op),
        Err(e) => {
            tracing::warn!(operation = %key, origin, error = %e, "Malformed catalog operation");
            None
        }
    }
}

/// Merge the default document with an optional workspace override.
///
/// Each operation is decided on its own: the override wins when it defines
/// the operation, the default is used otherwise, and override-only
/// operations are taken as they are. A malformed override operation falls
/// back to the default definition of that operation.
pub fn merge_catalogs(
    default: Option<&CatalogDocument>,
    overrides: Option<&CatalogDocument>,
) -> BTreeMap<String, OperationCatalog> {
    let mut merged = BTreeMap::new();

    if let Some(doc) = default {
        for (key, raw) in &doc.operations {
            if let Some(op) = parse_operation(key, raw, "default") {
                merged.insert(key.clone(), op);
            }
        }
    }

    if let Some(doc) = overrides {
        for (key, raw) in &doc.operations {
            match parse_operation(key, raw, "override") {
                Some(op) => {
                    merged.insert(key.clone(), op);
                }
                None if merged.contains_key(key) => {
                    tracing::warn!(operation = %key, "Using default definition for operation");
                }
                None => {}
            }
        }
    }

    merged
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where catalog documents come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the default document (`workspace_key == None`) or a
    /// workspace override. `Ok(None)` when the document does not exist.
    async fn fetch(
        &self,
        environment: &str,
        workspace_key: Option<&str>,
    ) -> Result<Option<CatalogDocument>, ProviderError>;
}

/// Reads catalogs over HTTP:
///
/// - default: `{base_url}/{environment}/default.json`
/// - override: `{base_url}/{environment}/workspaces/{workspace_key}.json`
pub struct HttpCatalogSource {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpCatalogSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = parse_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Upstream(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn url(&self, environment: &str, workspace_key: Option<&str>) -> Result<reqwest::Url, ProviderError> {
        match workspace_key {
            None => segment_url(&self.base_url, &[environment, "default.json"]),
            Some(key) => {
                let file = format!("{key}.json");
                segment_url(&self.base_url, &[environment, "workspaces", &file])
            }
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(
        &self,
        environment: &str,
        workspace_key: Option<&str>,
    ) -> Result<Option<CatalogDocument>, ProviderError> {
        let url = self.url(environment, workspace_key)?;
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(url.to_string())
            } else {
                ProviderError::Upstream(format!("GET {url}: {e}"))
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "Catalog document not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        let doc = response
            .json::<CatalogDocument>()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Invalid catalog at {url}: {e}")))?;
        Ok(Some(doc))
    }
}
