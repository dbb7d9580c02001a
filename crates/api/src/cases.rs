//! HTTP client for the case service that backs provider-owned codes.
//!
//! Endpoints, relative to `CASE_SERVICE_URL`:
//!
//! - `GET /cases/{external_id}/answers/{template_type}` -- JSON object of
//!   question code to recorded answer
//! - `GET /cases/{external_id}/groups/{group}` -- `{ "answered": bool }`
//! - `GET /cases/{external_id}/owners/{subject}` -- `200` when the subject
//!   owns the case, `404` otherwise
//!
//! Ids are percent-encoded as single path segments.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use docforge_core::provider::{
    parse_base_url, segment_url, AnswerSource, OwnershipChecker, ProviderError,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct GroupStatus {
    answered: bool,
}

pub struct HttpCaseClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpCaseClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = parse_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Upstream(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// GET the path made of `segments`, mapping `404` to `None`.
    async fn get(&self, segments: &[&str]) -> Result<Option<reqwest::Response>, ProviderError> {
        let url = segment_url(&self.base_url, segments)?;
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(url.to_string())
            } else {
                ProviderError::Upstream(format!("GET {url}: {e}"))
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Upstream(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }
        Ok(Some(response))
    }
}

#[async_trait]
impl AnswerSource for HttpCaseClient {
    async fn answers(
        &self,
        external_id: &str,
        template_type: &str,
    ) -> Result<HashMap<String, serde_json::Value>, ProviderError> {
        let Some(response) = self
            .get(&["cases", external_id, "answers", template_type])
            .await?
        else {
            return Ok(HashMap::new());
        };
        response
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Invalid answers for '{external_id}': {e}")))
    }

    async fn group_answered(&self, external_id: &str, group: &str) -> Result<bool, ProviderError> {
        let Some(response) = self
            .get(&["cases", external_id, "groups", group])
            .await?
        else {
            return Ok(false);
        };
        let status: GroupStatus = response
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Invalid group status: {e}")))?;
        Ok(status.answered)
    }
}

#[async_trait]
impl OwnershipChecker for HttpCaseClient {
    async fn owns(&self, subject: &str, external_id: &str) -> Result<bool, ProviderError> {
        Ok(self
            .get(&["cases", external_id, "owners", subject])
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    /// Serve a fake case service on an ephemeral port.
    async fn case_service() -> String {
        let app = Router::new()
            .route(
                "/cases/{id}/answers/{kind}",
                get(|Path((id, kind)): Path<(String, String)>| async move {
                    if id == "c-1" && kind == "intake" {
                        Ok(Json(json!({ "name": "Ana", "age": 41 })))
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            )
            .route(
                "/cases/{id}/groups/{group}",
                get(|Path((id, group)): Path<(String, String)>| async move {
                    if id == "broken" {
                        Err(StatusCode::BAD_GATEWAY)
                    } else {
                        Ok(Json(json!({ "answered": group == "personal" })))
                    }
                }),
            )
            .route(
                "/cases/{id}/owners/{subject}",
                get(|Path((id, subject)): Path<(String, String)>| async move {
                    if id == "c-1" && subject == "user-7" {
                        StatusCode::OK
                    } else {
                        StatusCode::NOT_FOUND
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn answers_are_read_and_missing_cases_are_empty() {
        let client = HttpCaseClient::new(case_service().await, Duration::from_secs(2)).unwrap();
        let answers = client.answers("c-1", "intake").await.unwrap();
        assert_eq!(answers.get("name"), Some(&json!("Ana")));
        assert!(client.answers("c-2", "intake").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_and_ownership_checks() {
        let client = HttpCaseClient::new(case_service().await, Duration::from_secs(2)).unwrap();
        assert!(client.group_answered("c-1", "personal").await.unwrap());
        assert!(!client.group_answered("c-1", "incident").await.unwrap());
        assert!(client.owns("user-7", "c-1").await.unwrap());
        assert!(!client.owns("user-8", "c-1").await.unwrap());
    }

    #[tokio::test]
    async fn ids_cannot_reach_other_paths() {
        let client = HttpCaseClient::new(case_service().await, Duration::from_secs(2)).unwrap();
        assert!(!client.owns("user-8", "c-1/owners/user-7?").await.unwrap());
        assert!(!client.owns("user-8", "c-1/owners/user-7#").await.unwrap());
        assert!(client.answers("c-1/answers/intake?", "x").await.unwrap().is_empty());
        assert!(matches!(
            client.owns("user-8", "..").await,
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn upstream_errors_are_reported() {
        let client = HttpCaseClient::new(case_service().await, Duration::from_secs(2)).unwrap();
        let err = client.group_answered("broken", "personal").await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream(_)));
    }
}
