use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use docforge_core::injectable::InjectorDescriptor;
use docforge_core::provider::{CatalogRequest, ProviderInjectable};
use docforge_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::auth::request_headers;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub tenant_id: Option<DbId>,
    pub workspace_id: Option<DbId>,
    /// Workspace whose provider catalog override applies.
    pub workspace_key: Option<String>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub injectables: Vec<InjectorDescriptor>,
    /// Provider-owned codes. Empty when no provider is configured.
    pub provider: Vec<ProviderInjectable>,
}

/// GET /api/v1/injectables -- registered injectors active for the scope,
/// plus the provider catalog.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
    headers: HeaderMap,
) -> AppResult<Json<CatalogResponse>> {
    state.authenticator.authenticate(&request_headers(&headers)).await?;

    let engine = state.documents.engine();
    let mut injectables = engine.registry().catalog();
    if let Some(filter) = engine.scope_filter() {
        let codes: Vec<String> = injectables.iter().map(|d| d.code.clone()).collect();
        let inactive = filter
            .inactive_codes(&codes, query.tenant_id, query.workspace_id)
            .await?;
        injectables.retain(|d| !inactive.contains(&d.code));
    }

    let provider = match engine.provider() {
        Some(provider) => {
            provider
                .get_injectables(&CatalogRequest {
                    environment: state.config.catalog.environment.clone(),
                    workspace_key: query.workspace_key,
                })
                .await
                .map_err(docforge_core::error::CoreError::from)?
        }
        None => Vec::new(),
    };

    Ok(Json(CatalogResponse {
        injectables,
        provider,
    }))
}
