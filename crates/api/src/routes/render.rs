use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use docforge_core::document::RenderRequest;
use docforge_core::types::DbId;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::auth::request_headers;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    /// Render a DRAFT or SCHEDULED version.
    #[serde(default)]
    pub preview: bool,
    pub external_id: Option<String>,
    pub tenant_id: Option<DbId>,
    pub workspace_id: Option<DbId>,
    pub workspace_key: Option<String>,
    pub locale: Option<String>,
}

/// POST /api/v1/render/{version_id} -- render a version to PDF.
///
/// The raw body is handed to the registry's request mapper. Resolution is
/// cancelled if the client goes away.
pub async fn render(
    State(state): State<AppState>,
    Path(version_id): Path<DbId>,
    Query(query): Query<RenderQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let headers = request_headers(&headers);
    let caller = state.authenticator.authenticate(&headers).await?;

    let request = RenderRequest {
        version_id,
        preview: query.preview,
        external_id: query.external_id,
        tenant_id: query.tenant_id,
        workspace_id: query.workspace_id,
        workspace_key: query.workspace_key,
        caller,
        headers,
        payload: body.to_vec(),
        locale: query.locale,
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let document = state.documents.render(request, &cancel).await?;

    let cache = if document.cache_hit { "hit" } else { "miss" };
    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("inline; filename=\"version-{}.pdf\"", document.version_id),
            ),
            (
                HeaderName::from_static("x-render-id"),
                document.render_id.to_string(),
            ),
            (
                HeaderName::from_static("x-resolved-count"),
                document.resolved_count.to_string(),
            ),
            (
                HeaderName::from_static("x-degraded-count"),
                document.degraded.len().to_string(),
            ),
            (HeaderName::from_static("x-template-cache"), cache.to_string()),
        ],
        document.pdf,
    )
        .into_response())
}
