//! Document rendering service.
//!
//! Ties the version lifecycle, resolution and the render pipeline together
//! for one request: load the version, check it may be rendered, compile the
//! content, decode the payload, resolve every referenced code and render.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::{CallerIdentity, RequestHeaders};
use crate::error::CoreError;
use crate::injectable::{InjectorContext, JsonRequestMapper, RequestMapper};
use crate::render::RenderPipeline;
use crate::resolution::{DegradedCode, ResolutionEngine, ResolutionError};
use crate::types::DbId;
use crate::version::{VersionError, VersionStatus, VersionStore};

/// Inbound render request, already authenticated.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub version_id: DbId,
    /// Allow DRAFT and SCHEDULED versions.
    pub preview: bool,
    pub external_id: Option<String>,
    pub tenant_id: Option<DbId>,
    pub workspace_id: Option<DbId>,
    /// Workspace key selecting the provider catalog override.
    pub workspace_key: Option<String>,
    pub caller: CallerIdentity,
    pub headers: RequestHeaders,
    /// Raw request payload, decoded by the registry's request mapper.
    pub payload: Vec<u8>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub render_id: Uuid,
    #[serde(skip)]
    pub pdf: Vec<u8>,
    pub template_id: DbId,
    pub version_id: DbId,
    pub resolved_count: usize,
    pub cache_hit: bool,
    pub degraded: Vec<DegradedCode>,
    pub missing_images: Vec<String>,
    pub duration_ms: u64,
}

pub struct DocumentService<S: ?Sized> {
    versions: Arc<S>,
    engine: Arc<ResolutionEngine>,
    pipeline: Arc<RenderPipeline>,
}

impl<S: ?Sized> Clone for DocumentService<S> {
    fn clone(&self) -> Self {
        Self {
            versions: Arc::clone(&self.versions),
            engine: Arc::clone(&self.engine),
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<S: VersionStore + ?Sized> DocumentService<S> {
    pub fn new(versions: Arc<S>, engine: Arc<ResolutionEngine>, pipeline: Arc<RenderPipeline>) -> Self {
        Self {
            versions,
            engine,
            pipeline,
        }
    }

    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    pub fn pipeline(&self) -> &Arc<RenderPipeline> {
        &self.pipeline
    }

    pub async fn render(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedDocument, CoreError> {
        let render_id = Uuid::now_v7();
        let version = self
            .versions
            .find(request.version_id)
            .await?
            .ok_or(VersionError::NotFound(request.version_id))?;
        version.ensure_renderable(request.preview)?;

        // Only published content is immutable, so only it is cached.
        let (template, cache_hit) = self
            .pipeline
            .compile(
                version.template_id,
                version.id,
                &version.content,
                version.status == VersionStatus::Published,
            )
            .await?;

        let mut ctx = InjectorContext::new()
            .with_scope(request.tenant_id, request.workspace_id)
            .with_caller(request.caller)
            .with_headers(request.headers);
        if let Some(external_id) = request.external_id {
            ctx = ctx.with_external_id(external_id);
        }
        if let Some(key) = request.workspace_key {
            ctx = ctx.with_workspace_key(key);
        }
        if let Some(locale) = request.locale {
            ctx = ctx.with_locale(locale);
        }
        for (code, format) in &template.selected_formats {
            ctx = ctx.with_format(code.clone(), format.clone());
        }

        let payload = match self.engine.registry().request_mapper() {
            Some(mapper) => mapper.map(&request.payload, &ctx).await,
            None => JsonRequestMapper.map(&request.payload, &ctx).await,
        }
        .map_err(|e| CoreError::from_kind(e.kind(), format!("Request payload rejected: {e}")))?;
        let ctx = ctx.with_payload(payload);
        let locale = ctx.locale().to_string();

        let resolution = self.engine.resolve(&template.codes, ctx, cancel).await?;
        // Dropping the render future kills the renderer process.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ResolutionError::Cancelled.into()),
            output = self.pipeline.render(&template, &resolution.values, &locale) => output?,
        };

        tracing::info!(
            render_id = %render_id,
            version_id = version.id,
            resolved = resolution.values.len(),
            degraded = resolution.degraded.len(),
            cache_hit,
            "Render request completed"
        );
        Ok(RenderedDocument {
            render_id,
            pdf: output.pdf,
            template_id: version.template_id,
            version_id: version.id,
            resolved_count: resolution.values.len(),
            cache_hit,
            degraded: resolution.degraded,
            missing_images: output.missing_images,
            duration_ms: output.duration_ms,
        })
    }
}
