//! One render, end to end: compiled template + resolved values in, PDF out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::injectable::ResolvedValues;
use crate::types::DbId;

use super::{
    CacheKey, CachedImage, CompiledTemplate, ImageCache, RenderAsset, RenderError, RenderGate, RenderJob,
    Renderer, TemplateCache,
};

/// Directory inside the render project that holds images.
const ASSET_DIR: &str = "assets";

#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// Images embedded in the document.
    pub images: usize,
    /// Image URLs that could not be fetched and were left out.
    pub missing_images: Vec<String>,
    pub duration_ms: u64,
}

pub struct RenderPipeline {
    renderer: Arc<dyn Renderer>,
    gate: RenderGate,
    templates: Arc<TemplateCache>,
    images: Option<Arc<ImageCache>>,
}

impl RenderPipeline {
    pub fn new(renderer: Arc<dyn Renderer>, gate: RenderGate, templates: Arc<TemplateCache>) -> Self {
        Self {
            renderer,
            gate,
            templates,
            images: None,
        }
    }

    pub fn with_image_cache(mut self, images: Arc<ImageCache>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn gate(&self) -> &RenderGate {
        &self.gate
    }

    pub fn templates(&self) -> &Arc<TemplateCache> {
        &self.templates
    }

    pub fn image_cache(&self) -> Option<&Arc<ImageCache>> {
        self.images.as_ref()
    }

    /// Compile a version's content, through the template cache when
    /// `cached` is set. The boolean is `true` on a cache hit.
    pub async fn compile(
        &self,
        template_id: DbId,
        version_id: DbId,
        content: &serde_json::Value,
        cached: bool,
    ) -> Result<(Arc<CompiledTemplate>, bool), RenderError> {
        if !cached {
            let compiled = CompiledTemplate::compile(template_id, version_id, content)?;
            return Ok((Arc::new(compiled), false));
        }
        self.templates
            .get_or_compile(CacheKey::new(template_id, version_id), || async {
                CompiledTemplate::compile(template_id, version_id, content)
            })
            .await
    }

    /// Fill `template` with `values` and run the renderer under the gate.
    pub async fn render(
        &self,
        template: &CompiledTemplate,
        values: &ResolvedValues,
        locale: &str,
    ) -> Result<RenderOutput, RenderError> {
        let start = Instant::now();
        let (assets, asset_names, missing_images) = self.collect_images(template, values).await;
        let source = template.fill(values, &asset_names, locale);

        let _permit = self.gate.acquire().await?;
        let pdf = self
            .renderer
            .render(RenderJob {
                source,
                assets,
            })
            .await?;

        let output = RenderOutput {
            pdf,
            images: asset_names.len(),
            missing_images,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            template_id = template.template_id,
            version_id = template.version_id,
            bytes = output.pdf.len(),
            images = output.images,
            duration_ms = output.duration_ms,
            "Document rendered"
        );
        Ok(output)
    }

    /// Fetch every image the template needs. An image that cannot be
    /// fetched is left out of the document.
    async fn collect_images(
        &self,
        template: &CompiledTemplate,
        values: &ResolvedValues,
    ) -> (Vec<RenderAsset>, HashMap<String, String>, Vec<String>) {
        let urls = template.image_urls(values);
        if urls.is_empty() {
            return (Vec::new(), HashMap::new(), Vec::new());
        }

        let Some(cache) = &self.images else {
            tracing::warn!(count = urls.len(), "No image cache configured, images skipped");
            return (Vec::new(), HashMap::new(), urls);
        };

        let fetched = futures::future::join_all(urls.iter().map(|url| cache.get(url))).await;
        read_assets(urls.into_iter().zip(fetched)).await
    }
}

/// Read fetched images into render assets. An image that failed to fetch,
/// or whose cache file is gone by now, is left out of the document.
async fn read_assets(
    fetched: impl IntoIterator<Item = (String, Result<CachedImage, RenderError>)>,
) -> (Vec<RenderAsset>, HashMap<String, String>, Vec<String>) {
    let mut assets: Vec<RenderAsset> = Vec::new();
    let mut names = HashMap::new();
    let mut missing = Vec::new();

    for (url, result) in fetched {
        let image = match result {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Image left out of document");
                missing.push(url);
                continue;
            }
        };
        let name = format!("{ASSET_DIR}/{}", image.name);
        if !assets.iter().any(|a| a.name == name) {
            match tokio::fs::read(&image.path).await {
                Ok(bytes) => assets.push(RenderAsset {
                    name: name.clone(),
                    bytes,
                }),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Cached image vanished, left out of document");
                    missing.push(url);
                    continue;
                }
            }
        }
        names.insert(url, name);
    }
    (assets, names, missing)
}
