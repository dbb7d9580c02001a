//! PDF rendering.
//!
//! - [`source`] -- compiles content into Typst segments and fills them
//! - [`template_cache`] -- compiled templates by (template, version)
//! - [`image_cache`] -- remote images persisted on disk
//! - [`gate`] -- bounds concurrent renderer invocations
//! - [`typst`] -- the Typst CLI [`Renderer`]
//! - [`pipeline`] -- ties the above together for one render

pub mod gate;
pub mod image_cache;
pub mod pipeline;
pub mod source;
pub mod template_cache;
pub mod typst;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::content::ContentViolation;
use crate::error::{CoreError, ErrorKind};

pub use gate::RenderGate;
pub use image_cache::{CachedImage, CleanupReport, HttpImageFetcher, ImageCache, ImageFetcher};
pub use pipeline::{RenderOutput, RenderPipeline};
pub use source::{CompiledTemplate, Segment};
pub use template_cache::{CacheKey, TemplateCache};
pub use typst::TypstRenderer;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer busy: no slot became free within {waited:?}")]
    RendererBusy { waited: Duration },

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("Typst failed (exit code {exit_code:?}): {stderr}")]
    Engine {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to fetch image '{url}': {reason}")]
    ImageFetch { url: String, reason: String },

    #[error("Template content has {} violation(s)", .0.len())]
    InvalidContent(Vec<ContentViolation>),

    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RendererBusy { .. } | Self::ImageFetch { .. } | Self::Unavailable(_) => {
                ErrorKind::Unavailable
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidContent(_) => ErrorKind::Validation,
            Self::Engine { .. } | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<RenderError> for CoreError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::InvalidContent(violations) => CoreError::InvalidContent(violations),
            other => CoreError::from_kind(other.kind(), other.to_string()),
        }
    }
}

/// A file the Typst source refers to by `name`, relative to the project
/// root. Bytes are read up front so cache cleanup cannot pull them away
/// mid-render.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderAsset {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for RenderAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderAsset")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Everything one renderer invocation needs.
#[derive(Debug, Clone, Default)]
pub struct RenderJob {
    pub source: String,
    pub assets: Vec<RenderAsset>,
}

/// Turns Typst source into PDF bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn env_or<T: std::str::FromStr>(var: &str, fallback: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

/// Renderer process settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub typst_bin: String,
    pub font_paths: Vec<PathBuf>,
    pub render_timeout: Duration,
    pub max_concurrent: usize,
    pub acquire_timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            typst_bin: "typst".into(),
            font_paths: Vec::new(),
            render_timeout: Duration::from_secs(30),
            max_concurrent: 4,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl RenderConfig {
    /// | Env var                      | Default |
    /// |------------------------------|---------|
    /// | `TYPST_BIN`                  | `typst` |
    /// | `TYPST_FONT_PATHS`           | (none, `:`-separated) |
    /// | `RENDER_TIMEOUT_SECS`        | `30`    |
    /// | `RENDER_MAX_CONCURRENT`      | `4`     |
    /// | `RENDER_ACQUIRE_TIMEOUT_MS`  | `10000` |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            typst_bin: std::env::var("TYPST_BIN").unwrap_or(d.typst_bin),
            font_paths: std::env::var("TYPST_FONT_PATHS")
                .map(|v| v.split(':').filter(|p| !p.is_empty()).map(PathBuf::from).collect())
                .unwrap_or_default(),
            render_timeout: Duration::from_secs(env_or(
                "RENDER_TIMEOUT_SECS",
                d.render_timeout.as_secs(),
            )),
            max_concurrent: env_or("RENDER_MAX_CONCURRENT", d.max_concurrent).max(1),
            acquire_timeout: Duration::from_millis(env_or(
                "RENDER_ACQUIRE_TIMEOUT_MS",
                d.acquire_timeout.as_millis() as u64,
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateCacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for TemplateCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl TemplateCacheConfig {
    /// | Env var                        | Default |
    /// |--------------------------------|---------|
    /// | `TEMPLATE_CACHE_MAX_ENTRIES`   | `256`   |
    /// | `TEMPLATE_CACHE_TTL_SECS`      | `3600`  |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_entries: env_or("TEMPLATE_CACHE_MAX_ENTRIES", d.max_entries).max(1),
            ttl: Duration::from_secs(env_or("TEMPLATE_CACHE_TTL_SECS", d.ttl.as_secs())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    pub dir: PathBuf,
    pub max_age: Duration,
    pub cleanup_interval: Duration,
    pub fetch_timeout: Duration,
    /// Largest image accepted, in bytes.
    pub max_bytes: usize,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("docforge-images"),
            max_age: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(10),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ImageCacheConfig {
    /// | Env var                          | Default |
    /// |----------------------------------|---------|
    /// | `IMAGE_CACHE_DIR`                | `$TMPDIR/docforge-images` |
    /// | `IMAGE_CACHE_MAX_AGE_SECS`       | `86400` |
    /// | `IMAGE_CACHE_CLEANUP_SECS`       | `3600`  |
    /// | `IMAGE_FETCH_TIMEOUT_SECS`       | `10`    |
    /// | `IMAGE_MAX_BYTES`                | `10485760` |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            dir: std::env::var("IMAGE_CACHE_DIR").map(PathBuf::from).unwrap_or(d.dir),
            max_age: Duration::from_secs(env_or("IMAGE_CACHE_MAX_AGE_SECS", d.max_age.as_secs())),
            cleanup_interval: Duration::from_secs(env_or(
                "IMAGE_CACHE_CLEANUP_SECS",
                d.cleanup_interval.as_secs(),
            )),
            fetch_timeout: Duration::from_secs(env_or(
                "IMAGE_FETCH_TIMEOUT_SECS",
                d.fetch_timeout.as_secs(),
            )),
            max_bytes: env_or("IMAGE_MAX_BYTES", d.max_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_unavailable_not_timeout() {
        let err = RenderError::RendererBusy {
            waited: Duration::from_millis(5),
        };
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(CoreError::from(err).kind(), ErrorKind::Unavailable);
        assert_eq!(RenderError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Timeout);
    }

    #[test]
    fn defaults_are_sane() {
        let config = RenderConfig::default();
        assert!(config.max_concurrent >= 1);
        assert!(TemplateCacheConfig::default().max_entries > 0);
    }
}
