//! On-disk cache of remote images referenced by templates.
//!
//! Files are named `{sha256(url)}.{ext}` with the extension taken from the
//! image's magic bytes. A file younger than the max age is reused without a
//! fetch, and concurrent requests for the same URL share one download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use crate::hashing::sha256_hex;

use super::{ImageCacheConfig, RenderError};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "gif", "svg", "webp"];

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RenderError>;
}

/// [`ImageFetcher`] over HTTP(S) with a size cap.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Unavailable(format!("image HTTP client: {e}")))?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        let fail = |reason: String| RenderError::ImageFetch {
            url: url.to_string(),
            reason,
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(fail("only http and https URLs are fetched".into()));
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(fail(format!("larger than {} bytes", self.max_bytes)));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(fail(format!("larger than {} bytes", self.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// An image present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub url: String,
    pub path: PathBuf,
    /// File name inside the cache directory.
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub kept: usize,
}

pub struct ImageCache {
    dir: PathBuf,
    max_age: Duration,
    fetcher: Arc<dyn ImageFetcher>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<CachedImage>>>>,
}

impl ImageCache {
    pub fn new(config: &ImageCacheConfig, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            dir: config.dir.clone(),
            max_age: config.max_age,
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Return the cached file for `url`, downloading it when absent or stale.
    pub async fn get(&self, url: &str) -> Result<CachedImage, RenderError> {
        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(url.to_string()).or_default())
        };

        let result = cell.get_or_try_init(|| self.load(url)).await.cloned();

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(url)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(url);
        }
        result
    }

    /// Fetch several images concurrently, keyed by URL.
    pub async fn get_many(&self, urls: &[String]) -> Result<HashMap<String, CachedImage>, RenderError> {
        let images = futures::future::try_join_all(urls.iter().map(|url| self.get(url))).await?;
        Ok(images.into_iter().map(|img| (img.url.clone(), img)).collect())
    }

    async fn load(&self, url: &str) -> Result<CachedImage, RenderError> {
        let stem = sha256_hex(url.as_bytes());
        if let Some(image) = self.find_fresh(url, &stem).await? {
            tracing::debug!(url, name = %image.name, "Image cache hit");
            return Ok(image);
        }

        let bytes = self.fetcher.fetch(url).await?;
        let ext = sniff_extension(&bytes).ok_or_else(|| RenderError::ImageFetch {
            url: url.to_string(),
            reason: "unsupported image format".into(),
        })?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{stem}.{ext}");
        let path = self.dir.join(&name);
        let partial = self.dir.join(format!("{name}.part"));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        tracing::info!(url, name = %name, bytes = bytes.len(), "Image cached");
        Ok(CachedImage {
            url: url.to_string(),
            path,
            name,
        })
    }

    async fn find_fresh(&self, url: &str, stem: &str) -> Result<Option<CachedImage>, RenderError> {
        for ext in EXTENSIONS {
            let name = format!("{stem}.{ext}");
            let path = self.dir.join(&name);
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if age(metadata.modified()?) < self.max_age {
                return Ok(Some(CachedImage {
                    url: url.to_string(),
                    path,
                    name,
                }));
            }
        }
        Ok(None)
    }

    /// Delete cached files older than the max age.
    pub async fn cleanup(&self) -> Result<CleanupReport, RenderError> {
        let mut report = CleanupReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            if age(metadata.modified()?) >= self.max_age {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => report.removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                report.kept += 1;
            }
        }
        Ok(report)
    }
}

fn age(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default()
}

/// File extension for the image format the bytes start with.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("webp");
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("svg");
    }
    None
}
