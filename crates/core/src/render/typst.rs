//! [`Renderer`] backed by the `typst` command-line compiler.
//!
//! Each job gets a scratch project directory holding `main.typ` and its
//! assets. The compiler runs with the directory as its root, so templates
//! cannot reach files outside it.

use std::path::{Component, Path};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{RenderConfig, RenderError, RenderJob, Renderer};

/// Largest stderr captured from the compiler (1 MiB).
const MAX_STDERR_BYTES: u64 = 1024 * 1024;

const SOURCE_FILE: &str = "main.typ";
const OUTPUT_FILE: &str = "out.pdf";

pub struct TypstRenderer {
    config: RenderConfig,
}

impl TypstRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    fn command(&self, root: &Path) -> Command {
        let mut cmd = Command::new(&self.config.typst_bin);
        cmd.arg("compile")
            .arg(SOURCE_FILE)
            .arg(OUTPUT_FILE)
            .arg("--root")
            .arg(root);
        for font_path in &self.config.font_paths {
            cmd.arg("--font-path").arg(font_path);
        }
        cmd.current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Asset names must stay inside the project directory.
fn is_contained(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[async_trait]
impl Renderer for TypstRenderer {
    async fn render(&self, job: RenderJob) -> Result<Vec<u8>, RenderError> {
        let scratch = tempfile::tempdir()?;
        let root = scratch.path();

        tokio::fs::write(root.join(SOURCE_FILE), job.source.as_bytes()).await?;
        for asset in &job.assets {
            if !is_contained(&asset.name) {
                return Err(RenderError::Unavailable(format!(
                    "asset name '{}' escapes the project root",
                    asset.name
                )));
            }
            let target = root.join(&asset.name);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &asset.bytes).await?;
        }

        let start = Instant::now();
        let mut child = self.command(root).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::Unavailable(format!("'{}' not found", self.config.typst_bin))
            } else {
                RenderError::Io(e)
            }
        })?;

        let stderr_task = {
            let handle = child.stderr.take();
            tokio::spawn(async move { read_capped(handle).await })
        };

        let status = match tokio::time::timeout(self.config.render_timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                tracing::warn!(
                    timeout_secs = self.config.render_timeout.as_secs(),
                    "Typst compile timed out, process killed"
                );
                return Err(RenderError::Timeout(self.config.render_timeout));
            }
        };
        let stderr = stderr_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

        if !status.success() {
            tracing::error!(exit_code = ?status.code(), stderr = %stderr, "Typst compile failed");
            return Err(RenderError::Engine {
                exit_code: status.code(),
                stderr,
            });
        }

        let pdf = tokio::fs::read(root.join(OUTPUT_FILE)).await?;
        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            bytes = pdf.len(),
            assets = job.assets.len(),
            "Typst compile finished"
        );
        Ok(pdf)
    }
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        if let Err(e) = h.take(MAX_STDERR_BYTES).read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "Failed to read Typst stderr");
        }
    }
    buf
}
