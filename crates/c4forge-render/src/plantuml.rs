use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use c4forge_core::RenderFormat;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{RenderBackend, RenderFailure};

/// Local `plantuml` executable run in pipe mode.
pub struct PlantUmlCommand {
    program: Option<PathBuf>,
}

impl PlantUmlCommand {
    /// `None` means look `plantuml` up on PATH at render time.
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    fn resolve(&self) -> Result<PathBuf, RenderFailure> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => which::which("plantuml")
                .map_err(|e| RenderFailure::Unavailable(format!("plantuml not found in PATH: {e}"))),
        }
    }
}

#[async_trait]
impl RenderBackend for PlantUmlCommand {
    async fn render(&self, source: &str, format: RenderFormat) -> Result<Vec<u8>, RenderFailure> {
        let program = self.resolve()?;
        debug!("running {} -pipe -t{}", program.display(), format.extension());

        let mut child = Command::new(&program)
            .arg("-pipe")
            .arg(format!("-t{}", format.extension()))
            .args(["-charset", "UTF-8"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RenderFailure::Unavailable(format!("failed to start {}: {e}", program.display()))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderFailure::Unavailable("plantuml stdin not captured".to_string()))?;
        let input = source.to_owned();
        // Fed from a separate task so a full stdout pipe cannot stall the write.
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            result
        });

        let output = child.wait_with_output().await?;
        if let Ok(Err(e)) = writer.await {
            warn!("plantuml closed stdin early: {e}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderFailure::Backend(format!(
                "plantuml exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// PlantUML server reached over HTTP (`POST <url>/<format>` with the source as body).
pub struct PlantUmlServer {
    client: reqwest::Client,
    base_url: String,
}

impl PlantUmlServer {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, format: RenderFormat) -> String {
        format!("{}/{}", self.base_url, format.extension())
    }
}

#[async_trait]
impl RenderBackend for PlantUmlServer {
    async fn render(&self, source: &str, format: RenderFormat) -> Result<Vec<u8>, RenderFailure> {
        let url = self.endpoint(format);
        debug!("posting diagram to {url}");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(source.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The server answers bad diagrams with an error image; the
            // readable message travels in a header.
            let detail = response
                .headers()
                .get("X-PlantUML-Diagram-Error")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let detail = match detail {
                Some(d) => d,
                None => response.text().await.unwrap_or_default(),
            };
            return Err(RenderFailure::Backend(format!(
                "PlantUML server returned {status}: {}",
                detail.trim()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
