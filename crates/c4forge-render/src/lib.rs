mod plantuml;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use c4forge_core::{ArtifactRef, BackendSettings, RenderFormat, RenderSettings};
use tracing::{debug, info};

pub use plantuml::{PlantUmlCommand, PlantUmlServer};

#[derive(Debug, thiserror::Error)]
pub enum RenderFailure {
    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("renderer rejected the diagram: {0}")]
    Backend(String),

    #[error("renderer produced no output")]
    EmptyOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Engine that turns diagram source into encoded image bytes.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, source: &str, format: RenderFormat) -> Result<Vec<u8>, RenderFailure>;
}

/// A rendered diagram written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub filename: String,
}

impl From<RenderedFile> for ArtifactRef {
    fn from(file: RenderedFile) -> Self {
        ArtifactRef {
            path: file.path,
            filename: file.filename,
        }
    }
}

/// `diagram_<YYYYMMDD_HHmmss>.<ext>`. Two renders in the same second collide.
pub fn artifact_filename(at: NaiveDateTime, format: RenderFormat) -> String {
    format!("diagram_{}.{}", at.format("%Y%m%d_%H%M%S"), format.extension())
}

pub struct DiagramRenderer {
    backend: Box<dyn RenderBackend>,
    output_dir: PathBuf,
    format: RenderFormat,
}

impl DiagramRenderer {
    pub fn new(
        backend: Box<dyn RenderBackend>,
        output_dir: impl Into<PathBuf>,
        format: RenderFormat,
    ) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            format,
        }
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        let backend: Box<dyn RenderBackend> = match &settings.backend {
            BackendSettings::Command { program } => Box::new(PlantUmlCommand::new(program.clone())),
            BackendSettings::Server { url } => Box::new(PlantUmlServer::new(url)),
        };
        Self::new(backend, settings.output_dir.clone(), settings.format)
    }

    pub fn format(&self) -> RenderFormat {
        self.format
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render to encoded image bytes in the configured format.
    pub async fn render_bytes(&self, source: &str) -> Result<Vec<u8>, RenderFailure> {
        let bytes = self.backend.render(source, self.format).await?;
        if bytes.is_empty() {
            return Err(RenderFailure::EmptyOutput);
        }
        debug!("rendered {} bytes of {}", bytes.len(), self.format.extension());
        Ok(bytes)
    }

    /// Render and persist under the output directory, creating it if needed.
    pub async fn render_to_file(&self, source: &str) -> Result<RenderedFile, RenderFailure> {
        let bytes = self.render_bytes(source).await?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let filename = artifact_filename(chrono::Local::now().naive_local(), self.format);
        let path = self.output_dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;

        info!("diagram written to {}", path.display());
        Ok(RenderedFile { path, filename })
    }
}
