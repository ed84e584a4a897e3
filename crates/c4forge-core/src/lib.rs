pub mod normalize;
pub mod rules;
pub mod settings;
pub mod template;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use normalize::{infer_diagram_type, normalize};
pub use settings::{AiSettings, BackendSettings, RenderSettings, Settings, SettingsError};

// --- Conversation ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Speaker {
    #[serde(alias = "user")]
    User,
    #[serde(alias = "assistant")]
    Assistant,
}

/// One message of a design conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    #[serde(alias = "message")]
    text: String,
    #[serde(alias = "sender")]
    speaker: Speaker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    design: Option<Box<DesignResult>>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::User,
            design: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::Assistant,
            design: None,
        }
    }

    /// Assistant turn that remembers the design it produced, so a follow-up
    /// request can revise the previous diagram.
    pub fn assistant_with_design(text: impl Into<String>, design: DesignResult) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::Assistant,
            design: Some(Box::new(design)),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn design(&self) -> Option<&DesignResult> {
        self.design.as_deref()
    }
}

/// Caller-owned, append-only history. Insertion order is chronological order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the history extended by `turn`.
    pub fn appended(mut self, turn: ConversationTurn) -> Self {
        self.turns.push(turn);
        self
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl From<Vec<ConversationTurn>> for Conversation {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}

// --- Design result ---

/// Where a rendered diagram was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub filename: String,
}

/// Outcome of one design request.
///
/// Built once through [`DesignResult::succeeded`] or [`DesignResult::failed`]
/// and never mutated. A successful result always carries an artifact and no
/// error message; a failed one always carries an error message and no
/// artifact. Deserialization re-checks this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DesignResultRepr", into = "DesignResultRepr")]
pub struct DesignResult {
    user_request: String,
    explanation: String,
    diagram_source: String,
    artifact: Option<ArtifactRef>,
    error_message: Option<String>,
    clarification_needed: bool,
}

impl DesignResult {
    pub fn succeeded(
        user_request: impl Into<String>,
        explanation: impl Into<String>,
        diagram_source: impl Into<String>,
        artifact: ArtifactRef,
    ) -> Self {
        Self {
            user_request: user_request.into(),
            explanation: explanation.into(),
            diagram_source: diagram_source.into(),
            artifact: Some(artifact),
            error_message: None,
            clarification_needed: false,
        }
    }

    pub fn failed(
        user_request: impl Into<String>,
        explanation: impl Into<String>,
        diagram_source: impl Into<String>,
        error_message: impl Into<String>,
        clarification_needed: bool,
    ) -> Self {
        Self {
            user_request: user_request.into(),
            explanation: explanation.into(),
            diagram_source: diagram_source.into(),
            artifact: None,
            error_message: Some(error_message.into()),
            clarification_needed,
        }
    }

    pub fn user_request(&self) -> &str {
        &self.user_request
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn diagram_source(&self) -> &str {
        &self.diagram_source
    }

    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifact.as_ref()
    }

    pub fn success(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn clarification_needed(&self) -> bool {
        self.clarification_needed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesignResultRepr {
    user_request: String,
    #[serde(default)]
    explanation: String,
    #[serde(default, alias = "plantUmlCode")]
    diagram_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    diagram_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    diagram_filename: Option<String>,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default)]
    clarification_needed: bool,
}

impl TryFrom<DesignResultRepr> for DesignResult {
    type Error = String;

    fn try_from(repr: DesignResultRepr) -> Result<Self, Self::Error> {
        let artifact = match (repr.diagram_path, repr.diagram_filename) {
            (Some(path), Some(filename)) => Some(ArtifactRef { path, filename }),
            (None, None) => None,
            _ => return Err("diagramPath and diagramFilename must be set together".to_string()),
        };
        match (repr.success, &artifact, &repr.error_message) {
            (true, Some(_), None) | (false, None, Some(_)) => Ok(Self {
                user_request: repr.user_request,
                explanation: repr.explanation,
                diagram_source: repr.diagram_source,
                artifact,
                error_message: repr.error_message,
                clarification_needed: repr.clarification_needed,
            }),
            (true, _, _) => {
                Err("a successful design needs a diagram and no error message".to_string())
            }
            (false, _, _) => {
                Err("a failed design needs an error message and no diagram".to_string())
            }
        }
    }
}

impl From<DesignResult> for DesignResultRepr {
    fn from(result: DesignResult) -> Self {
        let success = result.success();
        let (diagram_path, diagram_filename) = match result.artifact {
            Some(a) => (Some(a.path), Some(a.filename)),
            None => (None, None),
        };
        Self {
            user_request: result.user_request,
            explanation: result.explanation,
            diagram_source: result.diagram_source,
            diagram_path,
            diagram_filename,
            success,
            error_message: result.error_message,
            clarification_needed: result.clarification_needed,
        }
    }
}

// --- Diagram kinds and output formats ---

/// C4 abstraction level a diagram is drawn at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    Context,
    Container,
    Component,
}

impl DiagramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramType::Context => "context",
            DiagramType::Container => "container",
            DiagramType::Component => "component",
        }
    }
}

impl fmt::Display for DiagramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "context" => Ok(DiagramType::Context),
            "container" => Ok(DiagramType::Container),
            "component" => Ok(DiagramType::Component),
            other => Err(format!("unknown diagram type: {other}")),
        }
    }
}

/// Image encoding produced by the renderer. Picked by configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    #[default]
    Png,
    Svg,
    Pdf,
}

impl RenderFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RenderFormat::Png => "png",
            RenderFormat::Svg => "svg",
            RenderFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            RenderFormat::Png => "image/png",
            RenderFormat::Svg => "image/svg+xml",
            RenderFormat::Pdf => "application/pdf",
        }
    }
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(RenderFormat::Png),
            "svg" => Ok(RenderFormat::Svg),
            "pdf" => Ok(RenderFormat::Pdf),
            other => Err(format!("unknown image format: {other}")),
        }
    }
}
