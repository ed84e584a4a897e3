use std::path::PathBuf;

use base64::Engine;
use c4forge_core::{
    infer_diagram_type, normalize, rules::RULES, settings, template, AiSettings,
    ConversationTurn, DesignResult, DiagramType, Settings, Speaker,
};
use c4forge_design::{design_with_settings, engine::health_check, parse, Outcome};
use c4forge_render::DiagramRenderer;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Deserialize;
use tracing::{info, warn};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct HistoryItem {
    /// What was said
    text: String,
    /// "USER" or "ASSISTANT"
    speaker: Speaker,
    /// The `result` a previous `design` call attached to its assistant turn.
    /// Passing it back lets the model revise that diagram.
    #[serde(default)]
    #[schemars(with = "Option<serde_json::Value>")]
    design: Option<DesignResult>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DesignRequest {
    /// Free-text description of the system to design, or a change to the previous design
    request: String,
    /// Earlier turns of this conversation, oldest first. Omit for a fresh conversation.
    history: Option<Vec<HistoryItem>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ExtractRequest {
    /// Raw model reply to pull the explanation and diagram source out of
    reply: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct NormalizeRequest {
    /// C4-PlantUML source, with or without @startuml/@enduml and includes
    source: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RenderRequest {
    /// C4-PlantUML source to render. It is normalized first.
    source: String,
    /// Return the image inline (base64) instead of writing it to the output directory
    inline: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct TemplateRequest {
    /// Name of the system the diagram is about, e.g. "Online Book Store"
    system_name: String,
    /// "context", "container" or "component". Default: context.
    kind: Option<DiagramType>,
}

// --- Server ---

#[derive(Clone)]
pub struct C4ForgeServer {
    tool_router: ToolRouter<Self>,
    settings_path: PathBuf,
}

#[tool_router]
impl C4ForgeServer {
    pub fn new() -> Self {
        Self::with_settings_path(settings::settings_path())
    }

    pub fn with_settings_path(settings_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            settings_path: settings_path.into(),
        }
    }

    /// Settings are re-read on every call so edits apply without a restart.
    fn load_settings(&self) -> Settings {
        settings::load_settings(&self.settings_path)
    }

    /// Renderer in the configured format and output directory.
    fn renderer(&self) -> DiagramRenderer {
        DiagramRenderer::from_settings(&self.load_settings().render)
    }

    fn not_configured(&self, ai: &AiSettings) -> CallToolResult {
        warn!("AI provider {} is not configured", ai.provider);
        CallToolResult::error(vec![Content::text(format!(
            "AI provider '{}' is not configured: set apiKey or baseUrl in {}",
            ai.provider,
            self.settings_path.display()
        ))])
    }

    #[tool(
        description = "Design a software architecture from a free-text request. Asks the configured language model for a C4 diagram, repairs the C4-PlantUML it returns and renders it to the output directory. Returns {outcome, result: {userRequest, explanation, diagramSource, diagramPath?, diagramFilename?, success, errorMessage?, clarificationNeeded}, turn}. Append the request and the returned turn to history for follow-up requests. When clarificationNeeded is true the explanation is a question for the user."
    )]
    async fn design(
        &self,
        Parameters(req): Parameters<DesignRequest>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.load_settings();
        if !settings.ai.configured() {
            return Ok(self.not_configured(&settings.ai));
        }
        let history = history_turns(req.history.unwrap_or_default());

        let reply = design_with_settings(&settings, &req.request, &history).await;
        info!("design finished: {:?}", reply.outcome);

        let json = serde_json::to_string_pretty(&reply)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        match reply.outcome {
            Outcome::Succeeded | Outcome::NoDiagramFound => {
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Outcome::RenderFailed | Outcome::ModelFailed => {
                Ok(CallToolResult::error(vec![Content::text(json)]))
            }
        }
    }

    #[tool(
        description = "Split a raw language-model reply into its explanation and C4-PlantUML source. Returns {explanation, diagramSource}; diagramSource is empty when the reply contains no diagram."
    )]
    fn extract(
        &self,
        Parameters(req): Parameters<ExtractRequest>,
    ) -> Result<CallToolResult, McpError> {
        let extraction = parse::extract(&req.reply);
        let json = serde_json::json!({
            "explanation": extraction.explanation,
            "diagramSource": extraction.diagram_source,
        });
        Ok(CallToolResult::success(vec![Content::text(json.to_string())]))
    }

    #[tool(
        description = "Repair C4-PlantUML source: adds @startuml/@enduml, the C4 standard-library includes for the level used and default layout, and rewrites Element/alias mistakes. Returns the source followed by the detected diagram type."
    )]
    fn normalize(
        &self,
        Parameters(req): Parameters<NormalizeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let source = normalize(&req.source);
        let kind = infer_diagram_type(&source);
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{source}\n\n' diagram type: {kind}"
        ))]))
    }

    #[tool(
        description = "Render C4-PlantUML source with the configured PlantUML backend and format. Writes diagram_<timestamp>.<ext> into the output directory and returns its path, or returns the image inline when inline is true."
    )]
    async fn render(
        &self,
        Parameters(req): Parameters<RenderRequest>,
    ) -> Result<CallToolResult, McpError> {
        let renderer = self.renderer();
        let source = normalize(&req.source);

        if req.inline.unwrap_or(false) {
            return match renderer.render_bytes(&source).await {
                Ok(bytes) => {
                    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
                    Ok(CallToolResult::success(vec![Content::image(
                        data,
                        renderer.format().mime_type(),
                    )]))
                }
                Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                    "diagram rendering failed: {e}"
                ))])),
            };
        }

        match renderer.render_to_file(&source).await {
            Ok(file) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Rendered {}",
                file.path.display()
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "diagram rendering failed: {e}"
            ))])),
        }
    }

    #[tool(
        description = "Get a starter C4-PlantUML diagram for a named system at the given level (context, container or component)."
    )]
    fn template(
        &self,
        Parameters(req): Parameters<TemplateRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.system_name.trim().is_empty() {
            return Ok(CallToolResult::error(vec![Content::text(
                "system_name must not be empty",
            )]));
        }
        let kind = req.kind.unwrap_or(DiagramType::Context);
        Ok(CallToolResult::success(vec![Content::text(
            template::starter_template(kind, &req.system_name),
        )]))
    }

    #[tool(description = "Check whether the configured language model is reachable and answering")]
    async fn check_model(&self) -> Result<CallToolResult, McpError> {
        let ai = self.load_settings().ai;
        if !ai.configured() {
            return Ok(self.not_configured(&ai));
        }
        if health_check(&ai).await {
            Ok(CallToolResult::success(vec![Content::text(format!(
                "{} ({}) is answering.",
                ai.provider, ai.model
            ))]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(format!(
                "{} ({}) did not answer. Check {}.",
                ai.provider,
                ai.model,
                self.settings_path.display()
            ))]))
        }
    }

    #[tool(description = "Get the C4-PlantUML authoring rules diagrams should follow")]
    fn get_rules(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(RULES)]))
    }
}

fn history_turns(items: Vec<HistoryItem>) -> Vec<ConversationTurn> {
    items
        .into_iter()
        .map(|item| match (item.speaker, item.design) {
            (Speaker::User, _) => ConversationTurn::user(item.text),
            (Speaker::Assistant, Some(design)) => {
                ConversationTurn::assistant_with_design(item.text, design)
            }
            (Speaker::Assistant, None) => ConversationTurn::assistant(item.text),
        })
        .collect()
}

const INSTRUCTIONS: &str = r#"# c4forge

Designs software architectures as C4 model diagrams and renders them with PlantUML.

- `design` runs the whole pipeline: language model, extraction, repair, rendering. Pass earlier turns as `history` to refine a design; send each returned `turn` back unchanged so its diagram travels with it.
- `extract`, `normalize` and `render` expose the individual steps for diagrams you write yourself.
- `template` gives a starter diagram to edit.
- `check_model` tells whether the configured model is reachable.

Settings live in ~/.c4forge/settings.json."#;

#[tool_handler]
impl ServerHandler for C4ForgeServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = format!("{}\n\n## C4-PlantUML Rules\n{}", INSTRUCTIONS, RULES);
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c4forge_core::{ArtifactRef, BackendSettings, RenderFormat, RenderSettings};

    fn text_of(result: &CallToolResult) -> String {
        let json = serde_json::to_value(result).unwrap();
        json["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    fn is_error(result: &CallToolResult) -> bool {
        result.is_error.unwrap_or(false)
    }

    fn server_with(settings: &Settings) -> (tempfile::TempDir, C4ForgeServer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        settings::write_settings_to(&path, settings).unwrap();
        (dir, C4ForgeServer::with_settings_path(path))
    }

    #[test]
    fn normalize_reports_repaired_source_and_level() {
        let server = C4ForgeServer::with_settings_path("/nonexistent/settings.json");
        let result = server
            .normalize(Parameters(NormalizeRequest {
                source: "Component(c, \"Parser\", \"Rust\")".to_string(),
            }))
            .unwrap();
        let text = text_of(&result);
        assert!(text.starts_with("@startuml\n"));
        assert!(text.contains("!include <C4/C4_Component>"));
        assert!(text.ends_with("' diagram type: component"));
    }

    #[test]
    fn extract_returns_both_parts() {
        let server = C4ForgeServer::with_settings_path("/nonexistent/settings.json");
        let result = server
            .extract(Parameters(ExtractRequest {
                reply: "Intro\n```plantuml\nA\n```".to_string(),
            }))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(json["explanation"], "Intro");
        assert_eq!(json["diagramSource"], "A\n");
    }

    #[test]
    fn template_defaults_to_context() {
        let server = C4ForgeServer::with_settings_path("/nonexistent/settings.json");
        let result = server
            .template(Parameters(TemplateRequest {
                system_name: "Book Store".to_string(),
                kind: None,
            }))
            .unwrap();
        assert!(text_of(&result).contains("System(book_store, \"Book Store\""));

        let empty = server
            .template(Parameters(TemplateRequest {
                system_name: "  ".to_string(),
                kind: Some(DiagramType::Container),
            }))
            .unwrap();
        assert!(is_error(&empty));
    }

    #[test]
    fn rules_tool_returns_rules() {
        let server = C4ForgeServer::with_settings_path("/nonexistent/settings.json");
        assert_eq!(text_of(&server.get_rules().unwrap()), RULES);
    }

    #[tokio::test]
    async fn design_with_unknown_provider_is_an_error_result() {
        let settings = Settings {
            ai: AiSettings {
                provider: "carrier-pigeon".to_string(),
                api_key: "key".to_string(),
                ..AiSettings::default()
            },
            ..Settings::default()
        };
        let (_dir, server) = server_with(&settings);
        let result = server
            .design(Parameters(DesignRequest {
                request: "Design a blog".to_string(),
                history: Some(vec![HistoryItem {
                    text: "hello".to_string(),
                    speaker: Speaker::User,
                    design: None,
                }]),
            }))
            .await
            .unwrap();
        assert!(is_error(&result));
        let json: serde_json::Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(json["outcome"], "modelFailed");
        assert!(json["result"]["errorMessage"]
            .as_str()
            .unwrap()
            .contains("unknown provider: carrier-pigeon"));
    }

    #[tokio::test]
    async fn unconfigured_hosted_provider_is_refused() {
        let settings = Settings {
            ai: AiSettings {
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                ..AiSettings::default()
            },
            ..Settings::default()
        };
        let (_dir, server) = server_with(&settings);

        let result = server
            .design(Parameters(DesignRequest {
                request: "Design a blog".to_string(),
                history: None,
            }))
            .await
            .unwrap();
        assert!(is_error(&result));
        assert!(text_of(&result).contains("'openai' is not configured"));

        let checked = server.check_model().await.unwrap();
        assert!(is_error(&checked));
        assert!(text_of(&checked).contains("not configured"));
    }

    #[test]
    fn returned_turn_keeps_its_design_when_sent_back() {
        let design = DesignResult::succeeded(
            "Design a blog",
            "A blog.",
            "@startuml\nSystem(blog, \"Blog\")\n@enduml",
            ArtifactRef {
                path: PathBuf::from("uml-diagram/diagram_20240101_000000.png"),
                filename: "diagram_20240101_000000.png".to_string(),
            },
        );
        let turn = ConversationTurn::assistant_with_design("A blog.", design.clone());
        let item: HistoryItem = serde_json::from_value(serde_json::to_value(&turn).unwrap()).unwrap();

        let turns = history_turns(vec![
            HistoryItem {
                text: "Design a blog".to_string(),
                speaker: Speaker::User,
                design: None,
            },
            item,
        ]);
        assert_eq!(turns[0], ConversationTurn::user("Design a blog"));
        assert_eq!(turns[1].design(), Some(&design));

        let messages = c4forge_design::prompt::assemble("Add comments", &turns);
        assert!(messages[2].content.contains("System(blog, \"Blog\")"));
    }

    #[test]
    fn renderer_uses_configured_format_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            render: RenderSettings {
                output_dir: dir.path().join("out"),
                format: RenderFormat::Svg,
                ..RenderSettings::default()
            },
            ..Settings::default()
        };
        let (_settings_dir, server) = server_with(&settings);
        let renderer = server.renderer();
        assert_eq!(renderer.format(), RenderFormat::Svg);
        assert_eq!(renderer.output_dir(), dir.path().join("out").as_path());
    }

    #[tokio::test]
    async fn render_with_missing_program_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            render: RenderSettings {
                output_dir: dir.path().join("out"),
                backend: BackendSettings::Command {
                    program: Some(PathBuf::from("/nonexistent/plantuml")),
                },
                ..RenderSettings::default()
            },
            ..Settings::default()
        };
        let (_settings_dir, server) = server_with(&settings);
        let result = server
            .render(Parameters(RenderRequest {
                source: "Person(a, \"A\")".to_string(),
                inline: Some(true),
            }))
            .await
            .unwrap();
        assert!(is_error(&result));
        assert!(text_of(&result).starts_with("diagram rendering failed: "));
    }
}
