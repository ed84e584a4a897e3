pub mod engine;
pub mod parse;
pub mod prompt;

use c4forge_core::{normalize, ConversationTurn, DesignResult, Settings};
use c4forge_render::DiagramRenderer;
use serde::Serialize;
use tracing::{debug, info, warn};

use engine::{ChatModel, LlmChatModel};

pub const NO_DIAGRAM_MESSAGE: &str = "no diagram source found";

/// Terminal state of one design request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Succeeded,
    NoDiagramFound,
    RenderFailed,
    ModelFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignReply {
    pub outcome: Outcome,
    pub result: DesignResult,
    /// Assistant turn for the caller to append to its conversation.
    pub turn: ConversationTurn,
}

impl DesignReply {
    fn new(outcome: Outcome, result: DesignResult) -> Self {
        let turn = match outcome {
            Outcome::Succeeded => {
                ConversationTurn::assistant_with_design(result.explanation(), result.clone())
            }
            Outcome::NoDiagramFound if !result.explanation().is_empty() => {
                ConversationTurn::assistant(result.explanation())
            }
            _ => ConversationTurn::assistant(result.error_message().unwrap_or_default()),
        };
        Self { outcome, result, turn }
    }
}

/// A reply without a diagram that ends in a question is the model asking
/// the user for more detail.
fn asks_for_clarification(explanation: &str) -> bool {
    explanation.trim_end().ends_with('?')
}

/// Runs one request through prompt, model, extraction, normalization and
/// rendering. Every fault ends in a populated [`DesignResult`].
pub struct Designer<'a> {
    model: &'a dyn ChatModel,
    renderer: &'a DiagramRenderer,
}

impl<'a> Designer<'a> {
    pub fn new(model: &'a dyn ChatModel, renderer: &'a DiagramRenderer) -> Self {
        Self { model, renderer }
    }

    pub async fn design(&self, request: &str, history: &[ConversationTurn]) -> DesignReply {
        let messages = prompt::assemble(request, history);
        info!("design request with {} prior turns", history.len());

        let reply = match self.model.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("model request failed: {e}");
                let message = format!("model request failed: {e}");
                let result = DesignResult::failed(request, message.clone(), "", message, false);
                return DesignReply::new(Outcome::ModelFailed, result);
            }
        };
        debug!("raw model reply:\n{reply}");

        let extraction = parse::extract(&reply);
        if !extraction.has_diagram() {
            let clarify = asks_for_clarification(&extraction.explanation);
            warn!("no diagram in model reply (clarification: {clarify})");
            let result = DesignResult::failed(
                request,
                extraction.explanation,
                "",
                NO_DIAGRAM_MESSAGE,
                clarify,
            );
            return DesignReply::new(Outcome::NoDiagramFound, result);
        }

        let source = normalize(&extraction.diagram_source);
        debug!("normalized diagram:\n{source}");

        match self.renderer.render_to_file(&source).await {
            Ok(file) => {
                info!("design rendered to {}", file.filename);
                let result =
                    DesignResult::succeeded(request, extraction.explanation, source, file.into());
                DesignReply::new(Outcome::Succeeded, result)
            }
            Err(e) => {
                warn!("diagram rendering failed: {e}");
                let result = DesignResult::failed(
                    request,
                    extraction.explanation,
                    source,
                    format!("diagram rendering failed: {e}"),
                    false,
                );
                DesignReply::new(Outcome::RenderFailed, result)
            }
        }
    }
}

/// Design with the model and renderer described by `settings`.
pub async fn design_with_settings(
    settings: &Settings,
    request: &str,
    history: &[ConversationTurn],
) -> DesignReply {
    let model = LlmChatModel::new(settings.ai.clone());
    let renderer = DiagramRenderer::from_settings(&settings.render);
    Designer::new(&model, &renderer).design(request, history).await
}
