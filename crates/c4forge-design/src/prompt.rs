use c4forge_core::rules::RULES;
use c4forge_core::{ConversationTurn, Speaker};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

const EXAMPLE: &str = r#"@startuml
!include <C4/C4_Context>

Person(customer, "Customer", "Orders books online")
System(store, "Book Store", "Lets customers browse and buy books")
System_Ext(payments, "Payment Provider", "Processes card payments")

Rel(customer, store, "Browses and orders from")
Rel(store, payments, "Charges orders through")
@enduml"#;

pub fn system_prompt() -> String {
    format!(
        r#"You are a software architect who designs systems and draws them as C4 model diagrams in C4-PlantUML.

For every request:
1. Think about the users, software systems, containers and components involved.
2. Pick the C4 level that answers the request best (context, container or component).
3. Reply with a short explanation of the design, then the diagram.

Answer in exactly this layout:

EXPLANATION:
<a few sentences describing the design and the main decisions>

PLANTUML:
```plantuml
<the complete diagram>
```

If the request is too vague to design anything, ask one clarifying question and do not include a diagram.

RULES:
{RULES}

A correct context diagram:
```plantuml
{EXAMPLE}
```"#
    )
}

/// Content sent for one history turn. A previous successful design travels
/// with its source so follow-ups can revise it.
fn turn_content(turn: &ConversationTurn) -> String {
    match turn.design() {
        Some(design) if design.success() && !design.diagram_source().is_empty() => format!(
            "{}\n\n```plantuml\n{}\n```",
            turn.text(),
            design.diagram_source().trim_end()
        ),
        _ => turn.text().to_string(),
    }
}

/// System instructions, then the history in order, then `request` as the
/// final user message.
pub fn assemble(request: &str, history: &[ConversationTurn]) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(system_prompt()));
    for turn in history {
        let content = turn_content(turn);
        messages.push(match turn.speaker() {
            Speaker::User => PromptMessage::user(content),
            Speaker::Assistant => PromptMessage::assistant(content),
        });
    }
    messages.push(PromptMessage::user(request));
    messages
}
