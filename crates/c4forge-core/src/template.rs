use once_cell::sync::Lazy;
use regex::Regex;

use crate::{infer_diagram_type, DiagramType};

const CONTEXT_TEMPLATE: &str = include_str!("../templates/context.puml");
const CONTAINER_TEMPLATE: &str = include_str!("../templates/container.puml");
const COMPONENT_TEMPLATE: &str = include_str!("../templates/component.puml");

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Lowercased system name with whitespace runs replaced by `_`, for use as a
/// PlantUML alias.
pub fn system_alias(system_name: &str) -> String {
    WHITESPACE_RE
        .replace_all(&system_name.trim().to_lowercase(), "_")
        .into_owned()
}

/// Starter diagram of the given level for a named system.
pub fn starter_template(kind: DiagramType, system_name: &str) -> String {
    let template = match kind {
        DiagramType::Context => CONTEXT_TEMPLATE,
        DiagramType::Container => CONTAINER_TEMPLATE,
        DiagramType::Component => COMPONENT_TEMPLATE,
    };
    let name = system_name.trim();
    template
        .replace("{systemName}", name)
        .replace("{systemAlias}", &system_alias(name))
}

/// Starter template at the level `source` is written at.
pub fn template_for_source(source: &str, system_name: &str) -> String {
    starter_template(infer_diagram_type(source), system_name)
}
