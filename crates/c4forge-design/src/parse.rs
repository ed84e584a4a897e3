use once_cell::sync::Lazy;
use regex::Regex;

/// What was pulled out of a free-form model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub explanation: String,
    /// Empty when the reply held no usable diagram.
    pub diagram_source: String,
}

impl Extraction {
    pub fn has_diagram(&self) -> bool {
        !self.diagram_source.trim().is_empty()
    }
}

// The tag must be the whole first word of the info line; the rest of that
// line (`title=x` and the like) is not part of the body.
static TAGGED_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:c4plantuml|plantuml|puml|c4)(?:[ \t][^\n]*)?\r?\n(.*?)```")
        .unwrap()
});

static MARKER_PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)@startuml.*?@enduml").unwrap());

/// Where the diagram part of a reply begins: any fence opening a line, a
/// tagged fence anywhere, or a start marker.
static DIAGRAM_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*```|```[ \t]*(?:c4plantuml|plantuml|puml|c4)(?:[ \t]|\r?\n)|@startuml")
        .unwrap()
});

static EXPLANATION_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t*_#]*EXPLANATION[ \t]*:[*_]*").unwrap());

static DIAGRAM_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t*_#]*(?:PLANTUML|DIAGRAM)[ \t]*:").unwrap());

type Matcher = fn(&str) -> Option<String>;

/// Tried in order; the first one that finds non-blank source wins.
const MATCHERS: [Matcher; 2] = [tagged_fences, marker_pairs];

fn join_blocks<'a>(blocks: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut out = String::new();
    for block in blocks.map(str::trim).filter(|b| !b.is_empty()) {
        out.push_str(block);
        out.push('\n');
    }
    (!out.is_empty()).then_some(out)
}

fn tagged_fences(reply: &str) -> Option<String> {
    join_blocks(
        TAGGED_FENCE_RE
            .captures_iter(reply)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str()),
    )
}

fn marker_pairs(reply: &str) -> Option<String> {
    join_blocks(MARKER_PAIR_RE.find_iter(reply).map(|m| m.as_str()))
}

/// Text after an `EXPLANATION:` label up to the diagram label, the diagram
/// itself, or the end of the reply. Only counts when it comes before the diagram.
fn labeled_explanation(reply: &str) -> Option<String> {
    let label = EXPLANATION_LABEL_RE.find(reply)?;
    if let Some(diagram) = DIAGRAM_START_RE.find(reply) {
        if diagram.start() < label.start() {
            return None;
        }
    }

    let rest = &reply[label.end()..];
    let end = [DIAGRAM_LABEL_RE.find(rest), DIAGRAM_START_RE.find(rest)]
        .into_iter()
        .flatten()
        .map(|m| m.start())
        .min()
        .unwrap_or(rest.len());
    let text = rest[..end].trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn leading_explanation(reply: &str) -> String {
    let end = DIAGRAM_START_RE.find(reply).map_or(reply.len(), |m| m.start());
    reply[..end].trim().to_string()
}

/// Split a model reply into explanation and diagram source. Never fails: a
/// reply without a diagram yields empty source and the whole reply as the
/// explanation.
pub fn extract(reply: &str) -> Extraction {
    match MATCHERS.iter().find_map(|matcher| matcher(reply)) {
        Some(diagram_source) => Extraction {
            explanation: labeled_explanation(reply).unwrap_or_else(|| leading_explanation(reply)),
            diagram_source,
        },
        None => Extraction {
            explanation: reply.trim().to_string(),
            diagram_source: String::new(),
        },
    }
}
