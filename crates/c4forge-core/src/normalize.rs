//! Structural repair of C4-PlantUML source.
//!
//! Model output is usually close to valid C4-PlantUML but often misses the
//! `@startuml`/`@enduml` markers, includes the wrong standard-library files or
//! includes them twice. [`normalize`] rewrites the text so that markers,
//! includes and default styling are each present exactly once. Element syntax
//! itself is left alone.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::DiagramType;

pub const START_MARKER: &str = "@startuml";
pub const END_MARKER: &str = "@enduml";

pub const CONTEXT_INCLUDE: &str = "!include <C4/C4_Context>";
pub const CONTAINER_INCLUDE: &str = "!include <C4/C4_Container>";
pub const COMPONENT_INCLUDE: &str = "!include <C4/C4_Component>";

const DEFAULT_STYLING: [&str; 2] = ["LAYOUT_WITH_LEGEND()", "HIDE_STEREOTYPE()"];

static START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*@startuml\b(.*)$").unwrap());
static END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*@enduml\b").unwrap());

// Local, stdlib (`<C4/C4_Context>`) and URL forms of the three level includes,
// with or without a trailing `'` comment. Other C4 files (Dynamic, Deployment,
// sprites) are left in place.
static LEVEL_INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*!include(?:url)?\s+\S*C4_(?:Context|Container|Component)(?:\.puml)?>?\s*(?:'.*)?$",
    )
    .unwrap()
});

// `Person/customer, "Customer"` -> `Person(customer, "Customer"`
static SLASH_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)([A-Z][A-Za-z]*(?:_[A-Za-z]+)*)/([A-Za-z0-9_]+)[ \t]*,").unwrap()
});

static COMPONENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bComponent(?:Db|Queue)?(?:_Ext)?\s*\(").unwrap());
static CONTAINER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Container(?:Db|Queue)?(?:_Ext)?|Container_Boundary)\s*\(").unwrap()
});
static CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:Person(?:_Ext)?|System(?:Db|Queue)?(?:_Ext)?|System_Boundary|Enterprise_Boundary)\s*\(",
    )
    .unwrap()
});
static STYLING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bLAYOUT_\w+\s*\(|\bHIDE_STEREOTYPE\s*\(").unwrap());

/// Repair diagram source so it renders as a standalone C4-PlantUML document.
///
/// The output starts with the start marker (keeping a diagram name if the
/// first marker had one), then the standard-library includes implied by the
/// highest C4 level used, then default styling when the source has none,
/// then the body, then the end marker. Running it on its own output returns
/// the same text.
pub fn normalize(source: &str) -> String {
    let text = source.replace("\r\n", "\n");
    let text = SLASH_CALL_RE.replace_all(&text, "${1}${2}(${3},");

    let mut title: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = START_RE.captures(line) {
            let name = caps[1].trim();
            if title.is_none() && !name.is_empty() {
                title = Some(name.to_string());
            }
            continue;
        }
        if END_RE.is_match(line) || LEVEL_INCLUDE_RE.is_match(line) {
            continue;
        }
        body.push(line.trim_end());
    }

    let first = body.iter().position(|l| !l.trim().is_empty());
    let last = body.iter().rposition(|l| !l.trim().is_empty());
    let body = match (first, last) {
        (Some(first), Some(last)) => body[first..=last].join("\n"),
        _ => String::new(),
    };

    let mut out: Vec<String> = Vec::new();
    out.push(match &title {
        Some(name) => format!("{START_MARKER} {name}"),
        None => START_MARKER.to_string(),
    });
    out.extend(includes_for(detect_level(&body)).iter().map(|s| s.to_string()));
    if !STYLING_RE.is_match(&body) {
        out.extend(DEFAULT_STYLING.iter().map(|s| s.to_string()));
    }
    if !body.is_empty() {
        out.push(body);
    }
    out.push(END_MARKER.to_string());
    out.join("\n")
}

/// Classify source by the most detailed C4 level it uses. Advisory only.
pub fn infer_diagram_type(source: &str) -> DiagramType {
    detect_level(source).unwrap_or(DiagramType::Context)
}

fn detect_level(body: &str) -> Option<DiagramType> {
    if COMPONENT_RE.is_match(body) {
        Some(DiagramType::Component)
    } else if CONTAINER_RE.is_match(body) {
        Some(DiagramType::Container)
    } else if CONTEXT_RE.is_match(body) {
        Some(DiagramType::Context)
    } else {
        None
    }
}

/// Each level builds on the macros of the one above it.
fn includes_for(level: Option<DiagramType>) -> &'static [&'static str] {
    match level {
        None => &[],
        Some(DiagramType::Context) => &[CONTEXT_INCLUDE],
        Some(DiagramType::Container) => &[CONTEXT_INCLUDE, CONTAINER_INCLUDE],
        Some(DiagramType::Component) => &[CONTEXT_INCLUDE, CONTAINER_INCLUDE, COMPONENT_INCLUDE],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn count_lines(text: &str, pred: impl Fn(&str) -> bool) -> usize {
        text.lines().filter(|l| pred(l)).count()
    }

    #[test]
    fn adds_missing_markers() {
        let out = normalize("Person(user, \"User\", \"\")");
        assert!(out.starts_with("@startuml\n"));
        assert!(out.ends_with("\n@enduml"));
        assert_eq!(count_lines(&out, |l| l.starts_with("@startuml")), 1);
        assert_eq!(count_lines(&out, |l| l == "@enduml"), 1);
    }

    #[test]
    fn context_elements_get_context_include_only() {
        let out = normalize("Person(user,\"User\",\"\")\nSystem(blog,\"Blog\",\"\")");
        assert_eq!(
            out,
            "@startuml\n\
             !include <C4/C4_Context>\n\
             LAYOUT_WITH_LEGEND()\n\
             HIDE_STEREOTYPE()\n\
             Person(user,\"User\",\"\")\n\
             System(blog,\"Blog\",\"\")\n\
             @enduml"
        );
    }

    #[test]
    fn component_implies_all_levels() {
        let out = normalize("Component(auth, \"Auth\", \"Rust\", \"Checks tokens\")");
        assert!(out.contains(CONTEXT_INCLUDE));
        assert!(out.contains(CONTAINER_INCLUDE));
        assert!(out.contains(COMPONENT_INCLUDE));
        let ctx = out.find(CONTEXT_INCLUDE).unwrap();
        let cont = out.find(CONTAINER_INCLUDE).unwrap();
        let comp = out.find(COMPONENT_INCLUDE).unwrap();
        assert!(ctx < cont && cont < comp);
    }

    #[test]
    fn container_db_counts_as_container() {
        let out = normalize("ContainerDb(db, \"Database\", \"Postgres\")");
        assert!(out.contains(CONTAINER_INCLUDE));
        assert!(!out.contains(COMPONENT_INCLUDE));
    }

    #[test]
    fn no_elements_means_no_includes() {
        let out = normalize("title Empty");
        assert!(!out.contains("!include"));
        assert!(out.contains("title Empty"));
    }

    #[test]
    fn strips_existing_level_includes_in_every_form() {
        let src = "@startuml\n\
                   !include C4_Context.puml\n\
                   !include <C4/C4_Container>\n\
                   !includeurl https://raw.githubusercontent.com/plantuml-stdlib/C4-PlantUML/master/C4_Container.puml\n\
                   Container(api, \"API\", \"Rust\")\n\
                   @enduml";
        let out = normalize(src);
        assert_eq!(count_lines(&out, |l| l.contains("C4_Context")), 1);
        assert_eq!(count_lines(&out, |l| l.contains("C4_Container")), 1);
        assert!(!out.contains("raw.githubusercontent.com"));
        assert!(!out.contains("C4_Context.puml"));
    }

    #[test]
    fn strips_level_includes_with_trailing_comment() {
        let out = normalize("!include <C4/C4_Context> ' ctx\nPerson(a, \"A\")");
        assert_eq!(count_lines(&out, |l| l.contains("C4_Context")), 1);
        assert!(out.contains(CONTEXT_INCLUDE));
        assert!(!out.contains("' ctx"));
    }

    #[test]
    fn keeps_unrelated_includes() {
        let out = normalize("!include <C4/C4_Deployment>\nDeployment_Node(n, \"Node\")");
        assert!(out.contains("!include <C4/C4_Deployment>"));
    }

    #[test]
    fn existing_layout_suppresses_default_styling() {
        let out = normalize("LAYOUT_LEFT_RIGHT()\nSystem(s, \"S\")");
        assert!(!out.contains("LAYOUT_WITH_LEGEND()"));
        assert!(!out.contains("HIDE_STEREOTYPE()"));

        let out = normalize("HIDE_STEREOTYPE()\nSystem(s, \"S\")");
        assert!(!out.contains("LAYOUT_WITH_LEGEND()"));
        assert_eq!(count_lines(&out, |l| l == "HIDE_STEREOTYPE()"), 1);
    }

    #[test]
    fn merged_blocks_collapse_to_one_document() {
        let src = "@startuml\nPerson(a, \"A\")\n@enduml\n@startuml\nSystem(b, \"B\")\n@enduml\n";
        let out = normalize(src);
        assert_eq!(count_lines(&out, |l| l.starts_with("@startuml")), 1);
        assert_eq!(count_lines(&out, |l| l == "@enduml"), 1);
        assert!(out.contains("Person(a, \"A\")\nSystem(b, \"B\")"));
    }

    #[test]
    fn keeps_diagram_name_and_handles_crlf() {
        let out = normalize("@startuml shop\r\nSystem(s, \"Shop\")\r\n@enduml\r\n");
        assert!(out.starts_with("@startuml shop\n"));
        assert!(!out.contains('\r'));
    }

    #[test]
    fn repairs_slash_call_slip() {
        let out = normalize("Person/customer, \"Customer\", \"Buys things\")");
        assert!(out.contains("Person(customer, \"Customer\", \"Buys things\")"));
        assert!(out.contains(CONTEXT_INCLUDE));
    }

    #[test]
    fn marker_case_is_ignored() {
        let out = normalize("@StartUML\nSystem(s, \"S\")\n@ENDUML");
        assert_eq!(count_lines(&out, |l| l.to_lowercase().starts_with("@startuml")), 1);
        assert_eq!(count_lines(&out, |l| l.eq_ignore_ascii_case("@enduml")), 1);
    }

    #[test]
    fn empty_source_still_well_formed() {
        let out = normalize("   \n  ");
        assert_eq!(out, "@startuml\nLAYOUT_WITH_LEGEND()\nHIDE_STEREOTYPE()\n@enduml");
        assert_eq!(normalize(&out), out);
    }

    #[test]
    fn infers_diagram_type() {
        assert_eq!(
            infer_diagram_type("Container(api, \"API\")\nComponent(c, \"C\")"),
            DiagramType::Component
        );
        assert_eq!(infer_diagram_type("System(s, \"S\")"), DiagramType::Context);
        assert_eq!(infer_diagram_type("Container_Boundary(b, \"B\") {\n}"), DiagramType::Container);
        assert_eq!(infer_diagram_type("Rel(a, b, \"uses\")"), DiagramType::Context);
    }

    const FRAGMENTS: &[&str] = &[
        "@startuml",
        "@startuml shop",
        "@enduml",
        "@ENDUML",
        "!include C4_Context.puml",
        "!include <C4/C4_Container>",
        "!include <C4/C4_Component>",
        "!include <C4/C4_Context> ' ctx",
        "!include C4_Container.puml 'local copy",
        "!include <C4/C4_Dynamic>",
        "Person(user, \"User\", \"\")",
        "Person/admin, \"Admin\", \"\")",
        "System(blog, \"Blog\", \"\")",
        "System_Ext(mail, \"Mail\")",
        "Container(api, \"API\", \"Rust\")",
        "ContainerDb(db, \"DB\", \"Postgres\")",
        "Component(auth, \"Auth\", \"Rust\")",
        "Rel(user, blog, \"Uses\")",
        "LAYOUT_WITH_LEGEND()",
        "LAYOUT_TOP_DOWN()",
        "HIDE_STEREOTYPE()",
        "System_Boundary(b, \"Boundary\") {",
        "}",
        "",
        "   ",
        "' comment",
    ];

    fn fragment_source() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::sample::select(FRAGMENTS), 0..16).prop_map(|v| v.join("\n"))
    }

    proptest! {
        #[test]
        fn idempotent_on_fragments(src in fragment_source()) {
            let once = normalize(&src);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn idempotent_on_arbitrary_text(src in "[ -~\n]{0,200}") {
            let once = normalize(&src);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn markers_appear_exactly_once(src in fragment_source()) {
            let out = normalize(&src);
            prop_assert!(out.starts_with(START_MARKER));
            prop_assert!(out.ends_with(END_MARKER));
            prop_assert_eq!(count_lines(&out, |l| l.to_lowercase().starts_with("@startuml")), 1);
            prop_assert_eq!(count_lines(&out, |l| l.eq_ignore_ascii_case("@enduml")), 1);
        }

        #[test]
        fn component_sources_get_every_include(src in fragment_source()) {
            let src = format!("{src}\nComponent(x, \"X\", \"Go\")");
            let out = normalize(&src);
            prop_assert_eq!(count_lines(&out, |l| l == CONTEXT_INCLUDE), 1);
            prop_assert_eq!(count_lines(&out, |l| l == CONTAINER_INCLUDE), 1);
            prop_assert_eq!(count_lines(&out, |l| l == COMPONENT_INCLUDE), 1);
            prop_assert_eq!(count_lines(&out, |l| l.contains("C4_Context")), 1);
            prop_assert_eq!(count_lines(&out, |l| l.contains("C4_Container")), 1);
        }
    }
}
