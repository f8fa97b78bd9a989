/// Diagram type declarations recognized at the start of a Mermaid source.
pub const HEADER_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "classDiagram-v2",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "mindmap",
    "timeline",
    "gitGraph",
    "quadrantChart",
    "requirementDiagram",
];

/// Leading token of a line: up to whitespace or `;`.
fn header_token(line: &str) -> &str {
    line.trim_start()
        .split(|c: char| c.is_whitespace() || c == ';')
        .next()
        .unwrap_or("")
}

/// Case-sensitive match against [`HEADER_KEYWORDS`].
pub fn is_header_keyword(token: &str) -> bool {
    HEADER_KEYWORDS.contains(&token)
}

/// Cheap check that a source opens with a diagram type declaration.
///
/// Only looks at the first non-blank line. A `true` result does not mean the
/// renderer will accept the source.
pub fn precheck_looks_valid(source: &str) -> bool {
    source
        .lines()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| is_header_keyword(header_token(line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_header_keyword_passes() {
        for keyword in HEADER_KEYWORDS {
            let source = format!("{keyword}\n  A --> B");
            assert!(precheck_looks_valid(&source), "{keyword}");
        }
    }

    #[test]
    fn headers_with_arguments_and_indentation() {
        assert!(precheck_looks_valid("graph TD\nA --> B"));
        assert!(precheck_looks_valid("\n\n   flowchart LR;\nA --> B"));
        assert!(precheck_looks_valid("\tsequenceDiagram\n  Alice->>Bob: Hi"));
        assert!(precheck_looks_valid("graph;A-->B"));
    }

    #[test]
    fn rejects_empty_and_free_text() {
        assert!(!precheck_looks_valid(""));
        assert!(!precheck_looks_valid("   \n\t\n"));
        assert!(!precheck_looks_valid("Here is your diagram:\ngraph TD"));
        assert!(!precheck_looks_valid("```mermaid\ngraph TD\n```"));
    }

    #[test]
    fn keyword_match_is_case_sensitive_and_whole_token() {
        assert!(!precheck_looks_valid("SequenceDiagram\nA->>B: x"));
        assert!(!precheck_looks_valid("Graph TD"));
        assert!(!precheck_looks_valid("graphics are nice"));
        assert!(!precheck_looks_valid("sequenceDiagrams"));
    }
}
