use serde::{Deserialize, Serialize};

use crate::guidance::GuidanceLibrary;

/// Diagram kind a request or an existing source implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagramCategory {
    UseCase,
    Sequence,
    Class,
    Activity,
    State,
    EntityRelationship,
    Unknown,
}

impl DiagramCategory {
    /// Scan order for keyword and source-marker matching. First match wins.
    pub const PRIORITY: [DiagramCategory; 6] = [
        DiagramCategory::UseCase,
        DiagramCategory::Sequence,
        DiagramCategory::Class,
        DiagramCategory::Activity,
        DiagramCategory::State,
        DiagramCategory::EntityRelationship,
    ];

    /// Position in [`Self::PRIORITY`]; `Unknown` sorts last.
    pub fn rank(self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| *c == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    /// Header token that identifies this category in Mermaid source, lowercased.
    ///
    /// Use case and activity diagrams are both drawn as flowcharts and have none.
    pub fn source_marker(self) -> Option<&'static str> {
        match self {
            DiagramCategory::Sequence => Some("sequencediagram"),
            DiagramCategory::Class => Some("classdiagram"),
            DiagramCategory::State => Some("statediagram"),
            DiagramCategory::EntityRelationship => Some("erdiagram"),
            DiagramCategory::UseCase | DiagramCategory::Activity | DiagramCategory::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiagramCategory::UseCase => "use-case",
            DiagramCategory::Sequence => "sequence",
            DiagramCategory::Class => "class",
            DiagramCategory::Activity => "activity",
            DiagramCategory::State => "state",
            DiagramCategory::EntityRelationship => "er",
            DiagramCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DiagramCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase, fold `ё` into `е`, collapse whitespace runs.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace('ё', "е")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `keyword` occurs in `text`.
///
/// Keywords of three characters or fewer must stand as whole words,
/// otherwise "er" would match inside "user". Longer keywords match anywhere,
/// so "подпроцесс" still hits "процесс".
pub(crate) fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    if keyword.chars().count() > 3 {
        return text.contains(keyword);
    }
    text.match_indices(keyword).any(|(i, _)| {
        let starts_word = text[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let ends_word = text[i + keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        starts_word && ends_word
    })
}

/// Category of a request, falling back to markers in the existing source.
///
/// Flowchart sources stay `Unknown`: they may be use case or activity
/// diagrams and the source alone cannot tell which.
pub fn classify(
    library: &GuidanceLibrary,
    request_text: &str,
    existing_source: Option<&str>,
) -> DiagramCategory {
    let request = normalize(request_text);

    if !request.is_empty() {
        if let Some(entry) = library
            .entries()
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| contains_keyword(&request, k)))
        {
            return entry.category;
        }
    }

    existing_source
        .map(detect_from_source)
        .unwrap_or(DiagramCategory::Unknown)
}

/// Category declared by a source's header marker, scanned in priority order.
pub fn detect_from_source(source: &str) -> DiagramCategory {
    let source = normalize(source);
    DiagramCategory::PRIORITY
        .into_iter()
        .find(|category| {
            category
                .source_marker()
                .is_some_and(|marker| source.contains(marker))
        })
        .unwrap_or(DiagramCategory::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lib() -> GuidanceLibrary {
        GuidanceLibrary::standard()
    }

    #[test]
    fn normalize_folds_case_yo_and_whitespace() {
        assert_eq!(normalize("  Диаграмма   Ёлок\n\tи  ЕЛЕЙ "), "диаграмма елок и елей");
    }

    #[test]
    fn keywords_in_both_languages() {
        let lib = lib();
        let cases = [
            ("Draw a use case diagram for an ATM", DiagramCategory::UseCase),
            ("диаграмма вариантов использования для банкомата", DiagramCategory::UseCase),
            ("sequence of login calls", DiagramCategory::Sequence),
            ("диаграмма последовательности регистрации пользователя", DiagramCategory::Sequence),
            ("диаграмма классов интернет-магазина", DiagramCategory::Class),
            ("activity diagram for checkout", DiagramCategory::Activity),
            ("бизнес-процесс согласования", DiagramCategory::Activity),
            ("state machine of a traffic light", DiagramCategory::State),
            ("диаграмма состояний заказа", DiagramCategory::State),
            ("ER diagram for a library", DiagramCategory::EntityRelationship),
            ("схема БД для блога", DiagramCategory::EntityRelationship),
        ];
        for (text, expected) in cases {
            assert_eq!(classify(&lib, text, None), expected, "{text}");
        }
    }

    #[test]
    fn yo_is_folded_in_keywords() {
        // "ё" in the request must still hit keywords spelled with "е"
        assert_eq!(
            classify(&lib(), "Диаграмма состояний счёта", None),
            DiagramCategory::State
        );
    }

    #[test]
    fn higher_priority_wins() {
        // both "sequence" and "class" appear; sequence comes first
        assert_eq!(
            classify(&lib(), "class interactions as a sequence diagram", None),
            DiagramCategory::Sequence
        );
    }

    #[test]
    fn short_keywords_need_whole_words() {
        assert_eq!(
            classify(&lib(), "the user registers here", None),
            DiagramCategory::Unknown
        );
        assert_eq!(
            classify(&lib(), "an er-diagram please", None),
            DiagramCategory::EntityRelationship
        );
    }

    #[test]
    fn long_keywords_match_inside_words() {
        let lib = lib();
        assert_eq!(
            classify(&lib, "subclass hierarchy of shapes", None),
            DiagramCategory::Class
        );
        assert_eq!(classify(&lib, "подпроцесс оплаты", None), DiagramCategory::Activity);
        assert_eq!(
            classify(&lib, "диаграмма подсостояний заказа", None),
            DiagramCategory::State
        );
        assert!(!contains_keyword("the chooser", "er"));
        assert!(contains_keyword("статистика подпроцессов", "процесс"));
    }

    #[test]
    fn falls_back_to_source_markers() {
        let lib = lib();
        assert_eq!(
            classify(&lib, "add an Order entity", Some("classDiagram\n  class Shop")),
            DiagramCategory::Class
        );
        assert_eq!(
            classify(&lib, "rename Bob", Some("sequenceDiagram\nAlice->>Bob: hi")),
            DiagramCategory::Sequence
        );
        assert_eq!(
            classify(&lib, "add a node", Some("stateDiagram-v2\n[*] --> Idle")),
            DiagramCategory::State
        );
        assert_eq!(
            classify(&lib, "add a table", Some("erDiagram\nA ||--o{ B : has")),
            DiagramCategory::EntityRelationship
        );
    }

    #[test]
    fn flowchart_source_is_ambiguous() {
        let lib = lib();
        assert_eq!(
            classify(&lib, "add a node", Some("graph TD\nA --> B")),
            DiagramCategory::Unknown
        );
        assert_eq!(
            classify(&lib, "add a node", Some("flowchart LR\nA --> B")),
            DiagramCategory::Unknown
        );
    }

    #[test]
    fn empty_input_is_unknown() {
        assert_eq!(classify(&lib(), "", None), DiagramCategory::Unknown);
        assert_eq!(classify(&lib(), "   ", Some("")), DiagramCategory::Unknown);
    }

    #[test]
    fn request_keywords_beat_source_markers() {
        assert_eq!(
            classify(&lib(), "turn it into a state machine", Some("sequenceDiagram\nA->>B: x")),
            DiagramCategory::State
        );
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(text in "\\PC{0,60}") {
            let lib = lib();
            prop_assert_eq!(classify(&lib, &text, None), classify(&lib, &text, None));
        }

        #[test]
        fn keyword_alone_selects_its_category(idx in 0usize..6, prefix in "[0-9 ]{0,8}") {
            // first keyword of each entry, surrounded by neutral text
            let lib = lib();
            let entry = &lib.entries()[idx];
            let text = format!("{prefix} {} 42", entry.keywords[0]);
            prop_assert_eq!(classify(&lib, &text, None), entry.category);
        }
    }
}
