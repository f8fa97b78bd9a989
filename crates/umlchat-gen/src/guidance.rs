//! Per-category syntax guidance injected into generation requests.
//!
//! The rules text is forwarded verbatim; nothing here parses it.

use crate::classify::{self, contains_keyword, normalize, DiagramCategory};

/// Words that mark a request as being about a diagram without naming a kind.
const GENERIC_KEYWORDS: &[&str] = &[
    "diagram",
    "диаграмм",
    "схем",
    "uml",
    "mermaid",
    "flowchart",
    "chart",
];

const USE_CASE_RULES: &str = "\
Draw use case diagrams as a flowchart: start with `graph LR` or `graph TD`.
Actors are separate nodes whose text starts with the stereotype: Client[\"<<actor>> Client\"].
Never write `class X <<actor>>` and never put <<actor>> after a node declaration (not Client[\"Client\"] <<actor>>). Style actors with classDef/class if needed.
Use cases are round nodes: UC1((Place order)).
Actor to use case associations are plain links: Client --- UC1.
Label links as A -->|Label| B. No colons inside the pipes.
include/extend are dotted links with a quoted label: UC1 -.->|\"<<include>>\"| UC2.
Only node IDs around an arrow. No extra letters or identifiers before the arrow.
One link per line. Put a space on both sides of every arrow.
Keep nodes apart: never glue two identifiers together (not Search_tourClient).
A subgraph has one title: subgraph System[\"Travel agency\"], never two names. Close it with `end`.
Group the system's use cases in a subgraph named after the system or subsystem.
Checklist: graph header, actor nodes with \"<<actor>> Name\" text, (( )) use cases, --- and -.-> links, one link per line, spaces around arrows, every subgraph closed.";

const SEQUENCE_RULES: &str = "\
Start with `sequenceDiagram`.
Declare participants left to right with `participant` or `actor` before the first message. Use `participant A as Long name` for names with spaces.
Messages: ->> synchronous call, -) asynchronous message, -->> return. Every message needs `: text` after the target.
Use alt/else, opt, loop and par blocks for conditions and repetition. Close every block with `end` on its own line.
activate/deactivate must be balanced, or use the +/- shorthand on messages.
Notes: `Note over A,B: text` or `Note right of A: text`.
One message per line. Do not use `;` inside message text.
Write technical terms in the user's language and keep a formal style.";

const CLASS_RULES: &str = "\
Start with `classDiagram`.
Mark visibility: + public, - private, # protected, ~ package.
Declare members inside `class Name { ... }` blocks, one member per line, and close the brace.
Stereotypes go inside the block on their own line: <<interface>>, <<abstract>>, <<enumeration>>.
Show cardinality on associations: Customer \"1\" --> \"0..*\" Order : places.
Composition *--, aggregation o--, inheritance <|--, realization <|.., dependency ..>.
Class names are single identifiers without spaces; use a label for display text if needed.
Generic types use tildes: List~Order~, not angle brackets.
One relationship per line.";

const ACTIVITY_RULES: &str = "\
Draw activity diagrams with `flowchart TD`.
Start node: start((Start)). End node: finish(((End))).
Actions are rectangles: A[\"Validate order\"]. Decisions are rhombi: D{Paid?} with labelled branches D -->|Yes| E.
Fork and join parallel branches with a subgraph or several outgoing edges from one node.
Node IDs are ASCII letters, digits and underscores. Quote labels with spaces or punctuation.
One edge per line, spaces around arrows, close every subgraph with `end`.
Keep it compact: short labels, no needless width.";

const STATE_RULES: &str = "\
Start with `stateDiagram-v2`.
Add the initial transition [*] --> First and final transitions Last --> [*].
Label transitions with triggers and actions: Idle --> Running : start [ready] / init.
Composite states: `state Parent { ... }` with the closing brace on its own line.
State names with spaces: declare `state \"Long name\" as S1` and use S1.
Use <<choice>>, <<fork>> and <<join>> pseudo-states via `state X <<choice>>`.
One transition per line. Keep lines straight and order states top to bottom.";

const ER_RULES: &str = "\
Start with `erDiagram`.
Relationships: ||--|| one to one, ||--o{ one to zero or more, ||--|{ one to one or more, }o--o{ many to many. Every relationship needs a label: CUSTOMER ||--o{ ORDER : places.
Attributes go in the entity block, one per line as `type name`, with PK / FK markers: ORDER { int id PK  int customer_id FK }.
Entity names are single identifiers (Customer, Order, Payment) or their translation in the user's language without spaces.
Attribute types are single words (string, int, date, decimal).
Close every entity block with `}`.";

const GENERIC_RULES: &str = "\
Start with exactly one diagram type declaration on the first line.
One statement per line. Put a space on both sides of every arrow.
Quote labels with spaces, punctuation or non-ASCII characters.
Node IDs are ASCII letters, digits and underscores only.
Close every block (subgraph, alt, loop, state, entity) with its matching `end` or `}`.";

/// Syntax rules for one diagram category.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidanceEntry {
    pub category: DiagramCategory,
    pub title: String,
    /// Normalized keywords, matched against normalized request text.
    pub keywords: Vec<String>,
    pub rules: String,
}

impl GuidanceEntry {
    pub fn new(category: DiagramCategory, title: &str, keywords: &[&str], rules: &str) -> Self {
        Self {
            category,
            title: title.to_string(),
            keywords: keywords.iter().map(|k| normalize(k)).collect(),
            rules: rules.to_string(),
        }
    }
}

/// Ordered, read-only collection of guidance entries.
///
/// Built once and shared; entries are kept in category priority order.
#[derive(Debug, Clone)]
pub struct GuidanceLibrary {
    entries: Vec<GuidanceEntry>,
}

impl GuidanceLibrary {
    pub fn new(mut entries: Vec<GuidanceEntry>) -> Self {
        entries.retain(|e| e.category != DiagramCategory::Unknown);
        entries.sort_by_key(|e| e.category.rank());
        Self { entries }
    }

    /// The built-in library covering every known category.
    pub fn standard() -> Self {
        Self::new(vec![
            GuidanceEntry::new(
                DiagramCategory::UseCase,
                "Use Case",
                &[
                    "use case",
                    "usecase",
                    "use-case",
                    "вариант использования",
                    "варианты использования",
                    "вариантов использования",
                    "диаграмма вариантов",
                    "диаграмма использования",
                ],
                USE_CASE_RULES,
            ),
            GuidanceEntry::new(
                DiagramCategory::Sequence,
                "Sequence",
                &[
                    "sequence",
                    "sequence diagram",
                    "seqdiagram",
                    "диаграмма последовательности",
                    "последовательности",
                ],
                SEQUENCE_RULES,
            ),
            GuidanceEntry::new(
                DiagramCategory::Class,
                "Class",
                &["class", "class diagram", "класс", "классов", "диаграмма классов"],
                CLASS_RULES,
            ),
            GuidanceEntry::new(
                DiagramCategory::Activity,
                "Activity",
                &[
                    "activity",
                    "activity diagram",
                    "workflow",
                    "диаграмма деятельности",
                    "диаграмма активности",
                    "активности",
                    "процесс",
                ],
                ACTIVITY_RULES,
            ),
            GuidanceEntry::new(
                DiagramCategory::State,
                "State",
                &[
                    "state",
                    "state machine",
                    "statechart",
                    "состояний",
                    "диаграмма состояний",
                    "автомат состояний",
                ],
                STATE_RULES,
            ),
            GuidanceEntry::new(
                DiagramCategory::EntityRelationship,
                "ER",
                &[
                    "er diagram",
                    "er-diagram",
                    "er",
                    "erd",
                    "erm",
                    "entity relationship",
                    "сущностей и связей",
                    "диаграмма сущностей",
                    "бд",
                    "база данных",
                ],
                ER_RULES,
            ),
        ])
    }

    pub fn entries(&self) -> &[GuidanceEntry] {
        &self.entries
    }

    pub fn entry(&self, category: DiagramCategory) -> Option<&GuidanceEntry> {
        self.entries.iter().find(|e| e.category == category)
    }

    /// Rules text for a category; `None` for `Unknown`.
    pub fn lookup(&self, category: DiagramCategory) -> Option<&str> {
        self.entry(category).map(|e| e.rules.as_str())
    }

    /// Guidance block for a request: category header plus rules, the generic
    /// baseline when only a generic diagram word is present, or nothing.
    pub fn build_guidance(&self, request_text: &str, existing_source: Option<&str>) -> Option<String> {
        let category = classify::classify(self, request_text, existing_source);
        if let Some(entry) = self.entry(category) {
            return Some(format_block(&entry.title, &entry.rules));
        }

        let request = normalize(request_text);
        GENERIC_KEYWORDS
            .iter()
            .any(|k| contains_keyword(&request, k))
            .then(|| format_block("Unspecified", GENERIC_RULES))
    }
}

fn format_block(title: &str, rules: &str) -> String {
    format!("DIAGRAM TYPE: {title}\nGUIDELINES:\n{rules}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_follow_priority_order() {
        let lib = GuidanceLibrary::standard();
        let order: Vec<_> = lib.entries().iter().map(|e| e.category).collect();
        assert_eq!(order, DiagramCategory::PRIORITY.to_vec());
    }

    #[test]
    fn new_sorts_and_drops_unknown() {
        let lib = GuidanceLibrary::new(vec![
            GuidanceEntry::new(DiagramCategory::State, "S", &["s"], "state rules"),
            GuidanceEntry::new(DiagramCategory::Unknown, "?", &["x"], "nothing"),
            GuidanceEntry::new(DiagramCategory::UseCase, "U", &["u"], "use case rules"),
        ]);
        let order: Vec<_> = lib.entries().iter().map(|e| e.category).collect();
        assert_eq!(order, vec![DiagramCategory::UseCase, DiagramCategory::State]);
    }

    #[test]
    fn keywords_are_normalized() {
        let entry = GuidanceEntry::new(DiagramCategory::State, "State", &["Счёт  Состояний"], "");
        assert_eq!(entry.keywords, vec!["счет состояний".to_string()]);
    }

    #[test]
    fn lookup_covers_every_known_category() {
        let lib = GuidanceLibrary::standard();
        for category in DiagramCategory::PRIORITY {
            let rules = lib.lookup(category).unwrap();
            assert!(!rules.is_empty());
        }
        assert_eq!(lib.lookup(DiagramCategory::Unknown), None);
    }

    #[test]
    fn rules_name_the_header_keyword() {
        let lib = GuidanceLibrary::standard();
        assert!(lib.lookup(DiagramCategory::Sequence).unwrap().contains("sequenceDiagram"));
        assert!(lib.lookup(DiagramCategory::Class).unwrap().contains("classDiagram"));
        assert!(lib.lookup(DiagramCategory::State).unwrap().contains("stateDiagram-v2"));
        assert!(lib.lookup(DiagramCategory::EntityRelationship).unwrap().contains("erDiagram"));
    }

    #[test]
    fn guidance_block_has_header() {
        let lib = GuidanceLibrary::standard();
        let block = lib
            .build_guidance("диаграмма последовательности регистрации пользователя", None)
            .unwrap();
        assert!(block.starts_with("DIAGRAM TYPE: Sequence\nGUIDELINES:\n"));
        assert!(block.ends_with(SEQUENCE_RULES));
    }

    #[test]
    fn generic_word_gets_baseline_rules() {
        let lib = GuidanceLibrary::standard();
        let block = lib.build_guidance("Нарисуй схему доставки", None).unwrap();
        assert!(block.starts_with("DIAGRAM TYPE: Unspecified"));
        assert!(block.contains("One statement per line"));

        let block = lib.build_guidance("a diagram of my home network", None).unwrap();
        assert!(block.contains(GENERIC_RULES));
    }

    #[test]
    fn no_keywords_no_guidance() {
        let lib = GuidanceLibrary::standard();
        assert_eq!(lib.build_guidance("make it blue", None), None);
        assert_eq!(lib.build_guidance("make it blue", Some("graph TD\nA --> B")), None);
    }

    #[test]
    fn source_marker_selects_specific_guidance() {
        let lib = GuidanceLibrary::standard();
        let block = lib
            .build_guidance("add an Order", Some("classDiagram\n  class Shop"))
            .unwrap();
        assert!(block.contains(CLASS_RULES));
    }
}
