//! Turn raw model output into clean Mermaid source.

use crate::precheck::is_header_keyword;

const FENCE: &str = "```";

/// Strip markdown code fences from model output.
///
/// A complete fenced block yields its interior; otherwise stray leading and
/// trailing fences are dropped. The result never contains a fence, is
/// trimmed, and `sanitize(sanitize(x)) == sanitize(x)`. An empty result is
/// possible and must be treated as a failed generation by the caller.
pub fn sanitize(raw: &str) -> String {
    let text = raw.trim();
    let body = match extract_fenced(text) {
        Some(inner) => inner,
        None => strip_fence_remnants(text),
    };
    // Each backtick run shrinks to fewer than three, so no fence survives.
    body.replace(FENCE, "").trim().to_string()
}

/// Interior of the first complete fenced block, if any.
fn extract_fenced(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after = skip_language_tag(&text[open + FENCE.len()..]);
    let close = after.find(FENCE)?;
    Some(after[..close].trim())
}

/// Best effort for output with a missing or partial fence.
fn strip_fence_remnants(text: &str) -> &str {
    let mut body = text;
    if let Some(rest) = body.strip_prefix(FENCE) {
        body = skip_language_tag(rest);
    }
    if let Some(rest) = body.trim_end().strip_suffix(FENCE) {
        body = rest;
    }
    body
}

/// Tags recognized even when the body follows on the same line.
const MERMAID_TAGS: &[&str] = &["mermaid", "mmd"];

/// Drop the remainder of the opening fence line when it is blank or a tag.
fn skip_language_tag(rest: &str) -> &str {
    let line_start = rest.trim_start_matches([' ', '\t']);
    for tag in MERMAID_TAGS {
        if let Some(after) = line_start.strip_prefix(tag) {
            if after.is_empty() || after.starts_with(char::is_whitespace) || after.starts_with(FENCE) {
                return after;
            }
        }
    }

    let Some((line, remainder)) = rest.split_once('\n') else {
        return rest;
    };
    let tag = line.trim();
    if tag.is_empty() || is_language_tag(tag) {
        remainder
    } else {
        rest
    }
}

/// `mermaid`, `mmd`, `text`... but not a diagram header like `sequenceDiagram`,
/// which some models put right after the fence.
fn is_language_tag(tag: &str) -> bool {
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
        && !is_header_keyword(tag)
}
