//! Markup to plain text.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Elements whose text never belongs in a body.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Strip tags, drop script/style content and collapse whitespace.
///
/// Plain text without markup passes through with whitespace collapsed.
pub fn clean_markup(input: &str) -> String {
    let doc = Html::parse_fragment(input);
    element_text(doc.root_element())
}

/// Visible text of an element, cleaned the same way as [`clean_markup`].
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// First `max` characters of `s`, with an ellipsis when something was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_script_and_style() {
        let html = r#"<div><style>.a{color:red}</style><p>Hello
            <b>world</b></p><script>track()</script></div>"#;
        assert_eq!(clean_markup(html), "Hello world");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(clean_markup("  just   text\n\nhere "), "just text here");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(clean_markup("<p>R&amp;D &lt;3</p>"), "R&D <3");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
