//! Best-effort problem extraction.
//!
//! Class names on the problem page change between deployments, so every
//! field is looked up through an ordered list of selectors and the first
//! one that matches wins. New fallbacks go in the tables, not the code.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::state::ProblemContext;

/// How to turn a matched element into field text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Text content, whitespace-trimmed.
    TrimmedText,
    /// Text content as-is (code keeps its indentation).
    Text,
    /// Paragraph-like children joined by blank lines; inner HTML when there
    /// are none.
    Paragraphs,
    /// Text of each row matching the given selector, one per line; plain text
    /// when there are no rows.
    Lines(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractRule {
    pub selector: &'static str,
    pub strategy: Strategy,
}

const fn rule(selector: &'static str, strategy: Strategy) -> ExtractRule {
    ExtractRule { selector, strategy }
}

pub const TITLE_RULES: &[ExtractRule] = &[
    rule(r#"[data-cy="question-title"]"#, Strategy::TrimmedText),
    rule(".mr-2.text-lg", Strategy::TrimmedText),
    rule("h3.text-lg", Strategy::TrimmedText),
    rule(".text-title-large", Strategy::TrimmedText),
    rule(r#"[data-cy="question-title"] span"#, Strategy::TrimmedText),
];

pub const DESCRIPTION_RULES: &[ExtractRule] = &[
    rule(r#"[data-cy="question-content"]"#, Strategy::Paragraphs),
    rule(".content__u3I1", Strategy::Paragraphs),
    rule(".question-content__JfgR", Strategy::Paragraphs),
    rule(r#"[data-cy="question-content"] div"#, Strategy::Paragraphs),
    rule(r#"[data-track-load="description_content"]"#, Strategy::Paragraphs),
];

pub const CODE_RULES: &[ExtractRule] = &[
    rule(".monaco-editor", Strategy::Lines(".view-line")),
    rule(".CodeMirror", Strategy::Lines(".CodeMirror-line")),
    rule(".ace_editor", Strategy::Lines(".ace_line")),
    rule(r#"[data-cy="code-editor"]"#, Strategy::Text),
];

const PARAGRAPH_TAGS: &[&str] = &["p", "pre", "ul", "ol", "blockquote"];

const PROBLEM_URL_MARKER: &str = "leetcode.com/problems/";

pub fn is_problem_page(url: &str) -> bool {
    url.contains(PROBLEM_URL_MARKER)
}

/// Scan the page for the problem. Never fails: a field nobody could find is
/// an empty string.
pub fn extract_context(doc: &Html) -> ProblemContext {
    let context = ProblemContext {
        title: extract_field(doc, "title", TITLE_RULES),
        description: extract_field(doc, "description", DESCRIPTION_RULES),
        current_code: extract_field(doc, "code", CODE_RULES),
    };
    debug!(
        title = %context.title,
        description_len = context.description.len(),
        code_len = context.current_code.len(),
        "extracted problem context"
    );
    context
}

pub fn extract_title(doc: &Html) -> String {
    extract_field(doc, "title", TITLE_RULES)
}

pub fn extract_code(doc: &Html) -> String {
    extract_field(doc, "code", CODE_RULES)
}

/// First-match-wins over `rules`.
pub fn extract_field(doc: &Html, field: &str, rules: &[ExtractRule]) -> String {
    for rule in rules {
        let selector = match Selector::parse(rule.selector) {
            Ok(sel) => sel,
            Err(e) => {
                warn!(field, selector = rule.selector, error = ?e, "skipping unparsable selector");
                continue;
            }
        };
        if let Some(element) = doc.select(&selector).next() {
            let value = apply(element, rule.strategy);
            debug!(field, selector = rule.selector, preview = %preview(&value), "field found");
            return value;
        }
    }
    debug!(field, "no selector matched");
    String::new()
}

fn apply(element: ElementRef<'_>, strategy: Strategy) -> String {
    match strategy {
        Strategy::TrimmedText => element.text().collect::<String>().trim().to_string(),
        Strategy::Text => element.text().collect(),
        Strategy::Paragraphs => paragraphs(element),
        Strategy::Lines(row) => lines(element, row),
    }
}

fn paragraphs(element: ElementRef<'_>) -> String {
    let blocks: Vec<String> = element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| PARAGRAPH_TAGS.contains(&child.value().name()))
        .map(block_text)
        .filter(|text| !text.is_empty())
        .collect();

    if blocks.is_empty() {
        element.inner_html()
    } else {
        blocks.join("\n\n")
    }
}

fn block_text(block: ElementRef<'_>) -> String {
    match block.value().name() {
        "pre" => block.text().collect::<String>().trim_end().to_string(),
        "ul" | "ol" => block
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|li| li.value().name() == "li")
            .map(|li| format!("- {}", normalize_ws(&li.text().collect::<String>())))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => normalize_ws(&block.text().collect::<String>()),
    }
}

fn lines(element: ElementRef<'_>, row: &str) -> String {
    let Ok(row_selector) = Selector::parse(row) else {
        return element.text().collect();
    };
    let rows: Vec<String> = element
        .select(&row_selector)
        .map(|line| line.text().collect::<String>().replace('\u{a0}', " "))
        .collect();
    if rows.is_empty() {
        element.text().collect()
    } else {
        rows.join("\n")
    }
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn preview(value: &str) -> String {
    value.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{}</body></html>", body))
    }

    /// Minimal markup that only the given selector matches.
    fn markup_for(selector: &str, inner: &str) -> String {
        let open = match selector {
            r#"[data-cy="question-title"]"# => r#"<div data-cy="question-title">"#,
            ".mr-2.text-lg" => r#"<div class="mr-2 text-lg">"#,
            "h3.text-lg" => r#"<h3 class="text-lg">"#,
            ".text-title-large" => r#"<div class="text-title-large">"#,
            r#"[data-cy="question-title"] span"# => "<span>",
            r#"[data-cy="question-content"]"# => r#"<div data-cy="question-content">"#,
            ".content__u3I1" => r#"<div class="content__u3I1">"#,
            ".question-content__JfgR" => r#"<div class="question-content__JfgR">"#,
            r#"[data-cy="question-content"] div"# => "<div>",
            r#"[data-track-load="description_content"]"# => {
                r#"<div data-track-load="description_content">"#
            }
            ".monaco-editor" => r#"<div class="monaco-editor">"#,
            ".CodeMirror" => r#"<div class="CodeMirror">"#,
            ".ace_editor" => r#"<div class="ace_editor">"#,
            r#"[data-cy="code-editor"]"# => r#"<div data-cy="code-editor">"#,
            other => panic!("no markup for {}", other),
        };
        let close = match open {
            "<span>" => "</span>",
            o if o.starts_with("<h3") => "</h3>",
            _ => "</div>",
        };
        format!("{}{}{}", open, inner, close)
    }

    #[test]
    fn test_each_title_fallback_is_reachable() {
        // The descendant rule can't match without its ancestor, which the
        // first rule would catch; skip it.
        let rules = TITLE_RULES
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.selector.ends_with(" span"));
        for (n, rule) in rules {
            let title = format!("Title via rule {}", n);
            let doc = page(&markup_for(rule.selector, &format!("  {}  ", title)));
            assert_eq!(extract_title(&doc), title, "rule {}", rule.selector);
        }
    }

    #[test]
    fn test_each_description_fallback_is_reachable() {
        let rules = DESCRIPTION_RULES
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.selector.ends_with(" div"));
        for (n, rule) in rules {
            let text = format!("Description {}", n);
            let doc = page(&markup_for(rule.selector, &format!("<p>{}</p>", text)));
            assert_eq!(extract_context(&doc).description, text, "rule {}", rule.selector);
        }
    }

    #[test]
    fn test_each_code_fallback_is_reachable() {
        for (n, rule) in CODE_RULES.iter().enumerate() {
            let code = format!("return {};", n);
            let doc = page(&markup_for(rule.selector, &code));
            assert_eq!(extract_code(&doc), code, "rule {}", rule.selector);
        }
    }

    #[test]
    fn test_earlier_rule_wins() {
        let doc = page(
            r#"<h3 class="text-lg">Later</h3><div data-cy="question-title">Earlier</div>"#,
        );
        assert_eq!(extract_title(&doc), "Earlier");
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let doc = page("<div>nothing to see</div>");
        assert_eq!(extract_context(&doc), ProblemContext::default());

        let only_title = page(r#"<div class="text-title-large">1. Two Sum</div>"#);
        let ctx = extract_context(&only_title);
        assert_eq!(ctx.title, "1. Two Sum");
        assert_eq!(ctx.description, "");
        assert_eq!(ctx.current_code, "");
    }

    #[test]
    fn test_description_joins_paragraphs() {
        let doc = page(
            r#"<div data-cy="question-content">
                <p>Given an array of integers <code>nums</code>,</p>
                <p>return   indices.</p>
                <ul><li>Only one answer</li><li>No reuse</li></ul>
                <pre>Input: nums = [2,7]
Output: [0,1]</pre>
            </div>"#,
        );
        assert_eq!(
            extract_context(&doc).description,
            "Given an array of integers nums,\n\nreturn indices.\n\n- Only one answer\n- No reuse\n\nInput: nums = [2,7]\nOutput: [0,1]"
        );
    }

    #[test]
    fn test_description_without_paragraphs_uses_inner_html() {
        let doc = page(r#"<div class="content__u3I1">Plain <b>text</b></div>"#);
        assert_eq!(extract_context(&doc).description, "Plain <b>text</b>");
    }

    #[test]
    fn test_monaco_rows_become_lines() {
        let doc = page(
            r#"<div class="monaco-editor"><div class="line-numbers">1 2</div>
               <div class="view-lines"><div class="view-line"><span>class Solution:</span></div>
               <div class="view-line"><span>&nbsp;&nbsp;&nbsp;&nbsp;pass</span></div></div></div>"#,
        );
        assert_eq!(extract_code(&doc), "class Solution:\n    pass");
    }

    #[test]
    fn test_is_problem_page() {
        assert!(is_problem_page("https://leetcode.com/problems/two-sum/description/"));
        assert!(!is_problem_page("https://leetcode.com/problemset/"));
    }
}
