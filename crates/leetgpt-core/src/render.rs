//! Turning assistant answers into markup that is safe to drop into a page.

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::sync::OnceLock;

use crate::format::RenderFormat;

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "b", "strong", "i", "em", "code", "pre", "ul", "ol", "li", "blockquote", "h3", "h4",
];

// Content of these is never shown, not even as text.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "template", "noscript", "svg",
];

const BLOCK_TAGS: &[&str] = &["p", "pre", "li", "blockquote", "h3", "h4", "div"];

/// Render an assistant answer according to the configured format.
pub fn render_assistant(content: &str, format: RenderFormat) -> String {
    match format {
        RenderFormat::Html => sanitize_html(content),
        RenderFormat::Markdown => markdown_to_html(content),
    }
}

/// Escape text for inclusion in HTML. User messages always go through here.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Keep a small set of formatting tags, strip all attributes, unwrap
/// everything else and drop scripts entirely.
pub fn sanitize_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let mut out = String::new();
    write_children(parsed.root_element(), &mut out);
    out.trim().to_string()
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    write_element(child_element, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if DROPPED_TAGS.contains(&name) {
        return;
    }
    if !ALLOWED_TAGS.contains(&name) {
        write_children(element, out);
        return;
    }
    if name == "br" {
        out.push_str("<br>");
        return;
    }

    out.push('<');
    out.push_str(name);
    out.push('>');
    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*([^*]+?)\*\*").expect("static regex"))
}

fn italic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*([^*\s][^*]*?)\*").expect("static regex"))
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+)`").expect("static regex"))
}

fn emphasis(text: &str) -> String {
    let with_bold = bold_re().replace_all(text, "<b>$1</b>");
    italic_re().replace_all(&with_bold, "<em>$1</em>").into_owned()
}

/// Convert **bold**, *italic* and `code` inside one line. Code spans are
/// left verbatim.
fn inline_markdown(line: &str) -> String {
    let escaped = escape_text(line);
    let mut out = String::with_capacity(escaped.len());
    let mut last = 0;
    for caps in code_re().captures_iter(&escaped) {
        let (Some(span), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&emphasis(&escaped[last..span.start()]));
        out.push_str("<code>");
        out.push_str(body.as_str());
        out.push_str("</code>");
        last = span.end();
    }
    out.push_str(&emphasis(&escaped[last..]));
    out
}

fn list_item(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
}

/// Lightweight markdown: fenced code, paragraphs, bullet lists and inline
/// emphasis. Anything fancier comes through as escaped text.
pub fn markdown_to_html(text: &str) -> String {
    let mut html = String::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            match code.take() {
                Some(block) => {
                    html.push_str("<pre><code>");
                    html.push_str(&escape_text(&block.join("\n")));
                    html.push_str("</code></pre>");
                }
                None => {
                    flush_paragraph(&mut paragraph, &mut html);
                    code = Some(Vec::new());
                }
            }
            continue;
        }

        if let Some(block) = code.as_mut() {
            block.push(line);
        } else if line.trim().is_empty() {
            flush_paragraph(&mut paragraph, &mut html);
        } else {
            paragraph.push(line);
        }
    }

    // An unterminated fence still renders as code
    if let Some(block) = code {
        html.push_str("<pre><code>");
        html.push_str(&escape_text(&block.join("\n")));
        html.push_str("</code></pre>");
    }
    flush_paragraph(&mut paragraph, &mut html);
    html
}

fn flush_paragraph(lines: &mut Vec<&str>, html: &mut String) {
    if lines.is_empty() {
        return;
    }

    if lines.iter().all(|l| list_item(l).is_some()) {
        html.push_str("<ul>");
        for &line in lines.iter() {
            html.push_str("<li>");
            html.push_str(&inline_markdown(list_item(line).unwrap_or(line)));
            html.push_str("</li>");
        }
        html.push_str("</ul>");
    } else {
        let rendered: Vec<String> = lines.iter().map(|&l| inline_markdown(l.trim())).collect();
        html.push_str("<p>");
        html.push_str(&rendered.join("<br>"));
        html.push_str("</p>");
    }
    lines.clear();
}

/// Strip markup for terminal output, keeping block structure as newlines.
pub fn to_plain_text(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    let mut out = String::new();
    write_plain(parsed.root_element(), &mut out);

    let mut collapsed = String::new();
    let mut blank_run = 0;
    for line in out.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        collapsed.push_str(line);
        collapsed.push('\n');
    }
    collapsed.trim().to_string()
}

fn write_plain(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if DROPPED_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    if name == "li" {
                        out.push_str("- ");
                    }
                    write_plain(child_element, out);
                    if BLOCK_TAGS.contains(&name) {
                        out.push_str("\n\n");
                    }
                }
            }
            _ => {}
        }
    }
}
