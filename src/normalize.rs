use std::borrow::Cow;

use scraper::{ElementRef, Html, Node};
use tracing::debug;

/// Returned when the document is empty.
pub const NO_CONTENT: &str = "No HTML content provided";

/// Returned when nothing in the document survives pruning and the allow-list.
pub const NO_ELEMENTS: &str = "No interactive elements found";

/// Tags removed together with their whole subtree.
const PRUNED_TAGS: &[&str] = &["script", "style", "svg", "link", "meta", "noscript"];

/// Interactive and structural tags rendered into the view.
const KEPT_TAGS: &[&str] = &[
    "input", "button", "select", "textarea", "form", "a", "label", "div", "span", "p", "h1", "h2",
    "h3", "h4", "h5", "h6", "ul", "ol", "li", "table", "tr", "td", "th", "section", "article",
];

/// Attributes rendered for each element, in output order.
const RENDERED_ATTRS: &[&str] = &[
    "id",
    "name",
    "type",
    "placeholder",
    "value",
    "class",
    "for",
    "href",
    "role",
    "aria-label",
];

const MAX_ATTR_CHARS: usize = 50;
const KEPT_ATTR_CHARS: usize = MAX_ATTR_CHARS - 3;

/// Text at or above this length is dropped rather than truncated.
const MAX_TEXT_CHARS: usize = 100;

/// Render the normalized view of a document: one line per kept element, in document order.
///
/// Example output:
/// ```text
/// <form id="login"></form>
/// <label for="user"> Username</label>
/// <input id="user" name="username" type="text"></input>
/// <button type="submit"> Sign in</button>
/// ```
pub fn normalize(html: &str) -> String {
    if html.is_empty() {
        return NO_CONTENT.to_string();
    }

    let lines = normalized_elements(html);
    if lines.is_empty() {
        NO_ELEMENTS.to_string()
    } else {
        lines.join("\n")
    }
}

/// The individual element summaries that make up the normalized view.
pub fn normalized_elements(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();
    collect(document.root_element(), &mut lines);
    debug!(html_len = html.len(), elements = lines.len(), "normalized document");
    lines
}

fn collect(element: ElementRef, lines: &mut Vec<String>) {
    let tag = element.value().name();
    if is_pruned(tag) {
        return;
    }

    if KEPT_TAGS.contains(&tag) {
        lines.push(render_element(tag, element));
    }

    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            collect(child, lines);
        }
    }
}

fn render_element(tag: &str, element: ElementRef) -> String {
    let el = element.value();
    let mut out = format!("<{tag}");

    for &attr in RENDERED_ATTRS {
        let value = match attr {
            "class" => Cow::Owned(el.classes().collect::<Vec<_>>().join(" ")),
            _ => match el.attr(attr) {
                Some(v) => Cow::Borrowed(v),
                None => continue,
            },
        };
        if value.is_empty() {
            continue;
        }
        out.push_str(&format!(" {attr}=\"{}\"", truncate_attr(&value)));
    }

    out.push('>');

    let text = visible_text(element);
    if !text.is_empty() && text.chars().count() < MAX_TEXT_CHARS {
        out.push(' ');
        out.push_str(&text);
    }

    out.push_str(&format!("</{tag}>"));
    out
}

fn truncate_attr(value: &str) -> Cow<'_, str> {
    if value.chars().count() > MAX_ATTR_CHARS {
        let kept: String = value.chars().take(KEPT_ATTR_CHARS).collect();
        Cow::Owned(format!("{kept}..."))
    } else {
        Cow::Borrowed(value)
    }
}

pub(crate) fn is_pruned(tag: &str) -> bool {
    PRUNED_TAGS.contains(&tag)
}

/// Text of an element and its descendants, skipping pruned subtrees,
/// with runs of whitespace collapsed to a single space and the ends trimmed.
pub(crate) fn visible_text(element: ElementRef) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);
    collapse_whitespace(&raw)
}

fn push_text(element: ElementRef, buf: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(el) if !is_pruned(el.name()) => {
                if let Some(child) = ElementRef::wrap(child) {
                    push_text(child, buf);
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
