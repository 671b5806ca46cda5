use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

/// The single strategy chosen to re-find an element in a live browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", content = "value")]
pub enum Locator {
    Identifier(String),
    Name(String),
    /// XPath expression matching an `input` by its placeholder.
    XPathByPlaceholder(String),
    /// XPath expression matching a `button` by its normalized text.
    XPathByNormalizedText(String),
    LinkText(String),
    /// No stable attribute or text was found; the element needs manual inspection.
    Unavailable,
}

impl Locator {
    pub fn is_available(&self) -> bool {
        !matches!(self, Locator::Unavailable)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(v) => write!(f, "Identifier('{}')", escape(v, '\'')),
            Self::Name(v) => write!(f, "Name('{}')", escape(v, '\'')),
            Self::XPathByPlaceholder(xpath) => {
                write!(f, "XPathByPlaceholder(\"{}\")", escape(xpath, '"'))
            }
            Self::XPathByNormalizedText(xpath) => {
                write!(f, "XPathByNormalizedText(\"{}\")", escape(xpath, '"'))
            }
            Self::LinkText(v) => write!(f, "LinkText('{}')", escape(v, '\'')),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectorRole {
    Input,
    Button,
    /// An anchor styled as a button (carries the `btn` class token).
    LinkButton,
}

impl SelectorRole {
    /// Label used when an element offers nothing better to call it by.
    /// Link-buttons have none: without text they are left out of the map.
    pub fn unlabeled(&self) -> Option<&'static str> {
        match self {
            Self::Input => Some("Unlabeled Input"),
            Self::Button => Some("Unlabeled Button"),
            Self::LinkButton => None,
        }
    }
}

impl fmt::Display for SelectorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "INPUT"),
            Self::Button => write!(f, "BUTTON"),
            Self::LinkButton => write!(f, "LINK/BUTTON"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorEntry {
    pub role: SelectorRole,
    pub label: String,
    pub locator: Locator,
}

impl fmt::Display for SelectorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: '{}' -> {}",
            self.role,
            escape(&self.label, '\''),
            self.locator
        )
    }
}

/// Backslash-escape `quote` and backslashes so a value can sit inside `quote`s.
fn escape(value: &str, quote: char) -> Cow<'_, str> {
    if !value.contains([quote, '\\']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if c == quote || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Ordered address table for one document: inputs, then buttons, then link-buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectorMap {
    pub entries: Vec<SelectorEntry>,
}

impl SelectorMap {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn by_role(&self, role: SelectorRole) -> impl Iterator<Item = &SelectorEntry> {
        self.entries.iter().filter(move |e| e.role == role)
    }

    /// Render the model-facing whitelist, one `ROLE: 'label' -> locator` line per entry.
    /// An empty map renders as an empty string.
    pub fn to_prompt_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
