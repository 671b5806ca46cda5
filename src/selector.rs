use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::dom::{Locator, SelectorEntry, SelectorMap, SelectorRole};
use crate::normalize::visible_text;

/// Role groups in output order.
const ROLE_ORDER: [SelectorRole; 3] = [
    SelectorRole::Input,
    SelectorRole::Button,
    SelectorRole::LinkButton,
];

/// Class token marking an anchor as a button-styled link.
const BUTTON_CLASS_TOKEN: &str = "btn";

/// Pick the most robust locator for a single element.
///
/// Stable attributes win over visible copy: `id`, then `name`, then the input's
/// placeholder, then button text, then link text. Elements offering none of these
/// resolve to [`Locator::Unavailable`].
pub fn resolve(element: ElementRef) -> Locator {
    let el = element.value();

    if let Some(id) = non_empty_attr(element, "id") {
        return Locator::Identifier(id.to_string());
    }
    if let Some(name) = non_empty_attr(element, "name") {
        return Locator::Name(name.to_string());
    }

    match el.name() {
        "input" => {
            if let Some(placeholder) = non_empty_attr(element, "placeholder") {
                return Locator::XPathByPlaceholder(format!(
                    "//input[@placeholder={}]",
                    xpath_literal(placeholder)
                ));
            }
        }
        "button" => {
            if !visible_text(element).is_empty() {
                let text = normalize_space(&element.text().collect::<String>());
                return Locator::XPathByNormalizedText(format!(
                    "//button[normalize-space()={}]",
                    xpath_literal(&text)
                ));
            }
        }
        "a" => {
            let text = visible_text(element);
            if !text.is_empty() {
                return Locator::LinkText(text);
            }
        }
        _ => {}
    }

    Locator::Unavailable
}

/// Build the labeled address table for a document.
pub fn build_selector_map(html: &str) -> SelectorMap {
    let document = Html::parse_document(html);
    let mut map = SelectorMap::default();

    for role in ROLE_ORDER {
        collect_role(&document, role, &mut map.entries);
    }

    debug!(
        inputs = map.by_role(SelectorRole::Input).count(),
        buttons = map.by_role(SelectorRole::Button).count(),
        link_buttons = map.by_role(SelectorRole::LinkButton).count(),
        unavailable = map.entries.iter().filter(|e| !e.locator.is_available()).count(),
        "selector map built"
    );
    map
}

/// The model-facing whitelist text for a document. Empty when nothing is addressable.
pub fn selector_map_text(html: &str) -> String {
    build_selector_map(html).to_prompt_text()
}

fn collect_role(document: &Html, role: SelectorRole, entries: &mut Vec<SelectorEntry>) {
    let selector = Selector::parse(candidate_selector(role)).expect("valid selector");

    for element in document.select(&selector) {
        if !is_eligible(role, element) {
            continue;
        }
        let Some(label) = label_for(role, element) else {
            continue;
        };
        entries.push(SelectorEntry {
            role,
            label,
            locator: resolve(element),
        });
    }
}

fn candidate_selector(role: SelectorRole) -> &'static str {
    match role {
        SelectorRole::Input => "input, select, textarea",
        SelectorRole::Button => "button",
        SelectorRole::LinkButton => "a[class]",
    }
}

fn is_eligible(role: SelectorRole, element: ElementRef) -> bool {
    let el = element.value();
    match role {
        SelectorRole::Input => {
            !(el.name() == "input"
                && el
                    .attr("type")
                    .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden")))
        }
        SelectorRole::Button => true,
        SelectorRole::LinkButton => el.classes().any(|c| c == BUTTON_CLASS_TOKEN),
    }
}

/// `None` means the element cannot be grounded and is left out of the map.
fn label_for(role: SelectorRole, element: ElementRef) -> Option<String> {
    let label = match role {
        SelectorRole::Input => non_empty_attr(element, "id")
            .or_else(|| non_empty_attr(element, "name"))
            .or_else(|| non_empty_attr(element, "placeholder"))
            .map(String::from),
        SelectorRole::Button => {
            let text = visible_text(element);
            if text.is_empty() {
                non_empty_attr(element, "id").map(String::from)
            } else {
                Some(text)
            }
        }
        SelectorRole::LinkButton => {
            let text = visible_text(element);
            (!text.is_empty()).then_some(text)
        }
    };

    label.or_else(|| role.unlabeled().map(String::from))
}

fn non_empty_attr<'a>(element: ElementRef<'a>, attr: &str) -> Option<&'a str> {
    element.value().attr(attr).filter(|v| !v.is_empty())
}

/// XPath 1.0 `normalize-space()`: only space, tab, CR and LF count as whitespace.
fn normalize_space(text: &str) -> String {
    text.split([' ', '\t', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a value as an XPath 1.0 string literal.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        let selector = Selector::parse(css).unwrap();
        doc.select(&selector).next().unwrap()
    }

    fn resolve_in(html: &str, css: &str) -> Locator {
        let doc = Html::parse_document(html);
        resolve(first_element(&doc, css))
    }

    fn lines(html: &str) -> Vec<String> {
        build_selector_map(html)
            .entries
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    // ── Resolver priority ──

    #[test]
    fn id_wins_over_everything() {
        let loc = resolve_in(
            r#"<button id="go" name="submit" placeholder="p">Go now</button>"#,
            "button",
        );
        assert_eq!(loc, Locator::Identifier("go".into()));
    }

    #[test]
    fn name_used_without_id() {
        let loc = resolve_in(r#"<input name="q" placeholder="Search">"#, "input");
        assert_eq!(loc, Locator::Name("q".into()));
    }

    #[test]
    fn whitespace_id_still_counts_as_identifier() {
        let loc = resolve_in(r#"<input id=" " name="q">"#, "input");
        assert_eq!(loc, Locator::Identifier(" ".into()));
    }

    #[test]
    fn empty_id_falls_through_to_name() {
        let loc = resolve_in(r#"<input id="" name="q">"#, "input");
        assert_eq!(loc, Locator::Name("q".into()));
    }

    #[test]
    fn placeholder_only_for_inputs() {
        let loc = resolve_in(r#"<input placeholder="Enter name">"#, "input");
        assert_eq!(
            loc,
            Locator::XPathByPlaceholder("//input[@placeholder='Enter name']".into())
        );

        let loc = resolve_in(r#"<textarea placeholder="Notes"></textarea>"#, "textarea");
        assert_eq!(loc, Locator::Unavailable);
    }

    #[test]
    fn button_text_is_normalized() {
        let loc = resolve_in("<button>\n  Add   to <i>Cart</i> </button>", "button");
        assert_eq!(
            loc,
            Locator::XPathByNormalizedText("//button[normalize-space()='Add to Cart']".into())
        );
    }

    #[test]
    fn button_xpath_keeps_non_breaking_spaces() {
        let loc = resolve_in("<button>Add&nbsp;to  Cart</button>", "button");
        assert_eq!(
            loc,
            Locator::XPathByNormalizedText("//button[normalize-space()='Add\u{a0}to Cart']".into())
        );
        // Labels collapse every Unicode space.
        assert_eq!(
            lines("<button>Add&nbsp;to Cart</button>")[0],
            "BUTTON: 'Add to Cart' -> XPathByNormalizedText(\"//button[normalize-space()='Add\u{a0}to Cart']\")"
        );
    }

    #[test]
    fn nbsp_only_button_has_no_text_locator() {
        assert_eq!(resolve_in("<button>&nbsp;</button>", "button"), Locator::Unavailable);
    }

    #[test]
    fn normalize_space_matches_xpath_whitespace() {
        assert_eq!(normalize_space(" a\t\n b\r\n"), "a b");
        assert_eq!(normalize_space("a\u{a0} b"), "a\u{a0} b");
    }

    #[test]
    fn anchor_text_becomes_link_text() {
        let loc = resolve_in(r#"<a href="/help">Help center</a>"#, "a");
        assert_eq!(loc, Locator::LinkText("Help center".into()));
    }

    #[test]
    fn nothing_usable_is_unavailable() {
        assert_eq!(resolve_in("<button></button>", "button"), Locator::Unavailable);
        assert_eq!(resolve_in("<select></select>", "select"), Locator::Unavailable);
        assert!(!Locator::Unavailable.is_available());
    }

    // ── XPath quoting ──

    #[test]
    fn xpath_literal_switches_quotes() {
        assert_eq!(xpath_literal("Cart"), "'Cart'");
        assert_eq!(xpath_literal("Don't"), "\"Don't\"");
        assert_eq!(
            xpath_literal(r#"Say "hi" don't"#),
            r#"concat('Say "hi" don', "'", 't')"#
        );
    }

    // ── Map builder scenarios ──

    #[test]
    fn input_with_id_name_and_placeholder() {
        assert_eq!(
            lines(r#"<input id="user" name="username" placeholder="Enter name">"#),
            vec!["INPUT: 'user' -> Identifier('user')"]
        );
    }

    #[test]
    fn hidden_input_is_never_mapped() {
        let map = build_selector_map(r#"<input type="hidden" id="csrf" value="abc">"#);
        assert_eq!(map.by_role(SelectorRole::Input).count(), 0);

        let map = build_selector_map(r#"<input type="HIDDEN" name="token">"#);
        assert!(map.is_empty());
    }

    #[test]
    fn button_without_attributes_uses_text_xpath() {
        assert_eq!(
            lines("<button>Add to Cart</button>"),
            vec![r#"BUTTON: 'Add to Cart' -> XPathByNormalizedText("//button[normalize-space()='Add to Cart']")"#]
        );
    }

    #[test]
    fn btn_styled_link_is_mapped() {
        assert_eq!(
            lines(r#"<a class="btn btn-primary" href="/checkout">Checkout</a>"#),
            vec!["LINK/BUTTON: 'Checkout' -> LinkText('Checkout')"]
        );
    }

    #[test]
    fn link_without_btn_token_is_ignored() {
        assert!(build_selector_map(r#"<a class="nav-link">Home</a>"#).is_empty());
        assert!(build_selector_map(r#"<a class="btn-primary">Pay</a>"#).is_empty());
        assert!(build_selector_map(r#"<a href="/x">Plain</a>"#).is_empty());
    }

    #[test]
    fn btn_link_without_text_is_skipped() {
        assert!(build_selector_map(r#"<a class="btn" id="icon-only" href="/x"></a>"#).is_empty());
    }

    #[test]
    fn empty_document_yields_empty_artifact() {
        assert_eq!(selector_map_text(""), "");
    }

    // ── Labels ──

    #[test]
    fn input_labels_fall_back_in_order() {
        assert_eq!(
            lines(r#"<input name="email"><input placeholder="Zip code"><textarea></textarea>"#),
            vec![
                "INPUT: 'email' -> Name('email')",
                r#"INPUT: 'Zip code' -> XPathByPlaceholder("//input[@placeholder='Zip code']")"#,
                "INPUT: 'Unlabeled Input' -> Unavailable",
            ]
        );
    }

    #[test]
    fn button_label_prefers_text_over_id() {
        assert_eq!(
            lines(r#"<button id="save-btn">Save</button><button id="icon"></button><button></button>"#),
            vec![
                "BUTTON: 'Save' -> Identifier('save-btn')",
                "BUTTON: 'icon' -> Identifier('icon')",
                "BUTTON: 'Unlabeled Button' -> Unavailable",
            ]
        );
    }

    // ── Ordering ──

    #[test]
    fn roles_grouped_in_fixed_order() {
        let html = r#"
            <a class="btn" href="/a">First link</a>
            <button name="b1">B1</button>
            <input id="i1">
            <select name="s1"></select>
            <button>B2</button>
            <textarea id="t1"></textarea>
        "#;
        let map = build_selector_map(html);
        let labels: Vec<_> = map.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["i1", "s1", "t1", "B1", "B2", "First link"]);
        let roles: Vec<_> = map.entries.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![
                SelectorRole::Input,
                SelectorRole::Input,
                SelectorRole::Input,
                SelectorRole::Button,
                SelectorRole::Button,
                SelectorRole::LinkButton,
            ]
        );
    }

    #[test]
    fn map_builder_is_idempotent() {
        let html = r#"<form><input name="a"><button>Go</button><a class="btn">More</a></form>"#;
        assert_eq!(selector_map_text(html), selector_map_text(html));
    }
}
