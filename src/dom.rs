//! Rendered element tree and a small selector engine.
//!
//! Selectors are descendant chains of compound selectors. A compound is an
//! optional tag (or `*`) followed by any number of `#id`, `.class` and
//! `:contains(text)` parts, e.g. `.last-searches button` or
//! `p:contains(Something went wrong ...)`.

use crate::error::{HarnessError, HarnessResult};
use crate::page::Action;
use std::collections::BTreeMap;
use std::fmt;

/// A rendered element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
    /// Text directly inside this element
    pub text: String,
    pub visible: bool,
    pub disabled: bool,
    /// What clicking the element does
    pub action: Option<Action>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            visible: true,
            ..Self::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.extend(class.split_whitespace().map(String::from));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn on_click(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Own text followed by the text of all descendants.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        if !self.text.is_empty() {
            parts.push(&self.text);
        }
        for child in &self.children {
            child.collect_text(parts);
        }
    }

    /// All descendants (self included) matching `selector`, in document order.
    pub fn select(&self, selector: &Selector) -> Vec<Found<'_>> {
        let mut found = Vec::new();
        let mut ancestors = Vec::new();
        walk(self, &mut ancestors, true, &mut |element, ancestors, visible| {
            if selector.matches(element, ancestors) {
                found.push(Found { element, visible });
            }
        });
        found
    }

    /// Elements whose own text contains `needle`, in document order.
    pub fn find_by_text(&self, needle: &str) -> Vec<Found<'_>> {
        let mut found = Vec::new();
        let mut ancestors = Vec::new();
        walk(self, &mut ancestors, true, &mut |element, _, visible| {
            if element.text.contains(needle) {
                found.push(Found { element, visible });
            }
        });
        found
    }
}

fn walk<'a, F>(element: &'a Element, ancestors: &mut Vec<&'a Element>, parent_visible: bool, f: &mut F)
where
    F: FnMut(&'a Element, &[&'a Element], bool),
{
    let visible = parent_visible && element.visible;
    f(element, ancestors, visible);
    ancestors.push(element);
    for child in &element.children {
        walk(child, ancestors, visible, f);
    }
    ancestors.pop();
}

/// An element returned by a query.
#[derive(Debug, Clone, Copy)]
pub struct Found<'a> {
    pub element: &'a Element,
    /// Visible itself and through all ancestors
    pub visible: bool,
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    source: String,
    chain: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    contains: Option<String>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.has_class(c)) {
            return false;
        }
        match &self.contains {
            Some(text) => element.text_content().contains(text.as_str()),
            None => true,
        }
    }
}

impl Selector {
    pub fn parse(source: &str) -> HarnessResult<Self> {
        let fail = |reason: &str| HarnessError::InvalidSelector {
            selector: source.to_string(),
            reason: reason.to_string(),
        };

        let chars: Vec<char> = source.trim().chars().collect();
        let mut chain = Vec::new();
        let mut current = Compound::default();
        let mut started = false;
        let mut i = 0;

        let read_ident = |i: &mut usize| -> String {
            let start = *i;
            while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '-' || chars[*i] == '_') {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        };

        while i < chars.len() {
            let ch = chars[i];
            if ch.is_whitespace() {
                if started {
                    chain.push(std::mem::take(&mut current));
                    started = false;
                }
                i += 1;
                continue;
            }
            match ch {
                '#' => {
                    i += 1;
                    let ident = read_ident(&mut i);
                    if ident.is_empty() {
                        return Err(fail("empty id"));
                    }
                    current.id = Some(ident);
                }
                '.' => {
                    i += 1;
                    let ident = read_ident(&mut i);
                    if ident.is_empty() {
                        return Err(fail("empty class"));
                    }
                    current.classes.push(ident);
                }
                ':' => {
                    i += 1;
                    let pseudo = read_ident(&mut i);
                    if pseudo != "contains" {
                        return Err(fail(&format!("unsupported pseudo-class ':{}'", pseudo)));
                    }
                    if chars.get(i) != Some(&'(') {
                        return Err(fail("expected '(' after :contains"));
                    }
                    i += 1;
                    let mut depth = 1;
                    let start = i;
                    while i < chars.len() {
                        match chars[i] {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                    if depth != 0 {
                        return Err(fail("unclosed :contains("));
                    }
                    let raw: String = chars[start..i].iter().collect();
                    i += 1;
                    current.contains = Some(unquote(raw.trim()).to_string());
                }
                '*' if !started => {
                    i += 1;
                }
                c if (c.is_alphanumeric() || c == '-' || c == '_') && !started => {
                    current.tag = Some(read_ident(&mut i).to_lowercase());
                }
                other => return Err(fail(&format!("unexpected '{}'", other))),
            }
            started = true;
        }
        if started {
            chain.push(current);
        }
        if chain.is_empty() {
            return Err(fail("empty selector"));
        }

        Ok(Self {
            source: source.to_string(),
            chain,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `element` matches the last compound and its ancestors cover the rest.
    fn matches(&self, element: &Element, ancestors: &[&Element]) -> bool {
        let Some((last, rest)) = self.chain.split_last() else {
            return false;
        };
        if !last.matches(element) {
            return false;
        }
        let mut remaining = ancestors.len();
        for compound in rest.iter().rev() {
            match ancestors[..remaining].iter().rposition(|a| compound.matches(a)) {
                Some(pos) => remaining = pos,
                None => return false,
            }
        }
        true
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Element {
        Element::new("div")
            .class("container")
            .child(Element::new("input").id("search").attr("value", "React"))
            .child(
                Element::new("div")
                    .class("last-searches")
                    .child(Element::new("button").class("button").text("Cypress"))
                    .child(Element::new("button").class("button").text("Vue")),
            )
            .child(
                Element::new("div").class("item").children([
                    Element::new("span").child(Element::new("a").text("React hooks")),
                    Element::new("span").text("dan"),
                    Element::new("button").class("button button-small").text("Dismiss"),
                ]),
            )
            .child(
                Element::new("div").class("item").children([
                    Element::new("span").child(Element::new("a").text("Redux")),
                    Element::new("button").class("button button-small").text("Dismiss"),
                ]),
            )
            .child(Element::new("p").text("Something went wrong ..."))
            .child(Element::new("footer").text("Icons made by Freepik from www.flaticon.com"))
    }

    fn count(selector: &str) -> usize {
        tree().select(&Selector::parse(selector).unwrap()).len()
    }

    #[test]
    fn test_class_and_id() {
        assert_eq!(count(".item"), 2);
        assert_eq!(count("#search"), 1);
        assert_eq!(count(".button-small"), 2);
        assert_eq!(count("footer"), 1);
    }

    #[test]
    fn test_descendant_chain() {
        assert_eq!(count(".last-searches button"), 2);
        assert_eq!(count(".container .item .button-small"), 2);
        assert_eq!(count(".item .last-searches button"), 0);
    }

    #[test]
    fn test_contains() {
        assert_eq!(count("button:contains(Cypress)"), 1);
        assert_eq!(count("button:contains(React)"), 0);
        assert_eq!(count("p:contains(Something went wrong ...)"), 1);
        assert_eq!(count("p:contains(\"Something went wrong ...\")"), 1);
        assert_eq!(count(".item:contains(Redux)"), 1);
    }

    #[test]
    fn test_document_order_and_text_content() {
        let root = tree();
        let selector = Selector::parse(".item").unwrap();
        let items = root.select(&selector);
        assert_eq!(items[0].element.text_content(), "React hooks dan Dismiss");
        assert_eq!(items[1].element.text_content(), "Redux Dismiss");
    }

    #[test]
    fn test_visibility_inherits() {
        let mut root = tree();
        root.children[1].visible = false;
        let buttons = root.select(&Selector::parse(".last-searches button").unwrap());
        assert!(buttons.iter().all(|b| !b.visible));
        let footer = root.select(&Selector::parse("footer").unwrap());
        assert!(footer[0].visible);
    }

    #[test]
    fn test_find_by_text() {
        let root = tree();
        let found = root.find_by_text("Dismiss");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].element.tag, "button");
        assert!(root.find_by_text("More").is_empty());
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["", "   ", "#", ".", "div:hover", "p:contains(oops", "a > b"] {
            assert!(
                matches!(Selector::parse(bad), Err(HarnessError::InvalidSelector { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_display_keeps_source() {
        let selector = Selector::parse(".last-searches button").unwrap();
        assert_eq!(selector.to_string(), ".last-searches button");
        assert_eq!(selector.as_str(), ".last-searches button");
    }
}
