//! Selector matching algorithm.
//!
//! Matching walks the encoded token list once with a mode register. Mode
//! tokens switch between tag, attribute and class matching; the `NOT` bit is
//! sticky, so every token after the first negation belongs to a negative
//! group. A failing positive token rejects the node immediately. A failing
//! negative token only skips ahead to the next mode token: the node is
//! rejected later if another negative group fails while not skipping.

use super::{CssSelector, SelectorFlags, SelectorList, SelectorToken};
use crate::node::{AttrToken, AttributeMarker, NodeAttrs, NodeKind, TemplateNode, NG_TEMPLATE_TAG};

/// Selector matching engine.
pub struct SelectorMatcher;

impl SelectorMatcher {
    /// Whether `node` satisfies `selector`.
    ///
    /// In projection mode the container's captured tag and the plain `class`
    /// attribute are consulted; in directive-matching mode containers compare
    /// as the placeholder template tag.
    pub fn matches(node: &TemplateNode, selector: &CssSelector, projection_mode: bool) -> bool {
        let tokens = selector.tokens();
        let attrs = node.attrs.as_ref();
        let name_only_marker = attrs.map_or(0, NodeAttrs::name_only_marker_index);
        let mut mode = SelectorFlags::ELEMENT;
        let mut skip_to_next_selector = false;

        let mut i = 0;
        while i < tokens.len() {
            let current = match &tokens[i] {
                SelectorToken::Flags(flags) => {
                    if !skip_to_next_selector && !mode.is_positive() && !flags.is_positive() {
                        return false;
                    }
                    i += 1;
                    // Still skipping a failed negative group.
                    if skip_to_next_selector && flags.is_positive() {
                        continue;
                    }
                    skip_to_next_selector = false;
                    mode = *flags | (mode & SelectorFlags::NOT);
                    continue;
                }
                SelectorToken::Name(name) => name.as_str(),
            };

            if skip_to_next_selector {
                i += 1;
                continue;
            }

            if mode.contains(SelectorFlags::ELEMENT) {
                mode = SelectorFlags::ATTRIBUTE | (mode & SelectorFlags::NOT);
                let tag_fails = if current.is_empty() {
                    tokens.len() == 1
                } else {
                    !Self::has_tag_and_type_match(node, current, projection_mode)
                };
                if tag_fails {
                    if mode.is_positive() {
                        return false;
                    }
                    skip_to_next_selector = true;
                }
            } else if mode.contains(SelectorFlags::CLASS) {
                if !Self::is_css_class_matching(node, current, projection_mode) {
                    if mode.is_positive() {
                        return false;
                    }
                    skip_to_next_selector = true;
                }
            } else {
                i += 1;
                let expected = match tokens.get(i) {
                    Some(SelectorToken::Name(value)) => value.as_str(),
                    _ => "",
                };
                let found = attrs.and_then(|attrs| {
                    Self::find_attr_index(current, attrs, node.is_inline_template(), projection_mode)
                });
                let Some(index) = found else {
                    if mode.is_positive() {
                        return false;
                    }
                    skip_to_next_selector = true;
                    i += 1;
                    continue;
                };
                if !expected.is_empty() {
                    let actual = if index > name_only_marker {
                        String::new()
                    } else {
                        attrs
                            .and_then(|a| a.get(index + 1))
                            .and_then(AttrToken::as_str)
                            .map(str::to_lowercase)
                            .unwrap_or_default()
                    };
                    if expected.to_lowercase() != actual {
                        if mode.is_positive() {
                            return false;
                        }
                        skip_to_next_selector = true;
                    }
                }
            }
            i += 1;
        }

        mode.is_positive() || skip_to_next_selector
    }

    /// Whether `node` satisfies any selector of the list.
    pub fn matches_any(node: &TemplateNode, list: &SelectorList, projection_mode: bool) -> bool {
        list.selectors()
            .iter()
            .any(|selector| Self::matches(node, selector, projection_mode))
    }

    /// The selector a node asks to be projected as, if any.
    pub fn project_as_selector(node: &TemplateNode) -> Option<&CssSelector> {
        let attrs = node.attrs.as_ref()?;
        let index = attrs.marker_index(AttributeMarker::ProjectAs, 0)?;
        if index % 2 != 0 {
            return None;
        }
        match attrs.get(index + 1)? {
            AttrToken::Selector(selector) => Some(selector),
            _ => None,
        }
    }

    fn has_tag_and_type_match(node: &TemplateNode, tag: &str, projection_mode: bool) -> bool {
        if node.kind == NodeKind::Container && !projection_mode {
            tag == NG_TEMPLATE_TAG
        } else {
            node.value.as_deref() == Some(tag)
        }
    }

    fn is_css_class_matching(node: &TemplateNode, class: &str, projection_mode: bool) -> bool {
        let Some(attrs) = node.attrs.as_ref() else {
            return false;
        };
        let tokens = attrs.tokens();
        let mut i = 0;
        if projection_mode {
            while i + 1 < tokens.len() {
                let (AttrToken::Str(name), AttrToken::Str(value)) = (&tokens[i], &tokens[i + 1]) else {
                    break;
                };
                if name == "class" && class_index_of(&value.to_lowercase(), class, 0).is_some() {
                    return true;
                }
                i += 2;
            }
        }

        let Some(start) = attrs.marker_index(AttributeMarker::Classes, i) else {
            return false;
        };
        tokens[start + 1..]
            .iter()
            .map_while(AttrToken::as_str)
            .any(|item| item.to_lowercase() == class)
    }

    /// Position of the attribute `name` in `attrs`.
    ///
    /// Outside projection, inline templates only expose their template
    /// attribute section.
    pub fn find_attr_index(
        name: &str,
        attrs: &NodeAttrs,
        inline_template: bool,
        projection_mode: bool,
    ) -> Option<usize> {
        let tokens = attrs.tokens();
        if !projection_mode && inline_template {
            return Self::match_template_attribute(attrs, name);
        }

        let mut bindings_mode = false;
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                AttrToken::Str(candidate) if candidate == name => return Some(i),
                AttrToken::Marker(AttributeMarker::Bindings | AttributeMarker::I18n) => {
                    bindings_mode = true;
                }
                AttrToken::Marker(AttributeMarker::Classes | AttributeMarker::Styles) => {
                    i += 1;
                    while tokens.get(i).and_then(AttrToken::as_str).is_some() {
                        i += 1;
                    }
                    continue;
                }
                AttrToken::Marker(AttributeMarker::Template) => break,
                AttrToken::Marker(AttributeMarker::NamespaceUri) => {
                    i += 4;
                    continue;
                }
                _ => {}
            }
            i += if bindings_mode { 1 } else { 2 };
        }
        None
    }

    fn match_template_attribute(attrs: &NodeAttrs, name: &str) -> Option<usize> {
        let start = attrs.marker_index(AttributeMarker::Template, 0)?;
        for (i, token) in attrs.tokens().iter().enumerate().skip(start + 1) {
            match token {
                AttrToken::Str(attr) if attr == name => return Some(i),
                AttrToken::Str(_) => {}
                _ => return None,
            }
        }
        None
    }
}

/// Find `class` as a whole whitespace-delimited token of `class_attr`,
/// starting the search at byte offset `start`.
pub fn class_index_of(class_attr: &str, class: &str, start: usize) -> Option<usize> {
    if class.is_empty() {
        return None;
    }
    let bytes = class_attr.as_bytes();
    let mut from = start;
    while from <= class_attr.len() {
        let found = class_attr.get(from..)?.find(class)? + from;
        let end = found + class.len();
        let boundary_before = found == 0 || bytes[found - 1].is_ascii_whitespace();
        let boundary_after = end == bytes.len() || bytes[end].is_ascii_whitespace();
        if boundary_before && boundary_after {
            return Some(found);
        }
        from = end;
    }
    None
}
