//! Encoded selector types.

use std::fmt;

use crate::node::{AttrToken, AttributeMarker, NodeAttrs};

bitflags::bitflags! {
    /// Mode flags embedded in a selector token list.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SelectorFlags: u8 {
        /// The following tokens are inside a `:not(...)` group.
        const NOT       = 0b0001;
        /// The following tokens are `name, value` attribute pairs.
        const ATTRIBUTE = 0b0010;
        /// The following token is a tag name.
        const ELEMENT   = 0b0100;
        /// The following tokens are class names.
        const CLASS     = 0b1000;
    }
}

impl SelectorFlags {
    /// Not inside a negation group.
    pub fn is_positive(self) -> bool {
        !self.contains(Self::NOT)
    }
}

/// One token of an encoded selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorToken {
    /// Switches the matching mode.
    Flags(SelectorFlags),
    /// A tag, attribute name, attribute value or class name.
    Name(String),
}

/// A compound selector encoded as a flat token list.
///
/// The first token is always the tag name, empty when the selector has no
/// tag. Attribute `name, value` pairs follow directly; other sections start
/// with a [`SelectorToken::Flags`] token:
///
/// ```ignore
/// // button[type=submit].primary:not(.disabled)
/// let selector = CssSelector::element("button")
///     .attr("type", "submit")
///     .class("primary")
///     .not_class("disabled");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CssSelector {
    tokens: Vec<SelectorToken>,
}

impl CssSelector {
    /// Create a selector from raw tokens.
    pub fn from_tokens(tokens: Vec<SelectorToken>) -> Self {
        Self { tokens }
    }

    /// Selector matching a tag name.
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tokens: vec![SelectorToken::Name(tag.into())],
        }
    }

    /// Selector without a tag constraint.
    pub fn any() -> Self {
        Self::element("")
    }

    /// The encoded tokens.
    pub fn tokens(&self) -> &[SelectorToken] {
        &self.tokens
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the selector has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn current_mode(&self) -> SelectorFlags {
        self.tokens
            .iter()
            .rev()
            .find_map(|t| match t {
                SelectorToken::Flags(f) => Some(*f),
                SelectorToken::Name(_) => None,
            })
            .unwrap_or(SelectorFlags::ATTRIBUTE)
    }

    fn switch_to(&mut self, mode: SelectorFlags) {
        if self.current_mode() != mode {
            self.tokens.push(SelectorToken::Flags(mode));
        }
    }

    fn push_names(&mut self, names: &[&str]) {
        self.tokens
            .extend(names.iter().map(|n| SelectorToken::Name((*n).to_string())));
    }

    /// Require an attribute. An empty value matches any value.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.switch_to(SelectorFlags::ATTRIBUTE);
        self.push_names(&[name, value]);
        self
    }

    /// Require a class.
    pub fn class(mut self, class: &str) -> Self {
        self.switch_to(SelectorFlags::CLASS);
        self.push_names(&[class]);
        self
    }

    /// Reject nodes with the given tag.
    pub fn not_element(mut self, tag: &str) -> Self {
        self.tokens
            .push(SelectorToken::Flags(SelectorFlags::NOT | SelectorFlags::ELEMENT));
        self.push_names(&[tag]);
        self
    }

    /// Reject nodes carrying the attribute (with the value, when non-empty).
    pub fn not_attr(mut self, name: &str, value: &str) -> Self {
        self.tokens
            .push(SelectorToken::Flags(SelectorFlags::NOT | SelectorFlags::ATTRIBUTE));
        self.push_names(&[name, value]);
        self
    }

    /// Reject nodes carrying the class.
    pub fn not_class(mut self, class: &str) -> Self {
        self.tokens
            .push(SelectorToken::Flags(SelectorFlags::NOT | SelectorFlags::CLASS));
        self.push_names(&[class]);
        self
    }

    /// Positive attribute and class literals of the selector, as a static
    /// attribute list suitable for creating a host element.
    ///
    /// Literals inside negation groups are ignored.
    pub fn extract_attrs_and_classes(&self) -> NodeAttrs {
        let mut tokens = Vec::new();
        let mut classes = Vec::new();
        let mut mode = SelectorFlags::ATTRIBUTE;
        let mut i = 1;
        while i < self.tokens.len() {
            match &self.tokens[i] {
                SelectorToken::Name(name) => {
                    if mode == SelectorFlags::ATTRIBUTE {
                        i += 1;
                        if !name.is_empty() {
                            let value = match self.tokens.get(i) {
                                Some(SelectorToken::Name(v)) => v.clone(),
                                _ => String::new(),
                            };
                            tokens.push(AttrToken::Str(name.clone()));
                            tokens.push(AttrToken::Str(value));
                        }
                    } else if mode == SelectorFlags::CLASS {
                        classes.push(AttrToken::Str(name.clone()));
                    }
                }
                SelectorToken::Flags(flags) => {
                    if !mode.is_positive() {
                        break;
                    }
                    mode = *flags;
                }
            }
            i += 1;
        }
        if !classes.is_empty() {
            tokens.push(AttrToken::Marker(AttributeMarker::Classes));
            tokens.extend(classes);
        }
        NodeAttrs::from_tokens(tokens)
    }
}

fn wrap_in_not(negative: bool, chunk: &str) -> String {
    if negative {
        format!(":not({})", chunk.trim())
    } else {
        chunk.to_string()
    }
}

impl fmt::Display for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(SelectorToken::Name(tag)) = self.tokens.first() else {
            return Ok(());
        };
        let mut result = tag.clone();
        let mut mode = SelectorFlags::ATTRIBUTE;
        let mut chunk = String::new();
        let mut negative = false;
        let mut i = 1;
        while i < self.tokens.len() {
            match &self.tokens[i] {
                SelectorToken::Name(name) => {
                    if mode.contains(SelectorFlags::ATTRIBUTE) {
                        i += 1;
                        let value = match self.tokens.get(i) {
                            Some(SelectorToken::Name(v)) => v.as_str(),
                            _ => "",
                        };
                        chunk.push('[');
                        chunk.push_str(name);
                        if !value.is_empty() {
                            chunk.push_str("=\"");
                            chunk.push_str(value);
                            chunk.push('"');
                        }
                        chunk.push(']');
                    } else if mode.contains(SelectorFlags::CLASS) {
                        chunk.push('.');
                        chunk.push_str(name);
                    } else if mode.contains(SelectorFlags::ELEMENT) {
                        chunk.push(' ');
                        chunk.push_str(name);
                    }
                }
                SelectorToken::Flags(flags) => {
                    if !chunk.is_empty() && !flags.is_positive() {
                        result.push_str(&wrap_in_not(negative, &chunk));
                        chunk.clear();
                    }
                    mode = *flags;
                    negative = negative || !mode.is_positive();
                }
            }
            i += 1;
        }
        if !chunk.is_empty() {
            result.push_str(&wrap_in_not(negative, &chunk));
        }
        f.write_str(&result)
    }
}

/// Alternative selectors; a node matches the list if it matches any entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SelectorList {
    selectors: Vec<CssSelector>,
}

impl SelectorList {
    /// Create a list.
    pub fn new(selectors: Vec<CssSelector>) -> Self {
        Self { selectors }
    }

    /// List with a single selector.
    pub fn single(selector: CssSelector) -> Self {
        Self::new(vec![selector])
    }

    /// The selectors.
    pub fn selectors(&self) -> &[CssSelector] {
        &self.selectors
    }

    /// Whether the list contains an identical selector.
    pub fn contains(&self, selector: &CssSelector) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.selectors.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{selector}")?;
        }
        Ok(())
    }
}

impl From<CssSelector> for SelectorList {
    fn from(selector: CssSelector) -> Self {
        Self::single(selector)
    }
}
