//! Element and property validation.
//!
//! Validation only runs in dev mode. Elements are checked during the first
//! creation pass when no directive matched them; property bindings are
//! checked when no directive input took the value.
//! Depending on [`RuntimeConfig`](crate::config::RuntimeConfig), an unknown
//! element or property is either returned as an error or logged at error
//! level, never both.

use std::collections::{HashMap, HashSet};

use crate::error::{ViewError, ViewResult};
use crate::logging::targets;

const HTML_ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "audio", "b", "blockquote", "body", "br", "button",
    "canvas", "caption", "code", "col", "dd", "details", "dialog", "div", "dl", "dt", "em",
    "fieldset", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "i", "iframe", "img", "input", "label", "legend", "li", "main", "nav", "ol", "optgroup",
    "option", "p", "pre", "section", "select", "small", "span", "strong", "sub", "summary", "sup",
    "svg", "table", "tbody", "td", "template", "textarea", "tfoot", "th", "thead", "tr", "u", "ul",
    "video",
];

const GLOBAL_PROPERTIES: &[&str] = &[
    "id", "className", "hidden", "title", "lang", "dir", "tabIndex", "textContent", "innerHTML",
    "style", "draggable", "role",
];

const FORM_PROPERTIES: &[(&str, &[&str])] = &[
    ("input", &["value", "checked", "disabled", "type", "placeholder", "name", "readOnly"]),
    ("button", &["disabled", "type", "name", "value"]),
    ("select", &["value", "disabled", "multiple", "name"]),
    ("option", &["value", "selected", "disabled", "label"]),
    ("textarea", &["value", "disabled", "placeholder", "rows", "cols", "readOnly"]),
    ("a", &["href", "target", "rel"]),
    ("img", &["src", "alt", "width", "height"]),
    ("label", &["htmlFor"]),
];

/// Which elements and properties a template may use.
///
/// The default schema knows every element and property, so nothing is ever
/// reported. [`ElementSchema::html`] knows a common subset of HTML.
#[derive(Debug, Clone, Default)]
pub struct ElementSchema {
    elements: Option<HashSet<String>>,
    properties: Option<HashMap<String, HashSet<String>>>,
    global_properties: HashSet<String>,
    custom_elements: bool,
    no_errors: bool,
}

impl ElementSchema {
    /// A schema that accepts everything.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// A schema of common HTML elements and their properties.
    pub fn html() -> Self {
        let mut schema = Self {
            elements: Some(HTML_ELEMENTS.iter().map(|s| s.to_string()).collect()),
            properties: Some(HashMap::new()),
            global_properties: GLOBAL_PROPERTIES.iter().map(|s| s.to_string()).collect(),
            custom_elements: false,
            no_errors: false,
        };
        for (tag, props) in FORM_PROPERTIES {
            for prop in *props {
                schema = schema.property(*tag, *prop);
            }
        }
        schema
    }

    /// Add a known element.
    pub fn element(mut self, tag: impl Into<String>) -> Self {
        self.elements.get_or_insert_with(HashSet::new).insert(tag.into());
        self
    }

    /// Add a known property of `tag`.
    pub fn property(mut self, tag: impl Into<String>, property: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(HashMap::new)
            .entry(tag.into())
            .or_default()
            .insert(property.into());
        self
    }

    /// Add a property known on every element.
    pub fn global_property(mut self, property: impl Into<String>) -> Self {
        self.properties.get_or_insert_with(HashMap::new);
        self.global_properties.insert(property.into());
        self
    }

    /// Accept any element or property on tags containing a dash.
    pub fn with_custom_elements(mut self) -> Self {
        self.custom_elements = true;
        self
    }

    /// Accept any element and any property.
    pub fn with_no_errors(mut self) -> Self {
        self.no_errors = true;
        self
    }

    fn allows_any(&self, tag: &str) -> bool {
        self.no_errors || (self.custom_elements && tag.contains('-'))
    }

    /// Whether `tag` is a known element.
    pub fn is_element_known(&self, tag: &str) -> bool {
        self.allows_any(tag)
            || self
                .elements
                .as_ref()
                .is_none_or(|elements| elements.contains(tag))
    }

    /// Whether `property` is a known property of `tag`.
    ///
    /// Animation properties, prefixed with `@`, are always accepted.
    pub fn is_property_known(&self, tag: &str, property: &str) -> bool {
        if self.allows_any(tag) || property.starts_with('@') {
            return true;
        }
        let Some(properties) = &self.properties else {
            return true;
        };
        self.global_properties.contains(property)
            || properties.get(tag).is_some_and(|props| props.contains(property))
    }
}

/// Check that an element that matched no directive is known.
pub(crate) fn validate_element(
    schema: &ElementSchema,
    tag: &str,
    template: &str,
    strict: bool,
) -> ViewResult<()> {
    if schema.is_element_known(tag) {
        return Ok(());
    }
    report(ViewError::unknown_element(tag, template), strict)
}

/// Check that a bound property exists. `tag` is `None` for containers.
pub(crate) fn validate_property(
    schema: &ElementSchema,
    tag: Option<&str>,
    property: &str,
    template: &str,
    strict: bool,
) -> ViewResult<()> {
    let tag = tag.unwrap_or(crate::node::NG_TEMPLATE_TAG);
    if schema.is_property_known(tag, property) {
        return Ok(());
    }
    report(ViewError::unknown_property(property, tag, template), strict)
}

fn report(error: ViewError, strict: bool) -> ViewResult<()> {
    if strict {
        return Err(error);
    }
    tracing::error!(target: targets::SCHEMA, "{error}");
    Ok(())
}
