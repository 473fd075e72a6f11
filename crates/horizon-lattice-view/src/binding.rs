//! Values stored in binding slots and pushed to the renderer.

use std::fmt;
use std::sync::Arc;

/// A bound value.
///
/// Bindings are compared on every refresh to decide whether the renderer must
/// be updated, so the type is cheap to clone and compare.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BindingValue {
    /// No value. Fresh binding slots start out as `Unset` so the first
    /// comparison always reports a change.
    #[default]
    Unset,
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(Arc<str>),
}

impl BindingValue {
    /// Returns true for the fresh-slot marker.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Text used when the value is rendered into a text node or attribute.
    pub fn render_text(&self) -> String {
        match self {
            Self::Unset | Self::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "<unset>"),
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for BindingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for BindingValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for BindingValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for BindingValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for BindingValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for BindingValue {
    fn from(v: &str) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<String> for BindingValue {
    fn from(v: String) -> Self {
        Self::Str(Arc::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text() {
        assert_eq!(BindingValue::Unset.render_text(), "");
        assert_eq!(BindingValue::Null.render_text(), "");
        assert_eq!(BindingValue::from(3).render_text(), "3");
        assert_eq!(BindingValue::from("hi").render_text(), "hi");
    }

    #[test]
    fn test_unset_differs_from_everything() {
        assert_ne!(BindingValue::Unset, BindingValue::Null);
        assert_ne!(BindingValue::Unset, BindingValue::from(""));
        assert!(BindingValue::default().is_unset());
    }
}
