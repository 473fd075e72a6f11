//! Error types for the view runtime.
//!
//! Programmer errors (unbalanced frames, a selected index moving backward,
//! re-running a completed init phase) are debug assertions and never show up
//! here. [`ViewError`] covers the failures a caller can observe and react to.

use crate::directive::LifecycleHook;
use crate::view::ViewId;

/// Result type alias for view runtime operations.
pub type ViewResult<T> = std::result::Result<T, ViewError>;

/// Error produced by a lifecycle hook, template function or query callback.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while creating, refreshing or inspecting views.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// The view id is stale or was never issued by this runtime.
    #[error("view {0:?} does not exist or has been destroyed")]
    InvalidView(ViewId),

    /// An instruction ran outside of any view traversal.
    #[error("no view is currently being processed")]
    NoActiveView,

    /// No node was declared at the given slot.
    #[error("no node at index {index} in template '{template}'")]
    NodeNotFound { index: usize, template: String },

    /// The slot does not hold a view container.
    #[error("slot {index} in template '{template}' is not a view container")]
    ContainerExpected { index: usize, template: String },

    /// An element tag is not known to the template's schema.
    #[error("'{tag}' is not a known element (used in the '{template}' template)")]
    UnknownElement { tag: String, template: String },

    /// A property binding targets a property the element does not have.
    #[error(
        "can't bind to '{property}' since it isn't a known property of '{tag}' (used in the '{template}' template)"
    )]
    UnknownProperty {
        property: String,
        tag: String,
        template: String,
    },

    /// No query is declared at the given index.
    #[error("no query at index {index} in template '{template}'")]
    QueryNotFound { index: usize, template: String },

    /// A local reference names an export no directive on the node declares.
    #[error("no directive exported as '{export}' on '{tag}' (used in the '{template}' template)")]
    ExportNotFound {
        export: String,
        tag: String,
        template: String,
    },

    /// A query asked to read a token the runtime cannot produce.
    #[error("query read token '{token}' is not supported")]
    UnsupportedReadToken { token: String },

    /// A component instance could not be located in its patched view.
    #[error("component instance is not attached to any node of view {0:?}")]
    ComponentNotFound(ViewId),

    /// A directive instance could not be located in its patched view.
    #[error("directive instance is not attached to any node of view {0:?}")]
    DirectiveNotFound(ViewId),

    /// A lifecycle hook returned an error.
    #[error("{hook} hook of '{directive}' failed: {source}")]
    Hook {
        directive: String,
        hook: LifecycleHook,
        #[source]
        source: HookError,
    },

    /// A template or query function returned an error of its own.
    #[error("template '{template}' failed: {source}")]
    Template {
        template: String,
        #[source]
        source: HookError,
    },

    /// A binding changed value during the check-no-changes verification pass.
    #[error(
        "expression changed after it was checked in '{template}' at binding {index}: previous '{previous}', current '{current}'"
    )]
    ExpressionChanged {
        template: String,
        index: usize,
        previous: String,
        current: String,
    },

    /// An i18n op code referenced a slot of the wrong shape.
    #[error("malformed i18n structure: {0}")]
    I18n(String),
}

impl ViewError {
    /// Create a node-not-found error.
    pub fn node_not_found(index: usize, template: impl Into<String>) -> Self {
        Self::NodeNotFound {
            index,
            template: template.into(),
        }
    }

    /// Create a container-expected error.
    pub fn container_expected(index: usize, template: impl Into<String>) -> Self {
        Self::ContainerExpected {
            index,
            template: template.into(),
        }
    }

    /// Create an unknown-element error.
    pub fn unknown_element(tag: impl Into<String>, template: impl Into<String>) -> Self {
        Self::UnknownElement {
            tag: tag.into(),
            template: template.into(),
        }
    }

    /// Create an unknown-property error.
    pub fn unknown_property(
        property: impl Into<String>,
        tag: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self::UnknownProperty {
            property: property.into(),
            tag: tag.into(),
            template: template.into(),
        }
    }

    /// Create an export-not-found error.
    pub fn export_not_found(
        export: impl Into<String>,
        tag: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self::ExportNotFound {
            export: export.into(),
            tag: tag.into(),
            template: template.into(),
        }
    }

    /// Create a query-not-found error.
    pub fn query_not_found(index: usize, template: impl Into<String>) -> Self {
        Self::QueryNotFound {
            index,
            template: template.into(),
        }
    }

    /// Create an unsupported-read-token error.
    pub fn unsupported_read_token(token: impl Into<String>) -> Self {
        Self::UnsupportedReadToken {
            token: token.into(),
        }
    }

    /// Wrap an error returned by a lifecycle hook.
    pub fn hook(directive: impl Into<String>, hook: LifecycleHook, source: HookError) -> Self {
        Self::Hook {
            directive: directive.into(),
            hook,
            source,
        }
    }

    /// Wrap an error returned by a template or query function.
    pub fn template(template: impl Into<String>, source: HookError) -> Self {
        Self::Template {
            template: template.into(),
            source,
        }
    }

    /// Create an i18n structure error.
    pub fn i18n(message: impl Into<String>) -> Self {
        Self::I18n(message.into())
    }

    /// Returns true for errors raised by schema validation in strict mode.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownElement { .. } | Self::UnknownProperty { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_element_message_names_template() {
        let err = ViewError::unknown_element("my-widget", "AppComponent");
        let message = err.to_string();
        assert!(message.contains("my-widget"));
        assert!(message.contains("AppComponent"));
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_hook_error_keeps_source() {
        let source: HookError = "boom".into();
        let err = ViewError::hook("Dir", LifecycleHook::OnInit, source);
        assert!(err.to_string().contains("Dir"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_schema_error());
    }
}
