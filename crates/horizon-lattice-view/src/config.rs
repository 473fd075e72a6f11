//! Runtime configuration.
//!
//! A [`RuntimeConfig`] decides how loudly the runtime reports problems and
//! which locale drives plural selection in translated content.
//!
//! ```ignore
//! use horizon_lattice_view::config::RuntimeConfigBuilder;
//!
//! let config = RuntimeConfigBuilder::new()
//!     .strict_unknown_elements(true)
//!     .locale("fr")
//!     .build();
//! ```

/// Default locale used for plural case selection.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Development mode: enables schema validation and the check-no-changes pass.
    pub dev_mode: bool,
    /// Return an error for unknown elements instead of logging it.
    pub strict_unknown_elements: bool,
    /// Return an error for unknown property bindings instead of logging it.
    pub strict_unknown_properties: bool,
    /// BCP-47 locale tag for ICU plural selection.
    pub locale: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dev_mode: cfg!(debug_assertions),
            strict_unknown_elements: false,
            strict_unknown_properties: false,
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration for production use: no validation passes.
    pub fn production() -> Self {
        Self {
            dev_mode: false,
            ..Default::default()
        }
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable development mode.
    pub fn dev_mode(mut self, enabled: bool) -> Self {
        self.config.dev_mode = enabled;
        self
    }

    /// Fail on unknown elements instead of logging.
    pub fn strict_unknown_elements(mut self, strict: bool) -> Self {
        self.config.strict_unknown_elements = strict;
        self
    }

    /// Fail on unknown property bindings instead of logging.
    pub fn strict_unknown_properties(mut self, strict: bool) -> Self {
        self.config.strict_unknown_properties = strict;
        self
    }

    /// Set the locale used for plural selection.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    /// Finish building.
    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}
