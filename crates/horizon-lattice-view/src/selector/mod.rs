//! Encoded CSS-like selectors and node matching.
//!
//! Selectors decide which directives apply to a node and which nodes a
//! query collects.

mod matcher;
mod types;

pub use matcher::{class_index_of, SelectorMatcher};
pub use types::*;
