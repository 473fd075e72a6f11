//! Logging and debugging facilities for the view runtime.
//!
//! This module provides:
//! - Target and span names for filtering the runtime's `tracing` output
//! - A debug visualization of the view tree
//!
//! # Tracing Integration
//!
//! The runtime logs through the `tracing` crate and never installs a
//! subscriber. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_lattice_view::hooks=trace")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! Use [`ViewTreeDebug`] to print the views of a runtime:
//!
//! ```ignore
//! use horizon_lattice_view::logging::ViewTreeDebug;
//!
//! println!("{}", ViewTreeDebug::new().format_all(&runtime));
//! ```

use std::fmt::Write as FmtWrite;

use crate::error::ViewResult;
use crate::runtime::Runtime;
use crate::view::{Slot, ViewId};

/// Span names used by the runtime.
pub mod span_names {
    /// One lifecycle hook invocation.
    pub const HOOK: &str = "horizon_lattice_view::hook";
}

/// Target names for log filtering.
pub mod targets {
    /// Runtime root target.
    pub const VIEW: &str = "horizon_lattice_view::view";
    /// Lifecycle hook scheduling.
    pub const HOOKS: &str = "horizon_lattice_view::hooks";
    /// Query matching and refresh.
    pub const QUERY: &str = "horizon_lattice_view::query";
    /// Context discovery.
    pub const CONTEXT: &str = "horizon_lattice_view::context";
    /// Translated content.
    pub const I18N: &str = "horizon_lattice_view::i18n";
    /// Schema validation reports.
    pub const SCHEMA: &str = "horizon_lattice_view::schema";
    /// Node creation and attachment.
    pub const RENDER: &str = "horizon_lattice_view::render";
}

/// Debug utility for visualizing the view tree of a [`Runtime`].
///
/// Children of a view are its component views and the views inserted into
/// its containers, in slot order. Each view prints as its template name
/// behind box-drawing branches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewTreeDebug;

impl ViewTreeDebug {
    /// Create a visualizer.
    pub fn new() -> Self {
        Self
    }

    /// Format every view, starting from the views with no parent.
    pub fn format_all(&self, runtime: &Runtime) -> ViewResult<String> {
        let roots = runtime.views().roots();
        let mut output = String::new();
        let _ = writeln!(output, "View Tree ({} total views):", runtime.views().len());
        if roots.is_empty() {
            let _ = writeln!(output, "  (empty)");
        }
        for root in roots {
            self.format_subtree_into(runtime, root, "", None, &mut output)?;
        }
        Ok(output)
    }

    /// Format the subtree rooted at `view`.
    pub fn format_subtree(&self, runtime: &Runtime, view: ViewId) -> ViewResult<String> {
        let mut output = String::new();
        self.format_subtree_into(runtime, view, "", None, &mut output)?;
        Ok(output)
    }

    /// `is_last` is `None` for the subtree root.
    fn format_subtree_into(
        &self,
        runtime: &Runtime,
        view: ViewId,
        indent: &str,
        is_last: Option<bool>,
        output: &mut String,
    ) -> ViewResult<()> {
        let instance = runtime.view(view)?;
        let (branch, child_indent) = match is_last {
            None => ("", String::new()),
            Some(true) => ("\u{2514}\u{2500}\u{2500} ", format!("{indent}    ")),
            Some(false) => ("\u{251c}\u{2500}\u{2500} ", format!("{indent}\u{2502}   ")),
        };
        let _ = writeln!(output, "{indent}{branch}{}", instance.template().name());

        let children: Vec<ViewId> = (0..instance.len())
            .filter_map(|index| instance.slot(index))
            .flat_map(|slot| match slot {
                Slot::Component { view, .. } => vec![*view],
                Slot::Container(container) => container.views.clone(),
                _ => Vec::new(),
            })
            .collect();
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.format_subtree_into(runtime, child, &child_indent, Some(i + 1 == count), output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::renderer::MemoryRenderer;
    use crate::template::{RenderFlags, TemplateKind, ViewTemplate};
    use crate::view::ContainerLocation;

    fn runtime_with_tree() -> (Runtime, ViewId) {
        let mut rt = Runtime::new(Arc::new(MemoryRenderer::new()));
        let row = ViewTemplate::builder("Row", TemplateKind::Embedded).build();
        let list = ViewTemplate::builder("List", TemplateKind::Root)
            .decls(1)
            .template(move |rt, flags| {
                if flags.contains(RenderFlags::CREATE) {
                    rt.template(0, &row, None, None, &[])?;
                }
                Ok(())
            })
            .build();
        let root = rt.create_root_view(&list, None, None).unwrap();
        let template_ref = rt.template_ref(root, 0).unwrap();
        let template_ref = template_ref.template().unwrap().clone();
        for _ in 0..2 {
            let view = rt.create_embedded_view(&template_ref, None).unwrap();
            rt.insert_view(ContainerLocation::new(root, 0), view, None).unwrap();
        }
        (rt, root)
    }

    #[test]
    fn test_tree_format_empty() {
        let rt = Runtime::new(Arc::new(MemoryRenderer::new()));
        let output = ViewTreeDebug::new().format_all(&rt).unwrap();
        assert!(output.contains("View Tree (0 total views)"));
        assert!(output.contains("(empty)"));
    }

    #[test]
    fn test_tree_format_hierarchy() {
        let (rt, root) = runtime_with_tree();
        let output = ViewTreeDebug::new().format_subtree(&rt, root).unwrap();
        assert_eq!(output, "List\n\u{251c}\u{2500}\u{2500} Row\n\u{2514}\u{2500}\u{2500} Row\n");
    }

    #[test]
    fn test_tree_format_all_counts_views() {
        let (rt, _) = runtime_with_tree();
        let output = ViewTreeDebug::new().format_all(&rt).unwrap();
        assert!(output.starts_with("View Tree (3 total views):\nList\n"));
    }
}
