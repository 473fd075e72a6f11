//! View runtime for Horizon Lattice.
//!
//! This crate runs compiled view templates: it instantiates them into a tree
//! of views, keeps track of which view is being processed, fires lifecycle
//! hooks in a fixed global order and resolves declarative queries across
//! views that are created, inserted, moved and destroyed at run time.
//!
//! - **Frame Stack** ([`state`]): pooled traversal frames for the view being processed
//! - **Lifecycle Hooks** ([`hooks`]): per-template hook lists with run-once bookkeeping
//! - **Selectors** ([`selector`]): directive matching and content projection
//! - **Queries** ([`query`]): first-pass matching, live bindings and [`QueryList`]
//! - **Context Discovery** ([`context`]): from a rendered node or instance back to its view
//! - **Translations** ([`i18n`]): op-code interpreter for translated content and ICU expressions
//! - **Schema Validation** ([`schema`]): unknown element and property reports
//!
//! All state lives in a [`Runtime`]. Templates drive it through
//! instructions ([`Runtime::element_start`], [`Runtime::property`], ...) and
//! a [`Renderer`] creates the actual nodes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_lattice_view::{MemoryRenderer, RenderFlags, Renderer, Runtime, TemplateKind, ViewTemplate};
//!
//! let renderer = Arc::new(MemoryRenderer::new());
//! let mut runtime = Runtime::new(renderer.clone());
//!
//! let greeting = ViewTemplate::builder("Greeting", TemplateKind::Root)
//!     .decls(2)
//!     .vars(1)
//!     .template(|rt, flags| {
//!         if flags.contains(RenderFlags::CREATE) {
//!             rt.element_start(0, "p", None, &[])?;
//!             rt.text(1, "")?;
//!             rt.element_end()?;
//!         }
//!         if flags.contains(RenderFlags::UPDATE) {
//!             rt.advance(1)?;
//!             rt.text_interpolate("hello")?;
//!         }
//!         Ok(())
//!     })
//!     .build();
//!
//! let host = renderer.create_element("app-root", None);
//! let view = runtime.create_root_view(&greeting, Some(host), None)?;
//! runtime.detect_changes(view)?;
//! assert_eq!(renderer.serialize(host), "<app-root><p>hello</p></app-root>");
//! # Ok::<(), horizon_lattice_view::ViewError>(())
//! ```

pub mod binding;
pub mod config;
pub mod context;
pub mod directive;
mod error;
pub mod hooks;
pub mod i18n;
mod instructions;
pub mod logging;
pub mod node;
pub mod query;
pub mod renderer;
mod runtime;
pub mod schema;
pub mod selector;
pub mod state;
pub mod template;
pub mod view;

pub use binding::BindingValue;
pub use config::{RuntimeConfig, RuntimeConfigBuilder, DEFAULT_LOCALE};
pub use context::{ContextId, ContextIndex, DiscoveryTarget, NodeContext, PatchTarget, PatchedData};
pub use directive::{
    CapabilityLocator, CapabilityToken, Directive, DirectiveDef, DirectiveDefBuilder, DirectiveInstance,
    DirectiveLocator, HookResult, LifecycleHook, LifecycleHooks, SimpleChange, SimpleChanges,
};
pub use error::{HookError, ViewError, ViewResult};
pub use hooks::{HookBoundary, HookList};
pub use i18n::{I18nBlock, I18nCreateOp, IcuCreateOp, IcuExpression, IcuKind, IcuRemoveOp, UpdateBlock, UpdateOp};
pub use logging::ViewTreeDebug;
pub use node::{AttrToken, AttributeMarker, NodeAttrs, NodeKind, TemplateNode};
pub use query::{
    ContainerRef, ElementRef, QueryFlags, QueryList, QueryMetadata, QueryPredicate, QueryResult, TemplateRef,
};
pub use renderer::{MemoryRenderer, Namespace, NodeHandle, Renderer};
pub use runtime::{ConsumerId, Runtime};
pub use schema::ElementSchema;
pub use selector::{CssSelector, SelectorList, SelectorMatcher};
pub use template::{RenderFlags, TemplateKind, ViewTemplate, ViewTemplateBuilder};
pub use view::{ContainerLocation, InitPhase, ViewContext, ViewFlags, ViewId, ViewInstance, ViewParent};
