//! Declarative queries over the view tree.
//!
//! A query is declared by a template (view query) or by a directive on a
//! node (content query). Matching happens once per template, during its
//! first creation pass, and is recorded as a list of [`QueryMatch`]es in the
//! template's [`TemplateQuery`]. When a match is a nested template, the
//! query is cloned into that template and a boundary entry points at the
//! clone, so results from every view later created from it are collected
//! through the boundary.
//!
//! Per view instance, a [`ViewQuery`] memoizes the view's own results and
//! shares a [`QueryList`] with the views it was inherited by. Inserting or
//! detaching a view dirties the lists of the queries that matched in it;
//! [`Runtime::query_refresh`](crate::runtime::Runtime::query_refresh)
//! recomputes dirty lists and publishes only real changes.
//!
//! # Related
//!
//! - [`CapabilityLocator`](crate::directive::CapabilityLocator) resolves named tokens

mod declaration;
mod list;
mod live;
mod resolve;

pub use declaration::{
    MatchKind, QueryFlags, QueryMatch, QueryMetadata, QueryPredicate, TemplateQueries, TemplateQuery,
};
pub use list::{QueryList, SubscriptionId};
pub use live::{ViewQueries, ViewQuery};
pub use resolve::{ContainerRef, ElementRef, QueryResult, TemplateRef};
