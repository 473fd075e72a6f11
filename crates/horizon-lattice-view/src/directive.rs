//! Directives, lifecycle hooks and capability lookup.
//!
//! A directive is matched onto template nodes by selector and instantiated
//! once per view instance. Its lifecycle hooks are methods of the
//! [`Directive`] trait; which of them the scheduler registers is declared up
//! front in the [`DirectiveDef`] through a [`LifecycleHooks`] set, since
//! trait objects cannot be inspected for overridden methods.
//!
//! # Related
//!
//! - [`hooks`](crate::hooks) registers and runs the hooks
//! - [`SelectorMatcher`](crate::selector::SelectorMatcher) matches definitions to nodes

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::binding::BindingValue;
use crate::error::{HookError, ViewResult};
use crate::node::TemplateNode;
use crate::runtime::Runtime;
use crate::selector::{CssSelector, SelectorList};
use crate::template::{RenderFlags, TemplateData, TemplateSlot, ViewTemplate};

/// Result returned by lifecycle hooks.
pub type HookResult = Result<(), HookError>;

/// A live directive or component instance.
pub type DirectiveInstance = Arc<dyn Directive>;

/// Creates a directive instance.
pub type DirectiveFactory = Arc<dyn Fn() -> DirectiveInstance + Send + Sync>;

/// Declares or refreshes the content queries of a directive instance.
///
/// Receives the render pass, the instance and its directive slot.
pub type ContentQueriesFn =
    Arc<dyn Fn(&mut Runtime, RenderFlags, &DirectiveInstance, usize) -> ViewResult<()> + Send + Sync>;

/// Creates or updates the host bindings of a directive instance.
pub type HostBindingsFn =
    Arc<dyn Fn(&mut Runtime, RenderFlags, &DirectiveInstance) -> ViewResult<()> + Send + Sync>;

/// One input change delivered to [`Directive::on_changes`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleChange {
    /// Value before the change; [`BindingValue::Unset`] on the first change.
    pub previous: BindingValue,
    /// New value.
    pub current: BindingValue,
    /// Whether this is the first value the input received.
    pub first_change: bool,
}

/// Input changes keyed by input name.
pub type SimpleChanges = BTreeMap<String, SimpleChange>;

/// Lifecycle callbacks of a directive.
///
/// Every method has an empty default. Only the hooks listed in the
/// definition's [`LifecycleHooks`] are ever called.
pub trait Directive: Any + Send + Sync {
    /// Inputs changed since the last check.
    fn on_changes(&self, _rt: &mut Runtime, _changes: &SimpleChanges) -> HookResult {
        Ok(())
    }

    /// First check of the directive. Runs once.
    fn on_init(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// Every check of the directive.
    fn do_check(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// Content children checked for the first time. Runs once.
    fn after_content_init(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// Content children checked.
    fn after_content_checked(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// Own view checked for the first time. Runs once.
    fn after_view_init(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// Own view checked.
    fn after_view_checked(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// The owning view is being destroyed.
    fn on_destroy(&self, _rt: &mut Runtime) -> HookResult {
        Ok(())
    }

    /// A declared input received a new value.
    ///
    /// Called before the change is queued for [`on_changes`](Self::on_changes).
    fn set_input(&self, _name: &str, _value: &BindingValue) {}
}

/// Identity comparison of two instances.
pub fn same_instance(a: &DirectiveInstance, b: &DirectiveInstance) -> bool {
    instance_address(a) == instance_address(b)
}

/// Address of the instance data, used as a reverse-lookup key.
pub(crate) fn instance_address(instance: &DirectiveInstance) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

/// A single lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    OnChanges,
    OnInit,
    DoCheck,
    AfterContentInit,
    AfterContentChecked,
    AfterViewInit,
    AfterViewChecked,
    OnDestroy,
}

impl LifecycleHook {
    /// Hooks that run once per view instance.
    pub fn is_init(self) -> bool {
        matches!(
            self,
            Self::OnInit | Self::AfterContentInit | Self::AfterViewInit
        )
    }

    /// The capability flag for this hook.
    pub fn flag(self) -> LifecycleHooks {
        match self {
            Self::OnChanges => LifecycleHooks::ON_CHANGES,
            Self::OnInit => LifecycleHooks::ON_INIT,
            Self::DoCheck => LifecycleHooks::DO_CHECK,
            Self::AfterContentInit => LifecycleHooks::AFTER_CONTENT_INIT,
            Self::AfterContentChecked => LifecycleHooks::AFTER_CONTENT_CHECKED,
            Self::AfterViewInit => LifecycleHooks::AFTER_VIEW_INIT,
            Self::AfterViewChecked => LifecycleHooks::AFTER_VIEW_CHECKED,
            Self::OnDestroy => LifecycleHooks::ON_DESTROY,
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OnChanges => "on_changes",
            Self::OnInit => "on_init",
            Self::DoCheck => "do_check",
            Self::AfterContentInit => "after_content_init",
            Self::AfterContentChecked => "after_content_checked",
            Self::AfterViewInit => "after_view_init",
            Self::AfterViewChecked => "after_view_checked",
            Self::OnDestroy => "on_destroy",
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// Set of lifecycle hooks a directive implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleHooks: u8 {
        const ON_CHANGES            = 1 << 0;
        const ON_INIT               = 1 << 1;
        const DO_CHECK              = 1 << 2;
        const AFTER_CONTENT_INIT    = 1 << 3;
        const AFTER_CONTENT_CHECKED = 1 << 4;
        const AFTER_VIEW_INIT       = 1 << 5;
        const AFTER_VIEW_CHECKED    = 1 << 6;
        const ON_DESTROY            = 1 << 7;

        /// Hooks run while entering nodes.
        const PRE_ORDER = Self::ON_CHANGES.bits() | Self::ON_INIT.bits() | Self::DO_CHECK.bits();
        /// Pre-order hooks that also run on later checks.
        const PRE_ORDER_CHECK = Self::ON_CHANGES.bits() | Self::DO_CHECK.bits();
    }
}

/// Token naming a capability a query or lookup can ask a node for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilityToken {
    /// The node's rendered handle.
    NodeHandle,
    /// The node's nested template.
    TemplateHandle,
    /// The view container anchored at the node.
    ContainerHandle,
    /// A directive or provider registered under this name.
    Named(Arc<str>),
}

impl CapabilityToken {
    /// Token for a named directive or provider.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeHandle => f.write_str("NodeHandle"),
            Self::TemplateHandle => f.write_str("TemplateHandle"),
            Self::ContainerHandle => f.write_str("ContainerHandle"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Static description of a directive or component.
pub struct DirectiveDef {
    name: Arc<str>,
    selectors: SelectorList,
    hooks: LifecycleHooks,
    component: Option<ViewTemplate>,
    export_as: Vec<String>,
    inputs: Vec<String>,
    provides: Vec<Arc<str>>,
    host_vars: usize,
    factory: DirectiveFactory,
    content_queries: Option<ContentQueriesFn>,
    host_bindings: Option<HostBindingsFn>,
}

impl fmt::Debug for DirectiveDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveDef")
            .field("name", &self.name)
            .field("selectors", &self.selectors.to_string())
            .field("hooks", &self.hooks)
            .field("component", &self.component.as_ref().map(ViewTemplate::name))
            .finish_non_exhaustive()
    }
}

impl DirectiveDef {
    /// Start building a definition.
    pub fn builder(
        name: impl Into<Arc<str>>,
        factory: impl Fn() -> DirectiveInstance + Send + Sync + 'static,
    ) -> DirectiveDefBuilder {
        DirectiveDefBuilder {
            def: DirectiveDef {
                name: name.into(),
                selectors: SelectorList::default(),
                hooks: LifecycleHooks::empty(),
                component: None,
                export_as: Vec::new(),
                inputs: Vec::new(),
                provides: Vec::new(),
                host_vars: 0,
                factory: Arc::new(factory),
                content_queries: None,
                host_bindings: None,
            },
        }
    }

    /// Directive name; also the name it is located by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selectors the directive applies to.
    pub fn selectors(&self) -> &SelectorList {
        &self.selectors
    }

    /// Implemented lifecycle hooks.
    pub fn hooks(&self) -> LifecycleHooks {
        self.hooks
    }

    /// Component view template, for components.
    pub fn component(&self) -> Option<&ViewTemplate> {
        self.component.as_ref()
    }

    /// Whether this is a component.
    pub fn is_component(&self) -> bool {
        self.component.is_some()
    }

    /// Names usable in local references.
    pub fn export_as(&self) -> &[String] {
        &self.export_as
    }

    /// Declared input names.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Whether `name` is a declared input.
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|input| input == name)
    }

    /// Number of host binding slots.
    pub fn host_vars(&self) -> usize {
        self.host_vars
    }

    /// Whether the directive answers to the token name.
    pub fn provides(&self, name: &str) -> bool {
        &*self.name == name || self.provides.iter().any(|p| &**p == name)
    }

    /// Create a new instance.
    pub fn create(&self) -> DirectiveInstance {
        (self.factory)()
    }

    /// Content query function.
    pub fn content_queries(&self) -> Option<&ContentQueriesFn> {
        self.content_queries.as_ref()
    }

    /// Host bindings function.
    pub fn host_bindings(&self) -> Option<&HostBindingsFn> {
        self.host_bindings.as_ref()
    }
}

/// Builder for [`DirectiveDef`].
pub struct DirectiveDefBuilder {
    def: DirectiveDef,
}

impl DirectiveDefBuilder {
    /// Add a selector.
    pub fn selector(mut self, selector: CssSelector) -> Self {
        let mut selectors = self.def.selectors.selectors().to_vec();
        selectors.push(selector);
        self.def.selectors = SelectorList::new(selectors);
        self
    }

    /// Declare the implemented hooks.
    pub fn hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.def.hooks = hooks;
        self
    }

    /// Make this a component rendering `template` inside its host.
    pub fn component(mut self, template: ViewTemplate) -> Self {
        self.def.component = Some(template);
        self
    }

    /// Add a name usable in local references.
    pub fn export_as(mut self, name: impl Into<String>) -> Self {
        self.def.export_as.push(name.into());
        self
    }

    /// Declare an input.
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.def.inputs.push(name.into());
        self
    }

    /// Add a token name this directive can be located by.
    pub fn provides(mut self, name: impl Into<Arc<str>>) -> Self {
        self.def.provides.push(name.into());
        self
    }

    /// Content queries.
    pub fn content_queries(
        mut self,
        f: impl Fn(&mut Runtime, RenderFlags, &DirectiveInstance, usize) -> ViewResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.def.content_queries = Some(Arc::new(f));
        self
    }

    /// Host bindings using `vars` binding slots.
    pub fn host_bindings(
        mut self,
        vars: usize,
        f: impl Fn(&mut Runtime, RenderFlags, &DirectiveInstance) -> ViewResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.def.host_vars = vars;
        self.def.host_bindings = Some(Arc::new(f));
        self
    }

    /// Finish the definition.
    pub fn build(self) -> Arc<DirectiveDef> {
        Arc::new(self.def)
    }
}

/// Locates the directive slot that provides a capability on a node.
///
/// The runtime treats the locator as opaque. The default implementation,
/// [`DirectiveLocator`], searches the node's own directives by name.
pub trait CapabilityLocator: Send + Sync {
    /// Directive slot answering `token` on `node`, if any.
    fn locate(&self, data: &TemplateData, node: &TemplateNode, token: &CapabilityToken) -> Option<usize>;
}

/// Finds named capabilities among the directives matched on a node.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectiveLocator;

impl CapabilityLocator for DirectiveLocator {
    fn locate(&self, data: &TemplateData, node: &TemplateNode, token: &CapabilityToken) -> Option<usize> {
        let CapabilityToken::Named(name) = token else {
            return None;
        };
        (node.directive_start..node.directive_end).find(|&slot| {
            matches!(data.slots.get(slot), Some(TemplateSlot::Directive(def)) if def.provides(name))
        })
    }
}

static_assertions::assert_impl_all!(DirectiveDef: Send, Sync);
