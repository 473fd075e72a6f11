//! Translated content.
//!
//! A translated block is compiled ahead of time into op codes:
//!
//! - [`I18nCreateOp`]s create the block's text and comment nodes when the
//!   view is created.
//! - [`UpdateBlock`]s rebuild a string from literal parts and binding values
//!   and write it to a text node, an attribute, or an ICU expression. Each
//!   block carries a mask of the `i18n_exp` bindings it reads, so a refresh
//!   only touches what changed.
//! - [`IcuExpression`]s (`select` and `plural`) hold, per case, the nodes to
//!   create ([`IcuCreateOp`]), the nodes to remove ([`IcuRemoveOp`]) and the
//!   update blocks of the case. Switching case tears down the active case
//!   and builds the new one in front of the ICU's anchor comment.
//!
//! Nodes are created once per view and slot. Switching back to a case that
//! was shown before reattaches the nodes it created the first time.
//!
//! The change mask is per runtime and is cleared by `i18n_apply` and when
//! the outermost view is left.

use std::sync::Arc;

use crate::binding::BindingValue;
use crate::context::{PatchTarget, PatchedData};
use crate::error::{ViewError, ViewResult};
use crate::logging::targets;
use crate::renderer::NodeHandle;
use crate::runtime::Runtime;
use crate::template::TemplateSlot;
use crate::view::{IcuCaseState, Slot, ViewId};

/// Creates a node of a translated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I18nCreateOp {
    /// Text node at `index`.
    Text {
        index: usize,
        value: String,
        append_now: bool,
    },
    /// Comment node at `index`, typically the anchor of an ICU expression.
    Comment {
        index: usize,
        value: String,
        append_now: bool,
    },
}

/// One step of an [`UpdateBlock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOp {
    /// Append literal text to the value being built.
    Text(String),
    /// Append the `n`-th `i18n_exp` binding of the block.
    Expr(usize),
    /// Write the value into the text node at the slot.
    SetText(usize),
    /// Write the value into an attribute of the node at the slot.
    SetAttr { node: usize, name: String },
    /// Select the case of the ICU anchored at the slot by the value.
    IcuSwitch(usize),
    /// Update the active case of the ICU anchored at the slot.
    IcuUpdate(usize),
}

/// Op codes that run when any binding in `mask` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateBlock {
    /// Bits of the `i18n_exp` bindings this block reads.
    pub mask: u32,
    /// Steps, in order.
    pub ops: Vec<UpdateOp>,
}

impl UpdateBlock {
    /// Create a block.
    pub fn new(mask: u32, ops: Vec<UpdateOp>) -> Self {
        Self { mask, ops }
    }
}

/// Mask bit of the `n`-th `i18n_exp` binding of a block. Bindings past the
/// 32nd share the last bit.
pub fn mask_bit(expr: usize) -> u32 {
    1 << expr.min(31)
}

/// Creates or attaches a node of an ICU case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcuCreateOp {
    /// Text node at `index`.
    Text { index: usize, value: String },
    /// Comment node at `index`, the anchor of a nested ICU.
    Comment { index: usize, value: String },
    /// Element at `index`.
    Element { index: usize, tag: String },
    /// Attach `child` to the element at `parent`, or in front of the ICU
    /// anchor when `parent` is `None`.
    AppendChild { parent: Option<usize>, child: usize },
    /// Static attribute of the element at `element`.
    Attr {
        element: usize,
        name: String,
        value: String,
    },
}

/// Removes a node of an ICU case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcuRemoveOp {
    /// Detach the node at the slot.
    Node(usize),
    /// Tear down the active case of the nested ICU anchored at the slot.
    Icu(usize),
}

/// Kind of ICU expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcuKind {
    /// Cases are matched by value, then `other`.
    Select,
    /// Cases are matched by value, then by plural category, then `other`.
    Plural,
}

/// A `select` or `plural` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcuExpression {
    /// Kind.
    pub kind: IcuKind,
    /// Slot of the anchor comment. The expression is stored at this slot of
    /// the template.
    pub anchor: usize,
    /// View slot holding the active case.
    pub case_slot: usize,
    /// Case keys, e.g. `=0`, `one`, `other`, `male`.
    pub cases: Vec<String>,
    /// Per case: nodes to create.
    pub create: Vec<Vec<IcuCreateOp>>,
    /// Per case: nodes to remove.
    pub remove: Vec<Vec<IcuRemoveOp>>,
    /// Per case: update blocks.
    pub update: Vec<Vec<UpdateBlock>>,
}

impl IcuExpression {
    /// Create an expression with no cases.
    pub fn new(kind: IcuKind, anchor: usize, case_slot: usize) -> Self {
        Self {
            kind,
            anchor,
            case_slot,
            cases: Vec::new(),
            create: Vec::new(),
            remove: Vec::new(),
            update: Vec::new(),
        }
    }

    /// Add a case.
    pub fn case(
        mut self,
        key: impl Into<String>,
        create: Vec<IcuCreateOp>,
        remove: Vec<IcuRemoveOp>,
        update: Vec<UpdateBlock>,
    ) -> Self {
        self.cases.push(key.into());
        self.create.push(create);
        self.remove.push(remove);
        self.update.push(update);
        self
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.cases
            .iter()
            .position(|case| case == key || case.strip_prefix('=') == Some(key))
    }

    /// Case selected by `value`, if any.
    pub fn case_index(&self, value: &str, locale: &str) -> Option<usize> {
        if let Some(index) = self.position(value) {
            return Some(index);
        }
        match self.kind {
            IcuKind::Plural => {
                let category = plural_category(value, locale);
                self.position(category).or_else(|| {
                    if category != "other" {
                        self.position("other")
                    } else {
                        None
                    }
                })
            }
            IcuKind::Select => self.position("other"),
        }
    }
}

/// Compiled translated block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct I18nBlock {
    /// Node creation, run in every creation pass.
    pub create: Vec<I18nCreateOp>,
    /// Update blocks, run by `i18n_apply`.
    pub update: Vec<UpdateBlock>,
    /// ICU expressions of the block, registered at their anchor slots.
    pub icus: Vec<Arc<IcuExpression>>,
}

impl I18nBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Plural category of `value` in `locale`: `zero`, `one`, `two`, `few`,
/// `many` or `other`.
#[cfg(feature = "localization")]
pub fn plural_category(value: &str, locale: &str) -> &'static str {
    use icu::locale::Locale;
    use icu::plurals::{PluralCategory, PluralOperands, PluralRules};

    let Ok(operands) = value.trim().parse::<PluralOperands>() else {
        return "other";
    };
    let locale: Locale = match locale.parse() {
        Ok(locale) => locale,
        Err(_) => {
            tracing::warn!(target: targets::I18N, locale, "invalid locale, using plural category 'other'");
            return "other";
        }
    };
    let Ok(rules) = PluralRules::try_new_cardinal(locale.into()) else {
        return "other";
    };
    match rules.category_for(operands) {
        PluralCategory::Zero => "zero",
        PluralCategory::One => "one",
        PluralCategory::Two => "two",
        PluralCategory::Few => "few",
        PluralCategory::Many => "many",
        PluralCategory::Other => "other",
    }
}

/// Plural category of `value`. Without locale data only `one` and `other`
/// are distinguished.
#[cfg(not(feature = "localization"))]
pub fn plural_category(value: &str, _locale: &str) -> &'static str {
    match value.trim().parse::<f64>() {
        Ok(n) if n == 1.0 => "one",
        _ => "other",
    }
}

/// Which `i18n_exp` bindings changed since the last `i18n_apply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct I18nState {
    change_mask: u32,
    counter: usize,
}

impl I18nState {
    /// Record the outcome of one `i18n_exp` binding.
    pub fn set_mask_bit(&mut self, changed: bool) {
        if changed {
            self.change_mask |= mask_bit(self.counter);
        }
        self.counter += 1;
    }

    /// Bits of the changed bindings.
    pub fn change_mask(&self) -> u32 {
        self.change_mask
    }

    /// Number of bindings recorded.
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Forget every recorded binding.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Runtime {
    /// Open a translated block at `index` and create its nodes.
    pub fn i18n_start(&mut self, index: usize, block: Arc<I18nBlock>) -> ViewResult<()> {
        let (view, template) = self.active_view()?;
        if template.first_create_pass() {
            let mut data = template.write();
            for icu in &block.icus {
                let anchor = data
                    .slots
                    .get_mut(icu.anchor)
                    .ok_or_else(|| ViewError::i18n(format!("ICU anchor {} is out of range", icu.anchor)))?;
                *anchor = TemplateSlot::Icu(icu.clone());
            }
            let slot = data
                .slots
                .get_mut(index)
                .ok_or_else(|| ViewError::i18n(format!("block index {index} is out of range")))?;
            *slot = TemplateSlot::I18n(block.clone());
        }

        let parent = self.current_parent_node();
        if parent.is_none() && template.first_create_pass() {
            let mut data = template.write();
            for op in &block.create {
                if let I18nCreateOp::Text { index, append_now: true, .. }
                | I18nCreateOp::Comment { index, append_now: true, .. } = op
                {
                    data.i18n_roots.push(*index);
                }
            }
        }
        let (parent_native, anchor) = self.render_location(view, parent)?;
        for op in &block.create {
            let (index, value, append_now, comment) = match op {
                I18nCreateOp::Text { index, value, append_now } => (*index, value, *append_now, false),
                I18nCreateOp::Comment { index, value, append_now } => (*index, value, *append_now, true),
            };
            let native = self.ensure_i18n_node(view, index, |r| {
                if comment {
                    r.create_comment(value)
                } else {
                    r.create_text(value)
                }
            })?;
            if append_now {
                if let Some(parent) = parent_native {
                    self.renderer.insert_before(parent, native, anchor, false);
                }
            }
        }
        self.frames.set_in_i18n(true);
        Ok(())
    }

    /// Close the current translated block.
    pub fn i18n_end(&mut self) -> ViewResult<()> {
        self.active_view()?;
        self.frames.set_in_i18n(false);
        Ok(())
    }

    /// A translated block with no element children.
    pub fn i18n(&mut self, index: usize, block: Arc<I18nBlock>) -> ViewResult<()> {
        self.i18n_start(index, block)?;
        self.i18n_end()
    }

    /// Register the update blocks of translated attributes at `index`.
    ///
    /// The attributes are written by `i18n_apply(index)`.
    pub fn i18n_attributes(&mut self, index: usize, update: Vec<UpdateBlock>) -> ViewResult<()> {
        let (_, template) = self.active_view()?;
        if template.first_create_pass() {
            let mut data = template.write();
            let slot = data
                .slots
                .get_mut(index)
                .ok_or_else(|| ViewError::i18n(format!("block index {index} is out of range")))?;
            *slot = TemplateSlot::I18n(Arc::new(I18nBlock {
                update,
                ..I18nBlock::default()
            }));
        }
        Ok(())
    }

    /// Bind one value read by the next `i18n_apply`.
    pub fn i18n_exp(&mut self, value: impl Into<BindingValue>) -> ViewResult<()> {
        let (view, _) = self.active_view()?;
        let index = self.frames.next_binding_index();
        let changed = self.binding_updated(view, index, value.into())?;
        self.i18n.set_mask_bit(changed);
        Ok(())
    }

    /// Run the update blocks of the translated block at `index` for the
    /// bindings that changed since the last apply.
    pub fn i18n_apply(&mut self, index: usize) -> ViewResult<()> {
        let state = self.i18n;
        self.i18n.reset();
        if state.counter() == 0 {
            return Ok(());
        }
        let (view, template) = self.active_view()?;
        let block = match template.read().slots.get(index) {
            Some(TemplateSlot::I18n(block)) => block.clone(),
            _ => return Err(ViewError::i18n(format!("no translated block at index {index}"))),
        };
        let bindings_start = self.frames.binding_index() - state.counter();
        tracing::trace!(
            target: targets::I18N,
            index,
            mask = state.change_mask(),
            "applying translated block"
        );
        self.apply_update_blocks(view, &block.update, bindings_start, state.change_mask())
    }

    fn ensure_i18n_node(
        &mut self,
        view: ViewId,
        index: usize,
        create: impl FnOnce(&dyn crate::renderer::Renderer) -> NodeHandle,
    ) -> ViewResult<NodeHandle> {
        let instance = self.views.get_mut(view)?;
        let slot = instance
            .slots
            .get_mut(index)
            .ok_or_else(|| ViewError::i18n(format!("node index {index} is out of range")))?;
        if let Some(native) = slot.native() {
            return Ok(native);
        }
        let native = create(self.renderer.as_ref());
        *slot = Slot::Native(native);
        self.contexts.attach(PatchTarget::Node(native), PatchedData::View(view));
        Ok(native)
    }

    /// Append the rendered root-level translated nodes of `view` to `out`,
    /// the active case of each ICU before its anchor.
    pub(crate) fn collect_i18n_natives(&self, view: ViewId, out: &mut Vec<NodeHandle>) -> ViewResult<()> {
        let roots = self.views.get(view)?.template.read().i18n_roots.clone();
        for index in roots {
            self.collect_i18n_node(view, index, out)?;
        }
        Ok(())
    }

    fn collect_i18n_node(&self, view: ViewId, index: usize, out: &mut Vec<NodeHandle>) -> ViewResult<()> {
        let icu = match self.views.get(view)?.template.read().slots.get(index) {
            Some(TemplateSlot::Icu(icu)) => Some(icu.clone()),
            _ => None,
        };
        if let Some(icu) = icu {
            if let Some(case) = self.icu_case(view, &icu)?.case {
                for op in icu.create.get(case).into_iter().flatten() {
                    if let IcuCreateOp::AppendChild { parent: None, child } = op {
                        self.collect_i18n_node(view, *child, out)?;
                    }
                }
            }
        }
        out.extend(self.i18n_native(view, index)?);
        Ok(())
    }

    fn i18n_native(&self, view: ViewId, index: usize) -> ViewResult<Option<NodeHandle>> {
        Ok(self.views.get(view)?.slot(index).and_then(Slot::native))
    }

    fn icu_at(&self, view: ViewId, anchor: usize) -> ViewResult<Arc<IcuExpression>> {
        let template = self.views.get(view)?.template.clone();
        let data = template.read();
        match data.slots.get(anchor) {
            Some(TemplateSlot::Icu(icu)) => Ok(icu.clone()),
            _ => Err(ViewError::i18n(format!(
                "no ICU expression at index {anchor} in template '{}'",
                template.name()
            ))),
        }
    }

    fn icu_case(&self, view: ViewId, icu: &IcuExpression) -> ViewResult<IcuCaseState> {
        Ok(match self.views.get(view)?.slot(icu.case_slot) {
            Some(Slot::IcuCase(state)) => *state,
            _ => IcuCaseState::default(),
        })
    }

    fn set_icu_case(&mut self, view: ViewId, icu: &IcuExpression, state: IcuCaseState) -> ViewResult<()> {
        let slot = self
            .views
            .get_mut(view)?
            .slots
            .get_mut(icu.case_slot)
            .ok_or_else(|| ViewError::i18n(format!("ICU case slot {} is out of range", icu.case_slot)))?;
        *slot = Slot::IcuCase(state);
        Ok(())
    }

    fn apply_update_blocks(
        &mut self,
        view: ViewId,
        blocks: &[UpdateBlock],
        bindings_start: usize,
        mask: u32,
    ) -> ViewResult<()> {
        for block in blocks {
            if block.mask & mask != 0 {
                let mut value = String::new();
                for op in &block.ops {
                    match op {
                        UpdateOp::Text(text) => value.push_str(text),
                        UpdateOp::Expr(offset) => {
                            if let Some(Slot::Binding(bound)) = self.views.get(view)?.slot(bindings_start + offset) {
                                value.push_str(&bound.render_text());
                            }
                        }
                        UpdateOp::SetText(node) => {
                            if let Some(native) = self.i18n_native(view, *node)? {
                                self.renderer.set_value(native, &value);
                            }
                        }
                        UpdateOp::SetAttr { node, name } => {
                            self.set_i18n_attribute(view, *node, name, &value)?;
                        }
                        UpdateOp::IcuSwitch(anchor) => {
                            let icu = self.icu_at(view, *anchor)?;
                            self.apply_icu_switch_case(view, &icu, &value)?;
                        }
                        UpdateOp::IcuUpdate(anchor) => {
                            let icu = self.icu_at(view, *anchor)?;
                            self.apply_icu_update_case(view, &icu, bindings_start, mask)?;
                        }
                    }
                }
            } else if let Some(UpdateOp::IcuUpdate(anchor)) = block.ops.first() {
                // The mask missed, but a case switched in this apply still
                // needs its first update.
                let icu = self.icu_at(view, *anchor)?;
                if self.icu_case(view, &icu)?.fresh {
                    self.apply_icu_update_case(view, &icu, bindings_start, mask)?;
                }
            }
        }
        Ok(())
    }

    fn set_i18n_attribute(&mut self, view: ViewId, node: usize, name: &str, value: &str) -> ViewResult<()> {
        let template = self.views.get(view)?.template.clone();
        let is_template_node = template.read().node(node).is_some();
        if is_template_node {
            return self.element_property(view, node, name, BindingValue::from(value));
        }
        // ICU content has no template node and no directives.
        if let Some(native) = self.i18n_native(view, node)? {
            self.renderer.set_attribute(native, name, value, None);
        }
        Ok(())
    }

    fn apply_icu_update_case(
        &mut self,
        view: ViewId,
        icu: &IcuExpression,
        bindings_start: usize,
        mask: u32,
    ) -> ViewResult<()> {
        let mut state = self.icu_case(view, icu)?;
        let Some(case) = state.case else {
            return Ok(());
        };
        let mut mask = mask;
        if state.fresh {
            state.fresh = false;
            self.set_icu_case(view, icu, state)?;
            mask = u32::MAX;
        }
        let blocks = icu.update.get(case).cloned().unwrap_or_default();
        self.apply_update_blocks(view, &blocks, bindings_start, mask)
    }

    fn apply_icu_switch_case(&mut self, view: ViewId, icu: &IcuExpression, value: &str) -> ViewResult<()> {
        let case = icu.case_index(value, &self.config.locale);
        let current = self.icu_case(view, icu)?;
        if current.case == case {
            return Ok(());
        }
        tracing::trace!(
            target: targets::I18N,
            anchor = icu.anchor,
            from = ?current.case,
            to = ?case,
            "ICU case switched"
        );
        self.remove_icu_case(view, icu)?;
        self.set_icu_case(
            view,
            icu,
            IcuCaseState {
                case,
                fresh: case.is_some(),
            },
        )?;
        if let Some(case) = case {
            if let Some(anchor) = self.i18n_native(view, icu.anchor)? {
                let ops = icu.create.get(case).cloned().unwrap_or_default();
                self.apply_icu_create_ops(view, &ops, anchor)?;
            }
        }
        Ok(())
    }

    fn remove_icu_case(&mut self, view: ViewId, icu: &IcuExpression) -> ViewResult<()> {
        let Some(case) = self.icu_case(view, icu)?.case else {
            return Ok(());
        };
        let removals = icu.remove.get(case).cloned().unwrap_or_default();
        for op in removals {
            match op {
                IcuRemoveOp::Node(index) => {
                    if let Some(native) = self.i18n_native(view, index)? {
                        let parent = self.renderer.parent_node(native);
                        self.renderer.remove_child(parent, native);
                    }
                }
                IcuRemoveOp::Icu(anchor) => {
                    let nested = self.icu_at(view, anchor)?;
                    self.remove_icu_case(view, &nested)?;
                }
            }
        }
        Ok(())
    }

    fn apply_icu_create_ops(&mut self, view: ViewId, ops: &[IcuCreateOp], anchor: NodeHandle) -> ViewResult<()> {
        let root = self.renderer.parent_node(anchor);
        for op in ops {
            match op {
                IcuCreateOp::Text { index, value } => {
                    self.ensure_i18n_node(view, *index, |r| r.create_text(value))?;
                }
                IcuCreateOp::Comment { index, value } => {
                    self.ensure_i18n_node(view, *index, |r| r.create_comment(value))?;
                }
                IcuCreateOp::Element { index, tag } => {
                    self.ensure_i18n_node(view, *index, |r| r.create_element(tag, None))?;
                }
                IcuCreateOp::AppendChild { parent, child } => {
                    let (parent_native, before) = match parent {
                        None => (root, Some(anchor)),
                        Some(parent) => (self.i18n_native(view, *parent)?, None),
                    };
                    // Without a parent the view is not attached yet; its root
                    // nodes are picked up when it is inserted.
                    let Some(parent_native) = parent_native else {
                        continue;
                    };
                    let child_native = self
                        .i18n_native(view, *child)?
                        .ok_or_else(|| ViewError::i18n(format!("ICU child {child} was never created")))?;
                    self.renderer.insert_before(parent_native, child_native, before, false);

                    // A nested ICU that was rendered before comes back with
                    // its active case.
                    let nested = match self.views.get(view)?.template.read().slots.get(*child) {
                        Some(TemplateSlot::Icu(nested)) => Some(nested.clone()),
                        _ => None,
                    };
                    if let Some(nested) = nested {
                        if let Some(case) = self.icu_case(view, &nested)?.case {
                            let ops = nested.create.get(case).cloned().unwrap_or_default();
                            self.apply_icu_create_ops(view, &ops, child_native)?;
                        }
                    }
                }
                IcuCreateOp::Attr { element, name, value } => {
                    if let Some(native) = self.i18n_native(view, *element)? {
                        self.renderer.set_attribute(native, name, value, None);
                    }
                }
            }
        }
        Ok(())
    }
}
