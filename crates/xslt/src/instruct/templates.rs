//! Templates and the instructions that invoke them: `xsl:apply-templates`,
//! `xsl:apply-imports`, `xsl:next-match` and `xsl:call-template`.
use crate::context::{Focus, XPathContext};
use crate::error::{Location, Result, XsltError};
use crate::expr::Expr;
use crate::iter::{ListIterator, collect_items};
use crate::mode::{Mode, Rule, TemplateId};
use crate::params::{ParamId, ParameterSet};
use crate::slots::SlotManager;
use crate::sort::{SortKeyDefinition, SortedIterator};
use crate::tail_call::{ApplyTemplatesPackage, CallTemplatePackage, TailCall, drive};
use crate::types::{RoleLocator, SequenceType, convert_sequence};
use std::rc::Rc;
use trellis_xdm::{Item, NodeHandle, NodeKind, QName, Sequence};

/// A compiled `xsl:template`, invoked by name, by rule, or both.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    pub name: Option<QName>,
    pub body: Expr,
    pub slots: SlotManager,
    /// The `as` attribute, when present.
    pub required_type: Option<SequenceType>,
    pub location: Option<Location>,
}

impl Template {
    pub fn new(id: TemplateId, name: Option<QName>, body: Expr) -> Self {
        Self {
            id,
            name,
            body,
            slots: SlotManager::new(),
            required_type: None,
            location: None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.display_name(),
            None => format!("#{}", self.id),
        }
    }

    /// Runs the body in `ctx`, whose frame and parameters are already set
    /// up. A template with a declared result type runs to completion so
    /// that its result can be converted.
    pub fn apply_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let Some(required) = &self.required_type else {
            return self.body.process_leaving_tail(ctx);
        };
        let value = ctx.capture(|c| self.body.process(c))?;
        let value = convert_sequence(value, required, &RoleLocator::template_result(&self.display_name()))?;
        let mut out = ctx.receiver().borrow_mut();
        for item in value.iter() {
            out.append(item, true)?;
        }
        Ok(None)
    }

    pub fn apply<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        drive(self.apply_leaving_tail(ctx)?)
    }
}

/// `xsl:with-param`.
#[derive(Debug, Clone)]
pub struct WithParam {
    pub name: QName,
    pub id: ParamId,
    pub select: Expr,
    pub tunnel: bool,
    /// Set when the value is known to satisfy the receiving parameter's
    /// declared type.
    pub type_checked: bool,
}

impl WithParam {
    pub fn new(name: QName, id: ParamId, select: Expr) -> Self {
        Self {
            name,
            id,
            select,
            tunnel: false,
            type_checked: false,
        }
    }

    pub fn tunnel(mut self) -> Self {
        self.tunnel = true;
        self
    }
}

fn evaluate_params<'e>(params: &'e [WithParam], ctx: &XPathContext<'e>) -> Result<ParameterSet> {
    let mut set = ParameterSet::with_capacity(params.len());
    for p in params {
        set.put(p.id, p.select.evaluate(ctx)?, p.type_checked);
    }
    Ok(set)
}

/// The caller's tunnel parameters overlaid with any newly supplied ones.
fn assemble_tunnel_params<'e>(params: &'e [WithParam], ctx: &XPathContext<'e>) -> Result<Rc<ParameterSet>> {
    if params.is_empty() {
        return Ok(Rc::clone(ctx.tunnel_parameters()));
    }
    let mut set = ParameterSet::extend_from(ctx.tunnel_parameters(), params.len());
    for p in params {
        set.put(p.id, p.select.evaluate(ctx)?, p.type_checked);
    }
    Ok(Rc::new(set))
}

fn param_children<'a>(params: &'a [WithParam], tunnel_params: &'a [WithParam]) -> Vec<&'a Expr> {
    params.iter().chain(tunnel_params).map(|p| &p.select).collect()
}

fn param_children_mut<'a>(params: &'a mut [WithParam], tunnel_params: &'a mut [WithParam]) -> Vec<&'a mut Expr> {
    params
        .iter_mut()
        .chain(tunnel_params.iter_mut())
        .map(|p| &mut p.select)
        .collect()
}

fn context_node(ctx: &XPathContext<'_>, code: &str, instruction: &str) -> Result<NodeHandle> {
    match ctx.context_item() {
        Ok(Item::Node(node)) => Ok(node.clone()),
        Ok(Item::Atomic(_)) => Err(XsltError::type_error(
            code,
            format!("Cannot call {} when the context item is not a node", instruction),
        )),
        Err(_) => Err(XsltError::dynamic(
            code,
            format!("Cannot call {} when the context item is absent", instruction),
        )),
    }
}

/// Applies the built-in template rule for `node`: recurse into the
/// children of documents and elements, copy the string value of text and
/// attribute nodes, ignore everything else.
fn apply_built_in<'e>(
    node: &NodeHandle,
    mode: &'e Mode,
    params: &Rc<ParameterSet>,
    tunnel_params: &Rc<ParameterSet>,
    ctx: &XPathContext<'e>,
) -> Result<Option<TailCall<'e>>> {
    if !mode.is_default() {
        log::warn!(
            "No rule in mode {} matches {:?}; using the built-in rule",
            mode.display_name(),
            node
        );
    }
    match node.kind() {
        NodeKind::Document | NodeKind::Element => {
            let children: Vec<Item> = node.children().map(Item::Node).collect();
            if children.is_empty() {
                return Ok(None);
            }
            Ok(Some(TailCall::ApplyTemplates(ApplyTemplatesPackage {
                selection: Sequence::from_items(children),
                mode,
                params: Rc::clone(params),
                tunnel_params: Rc::clone(tunnel_params),
                context: ctx.clone(),
            })))
        }
        NodeKind::Text | NodeKind::Attribute => {
            ctx.receiver().borrow_mut().characters(&node.string_value())?;
            Ok(None)
        }
        NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => Ok(None),
    }
}

/// Dispatches every item of `selection` to its best rule in `mode`. Each
/// call but the last is run to completion; the last one's tail call is
/// returned.
pub fn apply_templates<'e>(
    selection: &Sequence,
    mode: &'e Mode,
    params: Rc<ParameterSet>,
    tunnel_params: Rc<ParameterSet>,
    ctx: &XPathContext<'e>,
) -> Result<Option<TailCall<'e>>> {
    let last = selection.len();
    let mut c = ctx.clone();
    c.set_current_mode(Some(mode));
    c.set_local_parameters(Rc::clone(&params));
    c.set_tunnel_parameters(Rc::clone(&tunnel_params));
    let mut previous: Option<TemplateId> = None;
    let mut pending: Option<TailCall<'e>> = None;
    for (i, item) in selection.iter().enumerate() {
        drive(pending.take())?;
        let Item::Node(node) = item else {
            return Err(XsltError::type_error(
                "XTTE0520",
                "apply-templates can only be applied to nodes",
            ));
        };
        c.set_focus(Some(Focus::new(item.clone(), i + 1, Some(last))));
        match mode.get_rule(node, &c)? {
            None => {
                previous = None;
                c.set_current_rule(None);
                pending = apply_built_in(node, mode, &params, &tunnel_params, &c)?;
            }
            Some(rule) => {
                let template = c.executable().template(rule.template)?;
                // Consecutive nodes handled by one template share a frame.
                if previous != Some(rule.template) {
                    c.open_stack_frame(template.slots.number_of_variables());
                    previous = Some(rule.template);
                }
                log::debug!(
                    "Applying template {} to {:?} in mode {}",
                    template.display_name(),
                    node,
                    mode.display_name()
                );
                c.set_current_rule(Some(rule));
                pending = template.apply_leaving_tail(&c)?;
            }
        }
    }
    Ok(pending)
}

/// Which mode an `xsl:apply-templates` dispatches in.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeRef {
    Default,
    /// `#current`
    Current,
    Named(QName),
}

impl ModeRef {
    pub fn resolve<'e>(&self, ctx: &XPathContext<'e>) -> Result<&'e Mode> {
        let exec = ctx.executable();
        match self {
            ModeRef::Default => Ok(exec.default_mode()),
            ModeRef::Current => Ok(ctx.current_mode().unwrap_or_else(|| exec.default_mode())),
            ModeRef::Named(name) => exec.mode(Some(name)).ok_or_else(|| {
                XsltError::dynamic("XTDE0045", format!("Mode {} does not exist", name.display_name()))
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApplyTemplates {
    /// `None` selects the children of the context node.
    pub select: Option<Box<Expr>>,
    pub mode: ModeRef,
    pub params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub sort: Vec<SortKeyDefinition>,
    pub use_tail_recursion: bool,
    pub location: Option<Location>,
}

impl ApplyTemplates {
    pub fn new(select: Option<Expr>, mode: ModeRef) -> Self {
        Self {
            select: select.map(Box::new),
            mode,
            params: Vec::new(),
            tunnel_params: Vec::new(),
            sort: Vec::new(),
            use_tail_recursion: false,
            location: None,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.select.iter().map(|s| &**s).collect();
        out.extend(self.sort.iter().map(|k| &k.select));
        out.extend(param_children(&self.params, &self.tunnel_params));
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out: Vec<&mut Expr> = self.select.iter_mut().map(|s| &mut **s).collect();
        out.extend(self.sort.iter_mut().map(|k| &mut k.select));
        out.extend(param_children_mut(&mut self.params, &mut self.tunnel_params));
        out
    }

    fn selection<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Sequence> {
        let iter = match &self.select {
            Some(select) => select.iterate(ctx)?,
            None => {
                let node = match ctx.context_item() {
                    Ok(Item::Node(node)) => node.clone(),
                    _ => {
                        return Err(XsltError::type_error(
                            "XTTE0510",
                            "apply-templates with no select attribute requires the context item to be a node",
                        ));
                    }
                };
                ListIterator::from_items(node.children().map(Item::Node).collect())
            }
        };
        let mut iter = if self.sort.is_empty() {
            iter
        } else {
            SortedIterator::boxed(iter, &self.sort, ctx)?
        };
        Ok(Sequence::from_items(collect_items(iter.as_mut())?))
    }

    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let selection = self.selection(ctx)?;
        let mode = self.mode.resolve(ctx)?;
        let params = Rc::new(evaluate_params(&self.params, ctx)?);
        let tunnel_params = assemble_tunnel_params(&self.tunnel_params, ctx)?;
        if selection.is_empty() {
            return Ok(None);
        }
        if self.use_tail_recursion {
            return Ok(Some(TailCall::ApplyTemplates(ApplyTemplatesPackage {
                selection,
                mode,
                params,
                tunnel_params,
                context: ctx.clone(),
            })));
        }
        drive(apply_templates(&selection, mode, params, tunnel_params, ctx)?)?;
        Ok(None)
    }
}

/// Runs `rule`'s template on the context node, or the built-in rule when
/// there is none. Shared by `xsl:apply-imports` and `xsl:next-match`.
fn invoke_rule<'e>(
    rule: Option<&'e Rule>,
    node: &NodeHandle,
    params: &'e [WithParam],
    tunnel_params: &'e [WithParam],
    tail: bool,
    ctx: &XPathContext<'e>,
) -> Result<Option<TailCall<'e>>> {
    let mode = ctx
        .current_mode()
        .unwrap_or_else(|| ctx.executable().default_mode());
    let local = Rc::new(evaluate_params(params, ctx)?);
    let tunnel = assemble_tunnel_params(tunnel_params, ctx)?;
    let Some(rule) = rule else {
        let pending = apply_built_in(node, mode, &local, &tunnel, ctx)?;
        if tail {
            return Ok(pending);
        }
        return drive(pending).map(|_| None);
    };
    let template = ctx.executable().template(rule.template)?;
    let mut c = ctx.clone();
    c.open_stack_frame(template.slots.number_of_variables());
    c.set_local_parameters(local);
    c.set_tunnel_parameters(tunnel);
    c.set_current_rule(Some(rule));
    if tail {
        return Ok(Some(TailCall::CallTemplate(CallTemplatePackage { template, context: c })));
    }
    template.apply(&c)?;
    Ok(None)
}

fn current_rule<'e>(ctx: &XPathContext<'e>, instruction: &str) -> Result<&'e Rule> {
    ctx.current_rule().ok_or_else(|| {
        XsltError::dynamic(
            "XTDE0560",
            format!("There is no current template rule for {}", instruction),
        )
    })
}

/// `xsl:apply-imports`: the best rule among the modules the current rule's
/// module imports.
#[derive(Debug, Clone, Default)]
pub struct ApplyImports {
    pub params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub use_tail_recursion: bool,
}

impl ApplyImports {
    pub fn children(&self) -> Vec<&Expr> {
        param_children(&self.params, &self.tunnel_params)
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        param_children_mut(&mut self.params, &mut self.tunnel_params)
    }

    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let current = current_rule(ctx, "xsl:apply-imports")?;
        let node = context_node(ctx, "XTDE0565", "xsl:apply-imports")?;
        let mode = ctx
            .current_mode()
            .unwrap_or_else(|| ctx.executable().default_mode());
        let next = mode.get_rule_in_precedence_range(
            &node,
            current.min_import_precedence,
            current.precedence - 1,
            ctx,
        )?;
        invoke_rule(next, &node, &self.params, &self.tunnel_params, self.use_tail_recursion, ctx)
    }
}

/// `xsl:next-match`: the next rule after the current one in rank order.
#[derive(Debug, Clone, Default)]
pub struct NextMatch {
    pub params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub use_tail_recursion: bool,
}

impl NextMatch {
    pub fn children(&self) -> Vec<&Expr> {
        param_children(&self.params, &self.tunnel_params)
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        param_children_mut(&mut self.params, &mut self.tunnel_params)
    }

    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let current = current_rule(ctx, "xsl:next-match")?;
        let node = context_node(ctx, "XTDE0565", "xsl:next-match")?;
        let mode = ctx
            .current_mode()
            .unwrap_or_else(|| ctx.executable().default_mode());
        let next = mode.get_next_matching_rule(&node, current, ctx)?;
        invoke_rule(next, &node, &self.params, &self.tunnel_params, self.use_tail_recursion, ctx)
    }
}

/// `xsl:call-template`. The target is bound by name when the executable
/// is built.
#[derive(Debug, Clone)]
pub struct CallTemplate {
    pub name: QName,
    pub target: Option<TemplateId>,
    pub params: Vec<WithParam>,
    pub tunnel_params: Vec<WithParam>,
    pub use_tail_recursion: bool,
    pub location: Option<Location>,
}

impl CallTemplate {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            target: None,
            params: Vec::new(),
            tunnel_params: Vec::new(),
            use_tail_recursion: false,
            location: None,
        }
    }

    pub fn with_param(mut self, param: WithParam) -> Self {
        if param.tunnel {
            self.tunnel_params.push(param);
        } else {
            self.params.push(param);
        }
        self
    }

    pub fn children(&self) -> Vec<&Expr> {
        param_children(&self.params, &self.tunnel_params)
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        param_children_mut(&mut self.params, &mut self.tunnel_params)
    }

    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let id = self.target.ok_or_else(|| {
            XsltError::static_error(
                "XTSE0650",
                format!("No template named {} has been declared", self.name.display_name()),
            )
        })?;
        let template = ctx.executable().template(id)?;
        let local = Rc::new(evaluate_params(&self.params, ctx)?);
        let tunnel = assemble_tunnel_params(&self.tunnel_params, ctx)?;
        let mut c = ctx.clone();
        c.open_stack_frame(template.slots.number_of_variables());
        c.set_local_parameters(local);
        c.set_tunnel_parameters(tunnel);
        if self.use_tail_recursion {
            // Nothing in the caller reads its frame after a tail call.
            ctx.clear_stack_frame();
            return Ok(Some(TailCall::CallTemplate(CallTemplatePackage { template, context: c })));
        }
        template.apply(&c)?;
        Ok(None)
    }
}
