//! The compiled expression tree.
//!
//! [`Expr`] is a closed sum over every expression and instruction kind the
//! runtime knows. Each node supports the static rewrite pipeline
//! (`simplify`, `type_check`, `optimize`, each consuming the node and
//! returning its replacement) and three evaluation styles:
//!
//! | Method | Produces |
//! |---|---|
//! | [`Expr::evaluate_item`] | at most one item |
//! | [`Expr::iterate`] | a lazy [`SequenceIterator`](crate::iter::SequenceIterator) |
//! | [`Expr::process`] | events pushed to the context's receiver |
//!
//! Every node can be evaluated in every style. Instructions prefer pushing,
//! so iterating one captures its output into a sequence first; plain
//! expressions prefer pulling, so processing one appends its items to the
//! receiver.
pub mod functions;
pub mod parser;
pub mod visitor;
pub mod xpath;

use crate::context::XPathContext;
use crate::error::{Location, Result, XsltError};
use crate::instruct::block::{Block, BlockIterator};
use crate::instruct::choose::Choose;
use crate::instruct::for_each::ForEach;
use crate::instruct::for_each_group::ForEachGroup;
use crate::instruct::message::Message;
use crate::instruct::nodes::{
    AttributeCreator, CommentInstr, CopyOf, DocumentInstr, ElementCreator,
    ProcessingInstructionInstr, ShallowCopy, ValueOf,
};
use crate::instruct::result_document::ResultDocument;
use crate::instruct::templates::{ApplyImports, ApplyTemplates, CallTemplate, NextMatch};
use crate::instruct::variables::{Let, LocalParam};
use crate::iter::{ListIterator, SeqIter, collect_sequence, empty_iterator, singleton_iterator};
use crate::tail_call::{TailCall, drive};
use crate::types::{Cardinality, ItemType, SequenceType};
use std::ops::BitOr;
use trellis_xdm::{AtomicType, AtomicValue, Item, NodeKind, Sequence};

pub use functions::{FunctionCall, SystemFunction, UserFunctionCall};
pub use parser::parse_xpath;
pub use visitor::ExpressionVisitor;
pub use xpath::{
    Arithmetic, ArithmeticOp, Axis, AxisStep, CompareOp, Comparison, Convert, ErrorExpr, NodeTest,
    VariableBinding, VariableRef,
};

/// The evaluation styles an expression implements natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplementationMethod(u8);

impl ImplementationMethod {
    pub const EVALUATE: Self = Self(1);
    pub const ITERATE: Self = Self(2);
    pub const PROCESS: Self = Self(4);

    pub fn contains(self, other: ImplementationMethod) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ImplementationMethod {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Sequence),
    ContextItem,
    Root,
    Axis(AxisStep),
    /// `start/step`: the step is evaluated once per item of `start`.
    Path(Box<Expr>, Box<Expr>),
    /// `base[predicate]`
    Filter(Box<Expr>, Box<Expr>),
    VariableRef(VariableRef),
    Compare(Comparison),
    Arithmetic(Arithmetic),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    FunctionCall(FunctionCall),
    UserFunctionCall(UserFunctionCall),
    Convert(Convert),
    Error(ErrorExpr),

    Block(Block),
    Choose(Choose),
    ForEach(ForEach),
    ForEachGroup(ForEachGroup),
    ApplyTemplates(ApplyTemplates),
    ApplyImports(ApplyImports),
    NextMatch(NextMatch),
    CallTemplate(CallTemplate),
    Element(ElementCreator),
    Attribute(AttributeCreator),
    Copy(ShallowCopy),
    CopyOf(CopyOf),
    Document(DocumentInstr),
    ValueOf(ValueOf),
    Comment(CommentInstr),
    ProcessingInstruction(ProcessingInstructionInstr),
    Let(Let),
    LocalParam(LocalParam),
    Message(Message),
    ResultDocument(ResultDocument),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::empty()
    }
}

impl Expr {
    // Construction helpers

    pub fn empty() -> Expr {
        Expr::Literal(Sequence::empty())
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(Sequence::singleton(AtomicValue::String(value.into())))
    }

    pub fn integer(value: i64) -> Expr {
        Expr::Literal(Sequence::singleton(AtomicValue::Integer(value)))
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Literal(Sequence::singleton(AtomicValue::Boolean(value)))
    }

    /// Parses an XPath expression that uses no namespace prefixes.
    pub fn xpath(text: &str) -> Result<Expr> {
        parse_xpath(text, &trellis_xdm::StaticNamespaces::new())
    }

    pub fn as_literal(&self) -> Option<&Sequence> {
        match self {
            Expr::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty_literal(&self) -> bool {
        self.as_literal().is_some_and(Sequence::is_empty)
    }

    /// True for a literal whose effective boolean value is statically true.
    pub fn is_literal_true(&self) -> bool {
        self.as_literal()
            .is_some_and(|v| v.effective_boolean_value().unwrap_or(false))
    }

    pub fn is_literal_false(&self) -> bool {
        self.as_literal()
            .is_some_and(|v| v.effective_boolean_value().is_ok_and(|b| !b))
    }

    /// Attaches a source location to instructions that record one.
    pub fn at(mut self, location: Location) -> Expr {
        if let Some(slot) = self.location_slot() {
            *slot = Some(location);
        }
        self
    }

    fn location_slot(&mut self) -> Option<&mut Option<Location>> {
        match self {
            Expr::ApplyTemplates(a) => Some(&mut a.location),
            Expr::CallTemplate(c) => Some(&mut c.location),
            Expr::Element(e) => Some(&mut e.location),
            Expr::Attribute(a) => Some(&mut a.location),
            Expr::CopyOf(c) => Some(&mut c.location),
            Expr::ForEach(f) => Some(&mut f.location),
            Expr::ForEachGroup(g) => Some(&mut g.location),
            Expr::Message(m) => Some(&mut m.location),
            Expr::ResultDocument(r) => Some(&mut r.location),
            Expr::LocalParam(p) => Some(&mut p.location),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Expr::ApplyTemplates(a) => a.location.as_ref(),
            Expr::CallTemplate(c) => c.location.as_ref(),
            Expr::Element(e) => e.location.as_ref(),
            Expr::Attribute(a) => a.location.as_ref(),
            Expr::CopyOf(c) => c.location.as_ref(),
            Expr::ForEach(f) => f.location.as_ref(),
            Expr::ForEachGroup(g) => g.location.as_ref(),
            Expr::Message(m) => m.location.as_ref(),
            Expr::ResultDocument(r) => r.location.as_ref(),
            Expr::LocalParam(p) => p.location.as_ref(),
            _ => None,
        }
    }

    fn locate(&self, err: XsltError) -> XsltError {
        match self.location() {
            Some(location) => err.with_location(location),
            None => err,
        }
    }

    // Tree structure

    pub fn is_instruction(&self) -> bool {
        matches!(
            self,
            Expr::Block(_)
                | Expr::Choose(_)
                | Expr::ForEach(_)
                | Expr::ForEachGroup(_)
                | Expr::ApplyTemplates(_)
                | Expr::ApplyImports(_)
                | Expr::NextMatch(_)
                | Expr::CallTemplate(_)
                | Expr::Element(_)
                | Expr::Attribute(_)
                | Expr::Copy(_)
                | Expr::CopyOf(_)
                | Expr::Document(_)
                | Expr::ValueOf(_)
                | Expr::Comment(_)
                | Expr::ProcessingInstruction(_)
                | Expr::Let(_)
                | Expr::LocalParam(_)
                | Expr::Message(_)
                | Expr::ResultDocument(_)
        )
    }

    pub fn implementation_method(&self) -> ImplementationMethod {
        match self {
            Expr::Block(_) | Expr::Choose(_) | Expr::Let(_) | Expr::ForEach(_) => {
                ImplementationMethod::ITERATE | ImplementationMethod::PROCESS
            }
            Expr::Literal(_) | Expr::ContextItem | Expr::VariableRef(_) | Expr::Range(..) => {
                ImplementationMethod::EVALUATE | ImplementationMethod::ITERATE
            }
            Expr::Axis(_) | Expr::Path(..) | Expr::Filter(..) => ImplementationMethod::ITERATE,
            Expr::FunctionCall(f) if f.function.is_sequence_valued() => {
                ImplementationMethod::ITERATE
            }
            Expr::UserFunctionCall(_) => ImplementationMethod::ITERATE,
            e if e.is_instruction() => ImplementationMethod::PROCESS,
            _ => ImplementationMethod::EVALUATE,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::ContextItem | Expr::Root | Expr::Axis(_) => vec![],
            Expr::VariableRef(_) | Expr::Error(_) => vec![],
            Expr::Path(a, b)
            | Expr::Filter(a, b)
            | Expr::And(a, b)
            | Expr::Or(a, b)
            | Expr::Range(a, b) => vec![&**a, &**b],
            Expr::Compare(c) => vec![&*c.lhs, &*c.rhs],
            Expr::Arithmetic(a) => vec![&*a.lhs, &*a.rhs],
            Expr::Negate(e) => vec![&**e],
            Expr::FunctionCall(f) => f.args.iter().collect(),
            Expr::UserFunctionCall(f) => f.args.iter().collect(),
            Expr::Convert(c) => vec![&*c.operand],
            Expr::Block(b) => b.children.iter().collect(),
            Expr::Choose(c) => c
                .branches
                .iter()
                .flat_map(|(cond, action)| [cond, action])
                .collect(),
            Expr::ForEach(f) => f.children(),
            Expr::ForEachGroup(g) => g.children(),
            Expr::ApplyTemplates(a) => a.children(),
            Expr::ApplyImports(a) => a.children(),
            Expr::NextMatch(n) => n.children(),
            Expr::CallTemplate(c) => c.children(),
            Expr::Element(e) => e.children(),
            Expr::Attribute(a) => a.children(),
            Expr::Copy(c) => vec![&*c.content],
            Expr::CopyOf(c) => vec![&*c.select],
            Expr::Document(d) => vec![&*d.content],
            Expr::ValueOf(v) => vec![&*v.select],
            Expr::Comment(c) => vec![&*c.select],
            Expr::ProcessingInstruction(p) => vec![&*p.name, &*p.select],
            Expr::Let(l) => vec![&*l.select, &*l.action],
            Expr::LocalParam(p) => p.default.iter().map(|d| &**d).collect(),
            Expr::Message(m) => vec![&*m.select],
            Expr::ResultDocument(r) => r.children(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Literal(_) | Expr::ContextItem | Expr::Root | Expr::Axis(_) => vec![],
            Expr::VariableRef(_) | Expr::Error(_) => vec![],
            Expr::Path(a, b)
            | Expr::Filter(a, b)
            | Expr::And(a, b)
            | Expr::Or(a, b)
            | Expr::Range(a, b) => vec![&mut **a, &mut **b],
            Expr::Compare(c) => vec![&mut *c.lhs, &mut *c.rhs],
            Expr::Arithmetic(a) => vec![&mut *a.lhs, &mut *a.rhs],
            Expr::Negate(e) => vec![&mut **e],
            Expr::FunctionCall(f) => f.args.iter_mut().collect(),
            Expr::UserFunctionCall(f) => f.args.iter_mut().collect(),
            Expr::Convert(c) => vec![&mut *c.operand],
            Expr::Block(b) => b.children.iter_mut().collect(),
            Expr::Choose(c) => c
                .branches
                .iter_mut()
                .flat_map(|(cond, action)| [cond, action])
                .collect(),
            Expr::ForEach(f) => f.children_mut(),
            Expr::ForEachGroup(g) => g.children_mut(),
            Expr::ApplyTemplates(a) => a.children_mut(),
            Expr::ApplyImports(a) => a.children_mut(),
            Expr::NextMatch(n) => n.children_mut(),
            Expr::CallTemplate(c) => c.children_mut(),
            Expr::Element(e) => e.children_mut(),
            Expr::Attribute(a) => a.children_mut(),
            Expr::Copy(c) => vec![&mut *c.content],
            Expr::CopyOf(c) => vec![&mut *c.select],
            Expr::Document(d) => vec![&mut *d.content],
            Expr::ValueOf(v) => vec![&mut *v.select],
            Expr::Comment(c) => vec![&mut *c.select],
            Expr::ProcessingInstruction(p) => vec![&mut *p.name, &mut *p.select],
            Expr::Let(l) => vec![&mut *l.select, &mut *l.action],
            Expr::LocalParam(p) => p.default.iter_mut().map(|d| &mut **d).collect(),
            Expr::Message(m) => vec![&mut *m.select],
            Expr::ResultDocument(r) => r.children_mut(),
        }
    }

    /// Replaces every direct child with `f(child)`.
    pub fn rewrite_children<F>(mut self, mut f: F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        for child in self.children_mut() {
            let taken = std::mem::take(child);
            *child = f(taken)?;
        }
        Ok(self)
    }

    /// Visits this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Whether evaluating this node in the current focus calls `last()`.
    /// Subexpressions evaluated under a different focus do not count.
    pub fn depends_on_last(&self) -> bool {
        match self {
            Expr::FunctionCall(f) if f.function == SystemFunction::Last => true,
            Expr::Path(start, _) | Expr::Filter(start, _) => start.depends_on_last(),
            Expr::ForEach(f) => f.select.depends_on_last(),
            Expr::ForEachGroup(g) => g.select.depends_on_last(),
            Expr::ApplyTemplates(a) => {
                a.select.as_deref().is_some_and(Expr::depends_on_last)
                    || a.params.iter().chain(&a.tunnel_params).any(|p| p.select.depends_on_last())
            }
            other => other.children().iter().any(|c| c.depends_on_last()),
        }
    }

    pub fn static_type(&self) -> SequenceType {
        use Cardinality::*;
        match self {
            Expr::Literal(value) => literal_type(value),
            Expr::ContextItem => SequenceType::new(ItemType::AnyItem, ExactlyOne),
            Expr::Root => SequenceType::new(ItemType::Node(NodeKind::Document), ExactlyOne),
            Expr::Axis(step) => SequenceType::new(step.item_type(), ZeroOrMore),
            Expr::Path(_, step) => SequenceType::new(step.static_type().item, ZeroOrMore),
            Expr::Filter(base, _) => SequenceType::new(base.static_type().item, ZeroOrMore),
            Expr::Compare(c) => SequenceType::new(
                ItemType::Atomic(AtomicType::Boolean),
                if c.general { ExactlyOne } else { ZeroOrOne },
            ),
            Expr::Arithmetic(_) | Expr::Negate(_) => {
                SequenceType::new(ItemType::Atomic(AtomicType::Numeric), ZeroOrOne)
            }
            Expr::And(..) | Expr::Or(..) => SequenceType::single_atomic(AtomicType::Boolean),
            Expr::Range(..) => SequenceType::new(ItemType::Atomic(AtomicType::Integer), ZeroOrMore),
            Expr::FunctionCall(f) => f.static_type(),
            Expr::Convert(c) => c.required,
            Expr::VariableRef(_) | Expr::UserFunctionCall(_) | Expr::Error(_) => SequenceType::ANY,
            Expr::Block(b) => b.static_type(),
            Expr::Choose(c) => c.static_type(),
            Expr::Let(l) => l.action.static_type(),
            Expr::Element(_) => SequenceType::new(ItemType::Node(NodeKind::Element), ExactlyOne),
            Expr::Attribute(_) => SequenceType::new(ItemType::Node(NodeKind::Attribute), ExactlyOne),
            Expr::Document(_) => SequenceType::new(ItemType::Node(NodeKind::Document), ExactlyOne),
            Expr::Comment(_) => SequenceType::new(ItemType::Node(NodeKind::Comment), ExactlyOne),
            Expr::ProcessingInstruction(_) => SequenceType::new(
                ItemType::Node(NodeKind::ProcessingInstruction),
                ExactlyOne,
            ),
            Expr::ValueOf(_) => SequenceType::new(ItemType::Node(NodeKind::Text), ZeroOrOne),
            Expr::CopyOf(c) => c.select.static_type(),
            Expr::Copy(_) => SequenceType::new(ItemType::AnyItem, ZeroOrOne),
            Expr::LocalParam(_) | Expr::Message(_) | Expr::ResultDocument(_) => SequenceType::EMPTY,
            Expr::ForEach(_)
            | Expr::ForEachGroup(_)
            | Expr::ApplyTemplates(_)
            | Expr::ApplyImports(_)
            | Expr::NextMatch(_)
            | Expr::CallTemplate(_) => SequenceType::ANY,
        }
    }

    // Static rewrite pipeline

    pub fn simplify(self, visitor: &mut ExpressionVisitor) -> Result<Expr> {
        match self {
            Expr::Block(b) => b.simplify(visitor),
            Expr::Choose(c) => c.simplify(visitor),
            Expr::FunctionCall(f) => f.simplify(visitor),
            other => other.rewrite_children(|c| c.simplify(visitor)),
        }
    }

    /// Checks static types and rewrites accordingly. `context_item` is the
    /// static type of the context item, when known.
    pub fn type_check(
        self,
        visitor: &mut ExpressionVisitor,
        context_item: Option<ItemType>,
    ) -> Result<Expr> {
        match self {
            Expr::Axis(step) => {
                if context_item.is_some_and(|t| t.is_atomic()) {
                    return Err(XsltError::type_error(
                        "XPTY0020",
                        format!("Axis step {} requires a node as context item", step),
                    ));
                }
                Ok(Expr::Axis(step))
            }
            Expr::Path(start, step) => {
                let start = start.type_check(visitor, context_item)?;
                let inner = Some(start.static_type().item);
                let step = step.type_check(visitor, inner)?;
                Ok(Expr::Path(Box::new(start), Box::new(step)))
            }
            Expr::Filter(base, predicate) => {
                let base = base.type_check(visitor, context_item)?;
                let inner = Some(base.static_type().item);
                let predicate = predicate.type_check(visitor, inner)?;
                Ok(Expr::Filter(Box::new(base), Box::new(predicate)))
            }
            Expr::Arithmetic(a) => a.type_check(visitor, context_item),
            Expr::Convert(c) => c.type_check(visitor, context_item),
            Expr::Choose(c) => c.type_check(visitor, context_item),
            Expr::ForEach(f) => f.type_check(visitor, context_item),
            Expr::ForEachGroup(g) => g.type_check(visitor, context_item),
            other => other.rewrite_children(|c| c.type_check(visitor, context_item)),
        }
    }

    pub fn optimize(
        self,
        visitor: &mut ExpressionVisitor,
        context_item: Option<ItemType>,
    ) -> Result<Expr> {
        let expr = self.rewrite_children(|c| c.optimize(visitor, context_item))?;
        match expr {
            Expr::And(a, b) => {
                if a.is_literal_false() || b.is_literal_false() {
                    visitor.record_rewrite("and() with a false operand");
                    Ok(Expr::boolean(false))
                } else if a.is_literal_true() && b.is_literal_true() {
                    Ok(Expr::boolean(true))
                } else {
                    Ok(Expr::And(a, b))
                }
            }
            Expr::Or(a, b) => {
                if a.is_literal_true() || b.is_literal_true() {
                    visitor.record_rewrite("or() with a true operand");
                    Ok(Expr::boolean(true))
                } else if a.is_literal_false() && b.is_literal_false() {
                    Ok(Expr::boolean(false))
                } else {
                    Ok(Expr::Or(a, b))
                }
            }
            // A numeric literal is positional, so only `true()` can go.
            Expr::Filter(base, predicate)
                if matches!(
                    predicate.as_literal().map(Sequence::items),
                    Some([Item::Atomic(AtomicValue::Boolean(true))])
                ) =>
            {
                visitor.record_rewrite("filter with a true predicate");
                Ok(*base)
            }
            Expr::Choose(c) => c.prune(visitor),
            Expr::Block(b) => b.simplify(visitor),
            other => Ok(other),
        }
    }

    // Evaluation

    pub fn evaluate_item<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<Item>> {
        match self {
            Expr::Literal(value) => Ok(value.first().cloned()),
            Expr::ContextItem => Ok(Some(ctx.context_item()?.clone())),
            Expr::Root => xpath::root(ctx).map(Some),
            Expr::Compare(c) => c.evaluate_item(ctx),
            Expr::Arithmetic(a) => a.evaluate_item(ctx),
            Expr::Negate(operand) => xpath::negate(operand, ctx),
            Expr::And(a, b) => Ok(Some(Item::from(AtomicValue::Boolean(
                a.effective_boolean_value(ctx)? && b.effective_boolean_value(ctx)?,
            )))),
            Expr::Or(a, b) => Ok(Some(Item::from(AtomicValue::Boolean(
                a.effective_boolean_value(ctx)? || b.effective_boolean_value(ctx)?,
            )))),
            Expr::FunctionCall(f) => f.evaluate_item(ctx),
            Expr::Error(e) => Err(e.error.clone()),
            _ => self.iterate(ctx)?.next(),
        }
    }

    pub fn iterate<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
        match self {
            Expr::Literal(value) => Ok(ListIterator::boxed(value.clone())),
            Expr::ContextItem | Expr::Root => Ok(singleton_iterator(self.evaluate_item(ctx)?)),
            Expr::Axis(step) => step.iterate(ctx),
            Expr::Path(start, step) => xpath::iterate_path(start, step, ctx),
            Expr::Filter(base, predicate) => xpath::iterate_filter(base, predicate, ctx),
            Expr::VariableRef(v) => Ok(ListIterator::boxed(v.evaluate(ctx)?)),
            Expr::Range(from, to) => xpath::iterate_range(from, to, ctx),
            Expr::FunctionCall(f) => f.iterate(ctx),
            Expr::UserFunctionCall(f) => Ok(ListIterator::boxed(f.call(ctx)?)),
            Expr::Convert(c) => Ok(ListIterator::boxed(c.evaluate(ctx)?)),
            Expr::Error(e) => Err(e.error.clone()),
            Expr::Compare(_)
            | Expr::Arithmetic(_)
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Negate(_) => Ok(singleton_iterator(self.evaluate_item(ctx)?)),
            Expr::Block(b) => Ok(Box::new(BlockIterator::new(&b.children, ctx.clone()))),
            Expr::Choose(c) => match c.select_action(ctx)? {
                Some(action) => action.iterate(ctx),
                None => Ok(empty_iterator()),
            },
            Expr::ForEach(f) => f.iterate(ctx).map_err(|e| self.locate(e)),
            Expr::Let(l) => {
                l.bind(ctx)?;
                l.action.iterate(ctx)
            }
            _ => Ok(ListIterator::boxed(ctx.capture(|c| self.process(c))?)),
        }
    }

    /// Pushes the result to the context's receiver, running any tail call
    /// this node leaves behind.
    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        drive(self.process_leaving_tail(ctx)?)
    }

    /// Pushes the result to the context's receiver. A node in tail position
    /// may return the call it would make last instead of making it.
    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let result = match self {
            Expr::Block(b) => b.process_leaving_tail(ctx),
            Expr::Choose(c) => c.process_leaving_tail(ctx),
            Expr::Let(l) => l.bind(ctx).and_then(|_| l.action.process_leaving_tail(ctx)),
            Expr::ForEach(f) => f.process(ctx).map(|_| None),
            Expr::ForEachGroup(g) => g.process(ctx).map(|_| None),
            Expr::ApplyTemplates(a) => a.process_leaving_tail(ctx),
            Expr::ApplyImports(a) => a.process_leaving_tail(ctx),
            Expr::NextMatch(n) => n.process_leaving_tail(ctx),
            Expr::CallTemplate(c) => c.process_leaving_tail(ctx),
            Expr::Element(e) => e.process(ctx).map(|_| None),
            Expr::Attribute(a) => a.process(ctx).map(|_| None),
            Expr::Copy(c) => c.process(ctx).map(|_| None),
            Expr::CopyOf(c) => c.process(ctx).map(|_| None),
            Expr::Document(d) => d.process(ctx).map(|_| None),
            Expr::ValueOf(v) => v.process(ctx).map(|_| None),
            Expr::Comment(c) => c.process(ctx).map(|_| None),
            Expr::ProcessingInstruction(p) => p.process(ctx).map(|_| None),
            Expr::LocalParam(p) => p.process(ctx).map(|_| None),
            Expr::Message(m) => m.process(ctx).map(|_| None),
            Expr::ResultDocument(r) => r.process(ctx).map(|_| None),
            Expr::Error(e) => Err(e.error.clone()),
            _ => self.append_items(ctx).map(|_| None),
        };
        result.map_err(|e| self.locate(e))
    }

    fn append_items<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let mut iter = self.iterate(ctx)?;
        while let Some(item) = iter.next()? {
            ctx.receiver().borrow_mut().append(&item, true)?;
        }
        Ok(())
    }

    /// The full value as a sequence. Literals and variable references return
    /// their stored value without copying it.
    pub fn evaluate<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Sequence> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::VariableRef(v) => v.evaluate(ctx),
            Expr::Convert(c) => c.evaluate(ctx),
            Expr::UserFunctionCall(f) => f.call(ctx),
            e if e.is_instruction() && !matches!(e, Expr::Block(_) | Expr::Choose(_) | Expr::Let(_)) => {
                ctx.capture(|c| self.process(c))
            }
            _ => collect_sequence(self.iterate(ctx)?),
        }
    }

    pub fn effective_boolean_value<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<bool> {
        match self {
            Expr::Compare(_) | Expr::And(..) | Expr::Or(..) => match self.evaluate_item(ctx)? {
                Some(Item::Atomic(AtomicValue::Boolean(b))) => Ok(b),
                _ => Ok(false),
            },
            _ => {
                let mut iter = self.iterate(ctx)?;
                let first = match iter.next()? {
                    None => return Ok(false),
                    Some(item) => item,
                };
                if first.is_node() {
                    return Ok(true);
                }
                if iter.next()?.is_some() {
                    return Err(XsltError::type_error(
                        "FORG0006",
                        "Effective boolean value is not defined for a sequence of two or more atomic values",
                    ));
                }
                Ok(trellis_xdm::effective_boolean_value(std::slice::from_ref(&first))?)
            }
        }
    }

    /// The string value of the result, with items separated by `separator`.
    pub fn evaluate_as_string<'e>(&'e self, ctx: &XPathContext<'e>, separator: &str) -> Result<String> {
        let mut out = String::new();
        let mut iter = self.iterate(ctx)?;
        let mut first = true;
        while let Some(item) = iter.next()? {
            if !first {
                out.push_str(separator);
            }
            out.push_str(&item.string_value());
            first = false;
        }
        Ok(out)
    }
}

fn literal_type(value: &Sequence) -> SequenceType {
    let cardinality = match value.len() {
        0 => Cardinality::Empty,
        1 => Cardinality::ExactlyOne,
        _ => Cardinality::OneOrMore,
    };
    let item = value
        .iter()
        .map(|i| match i {
            Item::Atomic(a) => ItemType::Atomic(a.atomic_type()),
            Item::Node(n) => ItemType::Node(n.kind()),
        })
        .reduce(|a, b| a.union(&b))
        .unwrap_or(ItemType::AnyItem);
    SequenceType::new(item, cardinality)
}
