//! The XPath expressions instructions are driven by: axis steps, paths,
//! filters, variable references, comparisons, arithmetic and conversion.
use super::{Expr, ExpressionVisitor};
use crate::context::XPathContext;
use crate::error::{Result, XsltError};
use crate::instruct::choose::Choose;
use crate::iter::{ListIterator, SeqIter, SequenceIterator, collect_items, empty_iterator};
use crate::types::{Cardinality, ItemType, RoleLocator, SequenceType, convert_sequence};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;
use trellis_xdm::{AtomicType, AtomicValue, Item, NodeHandle, NodeKind, QName, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    Descendant,
    DescendantOrSelf,
    Namespace,
}

impl Axis {
    /// The node kind a name test on this axis selects.
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Namespace => "namespace",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// A node of the axis' principal kind with this name.
    Name(QName),
    /// `*`
    Wildcard,
    /// `prefix:*`, holding the resolved namespace URI.
    NamespaceWildcard(String),
    /// `*:local`
    LocalWildcard(String),
    /// `node()` when `None`, otherwise `text()`, `comment()` and friends.
    Kind(Option<NodeKind>),
}

impl NodeTest {
    pub fn matches(&self, node: &NodeHandle, principal: NodeKind) -> bool {
        match self {
            NodeTest::Name(name) => node.kind() == principal && node.name() == Some(name),
            NodeTest::Wildcard => node.kind() == principal,
            NodeTest::NamespaceWildcard(uri) => {
                node.kind() == principal && node.name().is_some_and(|n| n.uri == *uri)
            }
            NodeTest::LocalWildcard(local) => node.kind() == principal && node.local_name() == local,
            NodeTest::Kind(None) => true,
            NodeTest::Kind(Some(kind)) => node.kind() == *kind,
        }
    }

    pub fn item_type(&self, principal: NodeKind) -> ItemType {
        match self {
            NodeTest::Kind(None) => ItemType::AnyNode,
            NodeTest::Kind(Some(kind)) => ItemType::Node(*kind),
            _ => ItemType::Node(principal),
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(name) => f.write_str(&name.display_name()),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::NamespaceWildcard(uri) => write!(f, "{{{}}}*", uri),
            NodeTest::LocalWildcard(local) => write!(f, "*:{}", local),
            NodeTest::Kind(kind) => f.write_str(match kind {
                None => "node()",
                Some(NodeKind::Document) => "document-node()",
                Some(NodeKind::Element) => "element()",
                Some(NodeKind::Attribute) => "attribute()",
                Some(NodeKind::Text) => "text()",
                Some(NodeKind::Comment) => "comment()",
                Some(NodeKind::ProcessingInstruction) => "processing-instruction()",
                Some(NodeKind::Namespace) => "namespace-node()",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisStep {
    pub axis: Axis,
    pub test: NodeTest,
}

impl AxisStep {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self { axis, test }
    }

    pub fn item_type(&self) -> ItemType {
        self.test.item_type(self.axis.principal_kind())
    }

    /// The nodes reached from `node`, in document order.
    pub fn select(&self, node: &NodeHandle) -> Vec<NodeHandle> {
        let principal = self.axis.principal_kind();
        let candidates: Vec<NodeHandle> = match self.axis {
            Axis::Child => node.children().collect(),
            Axis::Attribute => node.attributes().collect(),
            Axis::SelfAxis => vec![node.clone()],
            Axis::Parent => node.parent().into_iter().collect(),
            Axis::Descendant => node.descendants().collect(),
            Axis::DescendantOrSelf => std::iter::once(node.clone()).chain(node.descendants()).collect(),
            Axis::Namespace => node.namespaces().collect(),
        };
        candidates
            .into_iter()
            .filter(|n| self.test.matches(n, principal))
            .collect()
    }

    pub fn iterate<'e>(&self, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
        match ctx.context_item()? {
            Item::Node(node) => Ok(ListIterator::from_items(
                self.select(node).into_iter().map(Item::Node).collect(),
            )),
            Item::Atomic(_) => Err(XsltError::type_error(
                "XPTY0020",
                format!("Axis step {} requires a node as context item", self),
            )),
        }
    }
}

impl fmt::Display for AxisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis.name(), self.test)
    }
}

/// The root of the tree containing the context node, which must be a
/// document node.
pub fn root(ctx: &XPathContext<'_>) -> Result<Item> {
    let node = match ctx.context_item()? {
        Item::Node(node) => node.root(),
        Item::Atomic(_) => {
            return Err(XsltError::type_error(
                "XPTY0020",
                "The context item for '/' is not a node",
            ));
        }
    };
    if node.kind() != NodeKind::Document {
        return Err(XsltError::dynamic(
            "XPDY0050",
            "The root of the tree containing the context item is not a document node",
        ));
    }
    Ok(Item::Node(node))
}

/// Evaluates `step` once per item of `start`. Node results are returned in
/// document order without duplicates.
pub fn iterate_path<'e>(start: &'e Expr, step: &'e Expr, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
    let mut base = start.iterate(ctx)?;
    let items = collect_items(base.as_mut())?;
    let last = items.len();
    let mut nodes = Vec::new();
    let mut atomics = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_node() {
            return Err(XsltError::type_error(
                "XPTY0019",
                "The left-hand operand of '/' must be a sequence of nodes",
            ));
        }
        let c = ctx.with_focus(item, index + 1, Some(last));
        let mut results = step.iterate(&c)?;
        while let Some(result) = results.next()? {
            match result {
                Item::Node(n) => nodes.push(n),
                atomic => atomics.push(atomic),
            }
        }
    }
    if !atomics.is_empty() {
        if !nodes.is_empty() {
            return Err(XsltError::type_error(
                "XPTY0018",
                "The result of a path expression mixes nodes and atomic values",
            ));
        }
        return Ok(ListIterator::from_items(atomics));
    }
    nodes.sort();
    nodes.dedup();
    Ok(ListIterator::from_items(nodes.into_iter().map(Item::Node).collect()))
}

pub fn iterate_filter<'e>(base: &'e Expr, predicate: &'e Expr, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
    let mut source = base.iterate(ctx)?;
    let mut last = source.known_length();
    if last.is_none() && predicate.depends_on_last() {
        let items = collect_items(source.as_mut())?;
        last = Some(items.len());
        source = ListIterator::from_items(items);
    }
    Ok(Box::new(FilterIterator {
        base: source,
        predicate,
        ctx: ctx.clone(),
        last,
        current: None,
        position: 0,
    }))
}

/// Whether `predicate` holds for the item at `position`: numeric values are
/// compared with the position, anything else is taken as a boolean.
pub fn predicate_matches<'e>(predicate: &'e Expr, ctx: &XPathContext<'e>, position: usize) -> Result<bool> {
    let value = predicate.evaluate(ctx)?;
    if let [Item::Atomic(a)] = value.items() {
        if a.is_numeric() {
            return Ok(a.to_double() == position as f64);
        }
    }
    Ok(value.effective_boolean_value()?)
}

struct FilterIterator<'e> {
    base: SeqIter<'e>,
    predicate: &'e Expr,
    ctx: XPathContext<'e>,
    last: Option<usize>,
    current: Option<Item>,
    position: usize,
}

impl<'e> SequenceIterator<'e> for FilterIterator<'e> {
    fn next(&mut self) -> Result<Option<Item>> {
        while let Some(item) = self.base.next()? {
            let position = self.base.position();
            let c = self.ctx.with_focus(item.clone(), position, self.last);
            if predicate_matches(self.predicate, &c, position)? {
                self.position += 1;
                self.current = Some(item.clone());
                return Ok(Some(item));
            }
        }
        self.current = None;
        Ok(None)
    }

    fn current(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn get_another(&self) -> Result<SeqIter<'e>> {
        Ok(Box::new(FilterIterator {
            base: self.base.get_another()?,
            predicate: self.predicate,
            ctx: self.ctx.clone(),
            last: self.last,
            current: None,
            position: 0,
        }))
    }
}

pub fn iterate_range<'e>(from: &'e Expr, to: &'e Expr, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
    let (Some(start), Some(end)) = (range_bound(from, ctx)?, range_bound(to, ctx)?) else {
        return Ok(empty_iterator());
    };
    if start > end {
        return Ok(empty_iterator());
    }
    Ok(Box::new(RangeIterator {
        start,
        end,
        next: start,
        current: None,
    }))
}

fn range_bound<'e>(expr: &'e Expr, ctx: &XPathContext<'e>) -> Result<Option<i64>> {
    match atomize_optional(expr, ctx)? {
        None => Ok(None),
        Some(AtomicValue::Integer(i)) => Ok(Some(i)),
        Some(v) if v.is_untyped() => match v.convert_to(AtomicType::Integer)? {
            AtomicValue::Integer(i) => Ok(Some(i)),
            _ => Ok(None),
        },
        Some(v) => Err(XsltError::type_error(
            "XPTY0004",
            format!("Operand of 'to' must be an integer, found {}", v.atomic_type()),
        )),
    }
}

struct RangeIterator {
    start: i64,
    end: i64,
    next: i64,
    current: Option<Item>,
}

impl<'e> SequenceIterator<'e> for RangeIterator {
    fn next(&mut self) -> Result<Option<Item>> {
        if self.next > self.end {
            self.current = None;
            return Ok(None);
        }
        let item = Item::from(AtomicValue::Integer(self.next));
        self.next += 1;
        self.current = Some(item.clone());
        Ok(Some(item))
    }

    fn current(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    fn position(&self) -> usize {
        (self.next - self.start) as usize
    }

    fn get_another(&self) -> Result<SeqIter<'e>> {
        Ok(Box::new(RangeIterator {
            start: self.start,
            end: self.end,
            next: self.start,
            current: None,
        }))
    }

    fn known_length(&self) -> Option<usize> {
        Some((self.end - self.start + 1) as usize)
    }
}

/// Atomizes the value of `expr`, which must have at most one item.
pub fn atomize_optional<'e>(expr: &'e Expr, ctx: &XPathContext<'e>) -> Result<Option<AtomicValue>> {
    let mut iter = expr.iterate(ctx)?;
    let first = match iter.next()? {
        None => return Ok(None),
        Some(item) => item.atomize(),
    };
    if iter.next()?.is_some() {
        return Err(XsltError::type_error(
            "XPTY0004",
            "A sequence of more than one item is not allowed here",
        ));
    }
    Ok(Some(first))
}

// Variables

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableBinding {
    Unresolved,
    Local(usize),
    Global(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub name: QName,
    pub binding: VariableBinding,
}

impl VariableRef {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            binding: VariableBinding::Unresolved,
        }
    }

    pub fn evaluate(&self, ctx: &XPathContext<'_>) -> Result<Sequence> {
        match self.binding {
            VariableBinding::Local(slot) => ctx.evaluate_local_variable(slot),
            VariableBinding::Global(slot) => ctx.executable().global_variable(slot)?.evaluate_variable(ctx),
            VariableBinding::Unresolved => Err(XsltError::static_error(
                "XPST0008",
                format!("Variable ${} has not been declared", self.name.display_name()),
            )),
        }
    }
}

// Comparisons

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub op: CompareOp,
    /// General (`=`, existential over sequences) rather than value (`eq`).
    pub general: bool,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

impl Comparison {
    pub fn new(op: CompareOp, general: bool, lhs: Expr, rhs: Expr) -> Self {
        Self {
            op,
            general,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn evaluate_item<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<Item>> {
        if self.general {
            let left = self.lhs.evaluate(ctx)?.atomize();
            let right = self.rhs.evaluate(ctx)?.atomize();
            for a in &left {
                for b in &right {
                    let (a, b) = general_operands(a, b)?;
                    if compare_atomic(self.op, &a, &b)? {
                        return Ok(Some(Item::from(AtomicValue::Boolean(true))));
                    }
                }
            }
            return Ok(Some(Item::from(AtomicValue::Boolean(false))));
        }
        let (Some(a), Some(b)) = (atomize_optional(&self.lhs, ctx)?, atomize_optional(&self.rhs, ctx)?) else {
            return Ok(None);
        };
        let a = untyped_as_string(a);
        let b = untyped_as_string(b);
        Ok(Some(Item::from(AtomicValue::Boolean(compare_atomic(self.op, &a, &b)?))))
    }
}

fn untyped_as_string(value: AtomicValue) -> AtomicValue {
    match value {
        AtomicValue::UntypedAtomic(s) => AtomicValue::String(s),
        other => other,
    }
}

/// Applies the general comparison conversions of untyped operands.
fn general_operands(a: &AtomicValue, b: &AtomicValue) -> Result<(AtomicValue, AtomicValue)> {
    fn convert_against(untyped: &AtomicValue, other: &AtomicValue) -> Result<AtomicValue> {
        if other.is_numeric() {
            Ok(untyped.convert_to(AtomicType::Double)?)
        } else if other.is_untyped() || matches!(other, AtomicValue::String(_) | AtomicValue::AnyUri(_)) {
            Ok(AtomicValue::String(untyped.to_string_value()))
        } else {
            Ok(untyped.convert_to(other.atomic_type())?)
        }
    }
    match (a.is_untyped(), b.is_untyped()) {
        (true, _) => Ok((convert_against(a, b)?, untyped_as_string(b.clone()))),
        (false, true) => Ok((a.clone(), convert_against(b, a)?)),
        (false, false) => Ok((a.clone(), b.clone())),
    }
}

pub fn compare_atomic(op: CompareOp, a: &AtomicValue, b: &AtomicValue) -> Result<bool> {
    match a.compare(b) {
        Some(_) if matches!(a, AtomicValue::QName(_)) && !op.is_equality() => Err(incomparable(a, b)),
        Some(ordering) => Ok(op.test(ordering)),
        None if a.is_numeric() && b.is_numeric() => Ok(op == CompareOp::Ne),
        None if matches!((a, b), (AtomicValue::QName(_), AtomicValue::QName(_))) && op.is_equality() => {
            Ok(op == CompareOp::Ne)
        }
        None => Err(incomparable(a, b)),
    }
}

fn incomparable(a: &AtomicValue, b: &AtomicValue) -> XsltError {
    XsltError::type_error(
        "XPTY0004",
        format!("Cannot compare {} with {}", a.atomic_type(), b.atomic_type()),
    )
}

// Arithmetic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Plus,
    Minus,
    Times,
    Div,
    IDiv,
    Mod,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Plus => "+",
            ArithmeticOp::Minus => "-",
            ArithmeticOp::Times => "*",
            ArithmeticOp::Div => "div",
            ArithmeticOp::IDiv => "idiv",
            ArithmeticOp::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Arithmetic {
    pub op: ArithmeticOp,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

impl Arithmetic {
    pub fn new(op: ArithmeticOp, lhs: Expr, rhs: Expr) -> Self {
        Self {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn evaluate_item<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<Item>> {
        let (Some(a), Some(b)) = (atomize_optional(&self.lhs, ctx)?, atomize_optional(&self.rhs, ctx)?) else {
            return Ok(None);
        };
        compute(self.op, a, b).map(|v| Some(Item::from(v)))
    }

    /// Checks the operands and folds the operation when both are literals.
    /// A fold that fails becomes an [`ErrorExpr`], raised only if evaluated.
    pub fn type_check(self, visitor: &mut ExpressionVisitor, context_item: Option<ItemType>) -> Result<Expr> {
        let lhs = self.lhs.type_check(visitor, context_item)?;
        let rhs = self.rhs.type_check(visitor, context_item)?;
        if let (Some(a), Some(b)) = (lhs.as_literal(), rhs.as_literal()) {
            if let ([a], [b]) = (a.items(), b.items()) {
                visitor.record_rewrite("constant arithmetic");
                return Ok(match compute(self.op, a.atomize(), b.atomize()) {
                    Ok(value) => Expr::Literal(Sequence::singleton(value)),
                    Err(e) => Expr::Error(ErrorExpr::new(e)),
                });
            }
        }
        Ok(Expr::Arithmetic(Arithmetic::new(self.op, lhs, rhs)))
    }
}

fn numeric_operand(value: AtomicValue) -> Result<AtomicValue> {
    if value.is_untyped() {
        return Ok(value.convert_to(AtomicType::Double)?);
    }
    if !value.is_numeric() {
        return Err(XsltError::type_error(
            "XPTY0004",
            format!("Arithmetic operand must be numeric, found {}", value.atomic_type()),
        ));
    }
    Ok(value)
}

fn overflow() -> XsltError {
    XsltError::dynamic("FOAR0002", "Numeric overflow or underflow")
}

fn division_by_zero() -> XsltError {
    XsltError::dynamic("FOAR0001", "Division by zero")
}

fn to_decimal(value: &AtomicValue) -> Decimal {
    match value {
        AtomicValue::Integer(i) => Decimal::from(*i),
        AtomicValue::Decimal(d) => *d,
        _ => Decimal::ZERO,
    }
}

/// Applies `op` to two atomic operands using XPath numeric promotion.
pub fn compute(op: ArithmeticOp, a: AtomicValue, b: AtomicValue) -> Result<AtomicValue> {
    let a = numeric_operand(a)?;
    let b = numeric_operand(b)?;
    match (&a, &b) {
        (AtomicValue::Integer(x), AtomicValue::Integer(y)) => integer_op(op, *x, *y),
        (AtomicValue::Integer(_) | AtomicValue::Decimal(_), AtomicValue::Integer(_) | AtomicValue::Decimal(_)) => {
            decimal_op(op, to_decimal(&a), to_decimal(&b))
        }
        (AtomicValue::Double(_), _) | (_, AtomicValue::Double(_)) => {
            double_op(op, a.to_double(), b.to_double())
        }
        _ => match double_op(op, a.to_double(), b.to_double())? {
            AtomicValue::Double(d) => Ok(AtomicValue::Float(d as f32)),
            other => Ok(other),
        },
    }
}

fn integer_op(op: ArithmeticOp, x: i64, y: i64) -> Result<AtomicValue> {
    let result = match op {
        ArithmeticOp::Plus => x.checked_add(y),
        ArithmeticOp::Minus => x.checked_sub(y),
        ArithmeticOp::Times => x.checked_mul(y),
        ArithmeticOp::Div => return decimal_op(op, Decimal::from(x), Decimal::from(y)),
        ArithmeticOp::IDiv | ArithmeticOp::Mod if y == 0 => return Err(division_by_zero()),
        ArithmeticOp::IDiv => x.checked_div(y),
        ArithmeticOp::Mod => x.checked_rem(y),
    };
    result.map(AtomicValue::Integer).ok_or_else(overflow)
}

fn decimal_op(op: ArithmeticOp, x: Decimal, y: Decimal) -> Result<AtomicValue> {
    if matches!(op, ArithmeticOp::Div | ArithmeticOp::IDiv | ArithmeticOp::Mod) && y.is_zero() {
        return Err(division_by_zero());
    }
    let result = match op {
        ArithmeticOp::Plus => x.checked_add(y),
        ArithmeticOp::Minus => x.checked_sub(y),
        ArithmeticOp::Times => x.checked_mul(y),
        ArithmeticOp::Div => x.checked_div(y),
        ArithmeticOp::Mod => x.checked_rem(y),
        ArithmeticOp::IDiv => {
            return x
                .checked_div(y)
                .and_then(|q| q.trunc().to_i64())
                .map(AtomicValue::Integer)
                .ok_or_else(overflow);
        }
    };
    result.map(|d| AtomicValue::Decimal(d.normalize())).ok_or_else(overflow)
}

fn double_op(op: ArithmeticOp, x: f64, y: f64) -> Result<AtomicValue> {
    let result = match op {
        ArithmeticOp::Plus => x + y,
        ArithmeticOp::Minus => x - y,
        ArithmeticOp::Times => x * y,
        ArithmeticOp::Div => x / y,
        ArithmeticOp::Mod => x % y,
        ArithmeticOp::IDiv => {
            if y == 0.0 {
                return Err(division_by_zero());
            }
            if x.is_nan() || y.is_nan() || x.is_infinite() {
                return Err(overflow());
            }
            let q = (x / y).trunc();
            if q < i64::MIN as f64 || q > i64::MAX as f64 {
                return Err(overflow());
            }
            return Ok(AtomicValue::Integer(q as i64));
        }
    };
    Ok(AtomicValue::Double(result))
}

pub fn negate<'e>(operand: &'e Expr, ctx: &XPathContext<'e>) -> Result<Option<Item>> {
    let Some(value) = atomize_optional(operand, ctx)? else {
        return Ok(None);
    };
    let negated = match numeric_operand(value)? {
        AtomicValue::Integer(i) => AtomicValue::Integer(i.checked_neg().ok_or_else(overflow)?),
        AtomicValue::Decimal(d) => AtomicValue::Decimal(-d),
        AtomicValue::Float(f) => AtomicValue::Float(-f),
        other => AtomicValue::Double(-other.to_double()),
    };
    Ok(Some(Item::from(negated)))
}

// Conversion

/// Applies the function conversion rules to the value of `operand`.
#[derive(Debug, Clone)]
pub struct Convert {
    pub operand: Box<Expr>,
    pub required: SequenceType,
    pub role: RoleLocator,
}

impl Convert {
    pub fn new(operand: Expr, required: SequenceType, role: RoleLocator) -> Self {
        Self {
            operand: Box::new(operand),
            required,
            role,
        }
    }

    pub fn evaluate<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Sequence> {
        convert_sequence(self.operand.evaluate(ctx)?, &self.required, &self.role)
    }

    /// Drops the conversion when the operand statically satisfies the
    /// required type, and reports conversions that can never succeed.
    pub fn type_check(self, visitor: &mut ExpressionVisitor, context_item: Option<ItemType>) -> Result<Expr> {
        let operand = self.operand.type_check(visitor, context_item)?;
        Convert::check_static(operand, self.required, self.role, visitor)
    }

    /// Applies the static part of the conversion to an already checked
    /// operand. A conditional is checked branch by branch: a branch that
    /// already satisfies the required type is left unwrapped, the others get
    /// their own conversion.
    pub fn check_static(
        operand: Expr,
        required: SequenceType,
        role: RoleLocator,
        visitor: &mut ExpressionVisitor,
    ) -> Result<Expr> {
        match operand {
            Expr::Choose(choose) => {
                choose.check_required_type(&required, &role)?;
                let mut branches = Vec::with_capacity(choose.branches.len());
                for (condition, action) in choose.branches {
                    let was_empty = action.is_empty_literal();
                    let action = match Convert::check_static(action, required, role.clone(), visitor) {
                        Err(e) if e.is_type_error() && was_empty => Expr::Error(ErrorExpr::new(e)),
                        other => other?,
                    };
                    branches.push((condition, action));
                }
                Ok(Expr::Choose(Choose::new(branches)))
            }
            Expr::Literal(value) => {
                let converted = convert_sequence(value, &required, &role)?;
                visitor.record_rewrite("constant conversion");
                Ok(Expr::Literal(converted))
            }
            operand => {
                let actual = operand.static_type();
                if actual.cardinality == Cardinality::Empty && !required.cardinality.allows_empty() {
                    return Err(XsltError::type_error(
                        role.code,
                        format!(
                            "Required type of {} is {}, but the supplied value is always empty",
                            role.description, required
                        ),
                    ));
                }
                let item_ok =
                    actual.cardinality == Cardinality::Empty || actual.item.is_subtype_of(&required.item);
                if item_ok && cardinality_subsumes(required.cardinality, actual.cardinality) {
                    visitor.record_rewrite("redundant conversion");
                    return Ok(operand);
                }
                Ok(Expr::Convert(Convert::new(operand, required, role)))
            }
        }
    }
}

fn cardinality_subsumes(required: Cardinality, actual: Cardinality) -> bool {
    match required {
        Cardinality::Empty => actual == Cardinality::Empty,
        _ => {
            (required.allows_empty() || !actual.allows_empty())
                && (required.allows_many() || !actual.allows_many())
        }
    }
}

/// Stands in for a subexpression whose static processing failed with a
/// dynamic error; raises that error if it is ever evaluated.
#[derive(Debug, Clone)]
pub struct ErrorExpr {
    pub error: XsltError,
}

impl ErrorExpr {
    pub fn new(error: XsltError) -> Self {
        Self { error }
    }
}

impl Choose {
    /// Static check against a required type: with no branch that is always
    /// taken, the instruction can produce an empty sequence.
    pub fn check_required_type(&self, required: &SequenceType, role: &RoleLocator) -> Result<()> {
        if self.has_otherwise() || required.cardinality.allows_empty() {
            return Ok(());
        }
        Err(XsltError::type_error(
            role.code,
            format!(
                "Required type of {} is {}, but xsl:choose has no xsl:otherwise and can produce an empty sequence",
                role.description, required
            ),
        ))
    }
}
