//! The core function library available to stylesheet expressions, and
//! calls to stylesheet functions.
use super::xpath::{ArithmeticOp, atomize_optional, compute};
use super::{Expr, ExpressionVisitor};
use crate::context::XPathContext;
use crate::error::{Result, XsltError};
use crate::instruct::user_function::FunctionId;
use crate::iter::{ListIterator, SeqIter, count_items, empty_iterator, singleton_iterator};
use crate::types::{Cardinality, ItemType, SequenceType};
use trellis_xdm::{AtomicType, AtomicValue, Item, NodeHandle, QName, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemFunction {
    Count,
    String,
    Concat,
    Not,
    True,
    False,
    Boolean,
    Position,
    Last,
    Empty,
    Exists,
    StringJoin,
    Sum,
    Name,
    LocalName,
    CurrentGroup,
    CurrentGroupingKey,
}

impl SystemFunction {
    /// Resolves a function by local name and arity.
    pub fn lookup(name: &str, arity: usize) -> Result<SystemFunction> {
        let (function, min, max) = match name {
            "count" => (SystemFunction::Count, 1, 1),
            "string" => (SystemFunction::String, 0, 1),
            "concat" => (SystemFunction::Concat, 2, usize::MAX),
            "not" => (SystemFunction::Not, 1, 1),
            "true" => (SystemFunction::True, 0, 0),
            "false" => (SystemFunction::False, 0, 0),
            "boolean" => (SystemFunction::Boolean, 1, 1),
            "position" => (SystemFunction::Position, 0, 0),
            "last" => (SystemFunction::Last, 0, 0),
            "empty" => (SystemFunction::Empty, 1, 1),
            "exists" => (SystemFunction::Exists, 1, 1),
            "string-join" => (SystemFunction::StringJoin, 2, 2),
            "sum" => (SystemFunction::Sum, 1, 2),
            "name" => (SystemFunction::Name, 0, 1),
            "local-name" => (SystemFunction::LocalName, 0, 1),
            "current-group" => (SystemFunction::CurrentGroup, 0, 0),
            "current-grouping-key" => (SystemFunction::CurrentGroupingKey, 0, 0),
            _ => {
                return Err(XsltError::static_error(
                    "XPST0017",
                    format!("Unknown function {}()", name),
                ));
            }
        };
        if arity < min || arity > max {
            return Err(XsltError::static_error(
                "XPST0017",
                format!("Function {}() cannot be called with {} arguments", name, arity),
            ));
        }
        Ok(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemFunction::Count => "count",
            SystemFunction::String => "string",
            SystemFunction::Concat => "concat",
            SystemFunction::Not => "not",
            SystemFunction::True => "true",
            SystemFunction::False => "false",
            SystemFunction::Boolean => "boolean",
            SystemFunction::Position => "position",
            SystemFunction::Last => "last",
            SystemFunction::Empty => "empty",
            SystemFunction::Exists => "exists",
            SystemFunction::StringJoin => "string-join",
            SystemFunction::Sum => "sum",
            SystemFunction::Name => "name",
            SystemFunction::LocalName => "local-name",
            SystemFunction::CurrentGroup => "current-group",
            SystemFunction::CurrentGroupingKey => "current-grouping-key",
        }
    }

    /// Functions whose result can hold more than one item.
    pub fn is_sequence_valued(self) -> bool {
        self == SystemFunction::CurrentGroup
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub function: SystemFunction,
    pub args: Vec<Expr>,
}

impl FunctionCall {
    pub fn new(function: SystemFunction, args: Vec<Expr>) -> Self {
        Self { function, args }
    }

    pub fn simplify(self, visitor: &mut ExpressionVisitor) -> Result<Expr> {
        let args = self
            .args
            .into_iter()
            .map(|a| a.simplify(visitor))
            .collect::<Result<Vec<_>>>()?;
        let folded = match (self.function, args.as_slice()) {
            (SystemFunction::True, []) => Some(Expr::boolean(true)),
            (SystemFunction::False, []) => Some(Expr::boolean(false)),
            (SystemFunction::Not, [a]) if a.is_literal_true() => Some(Expr::boolean(false)),
            (SystemFunction::Not, [a]) if a.is_literal_false() => Some(Expr::boolean(true)),
            (SystemFunction::Boolean, [a]) if a.is_literal_true() => Some(Expr::boolean(true)),
            (SystemFunction::Boolean, [a]) if a.is_literal_false() => Some(Expr::boolean(false)),
            (SystemFunction::Count, [Expr::Literal(v)]) => Some(Expr::integer(v.len() as i64)),
            _ => None,
        };
        if let Some(literal) = folded {
            visitor.record_rewrite(self.function.name());
            return Ok(literal);
        }
        Ok(Expr::FunctionCall(FunctionCall::new(self.function, args)))
    }

    pub fn static_type(&self) -> SequenceType {
        use Cardinality::*;
        let atomic = |t, c| SequenceType::new(ItemType::Atomic(t), c);
        match self.function {
            SystemFunction::Count | SystemFunction::Position | SystemFunction::Last => {
                atomic(AtomicType::Integer, ExactlyOne)
            }
            SystemFunction::String
            | SystemFunction::Concat
            | SystemFunction::StringJoin
            | SystemFunction::Name
            | SystemFunction::LocalName => atomic(AtomicType::String, ExactlyOne),
            SystemFunction::Not
            | SystemFunction::True
            | SystemFunction::False
            | SystemFunction::Boolean
            | SystemFunction::Empty
            | SystemFunction::Exists => atomic(AtomicType::Boolean, ExactlyOne),
            SystemFunction::Sum => atomic(AtomicType::AnyAtomic, ZeroOrOne),
            SystemFunction::CurrentGroup => SequenceType::ANY,
            SystemFunction::CurrentGroupingKey => atomic(AtomicType::AnyAtomic, ZeroOrOne),
        }
    }

    pub fn evaluate_item<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<Item>> {
        let value = match self.function {
            SystemFunction::Count => {
                let iter = self.args[0].iterate(ctx)?;
                AtomicValue::Integer(count_items(iter.as_ref())? as i64)
            }
            SystemFunction::String => {
                let item = match self.args.first() {
                    Some(arg) => arg.evaluate_item(ctx)?,
                    None => Some(ctx.context_item()?.clone()),
                };
                AtomicValue::String(item.map(|i| i.string_value()).unwrap_or_default())
            }
            SystemFunction::Concat => {
                let mut out = String::new();
                for arg in &self.args {
                    if let Some(value) = atomize_optional(arg, ctx)? {
                        out.push_str(&value.to_string_value());
                    }
                }
                AtomicValue::String(out)
            }
            SystemFunction::Not => AtomicValue::Boolean(!self.args[0].effective_boolean_value(ctx)?),
            SystemFunction::True => AtomicValue::Boolean(true),
            SystemFunction::False => AtomicValue::Boolean(false),
            SystemFunction::Boolean => AtomicValue::Boolean(self.args[0].effective_boolean_value(ctx)?),
            SystemFunction::Position => AtomicValue::Integer(ctx.position()? as i64),
            SystemFunction::Last => AtomicValue::Integer(ctx.last()? as i64),
            SystemFunction::Empty => AtomicValue::Boolean(self.args[0].iterate(ctx)?.next()?.is_none()),
            SystemFunction::Exists => AtomicValue::Boolean(self.args[0].iterate(ctx)?.next()?.is_some()),
            SystemFunction::StringJoin => {
                let separator = self.args[1].evaluate_as_string(ctx, "")?;
                AtomicValue::String(self.args[0].evaluate_as_string(ctx, &separator)?)
            }
            SystemFunction::Sum => return self.sum(ctx),
            SystemFunction::Name => AtomicValue::String(
                self.node_argument(ctx)?
                    .and_then(|n| n.name().map(|q| q.display_name()))
                    .unwrap_or_default(),
            ),
            SystemFunction::LocalName => AtomicValue::String(
                self.node_argument(ctx)?
                    .map(|n| n.local_name().to_string())
                    .unwrap_or_default(),
            ),
            SystemFunction::CurrentGroup => {
                return Ok(ctx.current_group().and_then(|g| g.items.first().cloned()));
            }
            SystemFunction::CurrentGroupingKey => {
                return Ok(ctx.current_group().and_then(|g| g.key.clone()).map(Item::from));
            }
        };
        Ok(Some(Item::from(value)))
    }

    pub fn iterate<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
        match self.function {
            SystemFunction::CurrentGroup => match ctx.current_group() {
                Some(group) => Ok(ListIterator::boxed(group.items.clone())),
                None => Ok(empty_iterator()),
            },
            _ => Ok(singleton_iterator(self.evaluate_item(ctx)?)),
        }
    }

    fn node_argument<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<NodeHandle>> {
        let item = match self.args.first() {
            Some(arg) => arg.evaluate_item(ctx)?,
            None => Some(ctx.context_item()?.clone()),
        };
        match item {
            None => Ok(None),
            Some(Item::Node(n)) => Ok(Some(n)),
            Some(Item::Atomic(_)) => Err(XsltError::type_error(
                "XPTY0004",
                format!("The argument of {}() must be a node", self.function.name()),
            )),
        }
    }

    fn sum<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<Item>> {
        let mut iter = self.args[0].iterate(ctx)?;
        let mut total: Option<AtomicValue> = None;
        while let Some(item) = iter.next()? {
            let value = match item.atomize() {
                v if v.is_untyped() => v.convert_to(AtomicType::Double)?,
                v if v.is_numeric() => v,
                v => {
                    return Err(XsltError::dynamic(
                        "FORG0006",
                        format!("sum() cannot add a value of type {}", v.atomic_type()),
                    ));
                }
            };
            total = Some(match total {
                None => value,
                Some(t) => compute(ArithmeticOp::Plus, t, value)?,
            });
        }
        match total {
            Some(t) => Ok(Some(Item::from(t))),
            None => match self.args.get(1) {
                Some(zero) => zero.evaluate_item(ctx),
                None => Ok(Some(Item::from(AtomicValue::Integer(0)))),
            },
        }
    }
}

/// A call to an `xsl:function`, written with a prefixed name. The target
/// is bound by name and arity when the executable is built.
#[derive(Debug, Clone)]
pub struct UserFunctionCall {
    pub name: QName,
    pub args: Vec<Expr>,
    pub target: Option<FunctionId>,
}

impl UserFunctionCall {
    pub fn new(name: QName, args: Vec<Expr>) -> Self {
        Self {
            name,
            args,
            target: None,
        }
    }

    pub fn call<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Sequence> {
        let id = self.target.ok_or_else(|| {
            XsltError::static_error(
                "XPST0017",
                format!("Unknown function {}#{}", self.name.display_name(), self.args.len()),
            )
        })?;
        let function = ctx.executable().function(id)?;
        let args = self
            .args
            .iter()
            .map(|arg| arg.evaluate(ctx))
            .collect::<Result<Vec<_>>>()?;
        function.call(args, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_checks_arity() {
        assert_eq!(SystemFunction::lookup("count", 1).unwrap(), SystemFunction::Count);
        assert_eq!(SystemFunction::lookup("concat", 5).unwrap(), SystemFunction::Concat);
        assert_eq!(SystemFunction::lookup("concat", 1).unwrap_err().code(), "XPST0017");
        assert_eq!(SystemFunction::lookup("no-such", 0).unwrap_err().code(), "XPST0017");
    }

    #[test]
    fn test_constant_functions_fold() {
        let mut visitor = ExpressionVisitor::default();
        let call = FunctionCall::new(SystemFunction::Not, vec![Expr::boolean(false)]);
        let folded = call.simplify(&mut visitor).unwrap();
        assert!(folded.is_literal_true());
        assert_eq!(visitor.rewrites(), 1);
    }

    #[test]
    fn test_only_current_group_is_sequence_valued() {
        assert!(SystemFunction::CurrentGroup.is_sequence_valued());
        assert!(!SystemFunction::CurrentGroupingKey.is_sequence_valued());
    }

    #[test]
    fn test_unbound_user_function_call() {
        let call = UserFunctionCall::new(QName::new("f", "urn:f", "g"), vec![Expr::integer(1)]);
        crate::testing::with_context(|ctx| {
            assert_eq!(call.call(&ctx).unwrap_err().code(), "XPST0017");
        });
    }
}
