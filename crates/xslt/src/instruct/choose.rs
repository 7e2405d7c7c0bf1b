//! `xsl:choose` and `xsl:if`.
use crate::context::XPathContext;
use crate::error::{Result, XsltError};
use crate::expr::{ErrorExpr, Expr, ExpressionVisitor};
use crate::tail_call::TailCall;
use crate::types::{Cardinality, ItemType, SequenceType};

/// Ordered `(condition, action)` pairs; the first condition whose effective
/// boolean value is true selects its action. `xsl:otherwise` is a final
/// condition of literal `true()`.
#[derive(Debug, Clone, Default)]
pub struct Choose {
    pub branches: Vec<(Expr, Expr)>,
}

/// Keeps an error raised while rewriting an action that may never run.
/// Static errors always surface; type errors surface unless the action was
/// an empty placeholder.
fn defer(result: Result<Expr>, placeholder: bool) -> Result<Expr> {
    match result {
        Ok(action) => Ok(action),
        Err(e) if e.is_static_error() || e.is_termination() => Err(e),
        Err(e) if e.is_type_error() && !placeholder => Err(e),
        Err(e) => {
            log::debug!("Deferring error in conditional branch: {}", e);
            Ok(Expr::Error(ErrorExpr::new(e)))
        }
    }
}

impl Choose {
    pub fn new(branches: Vec<(Expr, Expr)>) -> Self {
        Self { branches }
    }

    /// `xsl:if`: a single branch with no fall-back.
    pub fn conditional(condition: Expr, action: Expr) -> Self {
        Self::new(vec![(condition, action)])
    }

    pub fn has_otherwise(&self) -> bool {
        self.branches.last().is_some_and(|(c, _)| c.is_literal_true())
    }

    pub fn simplify(self, visitor: &mut ExpressionVisitor) -> Result<Expr> {
        let mut branches = Vec::with_capacity(self.branches.len());
        for (condition, action) in self.branches {
            let condition = condition.simplify(visitor)?;
            let action = defer(action.simplify(visitor), false)?;
            branches.push((condition, action));
        }
        Choose::new(branches).prune(visitor)
    }

    /// Drops branches whose condition is literally false and everything
    /// after a literally true one.
    pub fn prune(self, visitor: &mut ExpressionVisitor) -> Result<Expr> {
        let mut kept: Vec<(Expr, Expr)> = Vec::with_capacity(self.branches.len());
        for (condition, action) in self.branches {
            if condition.is_literal_false() {
                visitor.record_rewrite("branch that is never taken");
                continue;
            }
            let always = condition.is_literal_true();
            kept.push((condition, action));
            if always {
                break;
            }
        }
        match kept.first() {
            None => Ok(Expr::empty()),
            Some((condition, _)) if condition.is_literal_true() => {
                visitor.record_rewrite("branch that is always taken");
                Ok(kept.swap_remove(0).1)
            }
            Some(_) => Ok(Expr::Choose(Choose::new(kept))),
        }
    }

    pub fn type_check(self, visitor: &mut ExpressionVisitor, context_item: Option<ItemType>) -> Result<Expr> {
        let mut branches = Vec::with_capacity(self.branches.len());
        for (condition, action) in self.branches {
            let condition = condition.type_check(visitor, context_item)?;
            check_boolean_condition(&condition)?;
            let placeholder = action.is_empty_literal();
            let action = defer(action.type_check(visitor, context_item), placeholder)?;
            branches.push((condition, action));
        }
        Ok(Expr::Choose(Choose::new(branches)))
    }

    pub fn static_type(&self) -> SequenceType {
        let mut result = self
            .branches
            .iter()
            .map(|(_, action)| action.static_type())
            .reduce(|a, b| {
                let item = match (a.cardinality, b.cardinality) {
                    (Cardinality::Empty, _) => b.item,
                    (_, Cardinality::Empty) => a.item,
                    _ => a.item.union(&b.item),
                };
                SequenceType::new(item, a.cardinality.union(b.cardinality))
            })
            .unwrap_or(SequenceType::EMPTY);
        if !self.has_otherwise() {
            result.cardinality = result.cardinality.union(Cardinality::Empty);
        }
        result
    }

    pub fn select_action<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<&'e Expr>> {
        for (condition, action) in &self.branches {
            if condition.effective_boolean_value(ctx)? {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        match self.select_action(ctx)? {
            Some(action) => action.process_leaving_tail(ctx),
            None => Ok(None),
        }
    }
}

/// A condition that always yields several atomic values has no effective
/// boolean value.
fn check_boolean_condition(condition: &Expr) -> Result<()> {
    let t = condition.static_type();
    if t.item.is_atomic() && t.cardinality == Cardinality::OneOrMore && condition.as_literal().is_some_and(|v| v.len() > 1) {
        return Err(XsltError::type_error(
            "FORG0006",
            "Effective boolean value is not defined for a sequence of two or more atomic values",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_context;

    fn choose(branches: Vec<(&str, &str)>) -> Choose {
        Choose::new(
            branches
                .into_iter()
                .map(|(c, a)| (Expr::xpath(c).unwrap(), Expr::xpath(a).unwrap()))
                .collect(),
        )
    }

    #[test]
    fn test_first_true_branch_wins() {
        let c = choose(vec![("1 = 2", "'a'"), ("2 = 2", "'b'"), ("true()", "'c'")]);
        with_context(|ctx| {
            let action = c.select_action(&ctx).unwrap().unwrap();
            assert_eq!(action.evaluate_as_string(&ctx, "").unwrap(), "b");
        });
    }

    #[test]
    fn test_no_true_branch_is_empty() {
        let c = choose(vec![("false()", "'a'"), ("0", "'b'")]);
        with_context(|ctx| {
            assert!(c.select_action(&ctx).unwrap().is_none());
        });
    }

    #[test]
    fn test_prune_constant_conditions() {
        let mut visitor = ExpressionVisitor::default();
        let c = Choose::new(vec![
            (Expr::boolean(false), Expr::integer(1)),
            (Expr::boolean(true), Expr::integer(2)),
            (Expr::ContextItem, Expr::integer(3)),
        ]);
        let pruned = c.prune(&mut visitor).unwrap();
        assert_eq!(pruned.as_literal().unwrap().string_join(""), "2");
    }

    #[test]
    fn test_dynamic_error_in_branch_is_deferred() {
        let mut visitor = ExpressionVisitor::default();
        let c = choose(vec![("position() = 1", "1 idiv 0"), ("true()", "'fine'")]);
        let checked = c.type_check(&mut visitor, None).unwrap();
        let Expr::Choose(checked) = checked else {
            panic!("expected the conditional to survive");
        };
        assert!(matches!(checked.branches[0].1, Expr::Error(_)));
    }

    #[test]
    fn test_static_error_in_branch_is_raised() {
        let mut visitor = ExpressionVisitor::default();
        let c = Choose::conditional(
            Expr::boolean(true),
            Expr::Error(ErrorExpr::new(XsltError::static_error("XPST0008", "no such variable"))),
        );
        let err = c.simplify(&mut visitor).unwrap_err();
        assert_eq!(err.code(), "XPST0008");
    }

    #[test]
    fn test_static_type_without_otherwise_allows_empty() {
        let c = Choose::conditional(Expr::ContextItem, Expr::integer(1));
        assert_eq!(c.static_type().cardinality, Cardinality::ZeroOrOne);
        let c = Choose::new(vec![(Expr::ContextItem, Expr::integer(1)), (Expr::boolean(true), Expr::integer(2))]);
        assert_eq!(c.static_type().cardinality, Cardinality::ExactlyOne);
    }
}
