//! Sequence constructors: the concatenation of several instructions.
use crate::context::XPathContext;
use crate::error::Result;
use crate::expr::{Expr, ExpressionVisitor};
use crate::iter::{SeqIter, SequenceIterator};
use crate::tail_call::TailCall;
use crate::types::{Cardinality, SequenceType};
use trellis_xdm::{Item, Sequence};

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub children: Vec<Expr>,
}

impl Block {
    pub fn new(children: Vec<Expr>) -> Self {
        Self { children }
    }

    /// Flattens nested blocks, merges adjacent literals, and unwraps blocks
    /// with fewer than two members.
    pub fn simplify(self, visitor: &mut ExpressionVisitor) -> Result<Expr> {
        let mut flat = Vec::with_capacity(self.children.len());
        for child in self.children {
            match child.simplify(visitor)? {
                Expr::Block(inner) => {
                    visitor.record_rewrite("nested block");
                    flat.extend(inner.children);
                }
                other => flat.push(other),
            }
        }
        let mut merged: Vec<Expr> = Vec::with_capacity(flat.len());
        for child in flat {
            if child.is_empty_literal() {
                continue;
            }
            if let (Some(Expr::Literal(previous)), Expr::Literal(next)) = (merged.last_mut(), &child) {
                *previous = Sequence::from_items(previous.iter().chain(next.iter()).cloned().collect());
                visitor.record_rewrite("adjacent literals");
                continue;
            }
            merged.push(child);
        }
        Ok(match merged.len() {
            0 => Expr::empty(),
            1 => merged.swap_remove(0),
            _ => Expr::Block(Block::new(merged)),
        })
    }

    pub fn static_type(&self) -> SequenceType {
        self.children
            .iter()
            .map(Expr::static_type)
            .filter(|t| t.cardinality != Cardinality::Empty)
            .reduce(|a, b| SequenceType::new(a.item.union(&b.item), a.cardinality.sum(b.cardinality)))
            .unwrap_or(SequenceType::EMPTY)
    }

    /// Runs every member in order. Only the last member may leave a tail
    /// call; the others are driven to completion.
    pub fn process_leaving_tail<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Option<TailCall<'e>>> {
        let Some((last, init)) = self.children.split_last() else {
            return Ok(None);
        };
        for child in init {
            child.process(ctx)?;
        }
        last.process_leaving_tail(ctx)
    }
}

/// Streams the members of a block one after another, starting each member
/// only once the previous one is exhausted.
pub struct BlockIterator<'e> {
    children: &'e [Expr],
    ctx: XPathContext<'e>,
    next_child: usize,
    active: Option<SeqIter<'e>>,
    current: Option<Item>,
    position: usize,
}

impl<'e> BlockIterator<'e> {
    pub fn new(children: &'e [Expr], ctx: XPathContext<'e>) -> Self {
        Self {
            children,
            ctx,
            next_child: 0,
            active: None,
            current: None,
            position: 0,
        }
    }
}

impl<'e> SequenceIterator<'e> for BlockIterator<'e> {
    fn next(&mut self) -> Result<Option<Item>> {
        loop {
            if let Some(active) = &mut self.active {
                if let Some(item) = active.next()? {
                    self.position += 1;
                    self.current = Some(item.clone());
                    return Ok(Some(item));
                }
                self.active = None;
            }
            let Some(child) = self.children.get(self.next_child) else {
                self.current = None;
                return Ok(None);
            };
            self.next_child += 1;
            self.active = Some(child.iterate(&self.ctx)?);
        }
    }

    fn current(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn get_another(&self) -> Result<SeqIter<'e>> {
        Ok(Box::new(BlockIterator::new(self.children, self.ctx.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::collect_items;
    use crate::testing::with_context;

    #[test]
    fn test_simplify_flattens_and_merges() {
        let mut visitor = ExpressionVisitor::default();
        let inner = Expr::Block(Block::new(vec![Expr::integer(2), Expr::empty(), Expr::integer(3)]));
        let block = Block::new(vec![Expr::integer(1), inner]);
        let simplified = block.simplify(&mut visitor).unwrap();
        let literal = simplified.as_literal().expect("constant block folds to a literal");
        assert_eq!(literal.string_join(","), "1,2,3");
    }

    #[test]
    fn test_trivial_blocks_unwrap() {
        let mut visitor = ExpressionVisitor::default();
        assert!(Block::new(vec![]).simplify(&mut visitor).unwrap().is_empty_literal());
        let single = Block::new(vec![Expr::ContextItem]).simplify(&mut visitor).unwrap();
        assert!(matches!(single, Expr::ContextItem));
    }

    #[test]
    fn test_iterator_is_lazy_across_members() {
        with_context(|ctx| {
            // The second member fails when evaluated; pulling the first item
            // must not reach it.
            let children = vec![Expr::integer(1), Expr::xpath("1 idiv 0").unwrap()];
            let mut iter = BlockIterator::new(&children, ctx.clone());
            assert_eq!(iter.next().unwrap().map(|i| i.string_value()).as_deref(), Some("1"));
            assert_eq!(iter.next().unwrap_err().code(), "FOAR0001");
        });
    }

    #[test]
    fn test_static_type_sums_members() {
        let block = Block::new(vec![Expr::integer(1), Expr::string("a")]);
        let t = block.static_type();
        assert_eq!(t.cardinality, Cardinality::OneOrMore);
        with_context(|ctx| {
            let mut iter = BlockIterator::new(&block.children, ctx.clone());
            assert_eq!(collect_items(&mut iter).unwrap().len(), 2);
        });
    }
}
