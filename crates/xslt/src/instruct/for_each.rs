//! `xsl:for-each`.
use crate::context::XPathContext;
use crate::error::{Location, Result};
use crate::expr::{Expr, ExpressionVisitor};
use crate::iter::{SeqIter, SequenceIterator, count_items};
use crate::sort::{SortKeyDefinition, SortedIterator};
use crate::types::ItemType;
use trellis_xdm::Item;

#[derive(Debug, Clone)]
pub struct ForEach {
    pub select: Box<Expr>,
    pub action: Box<Expr>,
    pub sort: Vec<SortKeyDefinition>,
    pub location: Option<Location>,
}

impl ForEach {
    pub fn new(select: Expr, action: Expr) -> Self {
        Self {
            select: Box::new(select),
            action: Box::new(action),
            sort: Vec::new(),
            location: None,
        }
    }

    pub fn sorted_by(mut self, key: SortKeyDefinition) -> Self {
        self.sort.push(key);
        self
    }

    pub fn children(&self) -> Vec<&Expr> {
        let mut out = vec![&*self.select];
        out.extend(self.sort.iter().map(|k| &k.select));
        out.push(&*self.action);
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out = vec![&mut *self.select];
        out.extend(self.sort.iter_mut().map(|k| &mut k.select));
        out.push(&mut *self.action);
        out
    }

    /// The action and the sort keys see each selected item as context.
    pub fn type_check(mut self, visitor: &mut ExpressionVisitor, context_item: Option<ItemType>) -> Result<Expr> {
        let select = self.select.type_check(visitor, context_item)?;
        let inner = Some(select.static_type().item);
        for key in &mut self.sort {
            let checked = std::mem::take(&mut key.select).type_check(visitor, inner)?;
            key.select = checked;
        }
        let action = self.action.type_check(visitor, inner)?;
        Ok(Expr::ForEach(ForEach {
            select: Box::new(select),
            action: Box::new(action),
            ..self
        }))
    }

    /// The selected items, sorted if required, and the context size when
    /// the action needs it.
    fn population<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<(SeqIter<'e>, Option<usize>)> {
        let base = self.select.iterate(ctx)?;
        if !self.sort.is_empty() {
            let sorted = SortedIterator::boxed(base, &self.sort, ctx)?;
            let last = sorted.known_length();
            return Ok((sorted, last));
        }
        let last = if self.action.depends_on_last() {
            Some(count_items(base.as_ref())?)
        } else {
            None
        };
        Ok((base, last))
    }

    fn inner_context<'e>(ctx: &XPathContext<'e>, item: Item, position: usize, last: Option<usize>) -> XPathContext<'e> {
        let mut c = ctx.with_focus(item, position, last);
        c.set_current_rule(None);
        c
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let (mut population, last) = self.population(ctx)?;
        let mut position = 0;
        while let Some(item) = population.next()? {
            position += 1;
            let c = Self::inner_context(ctx, item, position, last);
            self.action.process(&c)?;
        }
        Ok(())
    }

    /// Streams the concatenated results of the action, running it for an
    /// item only when the previous results are exhausted.
    pub fn iterate<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
        let (population, last) = self.population(ctx)?;
        Ok(Box::new(ForEachIterator {
            for_each: self,
            ctx: ctx.clone(),
            population,
            last,
            active: None,
            current: None,
            position: 0,
        }))
    }
}

struct ForEachIterator<'e> {
    for_each: &'e ForEach,
    ctx: XPathContext<'e>,
    population: SeqIter<'e>,
    last: Option<usize>,
    active: Option<SeqIter<'e>>,
    current: Option<Item>,
    position: usize,
}

impl<'e> SequenceIterator<'e> for ForEachIterator<'e> {
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
            let Some(item) = self.population.next()? else {
                self.current = None;
                return Ok(None);
            };
            let position = self.population.position();
            let c = ForEach::inner_context(&self.ctx, item, position, self.last);
            self.active = Some(self.for_each.action.iterate(&c)?);
        }
    }

    fn current(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    fn position(&self) -> usize {
        self.position
    }

    fn get_another(&self) -> Result<SeqIter<'e>> {
        self.for_each.iterate(&self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::collect_items;
    use crate::testing::with_context;

    fn evaluate_all<'e>(for_each: &'e ForEach, ctx: &XPathContext<'e>) -> Result<Vec<Item>> {
        let mut iter = for_each.iterate(ctx)?;
        collect_items(iter.as_mut())
    }

    fn strings(items: Vec<Item>) -> Vec<String> {
        items.iter().map(Item::string_value).collect()
    }

    #[test]
    fn test_action_sees_each_item_and_position() {
        let f = ForEach::new(
            Expr::xpath("('a', 'b', 'c')").unwrap(),
            Expr::xpath("concat(., position(), '/', last())").unwrap(),
        );
        with_context(|ctx| {
            assert_eq!(strings(evaluate_all(&f, &ctx).unwrap()), ["a1/3", "b2/3", "c3/3"]);
        });
    }

    #[test]
    fn test_sorted_iteration() {
        let f = ForEach::new(Expr::xpath("(3, 1, 2)").unwrap(), Expr::xpath(". * 10").unwrap())
            .sorted_by(SortKeyDefinition::new(Expr::ContextItem).descending());
        with_context(|ctx| {
            assert_eq!(strings(evaluate_all(&f, &ctx).unwrap()), ["30", "20", "10"]);
        });
    }

    #[test]
    fn test_iteration_is_lazy() {
        let f = ForEach::new(Expr::xpath("(1, 0)").unwrap(), Expr::xpath("1 idiv .").unwrap());
        with_context(|ctx| {
            let mut iter = f.iterate(&ctx).unwrap();
            assert_eq!(iter.next().unwrap().map(|i| i.string_value()).as_deref(), Some("1"));
            assert_eq!(iter.next().unwrap_err().code(), "FOAR0001");
        });
    }

    #[test]
    fn test_process_writes_to_receiver() {
        let f = ForEach::new(Expr::xpath("1 to 3").unwrap(), Expr::ContextItem);
        with_context(|ctx| {
            let out = ctx.capture(|c| f.process(c)).unwrap();
            assert_eq!(out.len(), 3);
        });
    }
}
