//! `xsl:for-each-group`.
//!
//! The population is partitioned eagerly into [`CurrentGroup`]s, which are
//! then optionally sorted and handed to the action one at a time. Within
//! the action the first item of the group is the context item and
//! `current-group()` returns all of its members.
use crate::context::{CurrentGroup, Focus, XPathContext};
use crate::error::{Location, Result, XsltError};
use crate::expr::{Expr, ExpressionVisitor};
use crate::iter::collect_items;
use crate::pattern::Pattern;
use crate::sort::{AtomicComparer, SortKeyDefinition, evaluate_keys, sort_rows};
use crate::types::ItemType;
use std::collections::HashMap;
use std::rc::Rc;
use trellis_xdm::{AtomicValue, ComparisonKey, Item, Sequence};

#[derive(Debug, Clone)]
pub enum GroupingAlgorithm {
    /// `group-by`: items with equal keys share a group, in order of first
    /// occurrence. An item with several keys joins several groups.
    By(Box<Expr>),
    /// `group-adjacent`: a new group starts whenever the key changes.
    Adjacent(Box<Expr>),
    /// `group-starting-with`: a new group starts at every matching node.
    StartingWith(Pattern),
    /// `group-ending-with`: a group ends at every matching node.
    EndingWith(Pattern),
}

#[derive(Debug, Clone)]
pub struct ForEachGroup {
    pub select: Box<Expr>,
    pub algorithm: GroupingAlgorithm,
    pub action: Box<Expr>,
    pub sort: Vec<SortKeyDefinition>,
    pub collation: Option<String>,
    pub location: Option<Location>,
}

impl ForEachGroup {
    pub fn new(select: Expr, algorithm: GroupingAlgorithm, action: Expr) -> Self {
        Self {
            select: Box::new(select),
            algorithm,
            action: Box::new(action),
            sort: Vec::new(),
            collation: None,
            location: None,
        }
    }

    pub fn sorted_by(mut self, key: SortKeyDefinition) -> Self {
        self.sort.push(key);
        self
    }

    fn key(&self) -> Option<&Expr> {
        match &self.algorithm {
            GroupingAlgorithm::By(key) | GroupingAlgorithm::Adjacent(key) => Some(key),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        let mut out = vec![&*self.select];
        out.extend(self.key());
        out.extend(self.sort.iter().map(|k| &k.select));
        out.push(&*self.action);
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out = vec![&mut *self.select];
        match &mut self.algorithm {
            GroupingAlgorithm::By(key) | GroupingAlgorithm::Adjacent(key) => out.push(&mut **key),
            _ => {}
        }
        out.extend(self.sort.iter_mut().map(|k| &mut k.select));
        out.push(&mut *self.action);
        out
    }

    pub fn type_check(mut self, visitor: &mut ExpressionVisitor, context_item: Option<ItemType>) -> Result<Expr> {
        let select = self.select.type_check(visitor, context_item)?;
        let inner = Some(select.static_type().item);
        self.algorithm = match self.algorithm {
            GroupingAlgorithm::By(key) => GroupingAlgorithm::By(Box::new(key.type_check(visitor, inner)?)),
            GroupingAlgorithm::Adjacent(key) => {
                GroupingAlgorithm::Adjacent(Box::new(key.type_check(visitor, inner)?))
            }
            other => other,
        };
        for key in &mut self.sort {
            let checked = std::mem::take(&mut key.select).type_check(visitor, inner)?;
            key.select = checked;
        }
        let action = self.action.type_check(visitor, inner)?;
        Ok(Expr::ForEachGroup(ForEachGroup {
            select: Box::new(select),
            action: Box::new(action),
            ..self
        }))
    }

    /// Partitions the population and sorts the groups.
    pub fn groups<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<Vec<CurrentGroup>> {
        // Rejects unsupported collations before any key is compared.
        AtomicComparer::new(None, self.collation.as_deref())?;
        let mut iter = self.select.iterate(ctx)?;
        let population = collect_items(iter.as_mut())?;
        let groups = match &self.algorithm {
            GroupingAlgorithm::By(key) => group_by(&population, key, ctx)?,
            GroupingAlgorithm::Adjacent(key) => group_adjacent(&population, key, ctx)?,
            GroupingAlgorithm::StartingWith(pattern) => group_by_pattern(&population, pattern, true, ctx)?,
            GroupingAlgorithm::EndingWith(pattern) => group_by_pattern(&population, pattern, false, ctx)?,
        };
        if self.sort.is_empty() {
            return Ok(groups);
        }
        let last = groups.len();
        let mut rows = Vec::with_capacity(last);
        for (i, group) in groups.into_iter().enumerate() {
            let c = group_context(ctx, &group, i + 1, last);
            let values = evaluate_keys(&self.sort, &c)?;
            rows.push((group, values));
        }
        sort_rows(rows, &self.sort)
    }

    pub fn process<'e>(&'e self, ctx: &XPathContext<'e>) -> Result<()> {
        let groups = self.groups(ctx)?;
        let last = groups.len();
        for (i, group) in groups.into_iter().enumerate() {
            let c = group_context(ctx, &group, i + 1, last);
            self.action.process(&c)?;
        }
        Ok(())
    }
}

fn group_context<'e>(ctx: &XPathContext<'e>, group: &CurrentGroup, position: usize, last: usize) -> XPathContext<'e> {
    let mut c = ctx.clone();
    c.set_focus(
        group
            .items
            .first()
            .cloned()
            .map(|item| Focus::new(item, position, Some(last))),
    );
    c.set_current_group(Some(Rc::new(group.clone())));
    c.set_current_rule(None);
    c
}

struct GroupBuilder {
    items: Vec<Item>,
    key: Option<AtomicValue>,
}

impl GroupBuilder {
    fn new(key: Option<AtomicValue>) -> Self {
        Self { items: Vec::new(), key }
    }

    fn finish(self) -> CurrentGroup {
        CurrentGroup {
            items: Sequence::from_items(self.items),
            key: self.key,
        }
    }
}

fn grouping_keys<'e>(key: &'e Expr, item: &Item, position: usize, last: usize, ctx: &XPathContext<'e>) -> Result<Vec<AtomicValue>> {
    let c = ctx.with_focus(item.clone(), position, Some(last));
    let mut iter = key.iterate(&c)?;
    Ok(collect_items(iter.as_mut())?
        .iter()
        .map(Item::atomize)
        .collect())
}

fn group_by<'e>(population: &[Item], key: &'e Expr, ctx: &XPathContext<'e>) -> Result<Vec<CurrentGroup>> {
    let last = population.len();
    let mut index: HashMap<ComparisonKey, usize> = HashMap::new();
    let mut groups: Vec<GroupBuilder> = Vec::new();
    for (i, item) in population.iter().enumerate() {
        let mut joined: Vec<usize> = Vec::new();
        for value in grouping_keys(key, item, i + 1, last, ctx)? {
            let slot = *index.entry(value.comparison_key()).or_insert_with(|| {
                groups.push(GroupBuilder::new(Some(value.clone())));
                groups.len() - 1
            });
            if !joined.contains(&slot) {
                joined.push(slot);
                groups[slot].items.push(item.clone());
            }
        }
    }
    Ok(groups.into_iter().map(GroupBuilder::finish).collect())
}

fn group_adjacent<'e>(population: &[Item], key: &'e Expr, ctx: &XPathContext<'e>) -> Result<Vec<CurrentGroup>> {
    let last = population.len();
    let mut groups: Vec<GroupBuilder> = Vec::new();
    let mut previous: Option<ComparisonKey> = None;
    for (i, item) in population.iter().enumerate() {
        let mut keys = grouping_keys(key, item, i + 1, last, ctx)?;
        if keys.len() != 1 {
            return Err(XsltError::type_error(
                "XTTE1100",
                format!("The group-adjacent key must be a single atomic value, found {} items", keys.len()),
            ));
        }
        let value = keys.remove(0);
        let comparable = value.comparison_key();
        if previous.as_ref() != Some(&comparable) {
            groups.push(GroupBuilder::new(Some(value)));
            previous = Some(comparable);
        }
        if let Some(group) = groups.last_mut() {
            group.items.push(item.clone());
        }
    }
    Ok(groups.into_iter().map(GroupBuilder::finish).collect())
}

fn group_by_pattern<'e>(
    population: &[Item],
    pattern: &'e Pattern,
    starting: bool,
    ctx: &XPathContext<'e>,
) -> Result<Vec<CurrentGroup>> {
    let mut groups: Vec<GroupBuilder> = Vec::new();
    let mut open = false;
    for item in population {
        let Item::Node(node) = item else {
            return Err(XsltError::type_error(
                "XTTE1120",
                "group-starting-with and group-ending-with require a sequence of nodes",
            ));
        };
        let matched = pattern.matches(node, ctx)?;
        if !open || (starting && matched) {
            groups.push(GroupBuilder::new(None));
        }
        if let Some(group) = groups.last_mut() {
            group.items.push(item.clone());
        }
        open = !(matched && !starting);
    }
    Ok(groups.into_iter().map(GroupBuilder::finish).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_context;
    use trellis_xdm::{StaticNamespaces, parse_document};

    fn rendered(groups: &[CurrentGroup]) -> Vec<String> {
        groups.iter().map(|g| g.items.string_join(",")).collect()
    }

    #[test]
    fn test_group_by_orders_by_first_occurrence() {
        let g = ForEachGroup::new(
            Expr::xpath("(1, 2, 2, 3, 1)").unwrap(),
            GroupingAlgorithm::By(Box::new(Expr::ContextItem)),
            Expr::empty(),
        );
        with_context(|ctx| {
            let groups = g.groups(&ctx).unwrap();
            assert_eq!(rendered(&groups), ["1,1", "2,2", "3"]);
            assert_eq!(groups[1].key.as_ref().map(|k| k.to_string_value()).as_deref(), Some("2"));
        });
    }

    #[test]
    fn test_group_adjacent_only_merges_neighbours() {
        let g = ForEachGroup::new(
            Expr::xpath("(1, 2, 2, 3, 1)").unwrap(),
            GroupingAlgorithm::Adjacent(Box::new(Expr::ContextItem)),
            Expr::empty(),
        );
        with_context(|ctx| {
            assert_eq!(rendered(&g.groups(&ctx).unwrap()), ["1", "2,2", "3", "1"]);
        });
    }

    #[test]
    fn test_group_adjacent_rejects_empty_key() {
        let g = ForEachGroup::new(
            Expr::xpath("(1, 2)").unwrap(),
            GroupingAlgorithm::Adjacent(Box::new(Expr::empty())),
            Expr::empty(),
        );
        with_context(|ctx| {
            assert_eq!(g.groups(&ctx).unwrap_err().code(), "XTTE1100");
        });
    }

    #[test]
    fn test_group_starting_and_ending_with() {
        let doc = parse_document("<r><h/><p/><p/><h/><p/></r>", None).unwrap();
        let ns = StaticNamespaces::new();
        let select = Expr::xpath("/r/*").unwrap();
        let starting = ForEachGroup::new(
            select.clone(),
            GroupingAlgorithm::StartingWith(Pattern::parse("h", &ns).unwrap()),
            Expr::empty(),
        );
        let ending = ForEachGroup::new(
            select,
            GroupingAlgorithm::EndingWith(Pattern::parse("h", &ns).unwrap()),
            Expr::empty(),
        );
        let names = |groups: Vec<CurrentGroup>| -> Vec<String> {
            groups
                .iter()
                .map(|g| {
                    g.items
                        .iter()
                        .filter_map(|i| i.as_node().map(|n| n.local_name().to_string()))
                        .collect::<Vec<_>>()
                        .join("")
                })
                .collect()
        };
        with_context(|ctx| {
            let ctx = ctx.with_focus(Item::Node(doc.clone()), 1, Some(1));
            assert_eq!(names(starting.groups(&ctx).unwrap()), ["hpp", "hp"]);
            assert_eq!(names(ending.groups(&ctx).unwrap()), ["h", "pph", "p"]);
        });
    }

    #[test]
    fn test_groups_sorted_by_key() {
        let g = ForEachGroup::new(
            Expr::xpath("(1, 2, 2, 3, 1)").unwrap(),
            GroupingAlgorithm::By(Box::new(Expr::ContextItem)),
            Expr::empty(),
        )
        .sorted_by(SortKeyDefinition::new(Expr::xpath("count(current-group())").unwrap()));
        with_context(|ctx| {
            assert_eq!(rendered(&g.groups(&ctx).unwrap()), ["3", "1,1", "2,2"]);
        });
    }

    #[test]
    fn test_action_sees_current_group() {
        let g = ForEachGroup::new(
            Expr::xpath("(1, 2, 2, 3, 1)").unwrap(),
            GroupingAlgorithm::By(Box::new(Expr::ContextItem)),
            Expr::xpath("concat(current-grouping-key(), ':', count(current-group()))").unwrap(),
        );
        with_context(|ctx| {
            let out = ctx.capture(|c| g.process(c)).unwrap();
            assert_eq!(out.string_join(" "), "1:2 2:2 3:1");
        });
    }
}
