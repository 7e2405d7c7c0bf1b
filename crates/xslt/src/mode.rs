//! Modes and template rules.
//!
//! A [`Mode`] keeps its rules in rank order: higher import precedence
//! first, then higher priority, then later declaration. Lookup walks the
//! rules that could match the node's kind, merged back into rank order,
//! and takes the first whose pattern matches.
use crate::context::XPathContext;
use crate::error::Result;
use crate::pattern::Pattern;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashMap;
use trellis_xdm::{NodeHandle, NodeKind, QName};

/// Index of a template in its executable.
pub type TemplateId = usize;

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub template: TemplateId,
    pub precedence: i32,
    pub priority: f64,
    /// Declaration order within the stylesheet.
    pub sequence: usize,
    /// Lowest precedence among the modules imported by the rule's own
    /// module; bounds the search made by `xsl:apply-imports`.
    pub min_import_precedence: i32,
}

impl Rule {
    /// Rank order: the rule to prefer sorts first.
    fn rank(&self, other: &Rule) -> Ordering {
        other
            .precedence
            .cmp(&self.precedence)
            .then(other.priority.total_cmp(&self.priority))
            .then(other.sequence.cmp(&self.sequence))
    }

    fn same_rank(&self, other: &Rule) -> bool {
        self.precedence == other.precedence && self.priority == other.priority
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mode {
    name: Option<QName>,
    rules: Vec<Rule>,
    /// Indices into `rules` of the rules restricted to one node kind.
    by_kind: HashMap<NodeKind, Vec<usize>>,
    /// Indices of rules whose pattern can match nodes of any kind.
    generic: Vec<usize>,
    next_sequence: usize,
}

impl Mode {
    /// A mode; `None` names the default mode.
    pub fn new(name: Option<QName>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&QName> {
        self.name.as_ref()
    }

    pub fn is_default(&self) -> bool {
        self.name.is_none()
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map(QName::display_name)
            .unwrap_or_else(|| "#default".to_string())
    }

    /// Registers `pattern` for `template`. Each alternative of a union
    /// becomes its own rule, with the default priority of that alternative
    /// unless `priority` is given.
    pub fn add_rule(
        &mut self,
        pattern: &Pattern,
        template: TemplateId,
        precedence: i32,
        min_import_precedence: i32,
        priority: Option<f64>,
    ) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        for alternative in pattern.alternatives() {
            let priority = priority.unwrap_or_else(|| alternative.default_priority());
            self.rules.push(Rule {
                pattern: alternative,
                template,
                precedence,
                priority,
                sequence,
                min_import_precedence,
            });
        }
        self.reindex();
    }

    fn reindex(&mut self) {
        self.rules.sort_by(Rule::rank);
        self.by_kind.clear();
        self.generic.clear();
        for (i, rule) in self.rules.iter().enumerate() {
            match rule.pattern.node_kind() {
                Some(kind) => self.by_kind.entry(kind).or_default().push(i),
                None => self.generic.push(i),
            }
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Candidate rules for `node` in rank order.
    fn candidates<'a>(&'a self, node: &NodeHandle) -> impl Iterator<Item = &'a Rule> + 'a {
        let specific = self
            .by_kind
            .get(&node.kind())
            .map(Vec::as_slice)
            .unwrap_or_default();
        [specific.iter(), self.generic.iter()]
            .into_iter()
            .kmerge()
            .map(move |&i| &self.rules[i])
    }

    fn first_match<'e, F>(&'e self, node: &NodeHandle, ctx: &XPathContext<'e>, mut accept: F) -> Result<Option<&'e Rule>>
    where
        F: FnMut(&Rule) -> bool,
    {
        let mut best: Option<&'e Rule> = None;
        for rule in self.candidates(node).filter(|r| accept(r)) {
            match best {
                None => {
                    if rule.pattern.matches(node, ctx)? {
                        best = Some(rule);
                    }
                }
                Some(chosen) => {
                    if !rule.same_rank(chosen) {
                        break;
                    }
                    if rule.pattern.matches(node, ctx)? {
                        log::warn!(
                            "Ambiguous rule match for {:?} in mode {}: '{}' and '{}' have the same precedence and priority",
                            node,
                            self.display_name(),
                            chosen.pattern,
                            rule.pattern
                        );
                        break;
                    }
                }
            }
        }
        Ok(best)
    }

    /// The best rule matching `node`.
    pub fn get_rule<'e>(&'e self, node: &NodeHandle, ctx: &XPathContext<'e>) -> Result<Option<&'e Rule>> {
        self.first_match(node, ctx, |_| true)
    }

    /// The best matching rule whose precedence lies in `min..=max`.
    pub fn get_rule_in_precedence_range<'e>(
        &'e self,
        node: &NodeHandle,
        min: i32,
        max: i32,
        ctx: &XPathContext<'e>,
    ) -> Result<Option<&'e Rule>> {
        self.first_match(node, ctx, |r| r.precedence >= min && r.precedence <= max)
    }

    /// The best matching rule ranked after `current`.
    pub fn get_next_matching_rule<'e>(
        &'e self,
        node: &NodeHandle,
        current: &Rule,
        ctx: &XPathContext<'e>,
    ) -> Result<Option<&'e Rule>> {
        self.first_match(node, ctx, |r| r.rank(current) == Ordering::Greater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_context;
    use trellis_xdm::{StaticNamespaces, parse_document};

    fn pattern(text: &str) -> Pattern {
        Pattern::parse(text, &StaticNamespaces::new()).unwrap()
    }

    fn para() -> NodeHandle {
        let doc = parse_document("<doc><para/></doc>", None).unwrap();
        doc.descendants().find(|n| n.local_name() == "para").unwrap()
    }

    #[test]
    fn test_priority_then_precedence() {
        let mut mode = Mode::new(None);
        mode.add_rule(&pattern("*"), 0, 1, 1, None);
        mode.add_rule(&pattern("para"), 1, 1, 1, None);
        mode.add_rule(&pattern("node()"), 2, 2, 1, None);
        let node = para();
        with_context(|ctx| {
            // Higher precedence wins over a better priority.
            assert_eq!(mode.get_rule(&node, &ctx).unwrap().unwrap().template, 2);
            let first = mode.get_rule_in_precedence_range(&node, 0, 1, &ctx).unwrap().unwrap();
            assert_eq!(first.template, 1);
            let next = mode.get_next_matching_rule(&node, first, &ctx).unwrap().unwrap();
            assert_eq!(next.template, 0);
            assert!(mode.get_next_matching_rule(&node, next, &ctx).unwrap().is_none());
        });
    }

    #[test]
    fn test_later_declaration_wins_ties() {
        let mut mode = Mode::new(None);
        mode.add_rule(&pattern("para"), 0, 1, 1, None);
        mode.add_rule(&pattern("doc/para"), 1, 1, 1, Some(0.0));
        let node = para();
        with_context(|ctx| {
            assert_eq!(mode.get_rule(&node, &ctx).unwrap().unwrap().template, 1);
        });
    }

    #[test]
    fn test_union_alternatives_rank_separately() {
        let mut mode = Mode::new(None);
        mode.add_rule(&pattern("text() | para"), 0, 1, 1, None);
        mode.add_rule(&pattern("*"), 1, 1, 1, Some(-0.1));
        assert_eq!(mode.rules().len(), 3);
        let node = para();
        with_context(|ctx| {
            assert_eq!(mode.get_rule(&node, &ctx).unwrap().unwrap().template, 0);
        });
    }

    #[test]
    fn test_kind_index_skips_other_kinds() {
        let mut mode = Mode::new(Some(QName::local("toc")));
        mode.add_rule(&pattern("text()"), 0, 1, 1, None);
        let node = para();
        with_context(|ctx| {
            assert!(mode.get_rule(&node, &ctx).unwrap().is_none());
        });
        assert_eq!(mode.display_name(), "toc");
    }
}
