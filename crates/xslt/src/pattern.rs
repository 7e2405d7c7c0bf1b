//! `match` patterns: parsing, matching, default priorities and the node kind
//! each pattern is indexed under.
use crate::context::XPathContext;
use crate::error::{Result, XsltError};
use crate::expr::parser::{nc_name, node_test, predicate, resolve_names, uri_for, ws};
use crate::expr::xpath::predicate_matches;
use crate::expr::{Expr, NodeTest};
use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::combinator::{map, opt, value};
use nom::multi::{many0, separated_list1};
use nom::sequence::{pair, preceded, terminated};
use std::fmt;
use trellis_xdm::{Item, NamespaceResolver, NodeHandle, NodeKind};

/// How a step relates to the step before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    /// `/`: the previous step matches the parent.
    Child,
    /// `//`: the previous step matches some ancestor.
    Descendant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchAxis {
    Child,
    Attribute,
}

/// Where the first step of a path must sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// `a/b`: anywhere.
    Relative,
    /// `/a`: directly below a document node.
    Root,
    /// `//a`: anywhere below a document node.
    Document,
}

#[derive(Debug, Clone)]
struct MatchStep {
    separator: Separator,
    axis: MatchAxis,
    test: NodeTest,
    predicate: Option<Expr>,
}

/// A single location path within a pattern, e.g. `/doc/section/para`.
#[derive(Debug, Clone)]
struct LocationPathPattern {
    anchor: Anchor,
    steps: Vec<MatchStep>,
}

/// A compiled `match` pattern: one or more location paths joined by `|`.
#[derive(Debug, Clone)]
pub struct Pattern {
    paths: Vec<LocationPathPattern>,
    original_text: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original_text)
    }
}

impl Pattern {
    /// Parses a pattern, resolving prefixes against `namespaces`.
    pub fn parse(text: &str, namespaces: &dyn NamespaceResolver) -> Result<Pattern> {
        let mut paths = match pattern_parser(text.trim()) {
            Ok(("", paths)) => paths,
            Ok((rest, _)) => {
                return Err(XsltError::static_error(
                    "XTSE0340",
                    format!("Syntax error in pattern '{}': unexpected '{}'", text, rest),
                ));
            }
            Err(e) => {
                return Err(XsltError::static_error(
                    "XTSE0340",
                    format!("Syntax error in pattern '{}': {}", text, e),
                ));
            }
        };
        for step in paths.iter_mut().flat_map(|p| p.steps.iter_mut()) {
            match &mut step.test {
                NodeTest::Name(name) if !name.prefix.is_empty() => {
                    name.uri = uri_for(&name.prefix, namespaces)?;
                }
                NodeTest::NamespaceWildcard(prefix) => *prefix = uri_for(prefix, namespaces)?,
                _ => {}
            }
            if let Some(p) = &mut step.predicate {
                resolve_names(p, namespaces)?;
            }
        }
        Ok(Pattern {
            paths,
            original_text: text.trim().to_string(),
        })
    }

    /// Evaluates whether `node` matches this pattern. Predicates are
    /// evaluated with the node as context item.
    pub fn matches<'e>(&'e self, node: &NodeHandle, ctx: &XPathContext<'e>) -> Result<bool> {
        for path in &self.paths {
            if path.matches(node, ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Splits a union into its alternatives, each of which takes part in
    /// rule selection with its own default priority.
    pub fn alternatives(&self) -> Vec<Pattern> {
        if self.paths.len() == 1 {
            return vec![self.clone()];
        }
        self.paths
            .iter()
            .map(|p| Pattern {
                paths: vec![p.clone()],
                original_text: self.original_text.clone(),
            })
            .collect()
    }

    /// The XSLT 2.0 default priority. For a union this is the highest
    /// priority of any alternative.
    pub fn default_priority(&self) -> f64 {
        self.paths
            .iter()
            .map(LocationPathPattern::default_priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// The step predicates, for binding the variables they reference.
    pub(crate) fn predicates_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        self.paths
            .iter_mut()
            .flat_map(|p| p.steps.iter_mut())
            .filter_map(|s| s.predicate.as_mut())
    }

    /// The only kind of node this pattern can match, if it is restricted
    /// to one.
    pub fn node_kind(&self) -> Option<NodeKind> {
        let mut kinds = self.paths.iter().map(LocationPathPattern::node_kind);
        let first = kinds.next().flatten()?;
        kinds.all(|k| k == Some(first)).then_some(first)
    }
}

impl LocationPathPattern {
    fn matches<'e>(&'e self, node: &NodeHandle, ctx: &XPathContext<'e>) -> Result<bool> {
        match self.steps.len() {
            // "/"
            0 => Ok(node.kind() == NodeKind::Document),
            n => self.matches_step(node, n - 1, ctx),
        }
    }

    fn matches_step<'e>(&'e self, node: &NodeHandle, index: usize, ctx: &XPathContext<'e>) -> Result<bool> {
        let step = &self.steps[index];
        if !step.matches(node, ctx)? {
            return Ok(false);
        }
        if index == 0 {
            return Ok(match self.anchor {
                Anchor::Relative => true,
                Anchor::Root => node.parent().is_some_and(|p| p.kind() == NodeKind::Document),
                Anchor::Document => node.parent().is_some() && node.root().kind() == NodeKind::Document,
            });
        }
        match step.separator {
            Separator::Child => match node.parent() {
                Some(parent) => self.matches_step(&parent, index - 1, ctx),
                None => Ok(false),
            },
            Separator::Descendant => {
                for ancestor in node.ancestors() {
                    if self.matches_step(&ancestor, index - 1, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn default_priority(&self) -> f64 {
        match (self.anchor, self.steps.as_slice()) {
            (Anchor::Root, []) => -0.5,
            (Anchor::Relative, [step]) if step.predicate.is_none() => match &step.test {
                NodeTest::Name(_) => 0.0,
                NodeTest::NamespaceWildcard(_) | NodeTest::LocalWildcard(_) => -0.25,
                NodeTest::Wildcard | NodeTest::Kind(_) => -0.5,
            },
            _ => 0.5,
        }
    }

    fn node_kind(&self) -> Option<NodeKind> {
        let Some(last) = self.steps.last() else {
            return Some(NodeKind::Document);
        };
        match (last.axis, &last.test) {
            (MatchAxis::Attribute, _) => Some(NodeKind::Attribute),
            (MatchAxis::Child, NodeTest::Kind(kind)) => *kind,
            (MatchAxis::Child, _) => Some(NodeKind::Element),
        }
    }
}

impl MatchStep {
    fn test_matches(&self, node: &NodeHandle) -> bool {
        match self.axis {
            MatchAxis::Attribute => {
                node.kind() == NodeKind::Attribute && self.test.matches(node, NodeKind::Attribute)
            }
            MatchAxis::Child => match node.kind() {
                NodeKind::Attribute | NodeKind::Namespace => false,
                NodeKind::Document => self.test == NodeTest::Kind(Some(NodeKind::Document)),
                _ => self.test.matches(node, NodeKind::Element),
            },
        }
    }

    fn matches<'e>(&'e self, node: &NodeHandle, ctx: &XPathContext<'e>) -> Result<bool> {
        if !self.test_matches(node) {
            return Ok(false);
        }
        let Some(predicate) = &self.predicate else {
            return Ok(true);
        };
        // Position and size count the siblings this step would select.
        let (position, last) = match node.parent() {
            None => (1, 1),
            Some(parent) => {
                let siblings: Vec<NodeHandle> = match self.axis {
                    MatchAxis::Attribute => parent.attributes().collect(),
                    MatchAxis::Child => parent.children().collect(),
                };
                let mut position = 0;
                let mut last = 0;
                for sibling in siblings.iter().filter(|s| self.test_matches(s)) {
                    last += 1;
                    if sibling == node {
                        position = last;
                    }
                }
                (position.max(1), last.max(1))
            }
        };
        let focus = ctx.with_focus(Item::Node(node.clone()), position, Some(last));
        predicate_matches(predicate, &focus, position)
    }
}

// --- Parser ---

fn pattern_parser(input: &str) -> IResult<&str, Vec<LocationPathPattern>> {
    separated_list1(ws(char('|')), location_path).parse(input)
}

fn location_path(input: &str) -> IResult<&str, LocationPathPattern> {
    let (input, anchor) = opt(ws(alt((
        value(Anchor::Document, tag("//")),
        value(Anchor::Root, tag("/")),
    ))))
    .parse(input)?;
    let anchor = anchor.unwrap_or(Anchor::Relative);
    let (input, steps) = match anchor {
        Anchor::Root => opt(relative_path).parse(input)?,
        _ => map(relative_path, Some).parse(input)?,
    };
    Ok((
        input,
        LocationPathPattern {
            anchor,
            steps: steps.unwrap_or_default(),
        },
    ))
}

fn relative_path(input: &str) -> IResult<&str, Vec<MatchStep>> {
    let (input, first) = step_parser(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(Separator::Descendant, tag("//")),
            value(Separator::Child, tag("/")),
        ))),
        step_parser,
    ))
    .parse(input)?;
    let mut steps = vec![first];
    for (separator, mut step) in rest {
        step.separator = separator;
        steps.push(step);
    }
    Ok((input, steps))
}

fn step_parser(input: &str) -> IResult<&str, MatchStep> {
    let (input, (axis, test)) = ws(alt((
        map(preceded(char('@'), node_test), |t| (MatchAxis::Attribute, t)),
        map(preceded(axis_specifier("attribute"), node_test), |t| (MatchAxis::Attribute, t)),
        map(preceded(opt(axis_specifier("child")), node_test), |t| (MatchAxis::Child, t)),
    )))
    .parse(input)?;
    let (input, predicate) = opt(predicate).parse(input)?;
    Ok((
        input,
        MatchStep {
            separator: Separator::Child,
            axis,
            test,
            predicate,
        },
    ))
}

fn axis_specifier<'a>(name: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(
        nom::combinator::verify(nc_name, move |n: &str| n == name),
        ws(tag("::")),
    )
}
