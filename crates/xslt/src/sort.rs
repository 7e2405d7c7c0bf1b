//! `xsl:sort`: sort key definitions, atomic comparers and the sorted
//! iterator used by `xsl:for-each`, `xsl:apply-templates` and the group
//! re-sort of `xsl:for-each-group`.
use crate::context::XPathContext;
use crate::error::{Result, XsltError};
use crate::expr::Expr;
use crate::iter::{ListIterator, SeqIter, SequenceIterator, collect_items};
use std::cmp::Ordering;
use trellis_xdm::{AtomicValue, Item, Sequence};

pub const CODEPOINT_COLLATION: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDataType {
    Text,
    Number,
}

/// One `xsl:sort` element. `select` is evaluated with each item to be
/// sorted as the context item.
#[derive(Debug, Clone)]
pub struct SortKeyDefinition {
    pub select: Expr,
    pub order: SortOrder,
    pub data_type: Option<SortDataType>,
    pub collation: Option<String>,
}

impl SortKeyDefinition {
    pub fn new(select: Expr) -> Self {
        Self {
            select,
            order: SortOrder::Ascending,
            data_type: None,
            collation: None,
        }
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    pub fn with_data_type(mut self, data_type: SortDataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// The comparer this key sorts with.
    pub fn comparer(&self) -> Result<AtomicComparer> {
        AtomicComparer::new(self.data_type, self.collation.as_deref())
    }
}

/// Compares optional sort key values. The empty key sorts before every
/// other value and NaN sorts before every number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicComparer {
    /// Strings by Unicode codepoint.
    Codepoint,
    /// Numbers by value, after conversion to `xs:double`.
    Numeric,
    /// Values by their own type's ordering.
    Generic,
}

impl AtomicComparer {
    pub fn new(data_type: Option<SortDataType>, collation: Option<&str>) -> Result<Self> {
        if let Some(uri) = collation {
            if uri != CODEPOINT_COLLATION {
                return Err(XsltError::dynamic(
                    "FOCH0002",
                    format!("Unsupported collation {}", uri),
                ));
            }
        }
        Ok(match data_type {
            Some(SortDataType::Text) => AtomicComparer::Codepoint,
            Some(SortDataType::Number) => AtomicComparer::Numeric,
            None => AtomicComparer::Generic,
        })
    }

    pub fn compare(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering> {
        let (a, b) = match (a, b) {
            (None, None) => return Ok(Ordering::Equal),
            (None, Some(_)) => return Ok(Ordering::Less),
            (Some(_), None) => return Ok(Ordering::Greater),
            (Some(a), Some(b)) => (a, b),
        };
        match self {
            AtomicComparer::Codepoint => Ok(a.to_string_value().cmp(&b.to_string_value())),
            AtomicComparer::Numeric => Ok(compare_doubles(number(a), number(b))),
            AtomicComparer::Generic => {
                if a.is_numeric() && b.is_numeric() {
                    let (x, y) = (a.to_double(), b.to_double());
                    if x.is_nan() || y.is_nan() {
                        return Ok(compare_doubles(x, y));
                    }
                }
                a.compare(b).ok_or_else(|| {
                    XsltError::dynamic(
                        "XTDE1030",
                        format!(
                            "Cannot compare sort keys of type {} and {}",
                            a.atomic_type(),
                            b.atomic_type()
                        ),
                    )
                })
            }
        }
    }
}

fn number(value: &AtomicValue) -> f64 {
    if value.is_numeric() {
        return value.to_double();
    }
    value
        .convert_to(trellis_xdm::AtomicType::Double)
        .map(|d| d.to_double())
        .unwrap_or(f64::NAN)
}

fn compare_doubles(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Evaluates every sort key for the focus held by `ctx`. A key may be empty
/// but must not be longer than one item.
pub(crate) fn evaluate_keys<'e>(
    keys: &'e [SortKeyDefinition],
    ctx: &XPathContext<'e>,
) -> Result<Vec<Option<AtomicValue>>> {
    keys.iter()
        .map(|key| {
            let mut iter = key.select.iterate(ctx)?;
            let first = iter.next()?;
            if first.is_some() && iter.next()?.is_some() {
                return Err(XsltError::type_error(
                    "XTTE1020",
                    "A sort key evaluated to more than one item",
                ));
            }
            Ok(first.map(|item| item.atomize()))
        })
        .collect()
}

/// Stable sort of `rows` by their precomputed keys.
pub(crate) fn sort_rows<T>(
    rows: Vec<(T, Vec<Option<AtomicValue>>)>,
    keys: &[SortKeyDefinition],
) -> Result<Vec<T>> {
    let comparers = keys
        .iter()
        .map(|k| k.comparer().map(|c| (c, k.order)))
        .collect::<Result<Vec<_>>>()?;
    let mut failure: Option<XsltError> = None;
    let mut rows = rows;
    rows.sort_by(|(_, a), (_, b)| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        for (i, (comparer, order)) in comparers.iter().enumerate() {
            match comparer.compare(a[i].as_ref(), b[i].as_ref()) {
                Ok(Ordering::Equal) => continue,
                Ok(o) if *order == SortOrder::Descending => return o.reverse(),
                Ok(o) => return o,
                Err(e) => {
                    failure = Some(e);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(rows.into_iter().map(|(row, _)| row).collect()),
    }
}

/// Delivers the items of a base sequence in sort-key order. The base is
/// read and sorted on construction; positions and `last()` seen by the key
/// expressions refer to the unsorted sequence.
pub struct SortedIterator {
    sorted: ListIterator,
}

impl SortedIterator {
    pub fn new<'e>(
        mut base: SeqIter<'e>,
        keys: &'e [SortKeyDefinition],
        ctx: &XPathContext<'e>,
    ) -> Result<Self> {
        let items = collect_items(base.as_mut())?;
        let last = items.len();
        let mut rows = Vec::with_capacity(last);
        for (i, item) in items.into_iter().enumerate() {
            let focus = ctx.with_focus(item.clone(), i + 1, Some(last));
            let values = evaluate_keys(keys, &focus)?;
            rows.push((item, values));
        }
        let sorted = sort_rows(rows, keys)?;
        Ok(Self {
            sorted: ListIterator::new(Sequence::from_items(sorted)),
        })
    }

    pub fn boxed<'e>(base: SeqIter<'e>, keys: &'e [SortKeyDefinition], ctx: &XPathContext<'e>) -> Result<SeqIter<'e>> {
        Ok(Box::new(Self::new(base, keys, ctx)?))
    }
}

impl<'e> SequenceIterator<'e> for SortedIterator {
    fn next(&mut self) -> Result<Option<Item>> {
        SequenceIterator::next(&mut self.sorted)
    }

    fn current(&self) -> Option<&Item> {
        SequenceIterator::current(&self.sorted)
    }

    fn position(&self) -> usize {
        SequenceIterator::position(&self.sorted)
    }

    fn get_another(&self) -> Result<SeqIter<'e>> {
        SequenceIterator::get_another(&self.sorted)
    }

    fn known_length(&self) -> Option<usize> {
        SequenceIterator::known_length(&self.sorted)
    }
}
