//! The pull-mode iterator protocol.
use crate::error::Result;
use trellis_xdm::{Item, Sequence};

/// A lazy, single-pass cursor over a sequence of items.
///
/// Iterators are not rewound; [`SequenceIterator::get_another`] returns a
/// fresh iterator positioned at the start of the same sequence.
pub trait SequenceIterator<'e> {
    fn next(&mut self) -> Result<Option<Item>>;

    /// The item most recently returned by `next`.
    fn current(&self) -> Option<&Item>;

    /// One-based position of the current item, zero before the first call
    /// to `next`.
    fn position(&self) -> usize;

    fn get_another(&self) -> Result<SeqIter<'e>>;

    /// The length of the sequence when it is known without consuming items.
    fn known_length(&self) -> Option<usize> {
        None
    }
}

pub type SeqIter<'e> = Box<dyn SequenceIterator<'e> + 'e>;

/// Drains an iterator into a vector.
pub fn collect_items(iter: &mut dyn SequenceIterator<'_>) -> Result<Vec<Item>> {
    let mut out = Vec::new();
    while let Some(item) = iter.next()? {
        out.push(item);
    }
    Ok(out)
}

pub fn collect_sequence(mut iter: SeqIter<'_>) -> Result<Sequence> {
    collect_items(iter.as_mut()).map(Sequence::from_items)
}

/// The length of the sequence behind `iter`, counted on a fresh copy when not
/// known directly.
pub fn count_items(iter: &dyn SequenceIterator<'_>) -> Result<usize> {
    if let Some(n) = iter.known_length() {
        return Ok(n);
    }
    let mut another = iter.get_another()?;
    let mut n = 0;
    while another.next()?.is_some() {
        n += 1;
    }
    Ok(n)
}

/// Iterates over an already materialized sequence.
#[derive(Debug, Clone)]
pub struct ListIterator {
    items: Sequence,
    position: usize,
}

impl ListIterator {
    pub fn new(items: Sequence) -> Self {
        Self { items, position: 0 }
    }

    pub fn boxed<'e>(items: Sequence) -> SeqIter<'e> {
        Box::new(Self::new(items))
    }

    pub fn from_items<'e>(items: Vec<Item>) -> SeqIter<'e> {
        Self::boxed(Sequence::from_items(items))
    }
}

impl<'e> SequenceIterator<'e> for ListIterator {
    fn next(&mut self) -> Result<Option<Item>> {
        let item = self.items.items().get(self.position).cloned();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    fn current(&self) -> Option<&Item> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.items.items().get(i))
    }

    fn position(&self) -> usize {
        self.position
    }

    fn get_another(&self) -> Result<SeqIter<'e>> {
        Ok(ListIterator::boxed(self.items.clone()))
    }

    fn known_length(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

pub fn empty_iterator<'e>() -> SeqIter<'e> {
    ListIterator::boxed(Sequence::empty())
}

pub fn singleton_iterator<'e>(item: Option<Item>) -> SeqIter<'e> {
    match item {
        Some(item) => ListIterator::boxed(Sequence::singleton(item)),
        None => empty_iterator(),
    }
}
