//! Items and sequences.
use crate::atomic::AtomicValue;
use crate::error::{Result, XdmError};
use crate::tree::{NodeHandle, NodeKind};
use std::sync::Arc;

/// A single XDM item: a node or an atomic value.
#[derive(Debug, Clone)]
pub enum Item {
    Node(NodeHandle),
    Atomic(AtomicValue),
}

impl Item {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_node(&self) -> Option<&NodeHandle> {
        match self {
            Item::Node(n) => Some(n),
            Item::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            Item::Node(_) => None,
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            Item::Node(n) => n.string_value(),
            Item::Atomic(a) => a.to_string_value(),
        }
    }

    /// The typed value. Untyped trees yield `xs:untypedAtomic` for element,
    /// attribute, text and document nodes, and `xs:string` for the rest.
    pub fn atomize(&self) -> AtomicValue {
        match self {
            Item::Atomic(a) => a.clone(),
            Item::Node(n) => match n.kind() {
                NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                    AtomicValue::String(n.string_value())
                }
                _ => AtomicValue::UntypedAtomic(n.string_value()),
            },
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Node(a), Item::Node(b)) => a == b,
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            _ => false,
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(value: AtomicValue) -> Self {
        Item::Atomic(value)
    }
}

impl From<NodeHandle> for Item {
    fn from(node: NodeHandle) -> Self {
        Item::Node(node)
    }
}

/// An immutable, shareable sequence value. Clones share storage, so
/// [`Sequence::same_value`] can tell whether two references denote the very
/// same computed value.
#[derive(Debug, Clone, Default)]
pub struct Sequence(Arc<Vec<Item>>);

impl Sequence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Sequence(Arc::new(items))
    }

    pub fn singleton(item: impl Into<Item>) -> Self {
        Sequence(Arc::new(vec![item.into()]))
    }

    pub fn items(&self) -> &[Item] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Item> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.0.iter()
    }

    pub fn same_value(a: &Sequence, b: &Sequence) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// XPath effective boolean value (FORG0006 when undefined).
    pub fn effective_boolean_value(&self) -> Result<bool> {
        effective_boolean_value(self.items())
    }

    pub fn atomize(&self) -> Vec<AtomicValue> {
        self.0.iter().map(Item::atomize).collect()
    }

    pub fn string_join(&self, separator: &str) -> String {
        self.0
            .iter()
            .map(Item::string_value)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl From<Vec<Item>> for Sequence {
    fn from(items: Vec<Item>) -> Self {
        Sequence::from_items(items)
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.items() == other.items()
    }
}

pub fn effective_boolean_value(items: &[Item]) -> Result<bool> {
    match items {
        [] => Ok(false),
        [Item::Node(_), ..] => Ok(true),
        [Item::Atomic(a)] => a.effective_boolean_value(),
        _ => Err(XdmError::Conversion {
            code: "FORG0006",
            message: "Effective boolean value is not defined for a sequence of two or more atomic values"
                .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_boolean_value() {
        assert!(!Sequence::empty().effective_boolean_value().unwrap());
        assert!(Sequence::singleton(AtomicValue::Integer(3)).effective_boolean_value().unwrap());
        let pair = Sequence::from_items(vec![
            Item::Atomic(AtomicValue::Integer(1)),
            Item::Atomic(AtomicValue::Integer(2)),
        ]);
        assert!(pair.effective_boolean_value().is_err());
    }

    #[test]
    fn test_same_value_tracks_identity() {
        let a = Sequence::singleton(AtomicValue::from("x"));
        let b = a.clone();
        let c = Sequence::singleton(AtomicValue::from("x"));
        assert!(Sequence::same_value(&a, &b));
        assert!(!Sequence::same_value(&a, &c));
        assert_eq!(a, c);
    }

    #[test]
    fn test_atomize_nodes() {
        let doc = crate::tree::parse_document("<a>12</a>", None).unwrap();
        let item = Item::Node(doc);
        assert!(item.atomize().is_untyped());
        assert_eq!(item.string_value(), "12");
    }
}
