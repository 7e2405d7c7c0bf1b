//! Static types and the function conversion rules applied to variables,
//! parameters and template results.
use crate::error::{Result, XsltError};
use std::fmt;
use trellis_xdm::{AtomicType, AtomicValue, Item, NodeKind, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    AnyItem,
    AnyNode,
    Node(NodeKind),
    Atomic(AtomicType),
}

impl ItemType {
    pub fn matches(&self, item: &Item) -> bool {
        match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::AnyNode, Item::Node(_)) => true,
            (ItemType::Node(kind), Item::Node(n)) => n.kind() == *kind,
            (ItemType::Atomic(t), Item::Atomic(a)) => a.atomic_type().is_subtype_of(*t),
            _ => false,
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, ItemType::Atomic(_))
    }

    pub fn is_subtype_of(&self, other: &ItemType) -> bool {
        match (self, other) {
            (_, ItemType::AnyItem) => true,
            (ItemType::Node(_) | ItemType::AnyNode, ItemType::AnyNode) => true,
            (ItemType::Node(a), ItemType::Node(b)) => a == b,
            (ItemType::Atomic(a), ItemType::Atomic(b)) => a.is_subtype_of(*b),
            _ => false,
        }
    }

    /// The least common supertype.
    pub fn union(&self, other: &ItemType) -> ItemType {
        if self.is_subtype_of(other) {
            *other
        } else if other.is_subtype_of(self) {
            *self
        } else if matches!(self, ItemType::Node(_)) && matches!(other, ItemType::Node(_)) {
            ItemType::AnyNode
        } else if self.is_atomic() && other.is_atomic() {
            ItemType::Atomic(AtomicType::AnyAtomic)
        } else {
            ItemType::AnyItem
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::AnyNode => f.write_str("node()"),
            ItemType::Node(kind) => f.write_str(match kind {
                NodeKind::Document => "document-node()",
                NodeKind::Element => "element()",
                NodeKind::Attribute => "attribute()",
                NodeKind::Text => "text()",
                NodeKind::Comment => "comment()",
                NodeKind::ProcessingInstruction => "processing-instruction()",
                NodeKind::Namespace => "namespace-node()",
            }),
            ItemType::Atomic(t) => write!(f, "{}", t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Empty,
    ZeroOrOne,
    ExactlyOne,
    OneOrMore,
    ZeroOrMore,
}

impl Cardinality {
    pub fn allows_empty(self) -> bool {
        matches!(
            self,
            Cardinality::Empty | Cardinality::ZeroOrOne | Cardinality::ZeroOrMore
        )
    }

    pub fn allows_many(self) -> bool {
        matches!(self, Cardinality::OneOrMore | Cardinality::ZeroOrMore)
    }

    pub fn allows(self, count: usize) -> bool {
        match count {
            0 => self.allows_empty(),
            1 => self != Cardinality::Empty,
            _ => self.allows_many(),
        }
    }

    fn from_flags(zero: bool, one: bool, many: bool) -> Self {
        match (zero, one || many, many) {
            (true, false, _) => Cardinality::Empty,
            (true, true, false) => Cardinality::ZeroOrOne,
            (true, true, true) => Cardinality::ZeroOrMore,
            (false, _, true) => Cardinality::OneOrMore,
            (false, _, false) => Cardinality::ExactlyOne,
        }
    }

    /// Cardinality of a value that is either one or the other.
    pub fn union(self, other: Cardinality) -> Cardinality {
        Cardinality::from_flags(
            self.allows_empty() || other.allows_empty(),
            self != Cardinality::Empty || other != Cardinality::Empty,
            self.allows_many() || other.allows_many(),
        )
    }

    /// Cardinality of the concatenation of two values.
    pub fn sum(self, other: Cardinality) -> Cardinality {
        if self == Cardinality::Empty {
            return other;
        }
        if other == Cardinality::Empty {
            return self;
        }
        let zero = self.allows_empty() && other.allows_empty();
        Cardinality::from_flags(zero, true, true)
    }

    fn suffix(self) -> &'static str {
        match self {
            Cardinality::Empty => "{empty}",
            Cardinality::ZeroOrOne => "?",
            Cardinality::ExactlyOne => "",
            Cardinality::OneOrMore => "+",
            Cardinality::ZeroOrMore => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceType {
    pub item: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub const ANY: SequenceType = SequenceType {
        item: ItemType::AnyItem,
        cardinality: Cardinality::ZeroOrMore,
    };

    pub const EMPTY: SequenceType = SequenceType {
        item: ItemType::AnyItem,
        cardinality: Cardinality::Empty,
    };

    pub fn new(item: ItemType, cardinality: Cardinality) -> Self {
        Self { item, cardinality }
    }

    pub fn single_atomic(t: AtomicType) -> Self {
        Self::new(ItemType::Atomic(t), Cardinality::ExactlyOne)
    }

    pub fn is_any(&self) -> bool {
        *self == SequenceType::ANY
    }

    /// Parses the sequence type syntax used in `as` attributes, for the item
    /// types this runtime knows.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text == "empty-sequence()" {
            return Ok(SequenceType::EMPTY);
        }
        let (body, cardinality) = match text.chars().last() {
            Some('?') => (&text[..text.len() - 1], Cardinality::ZeroOrOne),
            Some('*') if !text.ends_with("(*)") => (&text[..text.len() - 1], Cardinality::ZeroOrMore),
            Some('+') => (&text[..text.len() - 1], Cardinality::OneOrMore),
            _ => (text, Cardinality::ExactlyOne),
        };
        let item = match body.trim() {
            "item()" => ItemType::AnyItem,
            "node()" => ItemType::AnyNode,
            "document-node()" => ItemType::Node(NodeKind::Document),
            "element()" | "element(*)" => ItemType::Node(NodeKind::Element),
            "attribute()" | "attribute(*)" => ItemType::Node(NodeKind::Attribute),
            "text()" => ItemType::Node(NodeKind::Text),
            "comment()" => ItemType::Node(NodeKind::Comment),
            "processing-instruction()" => ItemType::Node(NodeKind::ProcessingInstruction),
            "namespace-node()" => ItemType::Node(NodeKind::Namespace),
            "xs:anyAtomicType" => ItemType::Atomic(AtomicType::AnyAtomic),
            "xs:string" => ItemType::Atomic(AtomicType::String),
            "xs:untypedAtomic" => ItemType::Atomic(AtomicType::UntypedAtomic),
            "xs:anyURI" => ItemType::Atomic(AtomicType::AnyUri),
            "xs:boolean" => ItemType::Atomic(AtomicType::Boolean),
            "xs:integer" => ItemType::Atomic(AtomicType::Integer),
            "xs:decimal" => ItemType::Atomic(AtomicType::Decimal),
            "xs:double" => ItemType::Atomic(AtomicType::Double),
            "xs:float" => ItemType::Atomic(AtomicType::Float),
            "xs:QName" => ItemType::Atomic(AtomicType::QName),
            other => {
                return Err(XsltError::static_error(
                    "XPST0051",
                    format!("Unknown item type '{}'", other),
                ));
            }
        };
        Ok(SequenceType::new(item, cardinality))
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cardinality == Cardinality::Empty {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item, self.cardinality.suffix())
    }
}

/// What a value being converted is for, and the error code a failed
/// conversion reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLocator {
    pub description: String,
    pub code: &'static str,
}

impl RoleLocator {
    pub fn variable(name: &str) -> Self {
        Self {
            description: format!("variable ${}", name),
            code: "XTTE0570",
        }
    }

    pub fn param(name: &str) -> Self {
        Self {
            description: format!("parameter ${}", name),
            code: "XTTE0590",
        }
    }

    pub fn template_result(name: &str) -> Self {
        Self {
            description: format!("result of template {}", name),
            code: "XTTE0505",
        }
    }

    /// The `n`-th (1-based) argument of a stylesheet function.
    pub fn function_argument(name: &str, n: usize) -> Self {
        Self {
            description: format!("argument {} of {}()", n, name),
            code: "XPTY0004",
        }
    }

    pub fn function_result(name: &str) -> Self {
        Self {
            description: format!("result of function {}()", name),
            code: "XPTY0004",
        }
    }

    pub fn instruction(name: &str) -> Self {
        Self {
            description: name.to_string(),
            code: "XPTY0004",
        }
    }

    fn error(&self, message: String) -> XsltError {
        XsltError::type_error(self.code, format!("Required type of {}: {}", self.description, message))
    }
}

/// Applies the function conversion rules: atomization for atomic targets,
/// conversion of untyped values, numeric and URI promotion, then item type
/// and cardinality checks. An unchanged value keeps its identity.
pub fn convert_sequence(value: Sequence, required: &SequenceType, role: &RoleLocator) -> Result<Sequence> {
    if required.is_any() {
        return Ok(value);
    }
    let converted = match required.item {
        ItemType::Atomic(target) if !value.iter().all(|i| required.item.matches(i)) => {
            let mut out = Vec::with_capacity(value.len());
            for atom in value.atomize() {
                out.push(Item::Atomic(convert_atomic(atom, target, role)?));
            }
            Sequence::from_items(out)
        }
        _ => value,
    };
    if let Some(bad) = converted.iter().find(|i| !required.item.matches(i)) {
        return Err(role.error(format!(
            "expected {}, supplied value contains {}",
            required,
            describe(bad)
        )));
    }
    if !required.cardinality.allows(converted.len()) {
        return Err(role.error(format!(
            "expected {}, supplied a sequence of length {}",
            required,
            converted.len()
        )));
    }
    Ok(converted)
}

fn convert_atomic(atom: AtomicValue, target: AtomicType, role: &RoleLocator) -> Result<AtomicValue> {
    if atom.atomic_type().is_subtype_of(target) {
        return Ok(atom);
    }
    if atom.is_untyped() {
        let target = if target == AtomicType::Numeric {
            AtomicType::Double
        } else {
            target
        };
        return atom.convert_to(target).map_err(XsltError::from);
    }
    atom.promote_to(target).ok_or_else(|| {
        role.error(format!(
            "cannot convert {} to {}",
            atom.atomic_type(),
            target
        ))
    })
}

fn describe(item: &Item) -> String {
    match item {
        Item::Node(n) => format!("a {:?} node", n.kind()),
        Item::Atomic(a) => format!("a value of type {}", a.atomic_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: Vec<AtomicValue>) -> Sequence {
        Sequence::from_items(values.into_iter().map(Item::Atomic).collect())
    }

    #[test]
    fn test_parse_sequence_types() {
        assert_eq!(
            SequenceType::parse("xs:integer?").unwrap(),
            SequenceType::new(ItemType::Atomic(AtomicType::Integer), Cardinality::ZeroOrOne)
        );
        assert_eq!(SequenceType::parse("item()*").unwrap(), SequenceType::ANY);
        assert_eq!(
            SequenceType::parse("element(*)").unwrap().item,
            ItemType::Node(NodeKind::Element)
        );
        assert!(SequenceType::parse("xs:date").is_err());
    }

    #[test]
    fn test_untyped_converted_and_promoted() {
        let required = SequenceType::parse("xs:double*").unwrap();
        let value = seq(vec![AtomicValue::UntypedAtomic("1.5".into()), AtomicValue::Integer(2)]);
        let out = convert_sequence(value, &required, &RoleLocator::param("p")).unwrap();
        assert!(out.iter().all(|i| matches!(i, Item::Atomic(AtomicValue::Double(_)))));
    }

    #[test]
    fn test_identity_preserved_when_unchanged() {
        let required = SequenceType::parse("xs:integer").unwrap();
        let value = seq(vec![AtomicValue::Integer(1)]);
        let out = convert_sequence(value.clone(), &required, &RoleLocator::variable("v")).unwrap();
        assert!(Sequence::same_value(&value, &out));
    }

    #[test]
    fn test_cardinality_error_uses_role_code() {
        let required = SequenceType::parse("xs:integer").unwrap();
        let err = convert_sequence(Sequence::empty(), &required, &RoleLocator::variable("v")).unwrap_err();
        assert_eq!(err.code(), "XTTE0570");
        assert!(err.is_type_error());
    }

    #[test]
    fn test_string_does_not_promote_to_number() {
        let required = SequenceType::parse("xs:integer").unwrap();
        let err = convert_sequence(
            seq(vec![AtomicValue::from("3")]),
            &required,
            &RoleLocator::param("n"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "XTTE0590");
    }

    #[test]
    fn test_cardinality_algebra() {
        assert_eq!(Cardinality::ExactlyOne.sum(Cardinality::ExactlyOne), Cardinality::OneOrMore);
        assert_eq!(Cardinality::Empty.sum(Cardinality::ZeroOrOne), Cardinality::ZeroOrOne);
        assert_eq!(Cardinality::ExactlyOne.union(Cardinality::Empty), Cardinality::ZeroOrOne);
        assert!(!Cardinality::ExactlyOne.allows_empty());
    }
}
