//! Atomic values, their types and the casting rules between them.
use crate::error::{Result, XdmError};
use crate::qname::QName;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum AtomicValue {
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Float(f32),
    QName(QName),
}

/// The primitive atomic types the runtime distinguishes, plus the abstract
/// `AnyAtomic` and `Numeric` supertypes used in required types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    Numeric,
    String,
    UntypedAtomic,
    AnyUri,
    Boolean,
    Integer,
    Decimal,
    Double,
    Float,
    QName,
}

impl AtomicType {
    pub fn name(&self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "xs:anyAtomicType",
            AtomicType::Numeric => "xs:numeric",
            AtomicType::String => "xs:string",
            AtomicType::UntypedAtomic => "xs:untypedAtomic",
            AtomicType::AnyUri => "xs:anyURI",
            AtomicType::Boolean => "xs:boolean",
            AtomicType::Integer => "xs:integer",
            AtomicType::Decimal => "xs:decimal",
            AtomicType::Double => "xs:double",
            AtomicType::Float => "xs:float",
            AtomicType::QName => "xs:QName",
        }
    }

    /// True when every value of `self` is also a value of `other`.
    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        if self == other || other == AtomicType::AnyAtomic {
            return true;
        }
        match other {
            AtomicType::Numeric => self.is_numeric(),
            AtomicType::Decimal => self == AtomicType::Integer,
            _ => false,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AtomicType::Numeric
                | AtomicType::Integer
                | AtomicType::Decimal
                | AtomicType::Double
                | AtomicType::Float
        )
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            AtomicValue::String(_) => AtomicType::String,
            AtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            AtomicValue::AnyUri(_) => AtomicType::AnyUri,
            AtomicValue::Boolean(_) => AtomicType::Boolean,
            AtomicValue::Integer(_) => AtomicType::Integer,
            AtomicValue::Decimal(_) => AtomicType::Decimal,
            AtomicValue::Double(_) => AtomicType::Double,
            AtomicValue::Float(_) => AtomicType::Float,
            AtomicValue::QName(_) => AtomicType::QName,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.atomic_type().is_numeric()
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, AtomicValue::UntypedAtomic(_))
    }

    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                s.clone()
            }
            AtomicValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => d.normalize().to_string(),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::Float(f) => format_double(*f as f64),
            AtomicValue::QName(q) => q.display_name(),
        }
    }

    /// Effective boolean value of a singleton atomic value (FORG0006 for
    /// types that have none).
    pub fn effective_boolean_value(&self) -> Result<bool> {
        Ok(match self {
            AtomicValue::Boolean(b) => *b,
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                !s.is_empty()
            }
            AtomicValue::Integer(i) => *i != 0,
            AtomicValue::Decimal(d) => !d.is_zero(),
            AtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
            AtomicValue::Float(f) => *f != 0.0 && !f.is_nan(),
            AtomicValue::QName(_) => {
                return Err(XdmError::Conversion {
                    code: "FORG0006",
                    message: "Effective boolean value is not defined for xs:QName".to_string(),
                });
            }
        })
    }

    /// The value as a double, NaN when it has no numeric interpretation.
    pub fn to_double(&self) -> f64 {
        match self {
            AtomicValue::Double(d) => *d,
            AtomicValue::Float(f) => *f as f64,
            AtomicValue::Integer(i) => *i as f64,
            AtomicValue::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            AtomicValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => parse_double(s),
            AtomicValue::AnyUri(_) | AtomicValue::QName(_) => f64::NAN,
        }
    }

    /// Casts this value to `target` following the XPath casting table for
    /// the supported primitive types.
    pub fn convert_to(&self, target: AtomicType) -> Result<AtomicValue> {
        if self.atomic_type().is_subtype_of(target) {
            return Ok(self.clone());
        }
        let fail = || {
            XdmError::cast(format!(
                "Cannot convert {} '{}' to {}",
                self.atomic_type(),
                self.to_string_value(),
                target
            ))
        };
        match target {
            AtomicType::AnyAtomic => Ok(self.clone()),
            AtomicType::String => Ok(AtomicValue::String(self.to_string_value())),
            AtomicType::UntypedAtomic => Ok(AtomicValue::UntypedAtomic(self.to_string_value())),
            AtomicType::AnyUri => match self {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                    Ok(AtomicValue::AnyUri(s.trim().to_string()))
                }
                _ => Err(fail()),
            },
            AtomicType::Boolean => match self {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => match s.trim() {
                    "true" | "1" => Ok(AtomicValue::Boolean(true)),
                    "false" | "0" => Ok(AtomicValue::Boolean(false)),
                    _ => Err(fail()),
                },
                v if v.is_numeric() => Ok(AtomicValue::Boolean(v.effective_boolean_value()?)),
                _ => Err(fail()),
            },
            AtomicType::Integer => match self {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(AtomicValue::Integer)
                    .map_err(|_| fail()),
                AtomicValue::Boolean(b) => Ok(AtomicValue::Integer(i64::from(*b))),
                AtomicValue::Decimal(d) => d.trunc().to_i64().map(AtomicValue::Integer).ok_or_else(fail),
                AtomicValue::Double(_) | AtomicValue::Float(_) => {
                    let d = self.to_double();
                    if d.is_finite() {
                        Ok(AtomicValue::Integer(d.trunc() as i64))
                    } else {
                        Err(fail())
                    }
                }
                _ => Err(fail()),
            },
            AtomicType::Decimal => match self {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                    let trimmed = s.trim();
                    if trimmed.contains(['e', 'E']) {
                        return Err(fail());
                    }
                    Decimal::from_str(trimmed)
                        .map(AtomicValue::Decimal)
                        .map_err(|_| fail())
                }
                AtomicValue::Boolean(b) => Ok(AtomicValue::Decimal(Decimal::from(i64::from(*b)))),
                AtomicValue::Double(_) | AtomicValue::Float(_) => Decimal::from_f64(self.to_double())
                    .map(AtomicValue::Decimal)
                    .ok_or_else(fail),
                _ => Err(fail()),
            },
            AtomicType::Double => match self {
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                    let d = parse_double(s);
                    if d.is_nan() && s.trim() != "NaN" {
                        Err(fail())
                    } else {
                        Ok(AtomicValue::Double(d))
                    }
                }
                v if v.is_numeric() || matches!(v, AtomicValue::Boolean(_)) => {
                    Ok(AtomicValue::Double(v.to_double()))
                }
                _ => Err(fail()),
            },
            AtomicType::Float => match self.convert_to(AtomicType::Double)? {
                AtomicValue::Double(d) => Ok(AtomicValue::Float(d as f32)),
                _ => Err(fail()),
            },
            AtomicType::Numeric => match self {
                AtomicValue::UntypedAtomic(_) => self.convert_to(AtomicType::Double),
                _ => Err(fail()),
            },
            AtomicType::QName => Err(fail()),
        }
    }

    /// Type promotion used by the function conversion rules: numeric values
    /// promote to float or double, anyURI promotes to string.
    pub fn promote_to(&self, target: AtomicType) -> Option<AtomicValue> {
        let source = self.atomic_type();
        if source.is_subtype_of(target) {
            return Some(self.clone());
        }
        match target {
            AtomicType::Double if source.is_numeric() => Some(AtomicValue::Double(self.to_double())),
            AtomicType::Float
                if matches!(source, AtomicType::Integer | AtomicType::Decimal) =>
            {
                Some(AtomicValue::Float(self.to_double() as f32))
            }
            AtomicType::String if source == AtomicType::AnyUri => {
                Some(AtomicValue::String(self.to_string_value()))
            }
            _ => None,
        }
    }

    /// Value comparison (`eq`, `lt`, ...). Untyped operands compare as
    /// strings; numerics compare by value across types. Returns `None` for
    /// incomparable operands and for NaN.
    pub fn compare(&self, other: &AtomicValue) -> Option<Ordering> {
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => match (a, b) {
                (AtomicValue::Integer(x), AtomicValue::Integer(y)) => Some(x.cmp(y)),
                (AtomicValue::Decimal(x), AtomicValue::Decimal(y)) => Some(x.cmp(y)),
                _ => a.to_double().partial_cmp(&b.to_double()),
            },
            (AtomicValue::Boolean(x), AtomicValue::Boolean(y)) => Some(x.cmp(y)),
            (AtomicValue::QName(x), AtomicValue::QName(y)) => (x == y).then_some(Ordering::Equal),
            (a, b) if a.is_stringlike() && b.is_stringlike() => {
                Some(a.to_string_value().cmp(&b.to_string_value()))
            }
            _ => None,
        }
    }

    fn is_stringlike(&self) -> bool {
        matches!(
            self,
            AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_)
        )
    }

    /// A hashable key such that two values have equal keys exactly when they
    /// are equal under `eq`, with NaN equal to itself.
    pub fn comparison_key(&self) -> ComparisonKey {
        match self {
            v if v.is_numeric() => ComparisonKey::Numeric(normalize_bits(v.to_double())),
            AtomicValue::Boolean(b) => ComparisonKey::Boolean(*b),
            AtomicValue::QName(q) => ComparisonKey::QName(q.uri.clone(), q.local.clone()),
            other => ComparisonKey::Text(other.to_string_value()),
        }
    }
}

/// See [`AtomicValue::comparison_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComparisonKey {
    Numeric(u64),
    Boolean(bool),
    Text(String),
    QName(String, String),
}

fn normalize_bits(d: f64) -> u64 {
    if d.is_nan() {
        f64::NAN.to_bits()
    } else if d == 0.0 {
        0.0f64.to_bits()
    } else {
        d.to_bits()
    }
}

fn parse_double(s: &str) -> f64 {
    match s.trim() {
        "INF" | "+INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        t if t.eq_ignore_ascii_case("inf") || t.eq_ignore_ascii_case("infinity") => f64::NAN,
        t => t.parse().unwrap_or(f64::NAN),
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if d == 0.0 {
        if d.is_sign_negative() { "-0" } else { "0" }.to_string()
    } else if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        d.to_string()
    }
}

impl PartialEq for AtomicValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_values() {
        assert_eq!(AtomicValue::Double(3.0).to_string_value(), "3");
        assert_eq!(AtomicValue::Double(0.5).to_string_value(), "0.5");
        assert_eq!(AtomicValue::Double(f64::NAN).to_string_value(), "NaN");
        assert_eq!(AtomicValue::Double(f64::NEG_INFINITY).to_string_value(), "-INF");
        assert_eq!(AtomicValue::Boolean(true).to_string_value(), "true");
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(!AtomicValue::from("").effective_boolean_value().unwrap());
        assert!(AtomicValue::from("x").effective_boolean_value().unwrap());
        assert!(!AtomicValue::Double(f64::NAN).effective_boolean_value().unwrap());
        assert!(AtomicValue::QName(QName::local("a")).effective_boolean_value().is_err());
    }

    #[test]
    fn test_untyped_conversion() {
        let v = AtomicValue::UntypedAtomic(" 42 ".to_string());
        assert!(matches!(v.convert_to(AtomicType::Integer).unwrap(), AtomicValue::Integer(42)));
        assert!(matches!(v.convert_to(AtomicType::Double).unwrap(), AtomicValue::Double(d) if d == 42.0));
        assert!(AtomicValue::UntypedAtomic("abc".into()).convert_to(AtomicType::Integer).is_err());
    }

    #[test]
    fn test_promotion() {
        let i = AtomicValue::Integer(2);
        assert!(matches!(i.promote_to(AtomicType::Double), Some(AtomicValue::Double(d)) if d == 2.0));
        assert!(matches!(i.promote_to(AtomicType::Decimal), Some(AtomicValue::Integer(2))));
        let uri = AtomicValue::AnyUri("urn:a".into());
        assert!(matches!(uri.promote_to(AtomicType::String), Some(AtomicValue::String(_))));
        assert!(AtomicValue::from("x").promote_to(AtomicType::Double).is_none());
    }

    #[test]
    fn test_comparison_keys() {
        assert_eq!(
            AtomicValue::Integer(1).comparison_key(),
            AtomicValue::Double(1.0).comparison_key()
        );
        assert_eq!(
            AtomicValue::Double(f64::NAN).comparison_key(),
            AtomicValue::Float(f32::NAN).comparison_key()
        );
        assert_eq!(
            AtomicValue::UntypedAtomic("a".into()).comparison_key(),
            AtomicValue::from("a").comparison_key()
        );
        assert_ne!(AtomicValue::from("1").comparison_key(), AtomicValue::Integer(1).comparison_key());
    }

    #[test]
    fn test_compare() {
        assert_eq!(AtomicValue::Integer(5), AtomicValue::Double(5.0));
        assert_eq!(
            AtomicValue::from("abc").compare(&AtomicValue::from("abd")),
            Some(Ordering::Less)
        );
        assert_eq!(AtomicValue::from("1").compare(&AtomicValue::Integer(1)), None);
    }
}
