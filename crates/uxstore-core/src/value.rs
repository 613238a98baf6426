// ── Key payload values ──
//
// Payloads are opaque to the store: the only thing it checks is that a
// value conforms to the type a key was declared with. Equality is
// structural for every payload kind, including lists and records.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Declared payload type of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    /// A named enum family, e.g. `unit_type`.
    Enum(String),
    /// Homogeneous list of the element type.
    List(Box<ValueType>),
    /// String-keyed composite value.
    Record,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("text"),
            Self::Enum(family) => write!(f, "enum<{family}>"),
            Self::List(elem) => write!(f, "list<{elem}>"),
            Self::Record => f.write_str("record"),
        }
    }
}

/// One variant of a named enum family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    family: String,
    variant: String,
}

impl EnumValue {
    pub fn new(family: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            variant: variant.into(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }
}

/// A payload held by the store.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Enum(EnumValue),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// The concrete type of this payload.
    ///
    /// Lists report the type of their first element; an empty list is
    /// reported as `list<record>` and conforms to every list type.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::Enum(e) => ValueType::Enum(e.family.clone()),
            Self::List(items) => ValueType::List(Box::new(
                items.first().map_or(ValueType::Record, Value::value_type),
            )),
            Self::Record(_) => ValueType::Record,
        }
    }

    /// Whether this payload may be stored under a key declared as `ty`.
    pub fn conforms_to(&self, ty: &ValueType) -> bool {
        match (self, ty) {
            (Self::Bool(_), ValueType::Bool)
            | (Self::Int(_), ValueType::Int)
            | (Self::Float(_), ValueType::Float)
            | (Self::Text(_), ValueType::Text)
            | (Self::Record(_), ValueType::Record) => true,
            (Self::Enum(e), ValueType::Enum(family)) => e.family == *family,
            (Self::List(items), ValueType::List(elem)) => {
                items.iter().all(|item| item.conforms_to(elem))
            }
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // total_cmp keeps equality reflexive for NaN
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b) == Ordering::Equal,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Enum(e) => write!(f, "{}::{}", e.family, e.variant),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, item)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// ── Conversions into raw values ──────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Self::Enum(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Record(v)
    }
}

// ── Typed payloads ───────────────────────────────────────────────────

/// A Rust type that can travel through a key.
///
/// Implemented for the primitive payload types, for `Vec<T>`, and for
/// strum-backed enums through [`enum_key_value!`](crate::enum_key_value).
pub trait KeyValue: Clone + Send + Sync + 'static {
    fn value_type() -> ValueType;
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

impl KeyValue for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl KeyValue for i64 {
    fn value_type() -> ValueType {
        ValueType::Int
    }
    fn into_value(self) -> Value {
        Value::Int(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl KeyValue for i32 {
    fn value_type() -> ValueType {
        ValueType::Int
    }
    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl KeyValue for u32 {
    fn value_type() -> ValueType {
        ValueType::Int
    }
    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| u32::try_from(v).ok())
    }
}

impl KeyValue for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }
    fn into_value(self) -> Value {
        Value::Float(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl KeyValue for f32 {
    fn value_type() -> ValueType {
        ValueType::Float
    }
    fn into_value(self) -> Value {
        Value::Float(f64::from(self))
    }
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl KeyValue for String {
    fn value_type() -> ValueType {
        ValueType::Text
    }
    fn into_value(self) -> Value {
        Value::Text(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl<T: KeyValue> KeyValue for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List(Box::new(T::value_type()))
    }
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(KeyValue::into_value).collect())
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

/// Implement [`KeyValue`] and `From<_> for Value` for a strum enum.
///
/// The enum must derive `strum::IntoStaticStr` and `strum::EnumString`
/// with matching serializations.
///
/// ```ignore
/// #[derive(Clone, Copy, strum::IntoStaticStr, strum::EnumString)]
/// #[strum(serialize_all = "snake_case")]
/// enum GimbalMode { Free, Fpv, YawFollow }
///
/// uxstore_core::enum_key_value!(GimbalMode, "gimbal_mode");
/// ```
#[macro_export]
macro_rules! enum_key_value {
    ($ty:ty, $family:literal) => {
        impl $crate::value::KeyValue for $ty {
            fn value_type() -> $crate::value::ValueType {
                $crate::value::ValueType::Enum($family.to_owned())
            }

            fn into_value(self) -> $crate::value::Value {
                let variant: &'static str = self.into();
                $crate::value::Value::Enum($crate::value::EnumValue::new($family, variant))
            }

            fn from_value(value: &$crate::value::Value) -> Option<Self> {
                match value {
                    $crate::value::Value::Enum(e) if e.family() == $family => {
                        e.variant().parse().ok()
                    }
                    _ => None,
                }
            }
        }

        impl From<$ty> for $crate::value::Value {
            fn from(v: $ty) -> Self {
                $crate::value::KeyValue::into_value(v)
            }
        }
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_reflexive_for_nan() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(1.0));
    }

    #[test]
    fn lists_compare_structurally() {
        let a = Value::List(vec!['a'.to_string().into(), "b".into()]);
        let b = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn conformance_checks_list_elements() {
        let floats = Value::List(vec![1.0.into(), 2.5.into()]);
        let mixed = Value::List(vec![1.0.into(), "x".into()]);
        let ty = ValueType::List(Box::new(ValueType::Float));

        assert!(floats.conforms_to(&ty));
        assert!(!mixed.conforms_to(&ty));
        assert!(Value::List(Vec::new()).conforms_to(&ty));
    }

    #[test]
    fn int_does_not_conform_to_float() {
        assert!(!Value::Int(3).conforms_to(&ValueType::Float));
        assert!(!Value::Float(3.0).conforms_to(&ValueType::Int));
    }

    #[test]
    fn enum_conformance_respects_family() {
        let v = Value::Enum(EnumValue::new("unit_type", "metric"));
        assert!(v.conforms_to(&ValueType::Enum("unit_type".into())));
        assert!(!v.conforms_to(&ValueType::Enum("grid_line_type".into())));
    }

    #[test]
    fn typed_vec_round_trip_rejects_wrong_elements() {
        let v = vec![1_i64, 2, 3].into_value();
        assert_eq!(Vec::<i64>::from_value(&v).unwrap(), vec![1, 2, 3]);
        assert!(Vec::<String>::from_value(&v).is_none());
    }

    #[test]
    fn value_type_display() {
        let ty = ValueType::List(Box::new(ValueType::Enum("unit_type".into())));
        assert_eq!(ty.to_string(), "list<enum<unit_type>>");
    }
}
