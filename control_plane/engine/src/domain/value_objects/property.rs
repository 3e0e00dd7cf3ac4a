//! Property values and allocation comparisons

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Dynamically typed property value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    #[default]
    Nil,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Sequence(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, PropertyValue::Nil)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Long(v) => Some(*v as f64),
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Long(v) => Some(*v != 0),
            PropertyValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text form used on exec-parameter command lines
    pub fn to_exec_string(&self) -> Option<String> {
        match self {
            PropertyValue::Nil | PropertyValue::Sequence(_) => None,
            PropertyValue::String(s) if s.is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Nil => write!(f, "nil"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::String(s) => write!(f, "{s}"),
            PropertyValue::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// Identified property value, the unit of configure and allocate calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    pub id: String,
    #[serde(default)]
    pub value: PropertyValue,
}

impl DataType {
    pub fn new(id: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Declared simple type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleType {
    Boolean,
    Char,
    Octet,
    Short,
    UShort,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    #[default]
    String,
    ObjRef,
}

impl SimpleType {
    /// Convert a value into this type, `None` when it cannot be represented
    pub fn coerce(&self, value: &PropertyValue) -> Option<PropertyValue> {
        match self {
            SimpleType::Boolean => value.as_bool().map(PropertyValue::Bool),
            SimpleType::Octet
            | SimpleType::Short
            | SimpleType::UShort
            | SimpleType::Long
            | SimpleType::ULong
            | SimpleType::LongLong
            | SimpleType::ULongLong => match value {
                PropertyValue::Long(v) => Some(PropertyValue::Long(*v)),
                PropertyValue::Double(v) if v.fract() == 0.0 => Some(PropertyValue::Long(*v as i64)),
                PropertyValue::String(s) => s.trim().parse().ok().map(PropertyValue::Long),
                _ => None,
            },
            SimpleType::Float | SimpleType::Double => value.as_f64().map(PropertyValue::Double),
            SimpleType::Char | SimpleType::String | SimpleType::ObjRef => match value {
                PropertyValue::Nil | PropertyValue::Sequence(_) => None,
                other => Some(PropertyValue::String(other.to_string())),
            },
        }
    }
}

/// Allocation comparison declared by a device's allocation property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    External,
}

/// Compare a device value (left) against a requested value (right).
///
/// The requested value has already been coerced to the device property's type.
/// `External` never matches locally; those properties go to `allocateCapacity`.
pub fn compare(left: &PropertyValue, right: &PropertyValue, action: Action) -> bool {
    let ordering = match (left, right) {
        (PropertyValue::Nil, _) | (_, PropertyValue::Nil) => None,
        (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
        (PropertyValue::Bool(a), PropertyValue::Bool(b)) => {
            return match action {
                Action::Eq => a == b,
                Action::Ne => a != b,
                _ => false,
            };
        }
        (PropertyValue::Sequence(_), _) | (_, PropertyValue::Sequence(_)) => {
            return match action {
                Action::Eq => left == right,
                Action::Ne => left != right,
                _ => false,
            };
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    };

    let Some(ordering) = ordering else {
        return false;
    };

    match action {
        Action::Eq => ordering == Ordering::Equal,
        Action::Ne => ordering != Ordering::Equal,
        Action::Gt => ordering == Ordering::Greater,
        Action::Lt => ordering == Ordering::Less,
        Action::Ge => ordering != Ordering::Less,
        Action::Le => ordering != Ordering::Greater,
        Action::External => false,
    }
}
