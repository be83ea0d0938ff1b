//! Typed field values.
//!
//! A field's kind decides both how its exact value is stored and how it is
//! indexed:
//!
//! | kind      | stored | terms          | point (`_point_<name>`) |
//! |-----------|--------|----------------|-------------------------|
//! | `Text`    | yes    | analyzed       | no                      |
//! | `Integer` | yes    | exact decimal  | yes                     |
//! | `Numeric` | yes    | no             | yes                     |
//! | `Blob`    | yes    | no             | no                      |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of the shadow numeric field that backs range queries.
pub const POINT_FIELD_PREFIX: &str = "_point_";

/// Name of the point field shadowing `field`.
pub fn point_field_name(field: &str) -> String {
    format!("{POINT_FIELD_PREFIX}{field}")
}

/// The value of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Tokenized text.
    Text(String),
    /// 32-bit decimal, indexed as a point only.
    Numeric(f32),
    /// 64-bit integer, indexed as an exact term and as a point.
    Integer(i64),
    /// Opaque bytes, stored only.
    Blob(Vec<u8>),
}

/// A stored field value as returned by a search.
pub type StoredValue = FieldValue;

impl FieldValue {
    /// Numeric tag used by the segment codec.
    pub(crate) fn type_tag(&self) -> u8 {
        match self {
            FieldValue::Text(_) => 0,
            FieldValue::Numeric(_) => 1,
            FieldValue::Integer(_) => 2,
            FieldValue::Blob(_) => 3,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<f32> {
        match self {
            FieldValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// The value used for the shadow point field, if this kind has one.
    pub fn point_value(&self) -> Option<f32> {
        match self {
            FieldValue::Numeric(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Rough heap footprint, used to bound the writer's RAM buffer.
    pub(crate) fn estimated_size(&self) -> usize {
        match self {
            FieldValue::Text(s) => s.len(),
            FieldValue::Blob(b) => b.len(),
            FieldValue::Numeric(_) | FieldValue::Integer(_) => 8,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Numeric(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Numeric(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Blob(value)
    }
}

/// A named field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, value: FieldValue) -> Self {
        Field {
            name: name.into(),
            value,
        }
    }
}
