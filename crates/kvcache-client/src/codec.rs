//! # Value Codec
//!
//! Typed values written by [`CacheStore::set`](crate::CacheStore::set) and the
//! text each kind is stored as. Reads never decode: callers reverse the
//! encoding themselves.
//!
//! | Kind            | Stored text                          |
//! |-----------------|--------------------------------------|
//! | `Str`           | unmodified                           |
//! | `Int` / `UInt`  | base-10 decimal                      |
//! | `Float`         | fixed, 3 decimal places; `+Inf`, `-Inf`, `NaN` |
//! | `Bool`          | `true` / `false`                     |
//! | `List`          | `[a b c]`, elements space separated  |
//! | `Json`          | compact JSON text                    |

use serde::Serialize;
use std::fmt::{self, Write as _};

use crate::error::Result;

/// A value to be written to the cache, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    List(Vec<CacheValue>),
    Json(serde_json::Value),
}

impl CacheValue {
    /// Wrap any serializable value as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialization` if the value cannot be encoded.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Stored text for this value
    pub fn encode(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Json(v) => v.to_string(),
            other => other.to_string(),
        }
    }

    /// Element formatting inside a list: floats keep their shortest form
    fn write_element(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => out.write_str(s),
            Self::Int(i) => write!(out, "{i}"),
            Self::UInt(u) => write!(out, "{u}"),
            Self::Float(f) => write_float(out, *f, None),
            Self::Bool(b) => write!(out, "{b}"),
            Self::Json(v) => write!(out, "{v}"),
            Self::List(items) => {
                out.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.write_char(' ')?;
                    }
                    item.write_element(out)?;
                }
                out.write_char(']')
            }
        }
    }
}

/// Non-finite floats are spelled the way other clients of the same keys expect
fn write_float(out: &mut fmt::Formatter<'_>, v: f64, precision: Option<usize>) -> fmt::Result {
    if v.is_nan() {
        return out.write_str("NaN");
    }
    if v.is_infinite() {
        return out.write_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    }
    match precision {
        Some(p) => write!(out, "{v:.p$}"),
        None => write!(out, "{v}"),
    }
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write_float(f, *v, Some(3)),
            other => other.write_element(f),
        }
    }
}

impl From<String> for CacheValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for CacheValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<bool> for CacheValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for CacheValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for CacheValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for CacheValue {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for CacheValue {
            fn from(v: $t) -> Self {
                Self::UInt(u64::from(v))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<isize> for CacheValue {
    fn from(v: isize) -> Self {
        // isize is at most 64 bits on every supported target
        Self::Int(v as i64)
    }
}

impl From<usize> for CacheValue {
    fn from(v: usize) -> Self {
        Self::UInt(v as u64)
    }
}

impl<T: Into<Self>> From<Vec<T>> for CacheValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Map an arbitrary JSON document onto the closest kind.
///
/// Scalars and arrays take their own kind; objects and `null` stay JSON.
impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;

        match v {
            Value::String(s) => Self::Str(s),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            other @ (Value::Null | Value::Object(_)) => Self::Json(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[test]
    fn test_scalar_encoding() {
        assert_eq!(CacheValue::from("hello").encode(), "hello");
        assert_eq!(CacheValue::from(42).encode(), "42");
        assert_eq!(CacheValue::from(-7i8).encode(), "-7");
        assert_eq!(CacheValue::from(u64::MAX).encode(), "18446744073709551615");
        assert_eq!(CacheValue::from(3.14159).encode(), "3.142");
        assert_eq!(CacheValue::from(2.5f32).encode(), "2.500");
        assert_eq!(CacheValue::from(true).encode(), "true");
        assert_eq!(CacheValue::from(false).encode(), "false");
    }

    #[test]
    fn test_non_finite_float_encoding() {
        assert_eq!(CacheValue::from(f64::INFINITY).encode(), "+Inf");
        assert_eq!(CacheValue::from(f64::NEG_INFINITY).encode(), "-Inf");
        assert_eq!(CacheValue::from(f64::NAN).encode(), "NaN");
        assert_eq!(
            CacheValue::from(vec![f64::INFINITY, -0.5]).encode(),
            "[+Inf -0.5]"
        );
    }

    #[test]
    fn test_string_is_not_quoted_or_trimmed() {
        assert_eq!(CacheValue::from("  \"x\"\n").encode(), "  \"x\"\n");
    }

    #[test]
    fn test_list_encoding() {
        assert_eq!(CacheValue::from(vec![1i32, 2, 3]).encode(), "[1 2 3]");
        assert_eq!(CacheValue::from(vec!["a", "b"]).encode(), "[a b]");
        assert_eq!(CacheValue::from(vec![1.5f64, 2.0]).encode(), "[1.5 2]");
        assert_eq!(CacheValue::from(Vec::<i32>::new()).encode(), "[]");

        let nested = CacheValue::List(vec![vec![1i32, 2].into(), vec![3i32].into()]);
        assert_eq!(nested.encode(), "[[1 2] [3]]");
    }

    #[test]
    fn test_struct_is_json() {
        #[derive(Serialize)]
        struct Session {
            user: String,
            turns: u32,
        }

        let value = CacheValue::json(&Session { user: "ana".into(), turns: 3 }).unwrap();
        assert_eq!(value.encode(), r#"{"user":"ana","turns":3}"#);

        let mut map = BTreeMap::new();
        map.insert("a", 1);
        assert_eq!(CacheValue::json(&map).unwrap().encode(), r#"{"a":1}"#);
    }

    #[test]
    fn test_json_failure_is_serialization_error() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "non-string key");

        let err = CacheValue::json(&map).unwrap_err();
        assert!(matches!(err, crate::CacheError::Serialization(_)));
    }

    #[test]
    fn test_from_json_value() {
        use serde_json::json;

        assert_eq!(CacheValue::from(json!("s")), CacheValue::Str("s".into()));
        assert_eq!(CacheValue::from(json!(7)), CacheValue::Int(7));
        assert_eq!(CacheValue::from(json!(0.25)).encode(), "0.250");
        assert_eq!(CacheValue::from(json!([1, "x", true])).encode(), "[1 x true]");
        assert_eq!(CacheValue::from(json!({"k": [1]})).encode(), r#"{"k":[1]}"#);
        assert_eq!(CacheValue::from(json!(null)).encode(), "null");
    }
}
