// Lazyset
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Dynamic values
//!
//! Registered operations and the dispatch layer work over [`Value`], which
//! lets a scalar and a sequence of scalars flow through the same call.

use crate::error::{SeqError, SeqResult};
use crate::sequence::{Seq, SequenceShape};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Function value accepted by dynamic calls such as `map` or `filter`
pub type Callable = Arc<dyn Fn(&[Value]) -> SeqResult<Value> + Send + Sync>;

/// Value that can flow through a sequence
#[derive(Clone)]
pub enum Value {
    /// Absent value
    Null,
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Nested lazy sequence
    Seq(Seq<Value>),
    /// Function passed as an argument
    Func(Callable),
}

impl Value {
    pub fn func(f: impl Fn(&[Value]) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Value::Func(Arc::new(f))
    }

    pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Value::Seq(Seq::new(values.into_iter().map(Into::into).collect::<Vec<_>>()))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Func(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is truthy (for predicates)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(_) | Value::Func(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&Seq<Value>> {
        match self {
            Value::Seq(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Callable> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Integer argument, failing with a type error otherwise
    pub fn expect_i64(&self) -> SeqResult<i64> {
        self.as_i64().ok_or(SeqError::Type {
            expected: "int",
            found: self.type_name(),
        })
    }

    pub fn expect_func(&self) -> SeqResult<&Callable> {
        self.as_func().ok_or(SeqError::Type {
            expected: "function",
            found: self.type_name(),
        })
    }

    /// Views this value as a sequence
    pub fn to_seq(&self) -> Seq<Value> {
        Seq::from_value(self.clone())
    }

    /// Shape without building a sequence for scalars
    pub fn shape(&self) -> SeqResult<SequenceShape<Value>> {
        match self {
            Value::Null => Ok(SequenceShape::Empty),
            Value::Seq(seq) => seq.shape(),
            other => Ok(SequenceShape::Singleton(other.clone())),
        }
    }

    /// Converts to JSON, materializing nested sequences
    pub fn to_json(&self) -> SeqResult<serde_json::Value> {
        Ok(match self {
            Value::Null | Value::Func(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Seq(seq) => {
                let items = seq.iter().map(|item| item.and_then(|value| value.to_json())).collect::<SeqResult<Vec<_>>>()?;
                serde_json::Value::Array(items)
            }
        })
    }

    pub fn from_json_str(json: &str) -> SeqResult<Self> {
        let json: serde_json::Value = serde_json::from_str(json)?;
        Ok(Value::from(json))
    }
}

impl Seq<Value> {
    /// Dynamic form of the factory: `Null` is empty, a sequence is reused,
    /// anything else becomes a singleton
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Seq::empty(),
            Value::Seq(seq) => seq,
            other => Seq::once(other),
        }
    }

    /// Integers from `start`, up to but excluding `end` when given
    pub fn range(start: i64, end: Option<i64>) -> Self {
        match end {
            Some(end) => Seq::from_producer(move || (start..end).map(Value::Int)),
            None => Seq::from_producer(move || (start..).map(Value::Int)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Sequences may be unbounded, so only identity is compared
            (Value::Seq(a), Value::Seq(b)) => Seq::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Seq(seq) => write!(f, "Seq({:?})", seq),
            Value::Func(_) => write!(f, "Func(..)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Seq(seq) => write!(f, "{}", seq.describe()),
            Value::Func(_) => write!(f, "<function>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Func(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Seq(seq) => seq.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::list(items),
            // Objects have no sequence reading
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(values: Vec<V>) -> Self {
        Value::list(values)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Seq<Value>> for Value {
    fn from(seq: Seq<Value>) -> Self {
        Value::Seq(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_normalization() {
        assert!(Seq::from_value(Value::Null).to_vec().unwrap().is_empty());
        assert_eq!(Seq::from_value(Value::Int(4)).to_vec().unwrap(), vec![Value::Int(4)]);
        assert_eq!(Seq::from_value(Value::from("a")).to_vec().unwrap(), vec![Value::from("a")]);

        let list = Value::list([1, 2]);
        let seq = Seq::from_value(list.clone());
        assert_eq!(Value::Seq(seq), list);
    }

    #[test]
    fn test_scalar_shape_fast_path() {
        assert_eq!(Value::Int(3).shape().unwrap(), SequenceShape::Singleton(Value::Int(3)));
        assert_eq!(Value::Null.shape().unwrap(), SequenceShape::Empty);
        assert!(Value::list([1, 2]).shape().unwrap().is_multi());
    }

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Str("2".into()));
    }

    #[test]
    fn test_json_round_trip_shape() {
        let value = Value::from_json_str("[1, 2.5, \"x\", [true, null]]").unwrap();
        assert_eq!(value.to_json().unwrap(), json!([1, 2.5, "x", [true, null]]));
        assert_eq!(serde_json::to_value(&value).unwrap(), json!([1, 2.5, "x", [true, null]]));
    }

    #[test]
    fn test_range() {
        let value = Value::Seq(Seq::range(1, Some(4)));
        assert_eq!(value.to_json().unwrap(), json!([1, 2, 3]));
        let open = Seq::range(5, None).take(2);
        assert_eq!(Value::Seq(open).to_json().unwrap(), json!([5, 6]));
    }

    #[test]
    fn test_expect_helpers() {
        assert_eq!(Value::Int(3).expect_i64().unwrap(), 3);
        assert!(matches!(
            Value::from("x").expect_i64(),
            Err(SeqError::Type { expected: "int", found: "string" })
        ));
        assert!(Value::Int(1).expect_func().is_err());
    }
}
