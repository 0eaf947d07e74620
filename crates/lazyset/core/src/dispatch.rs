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

//! Dispatch Layer
//!
//! Resolves a single access `seq[key]` on a dynamic sequence. Keys are tried
//! in a fixed order: iteration, numeric index, length, built-in methods, then
//! the registry. Anything left over resolves to [`Access::Absent`] instead of
//! failing.

use crate::error::{SeqError, SeqResult};
use crate::registry::OperationRegistry;
use crate::sequence::{Seq, SeqIter};
use crate::value::{Callable, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Key naming the iteration protocol
pub const ITERATOR_KEY: &str = "@@iterator";

/// Key naming the length property
pub const LENGTH_KEY: &str = "length";

/// What is being accessed on a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Iterator,
    Index(i64),
    Length,
    Name(String),
}

impl Key {
    /// Numeric strings become indices; the two reserved names map to their keys
    pub fn parse(raw: &str) -> Self {
        if raw == ITERATOR_KEY {
            return Key::Iterator;
        }
        if raw == LENGTH_KEY {
            return Key::Length;
        }
        match raw.parse::<i64>() {
            Ok(index) => Key::Index(index),
            Err(_) => Key::Name(raw.to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Iterator => write!(f, "{}", ITERATOR_KEY),
            Key::Index(index) => write!(f, "{}", index),
            Key::Length => write!(f, "{}", LENGTH_KEY),
            Key::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for Key {
    fn from(raw: &str) -> Self {
        Key::parse(raw)
    }
}

impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Key::Index(index)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index as i64)
    }
}

/// Methods every sequence answers to without consulting the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Map,
    Filter,
    Take,
    Skip,
    Reduce,
    ToArray,
    Get,
    Count,
    First,
    IsEmpty,
    ToJson,
    Len,
}

impl Builtin {
    /// Accepts both snake_case and camelCase spellings
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "map" => Builtin::Map,
            "filter" => Builtin::Filter,
            "take" => Builtin::Take,
            "skip" => Builtin::Skip,
            "reduce" => Builtin::Reduce,
            "to_array" | "toArray" => Builtin::ToArray,
            "get" => Builtin::Get,
            "count" => Builtin::Count,
            "first" => Builtin::First,
            "is_empty" | "isEmpty" => Builtin::IsEmpty,
            "to_json" | "toJSON" => Builtin::ToJson,
            "len" => Builtin::Len,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::Take => "take",
            Builtin::Skip => "skip",
            Builtin::Reduce => "reduce",
            Builtin::ToArray => "to_array",
            Builtin::Get => "get",
            Builtin::Count => "count",
            Builtin::First => "first",
            Builtin::IsEmpty => "is_empty",
            Builtin::ToJson => "to_json",
            Builtin::Len => "len",
        }
    }

    /// Lazy builtins return a new sequence without pulling any element
    pub fn is_lazy(&self) -> bool {
        matches!(self, Builtin::Map | Builtin::Filter | Builtin::Take | Builtin::Skip)
    }

    fn call(&self, seq: &Seq<Value>, args: &[Value]) -> SeqResult<Value> {
        let arg = |position: usize| args.get(position).unwrap_or(&Value::Null);
        match self {
            Builtin::Map => {
                let f = Arc::clone(arg(0).expect_func()?);
                Ok(Value::Seq(seq.try_map(move |value| f(&[value]))))
            }
            Builtin::Filter => {
                let f = Arc::clone(arg(0).expect_func()?);
                Ok(Value::Seq(seq.try_filter(move |value| Ok(f(std::slice::from_ref(value))?.is_truthy()))))
            }
            Builtin::Take => Ok(Value::Seq(seq.take(count_arg(arg(0))?))),
            Builtin::Skip => Ok(Value::Seq(seq.skip(count_arg(arg(0))?))),
            Builtin::Reduce => {
                let f = arg(0).expect_func()?;
                reduce_with(seq, f, args.get(1).cloned())
            }
            Builtin::ToArray | Builtin::ToJson => Ok(Value::list(seq.to_vec()?)),
            Builtin::Get => Ok(seq.get(arg(0).expect_i64()?)?.unwrap_or(Value::Null)),
            Builtin::Count => Ok(Value::from(seq.count()?)),
            Builtin::First => Ok(seq.first()?.unwrap_or(Value::Null)),
            Builtin::IsEmpty => Ok(Value::Bool(seq.is_empty()?)),
            Builtin::Len => Ok(seq.len().map_or(Value::Null, Value::from)),
        }
    }
}

/// Negative counts are treated as zero
fn count_arg(value: &Value) -> SeqResult<usize> {
    Ok(value.expect_i64()?.max(0) as usize)
}

fn reduce_with(seq: &Seq<Value>, f: &Callable, init: Option<Value>) -> SeqResult<Value> {
    let mut acc = init;
    for item in seq.iter() {
        let value = item?;
        acc = Some(match acc {
            Some(acc) => f(&[acc, value])?,
            None => value,
        });
    }
    Ok(acc.unwrap_or(Value::Null))
}

enum Target<'r> {
    Builtin(Builtin),
    Registered(&'r OperationRegistry, String),
}

/// A method resolved against a receiver, ready to be called
pub struct BoundMethod<'r> {
    receiver: Seq<Value>,
    target: Target<'r>,
}

impl BoundMethod<'_> {
    pub fn name(&self) -> &str {
        match &self.target {
            Target::Builtin(builtin) => builtin.name(),
            Target::Registered(_, name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.target, Target::Builtin(_))
    }

    /// Calls the method; failures inside it propagate unchanged
    pub fn call(&self, args: &[Value]) -> SeqResult<Value> {
        match &self.target {
            Target::Builtin(builtin) => builtin.call(&self.receiver, args),
            Target::Registered(registry, name) => registry.call_on(&Value::Seq(self.receiver.clone()), name, args),
        }
    }
}

/// Result of resolving a key
pub enum Access<'r> {
    Iter(SeqIter<Value>),
    /// Element at an index; `None` when the sequence is shorter
    Element(Option<Value>),
    /// Known only for collection-backed sequences
    Length(Option<usize>),
    Method(BoundMethod<'r>),
    Absent,
}

impl Access<'_> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Access::Absent)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Access::Iter(_) => "iterator",
            Access::Element(_) => "element",
            Access::Length(_) => "length",
            Access::Method(_) => "method",
            Access::Absent => "absent",
        }
    }
}

/// Resolves keys on sequences against a registry
#[derive(Clone, Copy)]
pub struct Dispatcher<'r> {
    registry: &'r OperationRegistry,
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r OperationRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r OperationRegistry {
        self.registry
    }

    pub fn resolve(&self, seq: &Seq<Value>, key: impl Into<Key>) -> SeqResult<Access<'r>> {
        let key = key.into();
        let access = match &key {
            Key::Iterator => Access::Iter(seq.iter()),
            // Only `get` rejects negative indices; plain access just finds nothing
            Key::Index(index) if *index < 0 => Access::Absent,
            Key::Index(index) => {
                let element = seq.get(*index).map_err(|err| SeqError::access(key.to_string(), seq.describe(), err))?;
                Access::Element(element)
            }
            Key::Length => Access::Length(seq.len()),
            Key::Name(name) => match Builtin::from_name(name) {
                Some(builtin) => Access::Method(BoundMethod {
                    receiver: seq.clone(),
                    target: Target::Builtin(builtin),
                }),
                None if self.registry.contains(name) => Access::Method(BoundMethod {
                    receiver: seq.clone(),
                    target: Target::Registered(self.registry, name.clone()),
                }),
                None => Access::Absent,
            },
        };
        debug!(key = %key, resolved = access.kind(), target = %seq.describe(), "resolved access");
        Ok(access)
    }

    /// Resolves `name` and calls it; names that resolve to nothing yield `Null`
    pub fn invoke(&self, seq: &Seq<Value>, name: &str, args: &[Value]) -> SeqResult<Value> {
        match self.resolve(seq, Key::Name(name.to_string()))? {
            Access::Method(method) => method.call(args),
            _ => Ok(Value::Null),
        }
    }

    /// Value-level access: methods are not called, elements and lengths are unwrapped
    pub fn get(&self, seq: &Seq<Value>, key: impl Into<Key>) -> SeqResult<Value> {
        Ok(match self.resolve(seq, key)? {
            Access::Element(element) => element.unwrap_or(Value::Null),
            Access::Length(length) => length.map_or(Value::Null, Value::from),
            Access::Iter(_) | Access::Method(_) | Access::Absent => Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SequenceOptions;
    use serde_json::json;

    fn numbers() -> Seq<Value> {
        Seq::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!(Key::parse("3"), Key::Index(3));
        assert_eq!(Key::parse("-1"), Key::Index(-1));
        assert_eq!(Key::parse("length"), Key::Length);
        assert_eq!(Key::parse(ITERATOR_KEY), Key::Iterator);
        assert_eq!(Key::parse("map"), Key::Name("map".into()));
    }

    #[test]
    fn test_index_and_length() {
        let registry = OperationRegistry::new();
        let dispatcher = Dispatcher::new(&registry);
        let seq = numbers();

        assert_eq!(dispatcher.get(&seq, "1").unwrap(), Value::Int(2));
        assert_eq!(dispatcher.get(&seq, 7usize).unwrap(), Value::Null);
        assert_eq!(dispatcher.get(&seq, "length").unwrap(), Value::Int(3));
        assert!(dispatcher.resolve(&seq, -1i64).unwrap().is_absent());

        let lazy = Seq::range(0, None);
        assert_eq!(dispatcher.get(&lazy, "length").unwrap(), Value::Null);
        assert_eq!(dispatcher.get(&lazy, 10usize).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_iterator_key() {
        let registry = OperationRegistry::new();
        let dispatcher = Dispatcher::new(&registry);
        match dispatcher.resolve(&numbers(), ITERATOR_KEY).unwrap() {
            Access::Iter(run) => assert_eq!(run.collect::<SeqResult<Vec<_>>>().unwrap().len(), 3),
            other => panic!("expected iterator, got {}", other.kind()),
        }
    }

    #[test]
    fn test_builtins_take_precedence_over_registry() {
        let mut registry = OperationRegistry::with_builtins();
        registry.register_operation("count", crate::registry::Operation::unary(|_| Ok(Value::Int(-1))));
        let dispatcher = Dispatcher::new(&registry);

        assert_eq!(dispatcher.invoke(&numbers(), "count", &[]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_builtin_methods() {
        let registry = OperationRegistry::new();
        let dispatcher = Dispatcher::new(&registry);
        let seq = numbers();

        let double = Value::func(|args| Ok(Value::Int(args[0].expect_i64()? * 2)));
        let doubled = dispatcher.invoke(&seq, "map", &[double]).unwrap();
        assert_eq!(doubled.to_json().unwrap(), json!([2, 4, 6]));

        let odd = Value::func(|args| Ok(Value::Bool(args[0].expect_i64()? % 2 == 1)));
        let odds = dispatcher.invoke(&seq, "filter", &[odd]).unwrap();
        assert_eq!(odds.to_json().unwrap(), json!([1, 3]));

        let plus = Value::func(|args| Ok(Value::Int(args[0].expect_i64()? + args[1].expect_i64()?)));
        assert_eq!(dispatcher.invoke(&seq, "reduce", &[plus.clone()]).unwrap(), Value::Int(6));
        assert_eq!(dispatcher.invoke(&seq, "reduce", &[plus, Value::Int(10)]).unwrap(), Value::Int(16));

        assert_eq!(dispatcher.invoke(&seq, "toArray", &[]).unwrap().to_json().unwrap(), json!([1, 2, 3]));
        assert_eq!(dispatcher.invoke(&seq, "first", &[]).unwrap(), Value::Int(1));
        assert_eq!(dispatcher.invoke(&seq, "isEmpty", &[]).unwrap(), Value::Bool(false));
        assert!(dispatcher.invoke(&seq, "get", &[Value::Int(-1)]).is_err());
    }

    #[test]
    fn test_registered_operations_and_unknown_names() {
        let registry = OperationRegistry::with_builtins();
        let dispatcher = Dispatcher::new(&registry);
        let seq = numbers();

        let added = dispatcher.invoke(&seq, "add", &[Value::Int(10)]).unwrap();
        assert_eq!(added.to_json().unwrap(), json!([11, 12, 13]));

        assert!(dispatcher.resolve(&seq, "frobnicate").unwrap().is_absent());
        assert_eq!(dispatcher.invoke(&seq, "frobnicate", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_index_failures_are_wrapped() {
        let registry = OperationRegistry::new();
        let dispatcher = Dispatcher::new(&registry);
        let failing = Seq::from_result_producer(|| vec![Ok(Value::Int(1)), Err(SeqError::operation("boom", "bad element"))])
            .configure(SequenceOptions::memo());

        match dispatcher.resolve(&failing, 1usize) {
            Err(SeqError::Access { key, target, source }) => {
                assert_eq!(key, "1");
                assert_eq!(target, "Seq<memo>");
                assert!(matches!(*source, SeqError::Operation { .. }));
            }
            other => panic!("expected access error, got {:?}", other.map(|access| access.kind())),
        }
    }
}
