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

//! Operation registry - classifies and calls externally supplied functions
//!
//! Two kinds of functions can be registered:
//!
//! - **Operations** are stateless and carry a declared [`Arity`]. Calling one
//!   on a sequence broadcasts, zips, maps or reduces depending on that arity
//!   and on whether each operand is a singleton.
//! - **Methods** take the receiving sequence explicitly and decide for
//!   themselves what to do with it.
//!
//! Both are reachable through the free-function form ([`OperationRegistry::call`],
//! first argument is the receiver) and the chained form
//! ([`OperationRegistry::call_on`]). The registry is built once at startup
//! and shared read-only afterwards.

use crate::builtins;
use crate::error::{SeqError, SeqResult};
use crate::sequence::{Seq, SequenceShape};
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Reductions over at most this many elements call the function once with
/// every element; longer sequences are folded pairwise.
pub const MAX_SPREAD_ARGS: usize = 4096;

pub type OperationFn = Arc<dyn Fn(&[Value]) -> SeqResult<Value> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&Seq<Value>, &[Value]) -> SeqResult<Value> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Operation,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Arity {
    Unary,
    Binary,
    Variadic,
}

impl Arity {
    /// 0 parameters means variadic, 1 unary, anything more binary
    pub fn from_param_count(count: usize) -> Self {
        match count {
            0 => Arity::Variadic,
            1 => Arity::Unary,
            _ => Arity::Binary,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Unary => write!(f, "unary"),
            Arity::Binary => write!(f, "binary"),
            Arity::Variadic => write!(f, "variadic"),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Operation => write!(f, "operation"),
            OperationKind::Method => write!(f, "method"),
        }
    }
}

/// How a registered name was classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    pub arity: Arity,
}

/// Stateless function with a declared arity
#[derive(Clone)]
pub struct Operation {
    arity: Arity,
    f: OperationFn,
}

impl Operation {
    pub fn unary(f: impl Fn(&Value) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            arity: Arity::Unary,
            f: Arc::new(move |args| f(args.first().unwrap_or(&Value::Null))),
        }
    }

    pub fn binary(f: impl Fn(&Value, &Value) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            arity: Arity::Binary,
            f: Arc::new(move |args| {
                let left = args.first().unwrap_or(&Value::Null);
                let right = args.get(1).unwrap_or(&Value::Null);
                f(left, right)
            }),
        }
    }

    pub fn variadic(f: impl Fn(&[Value]) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            arity: Arity::Variadic,
            f: Arc::new(f),
        }
    }

    /// Raw form: the arity follows from the declared parameter count
    pub fn with_param_count(count: usize, f: impl Fn(&[Value]) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            arity: Arity::from_param_count(count),
            f: Arc::new(f),
        }
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }
}

/// Function that consumes the receiving sequence
#[derive(Clone)]
pub struct Method {
    f: MethodFn,
}

impl Method {
    pub fn new(f: impl Fn(&Seq<Value>, &[Value]) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }
}

/// Either kind of registration, for the mapping form of registration
#[derive(Clone)]
pub enum Registration {
    Operation(Operation),
    Method(Method),
}

impl From<Operation> for Registration {
    fn from(op: Operation) -> Self {
        Registration::Operation(op)
    }
}

impl From<Method> for Registration {
    fn from(method: Method) -> Self {
        Registration::Method(method)
    }
}

#[derive(Clone)]
struct RegisteredOp {
    descriptor: OperationDescriptor,
    registration: Registration,
}

/// Table of registered operations and methods
#[derive(Clone, Default)]
pub struct OperationRegistry {
    ops: HashMap<String, RegisteredOp>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self { ops: HashMap::new() }
    }

    /// Registry pre-populated with the arithmetic and reduction builtins
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::install(&mut registry);
        registry
    }

    pub fn register_operation(&mut self, name: impl Into<String>, op: Operation) -> &OperationDescriptor {
        self.register(name, Registration::Operation(op))
    }

    pub fn register_method(&mut self, name: impl Into<String>, method: Method) -> &OperationDescriptor {
        self.register(name, Registration::Method(method))
    }

    /// Registers `registration` under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, registration: impl Into<Registration>) -> &OperationDescriptor {
        let name = name.into();
        let registration = registration.into();
        let (kind, arity) = match &registration {
            Registration::Operation(op) => (OperationKind::Operation, op.arity),
            Registration::Method(_) => (OperationKind::Method, Arity::Variadic),
        };
        let descriptor = OperationDescriptor {
            name: name.clone(),
            kind,
            arity,
        };

        if self.ops.contains_key(&name) {
            warn!("Replacing registered operation: {}", name);
        }
        info!("Registering {} `{}` ({})", kind, name, arity);

        let entry = RegisteredOp {
            descriptor,
            registration,
        };
        self.ops.insert(name.clone(), entry);
        &self.ops[&name].descriptor
    }

    /// Mapping form: registers every `(name, registration)` pair
    pub fn register_all<N, R>(&mut self, entries: impl IntoIterator<Item = (N, R)>)
    where
        N: Into<String>,
        R: Into<Registration>,
    {
        for (name, registration) in entries {
            self.register(name, registration);
        }
    }

    /// Sorted names of every registered operation and method
    pub fn list_operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ops.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptors(&self) -> Vec<&OperationDescriptor> {
        let mut descriptors: Vec<&OperationDescriptor> = self.ops.values().map(|op| &op.descriptor).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&OperationDescriptor> {
        self.ops.get(name).map(|op| &op.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Free-function form: the first argument is the receiver
    pub fn call(&self, name: &str, args: &[Value]) -> SeqResult<Value> {
        match args.split_first() {
            Some((receiver, rest)) => self.call_on(receiver, name, rest),
            None => self.call_on(&Value::Null, name, &[]),
        }
    }

    /// Chained form: `receiver.name(args...)`
    #[instrument(skip(self, receiver, args), fields(receiver = receiver.type_name(), argc = args.len()))]
    pub fn call_on(&self, receiver: &Value, name: &str, args: &[Value]) -> SeqResult<Value> {
        let entry = self.ops.get(name).ok_or_else(|| SeqError::UnknownOperation(name.to_string()))?;

        match &entry.registration {
            Registration::Method(method) => {
                let seq = receiver.to_seq();
                (method.f)(&seq, args)
            }
            Registration::Operation(op) => match op.arity {
                Arity::Variadic if args.is_empty() => reduce(&op.f, receiver),
                Arity::Variadic => spread_apply(&op.f, receiver, args),
                Arity::Unary => map_or_apply(&op.f, receiver, args),
                Arity::Binary => match args.len() {
                    0 => fold_pairwise(&op.f, receiver),
                    1 => broadcast(&op.f, receiver, &args[0]),
                    _ => map_or_apply(&op.f, receiver, args),
                },
            },
        }
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.list_operations())
            .finish()
    }
}

fn with_receiver(first: Value, rest: &[Value]) -> Vec<Value> {
    let mut call_args = Vec::with_capacity(rest.len() + 1);
    call_args.push(first);
    call_args.extend_from_slice(rest);
    call_args
}

/// Singleton receivers are applied directly and yield a raw value; anything
/// else is mapped lazily with `args` held fixed after each element
fn map_or_apply(f: &OperationFn, receiver: &Value, args: &[Value]) -> SeqResult<Value> {
    match receiver.shape()? {
        SequenceShape::Singleton(value) => f(&with_receiver(value, args)),
        SequenceShape::Empty => Ok(Value::Seq(Seq::empty())),
        SequenceShape::Multi => {
            let f = Arc::clone(f);
            let fixed: Arc<[Value]> = args.into();
            Ok(Value::Seq(receiver.to_seq().try_map(move |value| f(&with_receiver(value, &fixed)))))
        }
    }
}

/// Binary call with one operand on each side
fn broadcast(f: &OperationFn, left: &Value, right: &Value) -> SeqResult<Value> {
    let left_shape = left.shape()?;
    let right_shape = right.shape()?;
    debug!(left = left_shape.name(), right = right_shape.name(), "binary dispatch");

    let f = Arc::clone(f);
    match (left_shape, right_shape) {
        (SequenceShape::Singleton(a), SequenceShape::Singleton(b)) => f(&[a, b]),
        (SequenceShape::Singleton(a), SequenceShape::Multi) => Ok(Value::Seq(right.to_seq().try_map(move |b| f(&[a.clone(), b])))),
        (SequenceShape::Multi, SequenceShape::Singleton(b)) => Ok(Value::Seq(left.to_seq().try_map(move |a| f(&[a, b.clone()])))),
        (SequenceShape::Multi, SequenceShape::Multi) => Ok(Value::Seq(left.to_seq().zip_with(&right.to_seq(), move |a, b| f(&[a, b])))),
        (SequenceShape::Empty, _) | (_, SequenceShape::Empty) => Ok(Value::Seq(Seq::empty())),
    }
}

/// Variadic call without extra arguments: reduce the receiver's elements
fn reduce(f: &OperationFn, receiver: &Value) -> SeqResult<Value> {
    match receiver.shape()? {
        SequenceShape::Empty => f(&[]),
        SequenceShape::Singleton(value) => f(&[value]),
        SequenceShape::Multi => {
            let mut run = receiver.to_seq().iter();
            let mut spread = Vec::new();
            while spread.len() <= MAX_SPREAD_ARGS {
                match run.next() {
                    Some(item) => spread.push(item?),
                    None => return f(&spread),
                }
            }

            debug!(limit = MAX_SPREAD_ARGS, "reduction too long to spread, folding pairwise");
            let mut values = spread.into_iter();
            let mut acc = match values.next() {
                Some(first) => first,
                None => return f(&[]),
            };
            for value in values {
                acc = f(&[acc, value])?;
            }
            for item in run {
                acc = f(&[acc, item?])?;
            }
            Ok(acc)
        }
    }
}

/// Variadic call with explicit arguments: the receiver's value(s) come first
fn spread_apply(f: &OperationFn, receiver: &Value, args: &[Value]) -> SeqResult<Value> {
    let mut call_args = match receiver {
        Value::Null => Vec::new(),
        Value::Seq(seq) => seq.to_vec()?,
        scalar => vec![scalar.clone()],
    };
    call_args.extend_from_slice(args);
    f(&call_args)
}

/// Binary call without an operand: fold the receiver pairwise
fn fold_pairwise(f: &OperationFn, receiver: &Value) -> SeqResult<Value> {
    let mut acc: Option<Value> = None;
    for item in receiver.to_seq().iter() {
        let value = item?;
        acc = Some(match acc {
            Some(acc) => f(&[acc, value])?,
            None => value,
        });
    }
    Ok(acc.unwrap_or(Value::Null))
}
