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

//! Composition Engine
//!
//! Chains steps into a single callable. Each step receives the previous
//! step's value; conditional steps rewrite sequences element by element and
//! may cut them short.

use crate::error::SeqResult;
use crate::registry::{Arity, OperationKind, OperationRegistry};
use crate::sequence::{Seq, SeqIter};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{Level, debug};

pub type SourceFn = Arc<dyn Fn() -> SeqResult<Value> + Send + Sync>;
pub type TransformFn = Arc<dyn Fn(Value) -> SeqResult<Value> + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&Value) -> SeqResult<bool> + Send + Sync>;
pub type BranchFn = Arc<dyn Fn(&Value) -> SeqResult<Outcome> + Send + Sync>;

/// What a conditional branch does with the element it was given
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Emit this value and keep going
    Emit(Value),
    /// End the output here
    Stop,
    /// Emit the element unchanged, then end the output
    EmitOriginalAndStop,
}

/// Elementwise if/else with short-circuiting branches
#[derive(Clone)]
pub struct Conditional {
    predicate: PredicateFn,
    then: BranchFn,
    otherwise: Option<BranchFn>,
}

impl Conditional {
    pub fn new(
        predicate: impl Fn(&Value) -> SeqResult<bool> + Send + Sync + 'static,
        then: impl Fn(&Value) -> SeqResult<Outcome> + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            then: Arc::new(then),
            otherwise: None,
        }
    }

    /// Branch taken when the predicate is false. Without one the element passes through.
    pub fn otherwise(mut self, otherwise: impl Fn(&Value) -> SeqResult<Outcome> + Send + Sync + 'static) -> Self {
        self.otherwise = Some(Arc::new(otherwise));
        self
    }

    pub fn decide(&self, value: &Value) -> SeqResult<Outcome> {
        if (self.predicate)(value)? {
            return (self.then)(value);
        }
        match &self.otherwise {
            Some(otherwise) => otherwise(value),
            None => Ok(Outcome::Emit(value.clone())),
        }
    }

    fn apply(&self, input: Value) -> SeqResult<Value> {
        match input {
            Value::Null => Ok(Value::Null),
            Value::Seq(seq) => {
                let conditional = self.clone();
                Ok(Value::Seq(Seq::from_result_producer(move || ConditionalIter {
                    run: seq.iter(),
                    conditional: conditional.clone(),
                    done: false,
                })))
            }
            scalar => Ok(match self.decide(&scalar)? {
                Outcome::Emit(value) => value,
                Outcome::Stop => Value::Null,
                Outcome::EmitOriginalAndStop => scalar,
            }),
        }
    }
}

impl fmt::Debug for Conditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditional").field("has_otherwise", &self.otherwise.is_some()).finish()
    }
}

struct ConditionalIter {
    run: SeqIter<Value>,
    conditional: Conditional,
    done: bool,
}

impl Iterator for ConditionalIter {
    type Item = SeqResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let value = match self.run.next()? {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        };
        match self.conditional.decide(&value) {
            Ok(Outcome::Emit(emitted)) => Some(Ok(emitted)),
            Ok(Outcome::Stop) => {
                self.done = true;
                None
            }
            Ok(Outcome::EmitOriginalAndStop) => {
                self.done = true;
                Some(Ok(value))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// One stage of a composed pipeline
#[derive(Clone)]
pub enum Step {
    /// Produces a value from nothing; the incoming value is ignored
    Source(SourceFn),
    Transform(TransformFn),
    /// Chained registry call with the incoming value as receiver
    Operation { name: String, args: Vec<Value> },
    Conditional(Conditional),
}

impl Step {
    pub fn source(f: impl Fn() -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Step::Source(Arc::new(f))
    }

    pub fn transform(f: impl Fn(Value) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        Step::Transform(Arc::new(f))
    }

    pub fn operation(name: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        Step::Operation {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn conditional(conditional: Conditional) -> Self {
        Step::Conditional(conditional)
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Source(_) => "source",
            Step::Transform(_) => "transform",
            Step::Operation { name, .. } => name,
            Step::Conditional(_) => "conditional",
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Operation { name, args } => f.debug_struct("Operation").field("name", name).field("args", args).finish(),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Builds the single callable described by `steps`
pub fn compose(registry: Arc<OperationRegistry>, steps: impl IntoIterator<Item = Step>) -> Composed {
    Composed {
        registry,
        steps: steps.into_iter().collect(),
    }
}

/// A pipeline ready to run; cloning shares the steps
#[derive(Clone)]
pub struct Composed {
    registry: Arc<OperationRegistry>,
    steps: Arc<[Step]>,
}

impl Composed {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Runs every step in order. Without input the pipeline starts from `Null`,
    /// which a leading source step replaces.
    pub fn run(&self, input: Option<Value>) -> SeqResult<Value> {
        let mut current = input.unwrap_or(Value::Null);
        let last = self.steps.len().saturating_sub(1);
        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, step = step.name(), input = current.type_name(), "applying pipeline step");
            current = match step {
                Step::Source(source) => source()?,
                Step::Transform(transform) => transform(current)?,
                Step::Operation { name, args } => {
                    let flag = index == last && args.is_empty() && self.is_reduction(name);
                    let non_empty = flag && tracing::enabled!(Level::DEBUG) && !current.shape()?.is_empty();
                    let result = self.registry.call_on(&current, name, args)?;
                    if non_empty && is_degenerate(&result) {
                        debug!(operation = %name, result = %result, "reduction of non-empty input produced a degenerate result");
                    }
                    result
                }
                Step::Conditional(conditional) => conditional.apply(current)?,
            };
        }
        Ok(current)
    }

    /// Wraps the pipeline as a function value taking an optional input
    pub fn to_func(&self) -> Value {
        let composed = self.clone();
        Value::func(move |args| composed.run(args.first().cloned()))
    }

    fn is_reduction(&self, name: &str) -> bool {
        self.registry
            .descriptor(name)
            .is_some_and(|descriptor| descriptor.kind == OperationKind::Operation && descriptor.arity == Arity::Variadic)
    }
}

impl fmt::Debug for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composed").field("steps", &self.steps).finish()
    }
}

fn is_degenerate(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Int(i) => *i == 0,
        Value::Float(x) => *x == 0.0,
        _ => false,
    }
}

/// Builder over [`compose`]
pub struct Pipeline {
    registry: Arc<OperationRegistry>,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry, steps: Vec::new() }
    }

    pub fn source(self, f: impl Fn() -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        self.step(Step::source(f))
    }

    pub fn then(self, f: impl Fn(Value) -> SeqResult<Value> + Send + Sync + 'static) -> Self {
        self.step(Step::transform(f))
    }

    pub fn op(self, name: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        self.step(Step::operation(name, args))
    }

    pub fn when(self, conditional: Conditional) -> Self {
        self.step(Step::conditional(conditional))
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Composed {
        compose(self.registry, self.steps)
    }
}
