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

//! Built-in operations installed by [`OperationRegistry::with_builtins`]

use crate::error::{SeqError, SeqResult};
use crate::registry::{Method, Operation, OperationRegistry};
use crate::sequence::Seq;
use crate::value::Value;

/// Arithmetic operator shared by the binary builtins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Power,
}

impl ArithmeticOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "sub",
            ArithmeticOp::Multiply => "mul",
            ArithmeticOp::Divide => "div",
            ArithmeticOp::Modulus => "rem",
            ArithmeticOp::Power => "pow",
        }
    }

    /// Integers stay integers while the result is exact and in range,
    /// otherwise the operation is carried out in floating point
    pub fn apply(&self, a: &Value, b: &Value) -> SeqResult<Value> {
        if let (Value::Int(x), Value::Int(y)) = (a, b) {
            if let Some(result) = self.apply_int(*x, *y)? {
                return Ok(Value::Int(result));
            }
        }

        let (x, y) = match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x, y),
            (None, _) => return Err(type_error(self.name(), a)),
            (_, None) => return Err(type_error(self.name(), b)),
        };

        let result = match self {
            ArithmeticOp::Add => x + y,
            ArithmeticOp::Subtract => x - y,
            ArithmeticOp::Multiply => x * y,
            ArithmeticOp::Divide => {
                if y == 0.0 {
                    return Err(SeqError::operation(self.name(), "division by zero"));
                }
                x / y
            }
            ArithmeticOp::Modulus => {
                if y == 0.0 {
                    return Err(SeqError::operation(self.name(), "division by zero"));
                }
                x % y
            }
            ArithmeticOp::Power => x.powf(y),
        };
        Ok(Value::Float(result))
    }

    fn apply_int(&self, x: i64, y: i64) -> SeqResult<Option<i64>> {
        Ok(match self {
            ArithmeticOp::Add => x.checked_add(y),
            ArithmeticOp::Subtract => x.checked_sub(y),
            ArithmeticOp::Multiply => x.checked_mul(y),
            ArithmeticOp::Divide => {
                if y == 0 {
                    return Err(SeqError::operation(self.name(), "division by zero"));
                }
                if x.checked_rem(y) == Some(0) { x.checked_div(y) } else { None }
            }
            ArithmeticOp::Modulus => {
                if y == 0 {
                    return Err(SeqError::operation(self.name(), "division by zero"));
                }
                x.checked_rem(y)
            }
            ArithmeticOp::Power => u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp)),
        })
    }
}

fn type_error(name: &str, value: &Value) -> SeqError {
    SeqError::operation(name, format!("expected a number, found {}", value.type_name()))
}

fn negate(value: &Value) -> SeqResult<Value> {
    match value {
        Value::Int(i) => Ok(i.checked_neg().map_or(Value::Float(-(*i as f64)), Value::Int)),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(type_error("neg", other)),
    }
}

fn absolute(value: &Value) -> SeqResult<Value> {
    match value {
        Value::Int(i) => Ok(i.checked_abs().map_or(Value::Float((*i as f64).abs()), Value::Int)),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(type_error("abs", other)),
    }
}

fn square_root(value: &Value) -> SeqResult<Value> {
    let x = value.as_f64().ok_or_else(|| type_error("sqrt", value))?;
    if x < 0.0 {
        return Err(SeqError::operation("sqrt", "negative operand"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn fold_with(op: ArithmeticOp, init: Value, args: &[Value]) -> SeqResult<Value> {
    args.iter().try_fold(init, |acc, value| op.apply(&acc, value))
}

fn extreme(name: &'static str, args: &[Value], keep_left: fn(f64, f64) -> bool) -> SeqResult<Value> {
    let mut best: Option<(&Value, f64)> = None;
    for value in args {
        let x = value.as_f64().ok_or_else(|| type_error(name, value))?;
        best = match best {
            Some((current, y)) if keep_left(y, x) => Some((current, y)),
            _ => Some((value, x)),
        };
    }
    Ok(best.map_or(Value::Null, |(value, _)| value.clone()))
}

/// Running totals of the receiver
fn cumulative_sum(seq: &Seq<Value>, _args: &[Value]) -> SeqResult<Value> {
    let seq = seq.clone();
    Ok(Value::Seq(Seq::from_result_producer(move || {
        let mut total = Value::Int(0);
        seq.iter().map(move |item| -> SeqResult<Value> {
            total = ArithmeticOp::Add.apply(&total, &item?)?;
            Ok(total.clone())
        })
    })))
}

/// Receiver without repeated elements, first occurrence kept
fn distinct(seq: &Seq<Value>, _args: &[Value]) -> SeqResult<Value> {
    let seq = seq.clone();
    Ok(Value::Seq(Seq::from_result_producer(move || {
        let mut seen: Vec<Value> = Vec::new();
        seq.iter().filter(move |item| match item {
            Ok(value) if seen.contains(value) => false,
            Ok(value) => {
                seen.push(value.clone());
                true
            }
            Err(_) => true,
        })
    })))
}

/// Receiver grouped into lists of `size` elements; the last may be shorter
fn chunk(seq: &Seq<Value>, args: &[Value]) -> SeqResult<Value> {
    let size = args.first().map_or(Ok(1), Value::expect_i64)?.max(1) as usize;
    let seq = seq.clone();
    Ok(Value::Seq(Seq::from_result_producer(move || {
        let mut run = seq.iter();
        std::iter::from_fn(move || {
            let mut group = Vec::new();
            for item in run.by_ref().take(size) {
                match item {
                    Ok(value) => group.push(value),
                    Err(err) => return Some(Err(err)),
                }
            }
            if group.is_empty() { None } else { Some(Ok(Value::list(group))) }
        })
    })))
}

/// Registers every builtin into `registry`
pub fn install(registry: &mut OperationRegistry) {
    for op in [
        ArithmeticOp::Add,
        ArithmeticOp::Subtract,
        ArithmeticOp::Multiply,
        ArithmeticOp::Divide,
        ArithmeticOp::Modulus,
        ArithmeticOp::Power,
    ] {
        registry.register_operation(op.name(), Operation::binary(move |a, b| op.apply(a, b)));
    }

    registry.register_operation("neg", Operation::unary(negate));
    registry.register_operation("abs", Operation::unary(absolute));
    registry.register_operation("sqrt", Operation::unary(square_root));

    registry.register_operation("sum", Operation::variadic(|args| fold_with(ArithmeticOp::Add, Value::Int(0), args)));
    registry.register_operation("product", Operation::variadic(|args| fold_with(ArithmeticOp::Multiply, Value::Int(1), args)));
    registry.register_operation("max", Operation::variadic(|args| extreme("max", args, |best, x| best >= x)));
    registry.register_operation("min", Operation::variadic(|args| extreme("min", args, |best, x| best <= x)));

    registry.register_method("cumsum", Method::new(cumulative_sum));
    registry.register_method("distinct", Method::new(distinct));
    registry.register_method("chunk", Method::new(chunk));
}
