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

//! Lazyset Core
//!
//! A lazy, possibly infinite sequence type with uniform operation dispatch.
//! Scalars, collections and unbounded producers are all normalized into a
//! [`Seq`], optionally cached (full memoization or a bounded sliding window),
//! and operated on through a registry of operations that broadcast or zip
//! depending on the shape of their operands.

pub mod builtins;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod registry;
pub mod sequence;
pub mod value;

pub use cache::{CacheMode, CacheStats, CacheStrategy, MemoCache, WindowCache, WindowEvent};
pub use dispatch::{Access, Dispatcher, Key};
pub use error::{SeqError, SeqResult};
pub use options::{CacheSetting, SequenceOptions};
pub use pipeline::{Composed, Conditional, Outcome, Pipeline, Step, compose};
pub use registry::{Arity, Method, Operation, OperationDescriptor, OperationKind, OperationRegistry};
pub use sequence::{Seq, SeqInput, SeqIter, SequenceShape, make_sequence};
pub use value::{Callable, Value};
