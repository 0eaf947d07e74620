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

//! Error types for sequence construction, access and operation calls

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeqError {
    #[error("Failed to access `{key}` on {target}: {source}")]
    Access {
        key: String,
        target: String,
        #[source]
        source: Box<SeqError>,
    },

    #[error("Index out of range: {0} (negative indices are not supported)")]
    Range(i64),

    #[error("Operation `{name}` failed: {message}")]
    Operation { name: String, message: String },

    #[error("Operation `{0}` is not registered")]
    UnknownOperation(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    Type { expected: &'static str, found: &'static str },

    #[error("Sequence limit exceeded: more than {0} elements requested")]
    LimitExceeded(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SeqError {
    pub fn operation(name: impl Into<String>, message: impl Into<String>) -> Self {
        SeqError::Operation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wraps a failure raised while resolving `key` on a value described by `target`.
    pub fn access(key: impl Into<String>, target: impl Into<String>, source: SeqError) -> Self {
        SeqError::Access {
            key: key.into(),
            target: target.into(),
            source: Box::new(source),
        }
    }
}

pub type SeqResult<T> = Result<T, SeqError>;
