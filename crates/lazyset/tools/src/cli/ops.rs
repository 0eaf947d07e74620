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

//! Ops command: list the registered operations

use clap::Args;
use lazyset_core::{OperationDescriptor, OperationRegistry};

/// Arguments for the ops command
#[derive(Args, Debug, Clone, Default)]
pub struct OpsArgs {
    /// Print the descriptors as JSON
    #[arg(long)]
    pub json: bool,
}

/// Renders the descriptors of every registered operation
pub fn run_ops(args: &OpsArgs, registry: &OperationRegistry) -> anyhow::Result<String> {
    let descriptors = registry.descriptors();
    if args.json {
        return Ok(serde_json::to_string_pretty(&descriptors)?);
    }
    Ok(descriptors.iter().map(|descriptor| format_descriptor(descriptor)).collect::<Vec<_>>().join("\n"))
}

fn format_descriptor(descriptor: &OperationDescriptor) -> String {
    format!("{:<12} {:<10} {}", descriptor.name, descriptor.kind.to_string(), descriptor.arity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_builtins_sorted() {
        let registry = OperationRegistry::with_builtins();
        let listing = run_ops(&OpsArgs::default(), &registry).unwrap();
        let names: Vec<&str> = listing.lines().filter_map(|line| line.split_whitespace().next()).collect();

        assert!(names.contains(&"add"));
        assert!(names.contains(&"cumsum"));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_json_listing() {
        let registry = OperationRegistry::with_builtins();
        let listing = run_ops(&OpsArgs { json: true }, &registry).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&listing).unwrap();
        let sum = parsed.as_array().unwrap().iter().find(|entry| entry["name"] == "sum").unwrap();
        assert_eq!(sum["kind"], "Operation");
        assert_eq!(sum["arity"], "Variadic");
    }
}
