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

//! Eval command: build a sequence, run operations over it, print the result as JSON

use anyhow::{Context, Result, bail};
use clap::Args;
use lazyset_core::dispatch::Builtin;
use lazyset_core::{Dispatcher, OperationRegistry, Pipeline, Seq, SequenceOptions, Step, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Arguments for the eval command
#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    /// Input value as JSON (arrays become sequences, scalars singletons)
    #[arg(short, long, value_name = "JSON")]
    pub input: Option<String>,

    /// Integer range input, `START..END` or an unbounded `START`
    #[arg(short, long, value_name = "START[..END]", conflicts_with = "input")]
    pub range: Option<String>,

    /// Operation to apply, `name[:arg,...]` with JSON arguments; repeatable
    #[arg(long = "op", value_name = "NAME[:ARGS]")]
    pub ops: Vec<String>,

    /// Keep only the first N elements of the result
    #[arg(short, long)]
    pub take: Option<usize>,

    /// Memoize the input, optionally pre-filling N elements
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "0")]
    pub memo: Option<usize>,

    /// Sliding window cache over the input with room for N elements
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "0")]
    pub cache: Option<usize>,

    /// Window granularity for the sliding cache
    #[arg(long, value_name = "N")]
    pub window: Option<usize>,

    /// Sequence options as JSON; individual flags take precedence
    #[arg(long, value_name = "JSON")]
    pub options: Option<String>,

    /// Maximum number of elements to materialize (safety limit)
    #[arg(long, default_value = "1000000")]
    pub limit: usize,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

impl EvalArgs {
    /// Options from `--options`, overridden by the individual flags
    pub fn sequence_options(&self) -> Result<SequenceOptions> {
        let mut options = match &self.options {
            Some(json) => SequenceOptions::from_json(json).context("invalid --options")?,
            None => SequenceOptions::default(),
        };
        if let Some(memo) = self.memo {
            options = if memo == 0 { SequenceOptions::memo() } else { SequenceOptions::memo_with_size(memo) }
                .with_window_size(options.effective_window_size());
        }
        if let Some(cache) = self.cache {
            let size = if cache == 0 { options.effective_cache_size() } else { cache };
            options = SequenceOptions::cached(size).with_window_size(options.effective_window_size());
        }
        if let Some(window) = self.window {
            options = options.with_window_size(window);
        }
        Ok(options)
    }

    fn start_value(&self) -> Result<Value> {
        if let Some(range) = &self.range {
            let (start, end) = parse_range(range)?;
            return Ok(Value::Seq(Seq::range(start, end)));
        }
        match &self.input {
            Some(json) => Value::from_json_str(json).context("invalid --input"),
            None => Ok(Value::Null),
        }
    }
}

/// Parses `START..END` or `START`
pub fn parse_range(raw: &str) -> Result<(i64, Option<i64>)> {
    let (start, end) = match raw.split_once("..") {
        Some((start, end)) => (start, Some(end)),
        None => (raw, None),
    };
    let start = start.trim().parse::<i64>().with_context(|| format!("invalid range start in `{raw}`"))?;
    let end = match end.map(str::trim) {
        Some("") | None => None,
        Some(end) => Some(end.parse::<i64>().with_context(|| format!("invalid range end in `{raw}`"))?),
    };
    Ok((start, end))
}

/// Parses `name[:arg,...]`; the arguments are read as a JSON array body
pub fn parse_op(raw: &str) -> Result<(String, Vec<Value>)> {
    let (name, args) = match raw.split_once(':') {
        Some((name, args)) => (name.trim(), args.trim()),
        None => (raw.trim(), ""),
    };
    if name.is_empty() {
        bail!("operation name missing in `{raw}`");
    }
    let args: Vec<serde_json::Value> =
        if args.is_empty() { Vec::new() } else { serde_json::from_str(&format!("[{args}]")).with_context(|| format!("invalid arguments in `{raw}`"))? };
    Ok((name.to_string(), args.into_iter().map(Value::from).collect()))
}

fn op_step(registry: &Arc<OperationRegistry>, name: String, args: Vec<Value>) -> Result<Step> {
    if registry.contains(&name) {
        return Ok(Step::operation(name, args));
    }
    if Builtin::from_name(&name).is_some() {
        let registry = Arc::clone(registry);
        return Ok(Step::transform(move |current| Dispatcher::new(&registry).invoke(&current.to_seq(), &name, &args)));
    }
    bail!("unknown operation `{name}`; run `lazyset ops` to list them")
}

/// Execute the eval command and return the JSON result
pub fn run_eval(args: &EvalArgs) -> Result<serde_json::Value> {
    let registry = Arc::new(OperationRegistry::with_builtins());
    let options = args.sequence_options()?;
    debug!(?options, "sequence options");

    let start = match args.start_value()? {
        Value::Seq(seq) => Value::Seq(seq.configure(options)),
        other => other,
    };

    let mut pipeline = Pipeline::new(Arc::clone(&registry));
    for raw in &args.ops {
        let (name, op_args) = parse_op(raw)?;
        pipeline = pipeline.step(op_step(&registry, name, op_args)?);
    }
    let composed = pipeline.build();
    info!(steps = composed.steps().len(), "running pipeline");

    let result = match composed.run(Some(start))? {
        Value::Seq(seq) => {
            let seq = match args.take {
                Some(n) => seq.take(n),
                None => seq,
            };
            Value::Seq(seq.guarded(args.limit))
        }
        other => other,
    };
    Ok(result.to_json()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: EvalArgs,
    }

    fn eval(argv: &[&str]) -> Result<serde_json::Value> {
        let cli = TestCli::try_parse_from(std::iter::once("lazyset").chain(argv.iter().copied()))?;
        run_eval(&cli.args)
    }

    #[test]
    fn test_parse_op() {
        let (name, args) = parse_op("add:10").unwrap();
        assert_eq!(name, "add");
        assert_eq!(args, vec![Value::Int(10)]);

        let (name, args) = parse_op("mul:[1,2],3").unwrap();
        assert_eq!(name, "mul");
        assert_eq!(args.len(), 2);

        assert!(parse_op(":1").is_err());
        assert!(parse_op("add:[1,").is_err());
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("1..5").unwrap(), (1, Some(5)));
        assert_eq!(parse_range("3").unwrap(), (3, None));
        assert_eq!(parse_range("3..").unwrap(), (3, None));
        assert!(parse_range("a..2").is_err());
    }

    #[test]
    fn test_eval_scalar_and_broadcast() {
        assert_eq!(eval(&["--input", "5", "--op", "add:3"]).unwrap(), json!(8));
        assert_eq!(eval(&["--input", "[1,2,3]", "--op", "add:10"]).unwrap(), json!([11, 12, 13]));
        assert_eq!(eval(&["--input", "[1,2]", "--op", "add:[10,20]"]).unwrap(), json!([11, 22]));
    }

    #[test]
    fn test_eval_infinite_range_with_take() {
        let result = eval(&["--range", "1", "--op", "mul:2", "--take", "4", "--memo"]).unwrap();
        assert_eq!(result, json!([2, 4, 6, 8]));

        let result = eval(&["--range", "0", "--op", "take:3", "--op", "sum"]).unwrap();
        assert_eq!(result, json!(3));
    }

    #[test]
    fn test_eval_limit_guards_unbounded_output() {
        let err = eval(&["--range", "0", "--limit", "10"]).unwrap_err();
        assert!(err.to_string().contains("limit exceeded"));
    }

    #[test]
    fn test_eval_unknown_operation() {
        let err = eval(&["--input", "[1]", "--op", "frobnicate"]).unwrap_err();
        assert!(err.to_string().contains("unknown operation"));
    }

    #[test]
    fn test_flags_override_json_options() {
        let cli = TestCli::try_parse_from(["lazyset", "--options", r#"{"cache": 50, "windowSize": 5}"#, "--window", "10"]).unwrap();
        let options = cli.args.sequence_options().unwrap();
        assert!(options.is_windowed());
        assert_eq!(options.effective_cache_size(), 50);
        assert_eq!(options.effective_window_size(), 10);

        let cli = TestCli::try_parse_from(["lazyset", "--options", r#"{"cache": 50}"#, "--memo", "20"]).unwrap();
        let options = cli.args.sequence_options().unwrap();
        assert!(options.is_memo());
        assert_eq!(options.memo_target(), 20);
    }
}
