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

//! Lazyset CLI Tool
//!
//! Main entry point for the lazyset command-line interface.

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use lazyset_core::OperationRegistry;
use lazyset_tools::{EvalArgs, OpsArgs, run_eval, run_ops};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lazyset")]
#[command(about = "Lazyset - Lazy Sequence Engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate operations over an input sequence
    Eval(EvalArgs),
    /// List registered operations
    Ops(OpsArgs),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Eval(args) => {
            let result = run_eval(&args)?;
            let rendered = if args.pretty { serde_json::to_string_pretty(&result)? } else { result.to_string() };
            println!("{rendered}");
        }
        Commands::Ops(args) => {
            let registry = OperationRegistry::with_builtins();
            println!("{}", run_ops(&args, &registry)?);
        }
    }

    Ok(())
}
