//! eopic CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use eop_calib::Split;
use std::path::PathBuf;

mod compute;
mod config;
mod update;

use config::ObjectRef;

#[derive(Parser)]
#[command(name = "eopic")]
#[command(about = "eopic - E/p intercalibration of calorimeter channels")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accumulate numerator/denominator over the ntuples and write a pass file
    ComputeIc {
        /// Run configuration (YAML, or JSON with a .json extension)
        #[arg(long)]
        cfg: PathBuf,

        /// Prior ICs, overriding `input.ic` of the config
        #[arg(long, num_args = 2, value_names = ["NAME", "FILE"])]
        input_ic: Option<Vec<String>>,

        /// E/p weight table, overriding `input.eop_weight` of the config
        #[arg(long, num_args = 2, value_names = ["NAME", "FILE"])]
        eop_weight: Option<Vec<String>>,

        /// Output map file, overriding `output.compute_ic` of the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use only odd-numbered entries
        #[arg(long, conflicts_with = "even")]
        odd: bool,

        /// Use only even-numbered entries
        #[arg(long)]
        even: bool,

        /// Threads (0 = auto). 1 runs the sequential streaming pass.
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Recompute ICpull and the new ICs from a (possibly merged) pass file
    UpdateIc {
        /// Name of the new IC map and the pass file to update in place
        #[arg(long, num_args = 2, value_names = ["NAME", "FILE"], required = true)]
        new_ic: Vec<String>,

        /// Previous ICs (unit prior when omitted)
        #[arg(long, num_args = 2, value_names = ["NAME", "FILE"])]
        old_ic: Option<Vec<String>>,
    },

    /// Sum numerator/denominator of several pass files
    Merge {
        /// Output map file
        #[arg(short, long)]
        output: PathBuf,

        /// Pass files to merge
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::ComputeIc { cfg, input_ic, eop_weight, output, odd, even, threads } => {
            let split = match (odd, even) {
                (true, _) => Some(Split::Odd),
                (_, true) => Some(Split::Even),
                _ => None,
            };
            compute::cmd_compute_ic(compute::ComputeArgs {
                cfg,
                input_ic: input_ic.map(|v| ObjectRef::from_pair("--input-ic", v)).transpose()?,
                eop_weight: eop_weight.map(|v| ObjectRef::from_pair("--eop-weight", v)).transpose()?,
                output,
                split,
                threads,
            })
        }
        Commands::UpdateIc { new_ic, old_ic } => {
            let new_ic = ObjectRef::from_pair("--new-ic", new_ic)?;
            let old_ic = old_ic.map(|v| ObjectRef::from_pair("--old-ic", v)).transpose()?;
            update::cmd_update_ic(&new_ic, old_ic.as_ref())
        }
        Commands::Merge { output, inputs } => update::cmd_merge(&inputs, &output),
        Commands::Version => {
            println!("eopic {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
