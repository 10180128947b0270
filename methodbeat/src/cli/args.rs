//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::TracerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "methodbeat",
    about = "Trace method enter/exit on a work loop and report slow calls",
    after_help = "\
EXAMPLES:
    methodbeat                               Run the demo workload for 5 seconds
    methodbeat --duration 0                  Run until Ctrl+C
    methodbeat --threshold-ms 100 --json     Lower threshold, JSON report
    methodbeat --config tracer.json          Load tracer settings from a file"
)]
pub struct Args {
    /// Tracer settings as JSON (missing fields take defaults)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Event slots in the circular buffer
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Time offset refresh period in milliseconds
    #[arg(long, value_name = "MS")]
    pub cycle_ms: Option<u64>,

    /// Calls at least this long are reported
    #[arg(long, value_name = "MS")]
    pub threshold_ms: Option<u64>,

    /// Stop after N seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "5")]
    pub duration: u64,

    /// Milliseconds between posted jobs
    #[arg(long, value_name = "MS", default_value = "50")]
    pub interval_ms: u64,

    /// Every Nth job calls a method slower than the threshold (0 = never)
    #[arg(long, value_name = "N", default_value = "10")]
    pub slow_every: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Command-line values win over whatever `config` already holds.
    pub fn apply_overrides(&self, config: &mut TracerConfig) {
        if let Some(capacity) = self.capacity {
            config.buffer_capacity = capacity;
        }
        if let Some(cycle) = self.cycle_ms {
            config.time_update_cycle_ms = cycle;
        }
        if let Some(threshold) = self.threshold_ms {
            config.evil_method_threshold_ms = threshold;
        }
    }
}
