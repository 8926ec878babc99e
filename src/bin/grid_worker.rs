//! Stdio grid worker
//!
//! Reads one JSON request per line from stdin and streams progress and
//! results as JSON lines on stdout. Logs go to stderr.

use clap::{Parser, ValueEnum};
use std::io;

use taskgrid_worker::config::{FailurePolicy, FilterOptions, WorkerConfig, DEFAULT_ANNOTATION_KEY};
use taskgrid_worker::logging::init_tracing;
use taskgrid_worker::server::serve;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Fail the whole request on the first bad cell
    Abort,
    /// Drop bad cells and report them alongside the result
    Skip,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Abort => FailurePolicy::AbortBatch,
            PolicyArg::Skip => FailurePolicy::SkipCell,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "grid_worker", about = "Filter task grids against contributed geometries over stdio")]
struct Args {
    /// Log filter directive, overrides GRID_WORKER_LOG
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum, default_value_t = PolicyArg::Abort)]
    failure_policy: PolicyArg,

    /// Scan every contributed geometry per cell instead of using the R-tree
    #[arg(long)]
    no_spatial_index: bool,

    /// Candidates per cell at which matching runs in parallel
    #[arg(long, default_value_t = 256)]
    parallel_threshold: usize,

    /// Property key for the matched geometries on kept cells
    #[arg(long, default_value = DEFAULT_ANNOTATION_KEY)]
    annotation_key: String,
}

impl Args {
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            filter: FilterOptions {
                failure_policy: self.failure_policy.into(),
                use_spatial_index: !self.no_spatial_index,
                parallel_threshold: self.parallel_threshold,
                annotation_key: self.annotation_key.clone(),
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let config = args.worker_config();
    tracing::info!(?config, "starting grid worker");

    let stdin = io::stdin();
    serve(stdin.lock(), io::stdout(), config)?;

    tracing::info!("shutting down");
    Ok(())
}
