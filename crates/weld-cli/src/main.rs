mod build_context;
mod dispatch;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "weld", version, about = "Build native bridge modules")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project directory containing the module sources.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Configuration file (defaults to weld.json in the project directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    engine_home: Option<PathBuf>,

    #[arg(long, global = true)]
    support_home: Option<PathBuf>,

    #[arg(long, global = true)]
    interp_home: Option<PathBuf>,

    /// Extra include directory (repeatable).
    #[arg(long, global = true)]
    include: Vec<PathBuf>,

    /// Extra library directory (repeatable).
    #[arg(long, global = true)]
    lib: Vec<PathBuf>,

    #[arg(long, global = true)]
    make: Option<String>,

    /// Build with debugging flags instead of optimizations.
    #[arg(long, global = true)]
    debug: bool,

    /// Only log errors.
    #[arg(long, global = true)]
    quiet: bool,

    /// Log the commands being run.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and link the bridge module (the default).
    Build {
        /// Rebuild even when the inputs are unchanged.
        #[arg(long)]
        force: bool,

        /// Skip probe generation for this run.
        #[arg(long)]
        no_probes: bool,
    },
    /// Print the resolved build plan without running anything.
    Plan {
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Generate trace probes only.
    Probes,
    /// Report the detected platform and toolchain.
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::execute(cli)
}
