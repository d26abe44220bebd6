// bases/muster/src/config.rs
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use fleet_primitives::SimulationMode;

/// Muster - fleet provisioning orchestrator
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Environment name (selects the composition's environment)
    #[arg(short, long)]
    pub environment: String,

    /// Path to the composition document
    #[arg(short = 'd', long)]
    pub composition: PathBuf,

    /// Run only this phase
    #[arg(short, long, conflicts_with_all = ["phase_start", "phase_final"])]
    pub phase: Option<u32>,

    /// Start with this phase
    #[arg(short = 's', long, default_value_t = 0)]
    pub phase_start: u32,

    /// Stop after this phase
    #[arg(short = 'f', long)]
    pub phase_final: Option<u32>,

    /// Walk the full lifecycle but mutate nothing and assume every check
    /// passes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Report which hosts would be provisioned or bootstrapped, without
    /// acting or advancing past those steps
    #[arg(long, conflicts_with = "dry_run")]
    pub calculate: bool,

    /// Show probe targets and other diagnostics in host logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Seconds between orchestrator status polls
    #[arg(long, default_value_t = 1)]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub composition: PathBuf,
    pub phase_start: u32,
    pub phase_final: Option<u32>,
    pub simulate: SimulationMode,
    pub verbose: bool,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_args(args: CliArgs) -> Self {
        let simulate = if args.dry_run {
            SimulationMode::DryRun
        } else if args.calculate {
            SimulationMode::CalculateOnly
        } else {
            SimulationMode::None
        };

        // -p N is shorthand for the range [N, N].
        let (phase_start, phase_final) = match args.phase {
            Some(phase) => (phase, Some(phase)),
            None => (args.phase_start, args.phase_final),
        };

        Self {
            environment: args.environment,
            composition: args.composition,
            phase_start,
            phase_final,
            simulate,
            verbose: args.verbose,
            poll_interval: Duration::from_secs(args.poll_interval_secs),
        }
    }
}
