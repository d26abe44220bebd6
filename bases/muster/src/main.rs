// bases/muster/src/main.rs
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;

use fleet_engine::{Deps, Orchestrator, PhasePlan, Timeouts};
use fleet_primitives::SimulationMode;

mod adapters;
mod composition;
mod config;
mod error;
mod render;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=info".into()),
        )
        .init();

    let args = config::CliArgs::parse();
    let config = config::Config::from_args(args);

    match config.simulate {
        SimulationMode::DryRun => {
            tracing::warn!("DRY RUN: predicates are assumed, nothing will be changed")
        }
        SimulationMode::CalculateOnly => {
            tracing::warn!("CALCULATE: reporting intended actions only")
        }
        SimulationMode::None => {}
    }

    let doc = composition::load(&config.composition)?;

    let deps = Deps::new(
        Arc::new(adapters::CommandHypervisor::new(
            doc.toolchain.clone(),
            config.environment.clone(),
        )),
        Arc::new(adapters::CommandRegistry::new(
            doc.toolchain.clone(),
            config.environment.clone(),
        )),
        Arc::new(adapters::CommandBootstrapper::new(
            doc.toolchain.clone(),
            config.environment.clone(),
        )),
        Arc::new(adapters::CommandTester::new(
            doc.toolchain.clone(),
            config.environment.clone(),
        )),
    );

    let settings = composition::ResolveSettings {
        simulate: config.simulate,
        verbose: config.verbose,
        timeouts: Timeouts::default(),
    };
    let hosts = composition::resolve(&doc, &deps, &settings)?;
    tracing::info!(
        environment = %config.environment,
        hosts = hosts.len(),
        "composition resolved"
    );

    let orchestrator = Orchestrator::new(PhasePlan::from_hosts(hosts), render::ConsoleRenderer)
        .with_poll_interval(config.poll_interval);
    let report = orchestrator
        .run(config.phase_start, config.phase_final)
        .await;

    if report.success {
        tracing::info!(phases = report.phases.len(), "run complete");
        Ok(())
    } else {
        tracing::error!("run failed");
        std::process::exit(1);
    }
}
