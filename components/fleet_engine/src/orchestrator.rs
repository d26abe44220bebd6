//! Phase-level orchestration: run every host of a phase concurrently, drain
//! and render progress without racing the workers, and gate the next phase
//! on the current one finishing clean.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::host::Host;
use crate::machine::HostState;
use crate::status::{StatusRenderer, StatusSnapshot};
use crate::worker::{HostOutcome, HostWorker};

/// Hosts partitioned into integer-ordered phases, per-actor order kept.
#[derive(Default)]
pub struct PhasePlan {
    phases: BTreeMap<u32, Vec<Arc<Host>>>,
}

impl PhasePlan {
    pub fn from_hosts(hosts: impl IntoIterator<Item = Arc<Host>>) -> Self {
        let mut phases: BTreeMap<u32, Vec<Arc<Host>>> = BTreeMap::new();
        for host in hosts {
            phases.entry(host.phase()).or_default().push(host);
        }
        Self { phases }
    }

    pub fn phase_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.phases.keys().copied()
    }

    pub fn last_phase(&self) -> Option<u32> {
        self.phases.keys().next_back().copied()
    }

    pub fn hosts(&self, phase: u32) -> &[Arc<Host>] {
        self.phases.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostFailure {
    pub fqdn: String,
    pub state: HostState,
}

pub struct PhaseReport {
    pub phase: u32,
    pub snapshot: StatusSnapshot,
    pub failures: Vec<HostFailure>,
}

pub struct RunReport {
    pub success: bool,
    pub phases: Vec<PhaseReport>,
}

pub struct Orchestrator<R: StatusRenderer> {
    plan: PhasePlan,
    renderer: R,
    poll_interval: Duration,
}

impl<R: StatusRenderer> Orchestrator<R> {
    pub fn new(plan: PhasePlan, renderer: R) -> Self {
        Self {
            plan,
            renderer,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run phases in ascending order within `[start, last]`, stopping at the
    /// first phase that ends with a failed host. The run is successful iff
    /// every executed phase finished clean.
    pub async fn run(&self, start: u32, last: Option<u32>) -> RunReport {
        let mut phases = Vec::new();
        let mut success = true;

        for phase in self.plan.phase_numbers().collect::<Vec<_>>() {
            if phase < start {
                continue;
            }
            if last.is_some_and(|last| phase > last) {
                break;
            }

            let report = self.run_phase(phase).await;
            let failed = !report.failures.is_empty();
            phases.push(report);

            if failed {
                success = false;
                break;
            }
        }

        RunReport { success, phases }
    }

    /// Run one phase to completion: spawn a worker per host, then poll.
    /// Drained messages are rendered immediately; the snapshot is rendered
    /// whenever a state changed; the loop sleeps only when there was
    /// nothing new to report.
    pub async fn run_phase(&self, phase: u32) -> PhaseReport {
        let hosts = self.plan.hosts(phase);
        tracing::info!(phase, hosts = hosts.len(), "starting phase");

        let workers: Vec<HostWorker> = hosts.iter().cloned().map(HostWorker::spawn).collect();
        let mut snapshot = StatusSnapshot::new(phase, hosts);

        loop {
            let done = workers.iter().all(HostWorker::is_done);

            let mut dirty = false;
            for worker in &workers {
                let state = worker.current_state();
                if snapshot.update(worker.host().fqdn(), state) {
                    dirty = true;
                }
            }

            let mut drained = false;
            for worker in &workers {
                for entry in worker.host().log().drain() {
                    drained = true;
                    self.renderer.host_line(worker.host().fqdn(), &entry);
                }
            }

            if dirty {
                self.renderer.snapshot(&snapshot);
            }

            if done {
                break;
            }
            if !dirty && !drained {
                sleep(self.poll_interval).await;
            }
        }

        // Workers are done; pick up anything appended after the last drain
        // and show the final picture.
        for worker in &workers {
            snapshot.update(worker.host().fqdn(), worker.current_state());
            for entry in worker.host().log().drain() {
                self.renderer.host_line(worker.host().fqdn(), &entry);
            }
        }
        self.renderer.snapshot(&snapshot);

        let failures: Vec<HostFailure> = workers
            .iter()
            .filter_map(|worker| match worker.result() {
                Some(outcome @ HostOutcome::Completed { .. }) if outcome.failed() => {
                    Some(HostFailure {
                        fqdn: worker.host().fqdn().to_string(),
                        state: outcome.state(),
                    })
                }
                _ => None,
            })
            .collect();

        tracing::info!(phase, failures = failures.len(), "phase finished");
        PhaseReport {
            phase,
            snapshot,
            failures,
        }
    }
}
