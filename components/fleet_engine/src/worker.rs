//! One independently scheduled worker per host. The worker owns the host's
//! progress exclusively; the orchestrator only reads snapshots and drains
//! the message log.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::host::Host;
use crate::machine::{HostState, Step};

/// Final word on a host once its worker has finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostOutcome {
    /// Reached a terminal state.
    Completed { state: HostState, success: bool },
    /// Parked in a working state by a calculate-only run.
    Parked { state: HostState },
}

impl HostOutcome {
    pub fn failed(&self) -> bool {
        matches!(
            self,
            HostOutcome::Completed { success: false, .. }
        )
    }

    pub fn state(&self) -> HostState {
        match self {
            HostOutcome::Completed { state, .. } | HostOutcome::Parked { state } => *state,
        }
    }
}

pub struct HostWorker {
    host: Arc<Host>,
    handle: JoinHandle<()>,
}

impl HostWorker {
    /// Start stepping the host's state machine until it reaches a terminal
    /// state or a state parks it. Never blocks any other worker.
    pub fn spawn(host: Arc<Host>) -> Self {
        let runner = host.clone();
        let handle = tokio::spawn(async move {
            loop {
                match runner.step().await {
                    Step::Hold => break,
                    Step::Advance(next) if next.is_terminal() => break,
                    Step::Advance(_) => {}
                }
            }
        });

        Self { host, handle }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Non-blocking snapshot of the host's state.
    pub fn current_state(&self) -> HostState {
        self.host.state()
    }

    /// Non-blocking: has this worker finished (terminal or parked)?
    pub fn is_done(&self) -> bool {
        self.handle.is_finished()
    }

    /// `None` until the worker is done, then fixed.
    pub fn result(&self) -> Option<HostOutcome> {
        if !self.is_done() {
            return None;
        }

        let state = self.host.state();
        match state.terminal_success() {
            Some(success) => Some(HostOutcome::Completed { state, success }),
            None => Some(HostOutcome::Parked { state }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use crate::stub::{host_for_tests, quick_timeouts, StubFleet};

    #[tokio::test]
    async fn result_is_none_until_done_then_fixed() {
        let fleet = StubFleet::new()
            .with_network("prod-net")
            .with_template("base")
            .vm_appears_after_clone();
        let host = Arc::new(host_for_tests("web", 1, &fleet, quick_timeouts()));

        let worker = HostWorker::spawn(host);
        // The worker has barely started; no result yet.
        if !worker.is_done() {
            assert!(worker.result().is_none());
        }

        while !worker.is_done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let first = worker.result().unwrap();
        let second = worker.result().unwrap();
        assert_eq!(first, second);
        assert_matches!(
            first,
            HostOutcome::Completed {
                state: HostState::Verified,
                success: true
            }
        );
    }

    #[tokio::test]
    async fn fresh_host_traverses_the_provisioning_chain() {
        let fleet = StubFleet::new()
            .with_network("prod-net")
            .with_template("base")
            .vm_appears_after_clone();
        let host = Arc::new(host_for_tests("web", 1, &fleet, quick_timeouts()));

        let worker = HostWorker::spawn(host.clone());
        while !worker.is_done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(worker.current_state(), HostState::Verified);
        assert_eq!(host.success(), Some(true));
        assert_eq!(fleet.hypervisor.clone_calls(), 1);
        assert_eq!(fleet.bootstrapper.calls(), 1);
    }
}
