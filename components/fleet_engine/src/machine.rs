//! The per-host provisioning state machine.
//!
//! The transition function is pure: state handlers gather [`Facts`] by
//! talking to collaborators, [`next_state`] decides where to go. That keeps
//! the whole table unit-testable without live collaborators.

use std::fmt;

/// Every state a host can be in. Working states branch on observed facts;
/// terminal states are classified success or failure and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    LocateVm,
    RuntimeState,
    CheckConnectivity,
    Verify,
    Provision,
    Customizing,
    VerifyConnectivity,
    Bootstrap,
    Test,
    // success terminals
    Verified,
    Running,
    // failure terminals
    PoweredOff,
    NetworkingDown,
    Disconnected,
    AcceptanceFailed,
    Prerequisites,
    ProvisioningFailure,
    CustomizationTimeout,
    CustomizationFailure,
    BootstrappingFailure,
}

impl HostState {
    pub fn is_terminal(&self) -> bool {
        self.terminal_success().is_some()
    }

    /// `Some(true)` for success terminals, `Some(false)` for failure
    /// terminals, `None` for working states.
    pub fn terminal_success(&self) -> Option<bool> {
        use HostState::*;
        match self {
            Verified | Running => Some(true),
            PoweredOff | NetworkingDown | Disconnected | AcceptanceFailed | Prerequisites
            | ProvisioningFailure | CustomizationTimeout | CustomizationFailure
            | BootstrappingFailure => Some(false),
            LocateVm | RuntimeState | CheckConnectivity | Verify | Provision | Customizing
            | VerifyConnectivity | Bootstrap | Test => None,
        }
    }

    pub fn name(&self) -> &'static str {
        use HostState::*;
        match self {
            LocateVm => "locate_vm",
            RuntimeState => "runtime_state",
            CheckConnectivity => "check_connectivity",
            Verify => "verify",
            Provision => "provision",
            Customizing => "customizing",
            VerifyConnectivity => "verify_connectivity",
            Bootstrap => "bootstrap",
            Test => "test",
            Verified => "verified",
            Running => "running",
            PoweredOff => "powered_off",
            NetworkingDown => "networking_down",
            Disconnected => "disconnected",
            AcceptanceFailed => "acceptance_failed",
            Prerequisites => "prerequisites",
            ProvisioningFailure => "provisioning_failure",
            CustomizationTimeout => "customization_timeout",
            CustomizationFailure => "customization_failure",
            BootstrappingFailure => "bootstrapping_failure",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a state handler observed, one variant per working state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Facts {
    /// locate_vm: does the VM exist?
    Located { found: bool },
    /// runtime_state: power and addressing of the found VM.
    Runtime { powered_on: bool, has_ip: bool },
    /// check_connectivity: did the TCP probe succeed?
    Probed { reachable: bool },
    /// verify: acceptance result; `None` means no test configured.
    Accepted { result: Option<bool> },
    /// provision: prerequisite checks, stale-client removal, whether this is
    /// a calculate-only peek, and whether the clone was started.
    ProvisionReady {
        prerequisites_met: bool,
        deregistered: bool,
        calculate_only: bool,
        clone_started: bool,
    },
    /// customizing: powered on with an IP before the deadline?
    Customized { ready: bool },
    /// verify_connectivity: probe succeeded before the deadline?
    Connected { ready: bool },
    /// bootstrap: calculate-only peek, or did the bootstrap succeed?
    Bootstrapped {
        calculate_only: bool,
        succeeded: bool,
    },
    /// test: all acceptance tests passed (or none configured) in time?
    Tested { passed: bool },
}

/// Outcome of one decision point. `Hold` parks the host in its current
/// state: the calculate-only "report intent, do not act" case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Advance(HostState),
    Hold,
}

/// Pure transition function. Total over (working state, matching facts);
/// facts that do not belong to the state are a programming error and land
/// the host in `Prerequisites` rather than panicking.
pub fn next_state(state: &HostState, facts: Facts) -> Step {
    use HostState::*;

    let next = match (*state, facts) {
        (LocateVm, Facts::Located { found: true }) => RuntimeState,
        (LocateVm, Facts::Located { found: false }) => Provision,

        (RuntimeState, Facts::Runtime { powered_on: false, .. }) => PoweredOff,
        (RuntimeState, Facts::Runtime { has_ip: false, .. }) => NetworkingDown,
        (RuntimeState, Facts::Runtime { .. }) => CheckConnectivity,

        (CheckConnectivity, Facts::Probed { reachable: true }) => Verify,
        (CheckConnectivity, Facts::Probed { reachable: false }) => Disconnected,

        (Verify, Facts::Accepted { result: Some(true) }) => Verified,
        (Verify, Facts::Accepted { result: None }) => Running,
        (Verify, Facts::Accepted { result: Some(false) }) => AcceptanceFailed,

        (
            Provision,
            Facts::ProvisionReady {
                prerequisites_met,
                deregistered,
                calculate_only,
                clone_started,
            },
        ) => {
            if !prerequisites_met || !deregistered {
                Prerequisites
            } else if calculate_only {
                return Step::Hold;
            } else if !clone_started {
                ProvisioningFailure
            } else {
                Customizing
            }
        }

        (Customizing, Facts::Customized { ready: true }) => VerifyConnectivity,
        (Customizing, Facts::Customized { ready: false }) => CustomizationTimeout,

        (VerifyConnectivity, Facts::Connected { ready: true }) => Bootstrap,
        (VerifyConnectivity, Facts::Connected { ready: false }) => CustomizationFailure,

        (
            Bootstrap,
            Facts::Bootstrapped {
                calculate_only: true,
                ..
            },
        ) => return Step::Hold,
        (
            Bootstrap,
            Facts::Bootstrapped {
                succeeded: true, ..
            },
        ) => Test,
        (Bootstrap, Facts::Bootstrapped { .. }) => BootstrappingFailure,

        (Test, Facts::Tested { passed: true }) => Verified,
        (Test, Facts::Tested { passed: false }) => AcceptanceFailed,

        // Facts from the wrong state, or a decision requested for a
        // terminal state. Treated as a broken invariant, not a crash.
        (state, facts) => {
            tracing::error!(?state, ?facts, "facts do not match state");
            Prerequisites
        }
    };

    Step::Advance(next)
}
