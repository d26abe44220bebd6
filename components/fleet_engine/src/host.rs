//! One VM to be provisioned, plus the per-state handlers that observe the
//! world through the collaborator contracts and feed the transition table.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{sleep, timeout};

use fleet_primitives::{
    HostName, Network, RunList, SimulationMode, Template, TestSpec, ValidationError,
};

use crate::catalog::InfraCatalog;
use crate::collaborators::{
    Bootstrapper, CustomizationOptions, Hypervisor, NicSetting, NodeRegistry, Probe,
    ProgressSink, TcpProbe, Tester,
};
use crate::error::CollaboratorError;
use crate::log::MessageLog;
use crate::machine::{self, Facts, HostState, Step};

/// Hard deadlines and poll intervals for the three waiting states, plus the
/// TCP probe timeout. Tests shrink these to keep the suite fast.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub customize: Duration,
    pub customize_poll: Duration,
    pub connect: Duration,
    pub connect_poll: Duration,
    pub test: Duration,
    pub test_poll: Duration,
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            customize: Duration::from_secs(10 * 60),
            customize_poll: Duration::from_secs(10),
            connect: Duration::from_secs(5 * 60),
            connect_poll: Duration::from_secs(10),
            test: Duration::from_secs(10 * 60),
            test_poll: Duration::from_secs(30),
            probe: Duration::from_secs(5),
        }
    }
}

/// Shared collaborator bundle. The clone gate serializes the
/// clone-and-customize sequence across every host of one hypervisor;
/// concurrent customizations against the same hypervisor are unsafe.
#[derive(Clone)]
pub struct Deps {
    pub hypervisor: Arc<dyn Hypervisor>,
    pub catalog: Arc<InfraCatalog>,
    pub registry: Arc<dyn NodeRegistry>,
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub tester: Arc<dyn Tester>,
    pub prober: Arc<dyn Probe>,
    pub clone_gate: Arc<tokio::sync::Mutex<()>>,
}

impl Deps {
    pub fn new(
        hypervisor: Arc<dyn Hypervisor>,
        registry: Arc<dyn NodeRegistry>,
        bootstrapper: Arc<dyn Bootstrapper>,
        tester: Arc<dyn Tester>,
    ) -> Self {
        let catalog = Arc::new(InfraCatalog::new(hypervisor.clone()));
        Self {
            hypervisor,
            catalog,
            registry,
            bootstrapper,
            tester,
            prober: Arc::new(TcpProbe),
            clone_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_prober(mut self, prober: Arc<dyn Probe>) -> Self {
        self.prober = prober;
        self
    }
}

/// Declarative half of a host, resolved from the composition.
pub struct HostSpec {
    pub name: HostName,
    pub networks: Vec<Arc<Network>>,
    pub template: Arc<Template>,
    pub run_list: RunList,
    pub cpu_count: u32,
    pub memory_gb: u32,
    /// Static addresses, one per network in order; empty means DHCP
    /// everywhere. An empty string skips that NIC.
    pub addresses: Vec<String>,
    pub tests: Vec<TestSpec>,
    pub simulate: SimulationMode,
    pub verbose: bool,
    /// A composition-level problem (e.g. instance/address count mismatch)
    /// that must surface as a prerequisites failure if this host needs
    /// provisioning.
    pub config_defect: Option<String>,
    pub phase: u32,
    pub timeouts: Timeouts,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("fqdn", &self.fqdn)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

pub struct Host {
    name: HostName,
    fqdn: String,
    networks: Vec<Arc<Network>>,
    template: Arc<Template>,
    run_list: RunList,
    cpu_count: u32,
    memory_gb: u32,
    addresses: Vec<String>,
    tests: Vec<TestSpec>,
    simulate: SimulationMode,
    verbose: bool,
    config_defect: Option<String>,
    phase: u32,
    timeouts: Timeouts,
    deps: Deps,
    state: RwLock<HostState>,
    success: RwLock<Option<bool>>,
    log: MessageLog,
}

impl Host {
    pub fn new(spec: HostSpec, deps: Deps) -> Result<Self, ValidationError> {
        if spec.networks.is_empty() {
            return Err(ValidationError::NoNetworks);
        }

        let fqdn = spec.name.fqdn();
        Ok(Self {
            name: spec.name,
            fqdn,
            networks: spec.networks,
            template: spec.template,
            run_list: spec.run_list,
            cpu_count: spec.cpu_count,
            memory_gb: spec.memory_gb,
            addresses: spec.addresses,
            tests: spec.tests,
            simulate: spec.simulate,
            verbose: spec.verbose,
            config_defect: spec.config_defect,
            phase: spec.phase,
            timeouts: spec.timeouts,
            deps,
            state: RwLock::new(HostState::LocateVm),
            success: RwLock::new(None),
            log: MessageLog::new(),
        })
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    pub fn actor(&self) -> &str {
        self.name.actor()
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn state(&self) -> HostState {
        *self.state.read()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Undefined until a terminal state is reached, fixed afterwards.
    pub fn success(&self) -> Option<bool> {
        *self.success.read()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn config_defect(&self) -> Option<&str> {
        self.config_defect.as_deref()
    }

    fn sink(&self) -> ProgressSink {
        ProgressSink::new(&self.log)
    }

    /// Execute the current state's handler and apply the decision.
    pub async fn step(&self) -> Step {
        let state = self.state();
        let facts = match state {
            HostState::LocateVm => self.observe_locate().await,
            HostState::RuntimeState => self.observe_runtime().await,
            HostState::CheckConnectivity => self.observe_probe().await,
            HostState::Verify => self.observe_verify().await,
            HostState::Provision => self.observe_provision().await,
            HostState::Customizing => self.observe_customizing().await,
            HostState::VerifyConnectivity => self.observe_connectivity().await,
            HostState::Bootstrap => self.observe_bootstrap().await,
            HostState::Test => self.observe_test().await,
            terminal => return Step::Advance(terminal),
        };

        let step = machine::next_state(&state, facts);
        if let Step::Advance(next) = step {
            self.advance_to(next);
        }
        step
    }

    fn advance_to(&self, next: HostState) {
        *self.state.write() = next;
        if let Some(ok) = next.terminal_success() {
            let mut success = self.success.write();
            if success.is_none() {
                *success = Some(ok);
            }
        }
        tracing::debug!(host = %self.fqdn, state = %next, "state transition");
    }

    fn log_error(&self, operation: &str, error: &CollaboratorError) {
        self.log.push(format!("{operation} failed: {error}"));
        let mut source = error.source();
        while let Some(cause) = source {
            self.log.push(format!("caused by: {cause}"));
            source = cause.source();
        }
    }

    /// The probe and bootstrap target: the first static address when one is
    /// configured, the fqdn otherwise.
    fn reachable_address(&self) -> &str {
        self.addresses
            .iter()
            .find(|a| !a.is_empty())
            .map(String::as_str)
            .unwrap_or(&self.fqdn)
    }

    // --- state handlers -------------------------------------------------

    async fn observe_locate(&self) -> Facts {
        match self.deps.hypervisor.vm_exists(&self.fqdn).await {
            Ok(true) => {
                self.log.push("VM found");
                Facts::Located { found: true }
            }
            Ok(false) => {
                self.log.push("VM not found");
                Facts::Located { found: false }
            }
            Err(e) => {
                self.log_error("looking up VM", &e);
                Facts::Located { found: false }
            }
        }
    }

    async fn observe_runtime(&self) -> Facts {
        if self.simulate.forces_predicates() {
            self.log.push("assuming VM is powered on with an address");
            return Facts::Runtime {
                powered_on: true,
                has_ip: true,
            };
        }

        match self.deps.hypervisor.find_vm(&self.fqdn).await {
            Ok(Some(vm)) => {
                if !vm.powered_on {
                    self.log.push("VM is powered off");
                } else if vm.ip_address.is_none() {
                    self.log.push("VM has no IP address");
                } else {
                    self.log.push(format!(
                        "VM is powered on with address {}",
                        vm.ip_address.as_deref().unwrap_or("?")
                    ));
                }
                Facts::Runtime {
                    powered_on: vm.powered_on,
                    has_ip: vm.ip_address.is_some(),
                }
            }
            Ok(None) => {
                self.log.push("VM disappeared while checking runtime state");
                Facts::Runtime {
                    powered_on: false,
                    has_ip: false,
                }
            }
            Err(e) => {
                self.log_error("checking VM runtime state", &e);
                Facts::Runtime {
                    powered_on: false,
                    has_ip: false,
                }
            }
        }
    }

    async fn observe_probe(&self) -> Facts {
        if self.simulate.forces_predicates() {
            self.log.push("assuming host answers the connectivity probe");
            return Facts::Probed { reachable: true };
        }

        let reachable = self.probe().await;
        if reachable {
            self.log.push("VM responds to network probe");
        }
        Facts::Probed { reachable }
    }

    async fn observe_verify(&self) -> Facts {
        let result = self.run_acceptance_tests().await;
        match result {
            Some(true) => self.log.push("acceptance test passed"),
            Some(false) => self.log.push("acceptance test failed"),
            None => self.log.push("no acceptance test provided"),
        }
        Facts::Accepted { result }
    }

    async fn observe_provision(&self) -> Facts {
        let calculate_only = self.simulate.is_calculate_only();

        if let Some(defect) = &self.config_defect {
            self.log.push(format!("composition problem: {defect}"));
            return Facts::ProvisionReady {
                prerequisites_met: false,
                deregistered: true,
                calculate_only,
                clone_started: false,
            };
        }

        if !self.prerequisites_met().await {
            self.log.push("missing required template or network");
            return Facts::ProvisionReady {
                prerequisites_met: false,
                deregistered: true,
                calculate_only,
                clone_started: false,
            };
        }

        let deregistered = if self.simulate.suppresses_mutation() {
            true
        } else {
            self.deregister_stale_client().await
        };
        if !deregistered {
            self.log
                .push("failed to remove stale client from the node registry");
            return Facts::ProvisionReady {
                prerequisites_met: true,
                deregistered: false,
                calculate_only,
                clone_started: false,
            };
        }

        if calculate_only {
            self.log.push("needs to be provisioned");
            return Facts::ProvisionReady {
                prerequisites_met: true,
                deregistered: true,
                calculate_only: true,
                clone_started: false,
            };
        }

        let clone_started = if self.simulate.is_dry_run() {
            self.log.push("dry run: skipping clone");
            true
        } else {
            self.start_clone().await
        };

        Facts::ProvisionReady {
            prerequisites_met: true,
            deregistered: true,
            calculate_only: false,
            clone_started,
        }
    }

    async fn observe_customizing(&self) -> Facts {
        self.log.push("waiting for VM customization to complete");

        let ready = if self.simulate.forces_predicates() {
            true
        } else {
            timeout(self.timeouts.customize, async {
                loop {
                    match self.deps.hypervisor.find_vm(&self.fqdn).await {
                        Ok(Some(vm)) if vm.ready() => break,
                        Ok(_) => {}
                        Err(e) => self.log_error("polling VM customization", &e),
                    }
                    sleep(self.timeouts.customize_poll).await;
                }
            })
            .await
            .is_ok()
        };

        if ready {
            self.log.push("VM customization complete");
        } else {
            self.log.push("VM customization timed out");
        }
        Facts::Customized { ready }
    }

    async fn observe_connectivity(&self) -> Facts {
        let ready = if self.simulate.forces_predicates() {
            true
        } else {
            timeout(self.timeouts.connect, async {
                while !self.probe().await {
                    sleep(self.timeouts.connect_poll).await;
                }
            })
            .await
            .is_ok()
        };

        if ready {
            self.log.push("VM responds to network probe");
        } else {
            self.log.push("VM does not respond to network probe");
        }
        Facts::Connected { ready }
    }

    async fn observe_bootstrap(&self) -> Facts {
        if self.simulate.is_calculate_only() {
            self.log.push("requires bootstrapping");
            return Facts::Bootstrapped {
                calculate_only: true,
                succeeded: false,
            };
        }

        if self.simulate.is_dry_run() {
            self.log.push("dry run: skipping bootstrap");
            return Facts::Bootstrapped {
                calculate_only: false,
                succeeded: true,
            };
        }

        let target = self.reachable_address().to_string();
        self.log.push(format!(
            "bootstrapping {} as {}",
            target, self.template.ssh_user
        ));

        let succeeded = match self
            .deps
            .bootstrapper
            .run(
                &target,
                &self.template.ssh_user,
                &self.template.ssh_key,
                &self.run_list,
                self.template.os.needs_sudo(),
                self.sink(),
            )
            .await
        {
            Ok(0) => {
                self.log.push("bootstrap complete");
                self.update_run_list().await;
                true
            }
            Ok(code) => {
                self.log.push(format!("bootstrap exited with code {code}"));
                false
            }
            Err(e) => {
                self.log_error("bootstrapping", &e);
                false
            }
        };

        Facts::Bootstrapped {
            calculate_only: false,
            succeeded,
        }
    }

    async fn observe_test(&self) -> Facts {
        if self.tests.is_empty() {
            self.log.push("no acceptance test provided");
            return Facts::Tested { passed: true };
        }

        let passed = timeout(self.timeouts.test, async {
            loop {
                match self.run_acceptance_tests().await {
                    None | Some(true) => break,
                    Some(false) => sleep(self.timeouts.test_poll).await,
                }
            }
        })
        .await
        .is_ok();

        if passed {
            self.log.push("acceptance test passed");
        } else {
            self.log.push("acceptance test failed");
        }
        Facts::Tested { passed }
    }

    // --- collaborator plumbing -----------------------------------------

    async fn probe(&self) -> bool {
        let port = self.template.os.probe_port();
        let target = format!("{}:{}", self.reachable_address(), port);

        if self.verbose {
            self.log.push(format!("probing {target}"));
        }

        let reachable = self
            .deps
            .prober
            .reachable(self.reachable_address(), port, self.timeouts.probe)
            .await;
        if !reachable {
            self.log.push("host is not responding to the probe");
        }
        reachable
    }

    async fn prerequisites_met(&self) -> bool {
        let mut met = true;

        match self.deps.catalog.template_exists(&self.template.name).await {
            Ok(true) => {}
            Ok(false) => {
                self.log
                    .push(format!("template {} not found", self.template.name));
                met = false;
            }
            Err(e) => {
                self.log_error("checking template", &e);
                met = false;
            }
        }

        for network in &self.networks {
            match self.deps.catalog.network_exists(&network.name).await {
                Ok(true) => {}
                Ok(false) => {
                    self.log.push(format!("network {} not found", network.name));
                    met = false;
                }
                Err(e) => {
                    self.log_error("checking network", &e);
                    met = false;
                }
            }
        }

        met
    }

    async fn deregister_stale_client(&self) -> bool {
        match self.deps.registry.client_exists(&self.fqdn).await {
            Ok(false) => true,
            Ok(true) => match self.deps.registry.delete_client(&self.fqdn).await {
                Ok(deleted) => {
                    if deleted {
                        self.log.push("removed stale client from the node registry");
                    }
                    deleted
                }
                Err(e) => {
                    self.log_error("deleting stale client", &e);
                    false
                }
            },
            Err(e) => {
                self.log_error("checking for stale client", &e);
                false
            }
        }
    }

    async fn start_clone(&self) -> bool {
        let options = match self.customization_options() {
            Ok(options) => options,
            Err(e) => {
                self.log.push(format!("cannot assemble customization: {e}"));
                return false;
            }
        };

        // Serialize clone-and-customize across every host of this
        // hypervisor; held across the whole call.
        let _gate = self.deps.clone_gate.lock().await;

        self.log
            .push(format!("cloning from template {}", self.template.name));
        match self
            .deps
            .hypervisor
            .clone_vm(&self.template, &self.fqdn, &options, self.sink())
            .await
        {
            Ok(true) => {
                self.log.push("finished creating virtual machine");
                true
            }
            Ok(false) => {
                self.log.push("VM provisioning failed");
                false
            }
            Err(e) => {
                self.log_error("cloning virtual machine", &e);
                false
            }
        }
    }

    fn customization_options(&self) -> Result<CustomizationOptions, ValidationError> {
        let primary = &self.networks[0];

        let mut nics = Vec::with_capacity(self.networks.len());
        for (i, network) in self.networks.iter().enumerate() {
            let mut nic = NicSetting::default();
            if let Some(address) = self.addresses.get(i).filter(|a| !a.is_empty()) {
                nic.ip = Some(format!("{}/{}", address, network.prefix_len()?));
                if i == 0 {
                    nic.gateway = Some(network.gateway.clone());
                }
            }
            nics.push(nic);
        }

        let static_addressing = self.addresses.iter().any(|a| !a.is_empty());
        Ok(CustomizationOptions {
            hostname: self.name.vm_name(),
            domain: primary.domain.clone(),
            vlan: primary.name.clone(),
            cpu_count: self.cpu_count,
            memory_gb: self.memory_gb,
            resource_pool: self.name.actor().to_string(),
            nics,
            dns_servers: static_addressing.then(|| primary.dns.clone()),
            dns_suffixes: if static_addressing {
                self.networks
                    .iter()
                    .map(|n| n.domain.clone())
                    .filter(|d| !d.is_empty())
                    .collect()
            } else {
                Vec::new()
            },
        })
    }

    async fn update_run_list(&self) {
        match self.deps.registry.node_exists(&self.fqdn).await {
            Ok(true) => {
                self.log.push(format!(
                    "updating node run list: {}",
                    self.run_list.as_argument()
                ));
                match self
                    .deps
                    .registry
                    .set_run_list(&self.fqdn, &self.run_list)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => self.log.push("node registry refused the run list update"),
                    Err(e) => self.log_error("updating node run list", &e),
                }
            }
            Ok(false) => self
                .log
                .push("node not registered yet, skipping run list update"),
            Err(e) => self.log_error("looking up node", &e),
        }
    }

    /// Run every configured acceptance test; all must pass. `None` when no
    /// spec selects a runnable test.
    async fn run_acceptance_tests(&self) -> Option<bool> {
        if self.tests.is_empty() {
            return None;
        }

        let mut executed = false;
        let mut all_passed = true;
        for spec in &self.tests {
            match self
                .deps
                .tester
                .execute(spec, self.simulate.is_dry_run(), &self.fqdn, self.sink())
                .await
            {
                Ok(None) => {}
                Ok(Some(passed)) => {
                    executed = true;
                    self.log
                        .push(format!("test {} returned {}", spec.tester, passed));
                    if !passed {
                        all_passed = false;
                    }
                }
                Err(e) => {
                    executed = true;
                    all_passed = false;
                    self.log_error("running acceptance test", &e);
                }
            }
        }

        executed.then_some(all_passed)
    }
}
