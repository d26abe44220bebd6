//! Programmable fake collaborators for the engine's tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use fleet_primitives::{
    GuestOs, HostName, Network, RunList, SimulationMode, Template, TestSpec,
};

use crate::collaborators::{
    Bootstrapper, CustomizationOptions, Hypervisor, NodeRegistry, Probe, ProgressSink, Tester,
    VmHandle,
};
use crate::error::{CollaboratorError, Result};
use crate::host::{Deps, Host, HostSpec, Timeouts};
use crate::log::LogEntry;
use crate::status::{StatusRenderer, StatusSnapshot};

async fn simulated_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

#[derive(Default)]
pub struct StubHypervisor {
    vms: Mutex<HashMap<String, VmHandle>>,
    networks: Mutex<HashSet<String>>,
    templates: Mutex<HashSet<String>>,
    vm_appears_after_clone: AtomicBool,
    clone_fails: AtomicBool,
    fail_existence: AtomicBool,
    latency: Mutex<Duration>,
    find_count: AtomicUsize,
    network_count: AtomicUsize,
    template_count: AtomicUsize,
    clone_count: AtomicUsize,
}

impl StubHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(self, name: &str) -> Self {
        self.networks.lock().insert(name.to_string());
        self
    }

    pub fn with_template(self, name: &str) -> Self {
        self.templates.lock().insert(name.to_string());
        self
    }

    pub fn with_existing_vm(self, fqdn: &str, powered_on: bool, ip: Option<&str>) -> Self {
        self.vms.lock().insert(
            fqdn.to_string(),
            VmHandle {
                powered_on,
                ip_address: ip.map(str::to_string),
            },
        );
        self
    }

    /// After a clone the target VM shows up powered on with an address.
    pub fn vm_appears_after_clone(self) -> Self {
        self.vm_appears_after_clone.store(true, Ordering::Relaxed);
        self
    }

    pub fn failing_clone(self) -> Self {
        self.clone_fails.store(true, Ordering::Relaxed);
        self
    }

    pub fn failing_existence_checks(self) -> Self {
        self.fail_existence.store(true, Ordering::Relaxed);
        self
    }

    fn latency(&self) -> Duration {
        *self.latency.lock()
    }

    pub fn network_checks(&self) -> usize {
        self.network_count.load(Ordering::Relaxed)
    }

    pub fn template_checks(&self) -> usize {
        self.template_count.load(Ordering::Relaxed)
    }

    pub fn clone_calls(&self) -> usize {
        self.clone_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Hypervisor for StubHypervisor {
    async fn find_vm(&self, fqdn: &str) -> Result<Option<VmHandle>> {
        simulated_latency(self.latency()).await;
        self.find_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.vms.lock().get(fqdn).cloned())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        simulated_latency(self.latency()).await;
        self.network_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_existence.load(Ordering::Relaxed) {
            return Err(CollaboratorError::failed(
                "network lookup",
                "hypervisor unreachable",
            ));
        }
        Ok(self.networks.lock().contains(name))
    }

    async fn template_exists(&self, name: &str) -> Result<bool> {
        simulated_latency(self.latency()).await;
        self.template_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_existence.load(Ordering::Relaxed) {
            return Err(CollaboratorError::failed(
                "template lookup",
                "hypervisor unreachable",
            ));
        }
        Ok(self.templates.lock().contains(name))
    }

    async fn clone_vm(
        &self,
        _template: &Template,
        target: &str,
        _options: &CustomizationOptions,
        progress: ProgressSink,
    ) -> Result<bool> {
        simulated_latency(self.latency()).await;
        self.clone_count.fetch_add(1, Ordering::Relaxed);
        progress.send("starting cloning process");

        if self.clone_fails.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if self.vm_appears_after_clone.load(Ordering::Relaxed) {
            self.vms.lock().insert(
                target.to_string(),
                VmHandle {
                    powered_on: true,
                    ip_address: Some("10.0.0.5".to_string()),
                },
            );
        }
        progress.send("100% complete");
        Ok(true)
    }
}

#[derive(Default)]
pub struct StubRegistry {
    clients: Mutex<HashSet<String>>,
    nodes: Mutex<HashSet<String>>,
    delete_fails: AtomicBool,
    delete_count: AtomicUsize,
    run_list_count: AtomicUsize,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(self, fqdn: &str) -> Self {
        self.clients.lock().insert(fqdn.to_string());
        self
    }

    pub fn with_node(self, fqdn: &str) -> Self {
        self.nodes.lock().insert(fqdn.to_string());
        self
    }

    pub fn failing_delete(self) -> Self {
        self.delete_fails.store(true, Ordering::Relaxed);
        self
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_count.load(Ordering::Relaxed)
    }

    pub fn run_list_updates(&self) -> usize {
        self.run_list_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NodeRegistry for StubRegistry {
    async fn node_exists(&self, fqdn: &str) -> Result<bool> {
        Ok(self.nodes.lock().contains(fqdn))
    }

    async fn client_exists(&self, fqdn: &str) -> Result<bool> {
        Ok(self.clients.lock().contains(fqdn))
    }

    async fn delete_client(&self, fqdn: &str) -> Result<bool> {
        self.delete_count.fetch_add(1, Ordering::Relaxed);
        if self.delete_fails.load(Ordering::Relaxed) {
            return Ok(false);
        }
        self.clients.lock().remove(fqdn);
        Ok(true)
    }

    async fn set_run_list(&self, _fqdn: &str, _run_list: &RunList) -> Result<bool> {
        self.run_list_count.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

#[derive(Default)]
pub struct StubBootstrapper {
    exit_code: Mutex<i32>,
    latency: Mutex<Duration>,
    count: AtomicUsize,
}

impl StubBootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit_code(self, code: i32) -> Self {
        *self.exit_code.lock() = code;
        self
    }

    pub fn calls(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Bootstrapper for StubBootstrapper {
    async fn run(
        &self,
        target: &str,
        _ssh_user: &str,
        _ssh_key: &str,
        _run_list: &RunList,
        _use_sudo: bool,
        progress: ProgressSink,
    ) -> Result<i32> {
        let latency = *self.latency.lock();
        simulated_latency(latency).await;
        self.count.fetch_add(1, Ordering::Relaxed);
        progress.send(format!("bootstrap output for {target}"));
        Ok(*self.exit_code.lock())
    }
}

/// Scripted tester: results are popped per call; once the script is empty
/// the default result is returned. Default: no test configured.
#[derive(Default)]
pub struct StubTester {
    script: Mutex<VecDeque<Option<bool>>>,
    default_result: Mutex<Option<bool>>,
    count: AtomicUsize,
}

impl StubTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always(self, result: Option<bool>) -> Self {
        *self.default_result.lock() = result;
        self
    }

    pub fn scripted(self, results: Vec<Option<bool>>) -> Self {
        *self.script.lock() = results.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Tester for StubTester {
    async fn execute(
        &self,
        _spec: &TestSpec,
        _dry_run: bool,
        _node_fqdn: &str,
        _progress: ProgressSink,
    ) -> Result<Option<bool>> {
        self.count.fetch_add(1, Ordering::Relaxed);
        let scripted = self.script.lock().pop_front();
        Ok(scripted.unwrap_or(*self.default_result.lock()))
    }
}

#[derive(Default)]
pub struct StubProbe {
    reachable: AtomicBool,
    count: AtomicUsize,
}

impl StubProbe {
    pub fn up() -> Self {
        let probe = Self::default();
        probe.reachable.store(true, Ordering::Relaxed);
        probe
    }

    pub fn down() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Probe for StubProbe {
    async fn reachable(&self, _host: &str, _port: u16, _deadline: Duration) -> bool {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.reachable.load(Ordering::Relaxed)
    }
}

/// The whole collaborator set, pre-wired into a `Deps` bundle.
pub struct StubFleet {
    pub hypervisor: Arc<StubHypervisor>,
    pub registry: Arc<StubRegistry>,
    pub bootstrapper: Arc<StubBootstrapper>,
    pub tester: Arc<StubTester>,
    pub prober: Arc<StubProbe>,
    deps: Deps,
}

impl StubFleet {
    pub fn new() -> Self {
        Self::with_parts(
            StubHypervisor::new(),
            StubRegistry::new(),
            StubBootstrapper::new(),
            StubTester::new(),
            StubProbe::up(),
        )
    }

    pub fn with_parts(
        hypervisor: StubHypervisor,
        registry: StubRegistry,
        bootstrapper: StubBootstrapper,
        tester: StubTester,
        prober: StubProbe,
    ) -> Self {
        let hypervisor = Arc::new(hypervisor);
        let registry = Arc::new(registry);
        let bootstrapper = Arc::new(bootstrapper);
        let tester = Arc::new(tester);
        let prober = Arc::new(prober);
        let deps = Deps::new(
            hypervisor.clone(),
            registry.clone(),
            bootstrapper.clone(),
            tester.clone(),
        )
        .with_prober(prober.clone());

        Self {
            hypervisor,
            registry,
            bootstrapper,
            tester,
            prober,
            deps,
        }
    }

    pub fn with_network(self, name: &str) -> Self {
        self.hypervisor.networks.lock().insert(name.to_string());
        self
    }

    pub fn with_template(self, name: &str) -> Self {
        self.hypervisor.templates.lock().insert(name.to_string());
        self
    }

    pub fn vm_appears_after_clone(self) -> Self {
        self.hypervisor
            .vm_appears_after_clone
            .store(true, Ordering::Relaxed);
        self
    }

    pub fn with_collaborator_latency(self, latency: Duration) -> Self {
        *self.hypervisor.latency.lock() = latency;
        *self.bootstrapper.latency.lock() = latency;
        self
    }

    pub fn deps(&self) -> Deps {
        self.deps.clone()
    }
}

pub fn quick_timeouts() -> Timeouts {
    Timeouts {
        customize: Duration::from_millis(200),
        customize_poll: Duration::from_millis(20),
        connect: Duration::from_millis(200),
        connect_poll: Duration::from_millis(20),
        test: Duration::from_millis(200),
        test_poll: Duration::from_millis(20),
        probe: Duration::from_millis(50),
    }
}

pub fn test_network() -> Arc<Network> {
    Arc::new(Network {
        name: "prod-net".to_string(),
        dns: "10.0.0.2".to_string(),
        subnet: "10.0.0.0/24".to_string(),
        gateway: "10.0.0.1".to_string(),
        domain: "example.org".to_string(),
    })
}

pub fn test_template() -> Arc<Template> {
    Arc::new(Template {
        name: "base".to_string(),
        os: GuestOs::Linux,
        ssh_user: "root".to_string(),
        ssh_key: "id_rsa".to_string(),
    })
}

pub fn host_spec(actor: &str, instance: u32, timeouts: Timeouts) -> HostSpec {
    HostSpec {
        name: HostName::new(actor, instance, "example.org").unwrap(),
        networks: vec![test_network()],
        template: test_template(),
        run_list: RunList::new(vec!["role[base]".to_string()]),
        cpu_count: 2,
        memory_gb: 4,
        addresses: Vec::new(),
        tests: Vec::new(),
        simulate: SimulationMode::None,
        verbose: false,
        config_defect: None,
        phase: 0,
        timeouts,
    }
}

pub fn host_for_tests(actor: &str, instance: u32, fleet: &StubFleet, timeouts: Timeouts) -> Host {
    Host::new(host_spec(actor, instance, timeouts), fleet.deps()).unwrap()
}

/// Renderer that collects everything it is asked to show.
#[derive(Default)]
pub struct CollectingRenderer {
    pub lines: Mutex<Vec<(String, LogEntry)>>,
    pub snapshots: Mutex<Vec<StatusSnapshot>>,
}

impl CollectingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_count(&self) -> usize {
        self.lines.lock().len()
    }
}

impl StatusRenderer for CollectingRenderer {
    fn host_line(&self, fqdn: &str, entry: &LogEntry) {
        self.lines.lock().push((fqdn.to_string(), entry.clone()));
    }

    fn snapshot(&self, snapshot: &StatusSnapshot) {
        self.snapshots.lock().push(snapshot.clone());
    }
}
