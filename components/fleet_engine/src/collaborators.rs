//! Capability contracts the engine consumes. Implementations live outside
//! the core (real adapters in the base, programmable stubs in tests).

use std::time::Duration;

use async_trait::async_trait;

use fleet_primitives::{RunList, Template, TestSpec};

use crate::error::Result;
use crate::log::MessageLog;

/// Point-in-time observation of a VM, not a live proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct VmHandle {
    pub powered_on: bool,
    pub ip_address: Option<String>,
}

impl VmHandle {
    pub fn ready(&self) -> bool {
        self.powered_on && self.ip_address.is_some()
    }
}

/// Cheap clonable handle long-running collaborator calls use to stream
/// progress lines into the owning host's message log.
#[derive(Clone)]
pub struct ProgressSink {
    log: MessageLog,
}

impl ProgressSink {
    pub fn new(log: &MessageLog) -> Self {
        Self { log: log.clone() }
    }

    pub fn send(&self, line: impl Into<String>) {
        self.log.push(line);
    }
}

/// NIC customization for one assigned network. `ip` is "address/prefix";
/// absent means DHCP. Only the first NIC carries a gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NicSetting {
    pub ip: Option<String>,
    pub gateway: Option<String>,
}

/// Everything the hypervisor needs to clone and customize one guest.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomizationOptions {
    pub hostname: String,
    pub domain: String,
    pub vlan: String,
    pub cpu_count: u32,
    pub memory_gb: u32,
    pub resource_pool: String,
    pub nics: Vec<NicSetting>,
    /// DNS servers of the primary network; only set with static addressing.
    pub dns_servers: Option<String>,
    /// Non-empty domains of all assigned networks; only with static
    /// addressing.
    pub dns_suffixes: Vec<String>,
}

#[async_trait]
pub trait Hypervisor: Send + Sync {
    async fn find_vm(&self, fqdn: &str) -> Result<Option<VmHandle>>;

    async fn vm_exists(&self, fqdn: &str) -> Result<bool> {
        Ok(self.find_vm(fqdn).await?.is_some())
    }

    async fn network_exists(&self, name: &str) -> Result<bool>;

    async fn template_exists(&self, name: &str) -> Result<bool>;

    /// Clone `template` into a new guest named `target` and apply the
    /// customization. Returns true once the clone task completed. Progress
    /// is streamed through `progress`.
    async fn clone_vm(
        &self,
        template: &Template,
        target: &str,
        options: &CustomizationOptions,
        progress: ProgressSink,
    ) -> Result<bool>;
}

#[async_trait]
pub trait NodeRegistry: Send + Sync {
    async fn node_exists(&self, fqdn: &str) -> Result<bool>;

    async fn client_exists(&self, fqdn: &str) -> Result<bool>;

    /// Remove a stale client identity. Returns true when the client is gone
    /// afterwards.
    async fn delete_client(&self, fqdn: &str) -> Result<bool>;

    async fn set_run_list(&self, fqdn: &str, run_list: &RunList) -> Result<bool>;
}

#[async_trait]
pub trait Bootstrapper: Send + Sync {
    /// Run the bootstrap sequence over SSH. Success iff the returned exit
    /// code is 0.
    async fn run(
        &self,
        target: &str,
        ssh_user: &str,
        ssh_key: &str,
        run_list: &RunList,
        use_sudo: bool,
        progress: ProgressSink,
    ) -> Result<i32>;
}

/// Connectivity probe against a host's remote-session port.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn reachable(&self, host: &str, port: u16, deadline: Duration) -> bool;
}

/// Default probe: a plain TCP connect. A refused connection still proves
/// the host is up, so only timeouts and resolution failures count as down.
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn reachable(&self, host: &str, port: u16, deadline: Duration) -> bool {
        let target = format!("{host}:{port}");
        match tokio::time::timeout(deadline, tokio::net::TcpStream::connect(&target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            Err(_) => false,
        }
    }
}

#[async_trait]
pub trait Tester: Send + Sync {
    /// Execute one acceptance test. `Ok(None)` means the spec selects no
    /// runnable test and is treated as a pass.
    async fn execute(
        &self,
        spec: &TestSpec,
        dry_run: bool,
        node_fqdn: &str,
        progress: ProgressSink,
    ) -> Result<Option<bool>>;
}
