//! Renderable view of a phase. The engine only builds the snapshot; turning
//! it into human output is the renderer's business.

use std::sync::Arc;

use crate::host::Host;
use crate::log::LogEntry;
use crate::machine::HostState;

#[derive(Debug, Clone, PartialEq)]
pub struct HostStatus {
    pub fqdn: String,
    pub state: HostState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorStatus {
    pub actor: String,
    pub hosts: Vec<HostStatus>,
}

/// Last known state of every host in one phase, grouped by actor in
/// composition order.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub phase: u32,
    actors: Vec<ActorStatus>,
}

impl StatusSnapshot {
    pub fn new(phase: u32, hosts: &[Arc<Host>]) -> Self {
        let mut actors: Vec<ActorStatus> = Vec::new();
        for host in hosts {
            let status = HostStatus {
                fqdn: host.fqdn().to_string(),
                state: host.state(),
            };
            match actors.iter_mut().find(|a| a.actor == host.actor()) {
                Some(actor) => actor.hosts.push(status),
                None => actors.push(ActorStatus {
                    actor: host.actor().to_string(),
                    hosts: vec![status],
                }),
            }
        }
        Self { phase, actors }
    }

    pub fn actors(&self) -> &[ActorStatus] {
        &self.actors
    }

    /// Record a host's state; true when this changed the snapshot.
    pub fn update(&mut self, fqdn: &str, state: HostState) -> bool {
        for actor in &mut self.actors {
            if let Some(host) = actor.hosts.iter_mut().find(|h| h.fqdn == fqdn) {
                if host.state != state {
                    host.state = state;
                    return true;
                }
                return false;
            }
        }
        false
    }

    pub fn all_terminal(&self) -> bool {
        self.actors
            .iter()
            .flat_map(|a| &a.hosts)
            .all(|h| h.state.is_terminal())
    }
}

/// External collaborator that turns progress into human output.
pub trait StatusRenderer: Send + Sync {
    /// One drained message log entry, rendered immediately.
    fn host_line(&self, fqdn: &str, entry: &LogEntry);

    /// The full phase snapshot, rendered whenever it changed.
    fn snapshot(&self, snapshot: &StatusSnapshot);
}

impl<T: StatusRenderer> StatusRenderer for Arc<T> {
    fn host_line(&self, fqdn: &str, entry: &LogEntry) {
        (**self).host_line(fqdn, entry);
    }

    fn snapshot(&self, snapshot: &StatusSnapshot) {
        (**self).snapshot(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::stub::{host_spec, quick_timeouts, StubFleet};

    fn snapshot_for(counts: &[(&str, u32)]) -> StatusSnapshot {
        let fleet = StubFleet::new();
        let mut hosts = Vec::new();
        for (actor, count) in counts {
            for instance in 1..=*count {
                let spec = host_spec(actor, instance, quick_timeouts());
                hosts.push(Arc::new(Host::new(spec, fleet.deps()).unwrap()));
            }
        }
        StatusSnapshot::new(0, &hosts)
    }

    #[test]
    fn hosts_are_grouped_by_actor_in_order() {
        let snapshot = snapshot_for(&[("web", 2), ("db", 1)]);

        let actors: Vec<_> = snapshot.actors().iter().map(|a| a.actor.as_str()).collect();
        assert_eq!(actors, ["web", "db"]);
        assert_eq!(snapshot.actors()[0].hosts.len(), 2);
        assert_eq!(snapshot.actors()[0].hosts[0].fqdn, "web1.example.org");
    }

    #[test]
    fn update_reports_changes_only() {
        let mut snapshot = snapshot_for(&[("web", 1)]);

        assert!(!snapshot.update("web1.example.org", HostState::LocateVm));
        assert!(snapshot.update("web1.example.org", HostState::Provision));
        assert!(!snapshot.update("web1.example.org", HostState::Provision));
        assert!(!snapshot.update("unknown.example.org", HostState::Verified));
    }

    #[test]
    fn all_terminal_needs_every_host_settled() {
        let mut snapshot = snapshot_for(&[("web", 2)]);
        assert!(!snapshot.all_terminal());

        snapshot.update("web1.example.org", HostState::Verified);
        assert!(!snapshot.all_terminal());

        snapshot.update("web2.example.org", HostState::Prerequisites);
        assert!(snapshot.all_terminal());
    }
}
