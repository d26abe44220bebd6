//! The composition document: which networks, templates, and actors make up
//! an environment, and how to resolve them into engine hosts.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use fleet_engine::{Deps, Host, HostSpec, Timeouts};
use fleet_primitives::{
    GuestOs, HostName, Network, RunList, SimulationMode, Template, TestSpec,
};

use crate::adapters::Toolchain;
use crate::error::{CompositionError, Result};

#[derive(Debug, Deserialize)]
pub struct Document {
    pub toolchain: Toolchain,
    pub networks: BTreeMap<String, NetworkDef>,
    pub templates: BTreeMap<String, TemplateDef>,
    pub actors: BTreeMap<String, ActorDef>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkDef {
    pub vlan: String,
    pub dns: String,
    pub subnet: String,
    pub gateway: String,
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub struct TemplateDef {
    pub name: String,
    pub os: String,
    pub user: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ActorDef {
    pub instances: u32,
    /// One static address per instance, applied to the primary NIC. Empty
    /// means DHCP everywhere.
    #[serde(default)]
    pub addresses: Vec<String>,
    pub networks: Vec<String>,
    pub template: String,
    #[serde(default)]
    pub run_list: Vec<String>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub phase: u32,
    pub cpus: u32,
    pub memory_gb: u32,
}

pub fn load(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|source| CompositionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CompositionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct ResolveSettings {
    pub simulate: SimulationMode,
    pub verbose: bool,
    pub timeouts: Timeouts,
}

/// Expand every actor into its hosts, wired to the shared collaborators.
/// An instance/address count mismatch does not abort the load: it marks the
/// actor's hosts so they fail prerequisites if they need provisioning.
pub fn resolve(doc: &Document, deps: &Deps, settings: &ResolveSettings) -> Result<Vec<Arc<Host>>> {
    let networks: BTreeMap<&str, Arc<Network>> = doc
        .networks
        .iter()
        .map(|(key, def)| {
            (
                key.as_str(),
                Arc::new(Network {
                    name: def.vlan.clone(),
                    dns: def.dns.clone(),
                    subnet: def.subnet.clone(),
                    gateway: def.gateway.clone(),
                    domain: def.domain.clone(),
                }),
            )
        })
        .collect();

    let mut templates: BTreeMap<&str, Arc<Template>> = BTreeMap::new();
    for (key, def) in &doc.templates {
        templates.insert(
            key.as_str(),
            Arc::new(Template {
                name: def.name.clone(),
                os: GuestOs::parse(&def.os)?,
                ssh_user: def.user.clone(),
                ssh_key: def.key.clone(),
            }),
        );
    }

    let mut hosts = Vec::new();
    for (actor_name, actor) in &doc.actors {
        let actor_networks: Vec<Arc<Network>> = actor
            .networks
            .iter()
            .map(|key| {
                networks
                    .get(key.as_str())
                    .cloned()
                    .ok_or_else(|| CompositionError::UnknownNetwork {
                        actor: actor_name.clone(),
                        network: key.clone(),
                    })
            })
            .collect::<Result<_>>()?;
        if actor_networks.is_empty() {
            return Err(CompositionError::NoNetworks {
                actor: actor_name.clone(),
            });
        }

        let template = templates
            .get(actor.template.as_str())
            .cloned()
            .ok_or_else(|| CompositionError::UnknownTemplate {
                actor: actor_name.clone(),
                template: actor.template.clone(),
            })?;

        let config_defect = (!actor.addresses.is_empty()
            && actor.addresses.len() != actor.instances as usize)
            .then(|| {
                format!(
                    "actor {} declares {} instances but {} addresses",
                    actor_name,
                    actor.instances,
                    actor.addresses.len()
                )
            });

        let domain = actor_networks[0].domain.clone();
        for instance in 1..=actor.instances {
            let addresses = actor
                .addresses
                .get(instance as usize - 1)
                .filter(|a| !a.is_empty())
                .map(|a| vec![a.clone()])
                .unwrap_or_default();

            let spec = HostSpec {
                name: HostName::new(actor_name.clone(), instance, domain.clone())?,
                networks: actor_networks.clone(),
                template: template.clone(),
                run_list: RunList::new(actor.run_list.clone()),
                cpu_count: actor.cpus,
                memory_gb: actor.memory_gb,
                addresses,
                tests: actor.tests.clone(),
                simulate: settings.simulate,
                verbose: settings.verbose,
                config_defect: config_defect.clone(),
                phase: actor.phase,
                timeouts: settings.timeouts.clone(),
            };
            hosts.push(Arc::new(Host::new(spec, deps.clone())?));
        }
    }

    Ok(hosts)
}
