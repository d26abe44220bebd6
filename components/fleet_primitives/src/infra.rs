use serde::{Deserialize, Serialize};

use crate::{GuestOs, ValidationError};

/// A named VLAN with its addressing facts. Existence against the hypervisor
/// is checked elsewhere; this is the declarative half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub dns: String,
    pub subnet: String,
    pub gateway: String,
    pub domain: String,
}

impl Network {
    /// Prefix length of the subnet, e.g. 24 for "10.0.0.0/24". Static guest
    /// addresses are handed to the hypervisor as "address/prefix".
    pub fn prefix_len(&self) -> Result<u8, ValidationError> {
        self.subnet
            .split_once('/')
            .and_then(|(_, prefix)| prefix.parse().ok())
            .filter(|p| *p <= 32)
            .ok_or_else(|| ValidationError::BadSubnet(self.subnet.clone()))
    }
}

/// A source VM image plus the credentials needed to reach clones of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub os: GuestOs,
    pub ssh_user: String,
    pub ssh_key: String,
}
