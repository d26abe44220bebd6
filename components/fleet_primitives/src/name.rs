use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Identity of one host: actor name plus 1-based instance index, qualified
/// by the domain of its primary network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostName {
    actor: String,
    instance: u32,
    domain: String,
}

impl HostName {
    pub fn new(
        actor: impl Into<String>,
        instance: u32,
        domain: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let actor = actor.into();
        if actor.is_empty() {
            return Err(ValidationError::EmptyActorName);
        }
        if instance == 0 {
            return Err(ValidationError::ZeroInstance);
        }

        Ok(Self {
            actor,
            instance,
            domain: domain.into(),
        })
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Unqualified machine name, e.g. "web1".
    pub fn vm_name(&self) -> String {
        format!("{}{}", self.actor, self.instance)
    }

    pub fn fqdn(&self) -> String {
        if self.domain.is_empty() {
            self.vm_name()
        } else {
            format!("{}.{}", self.vm_name(), self.domain)
        }
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqdn())
    }
}
