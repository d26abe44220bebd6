use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Guest OS family of a template. Drives the connectivity probe port and
/// whether bootstrap commands run under sudo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestOs {
    Linux,
    Ubuntu,
    Windows,
}

impl GuestOs {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "linux" => Ok(GuestOs::Linux),
            "ubuntu" => Ok(GuestOs::Ubuntu),
            "windows" => Ok(GuestOs::Windows),
            other => Err(ValidationError::UnknownGuestOs(other.to_string())),
        }
    }

    /// Port probed to decide whether the host accepts remote sessions.
    /// SSH everywhere except Windows, which exposes RDP.
    pub fn probe_port(&self) -> u16 {
        match self {
            GuestOs::Windows => 3389,
            _ => 22,
        }
    }

    /// Ubuntu templates ship a non-root remote user.
    pub fn needs_sudo(&self) -> bool {
        matches!(self, GuestOs::Ubuntu)
    }
}
