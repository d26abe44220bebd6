//! Pure domain data for the fleet orchestrator.
//!
//! Everything in this crate is immutable after construction and does no I/O.

mod infra;
mod name;
mod os;
mod run_list;
mod simulation;
mod test_spec;

pub use infra::{Network, Template};
pub use name::HostName;
pub use os::GuestOs;
pub use run_list::RunList;
pub use simulation::SimulationMode;
pub use test_spec::TestSpec;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("actor name must not be empty")]
    EmptyActorName,

    #[error("instance index must be 1 or greater")]
    ZeroInstance,

    #[error("unknown guest OS '{0}'")]
    UnknownGuestOs(String),

    #[error("subnet '{0}' is not in CIDR notation")]
    BadSubnet(String),

    #[error("a host needs at least one network")]
    NoNetworks,
}
