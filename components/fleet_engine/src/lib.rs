//! Fleet lifecycle engine.
//!
//! Drives every host of a composition from "unknown" to a verified or failed
//! terminal state: an explicit per-host state machine, one worker task per
//! host, and a phase orchestrator that runs whole phases concurrently and
//! gates each phase on the previous one.

pub mod catalog;
pub mod collaborators;
pub mod error;
pub mod host;
pub mod log;
pub mod machine;
pub mod orchestrator;
pub mod status;
pub mod worker;

#[cfg(test)]
pub(crate) mod stub;

pub use catalog::InfraCatalog;
pub use collaborators::{
    Bootstrapper, CustomizationOptions, Hypervisor, NicSetting, NodeRegistry, Probe,
    ProgressSink, TcpProbe, Tester, VmHandle,
};
pub use error::CollaboratorError;
pub use host::{Deps, Host, HostSpec, Timeouts};
pub use log::{LogEntry, MessageLog};
pub use machine::{Facts, HostState, Step};
pub use orchestrator::{HostFailure, Orchestrator, PhasePlan, PhaseReport, RunReport};
pub use status::{StatusRenderer, StatusSnapshot};
pub use worker::{HostOutcome, HostWorker};
