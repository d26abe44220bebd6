use serde::{Deserialize, Serialize};

/// How much of a run is real.
///
/// `DryRun` walks the full lifecycle but treats every externally observed
/// condition as already satisfied and issues no mutation. `CalculateOnly`
/// reports which hosts would be provisioned or bootstrapped and parks them
/// there instead of acting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    #[default]
    None,
    DryRun,
    CalculateOnly,
}

impl SimulationMode {
    /// True when no clone, registry write, or bootstrap may be issued.
    pub fn suppresses_mutation(&self) -> bool {
        !matches!(self, SimulationMode::None)
    }

    /// True when power/IP/probe checks are treated as immediately satisfied.
    /// Calculate-only never reaches those checks; it parks earlier.
    pub fn forces_predicates(&self) -> bool {
        matches!(self, SimulationMode::DryRun)
    }

    pub fn is_calculate_only(&self) -> bool {
        matches!(self, SimulationMode::CalculateOnly)
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, SimulationMode::DryRun)
    }
}
