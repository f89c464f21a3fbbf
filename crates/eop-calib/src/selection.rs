//! Kinematic candidate selection.

use eop_core::{Observation, Selection};
use serde::{Deserialize, Serialize};

/// Rectangular cuts on candidate kinematics. Unset cuts always pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionCuts {
    /// Minimum `E` (GeV).
    #[serde(default)]
    pub min_energy: Option<f64>,
    /// Minimum `p` (GeV).
    #[serde(default)]
    pub min_momentum: Option<f64>,
    /// Minimum `E/p`.
    #[serde(default)]
    pub eop_min: Option<f64>,
    /// Maximum `E/p` (inclusive).
    #[serde(default)]
    pub eop_max: Option<f64>,
    /// Maximum `|ieta_seed|`.
    #[serde(default)]
    pub max_abs_ieta_seed: Option<i32>,
}

impl Selection for SelectionCuts {
    fn accept(&self, obs: &Observation) -> bool {
        if self.min_energy.is_some_and(|m| obs.energy < m) {
            return false;
        }
        if self.min_momentum.is_some_and(|m| obs.momentum < m) {
            return false;
        }
        if self.eop_min.is_some() || self.eop_max.is_some() {
            let eop = obs.eop();
            if eop.is_nan()
                || self.eop_min.is_some_and(|m| eop < m)
                || self.eop_max.is_some_and(|m| eop > m)
            {
                return false;
            }
        }
        if self.max_abs_ieta_seed.is_some_and(|m| obs.ieta_seed.unsigned_abs() > m.unsigned_abs()) {
            return false;
        }
        true
    }
}
