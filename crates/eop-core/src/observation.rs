//! Electron-candidate records consumed by the accumulator.

use serde::{Deserialize, Serialize};

/// One reconstructed hit of a candidate's cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecHit {
    /// Channel ieta.
    pub ieta: i32,
    /// Channel iphi.
    pub iphi: i32,
    /// Deposited energy (GeV).
    pub energy: f64,
    /// Fraction of the hit energy assigned to this cluster.
    #[serde(default = "default_one")]
    pub fraction: f64,
    /// Reconstruction quality flag; higher is worse.
    #[serde(default)]
    pub flag: i32,
}

/// One selected particle candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Reconstructed energy estimate `E`.
    pub energy: f64,
    /// Track momentum estimate `p`.
    pub momentum: f64,
    /// ieta of the seed channel (weighting model key).
    pub ieta_seed: i32,
    /// Regression scale factor `r`.
    #[serde(default = "default_one")]
    pub regression: f64,
    /// Channel contributions.
    #[serde(default)]
    pub hits: Vec<RecHit>,
}

impl Observation {
    /// `E/p`.
    pub fn eop(&self) -> f64 {
        self.energy / self.momentum
    }
}

/// One ntuple entry: the candidates recorded for a single event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Candidates of this entry (typically two electrons).
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl Event {
    /// Entry holding the given candidates.
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

/// Whether an energy and a momentum are usable as divisors: both finite and > 0.
pub fn valid_kinematics(energy: f64, momentum: f64) -> bool {
    energy.is_finite() && energy > 0.0 && momentum.is_finite() && momentum > 0.0
}

fn default_one() -> f64 {
    1.0
}
