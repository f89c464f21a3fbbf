//! Service traits at the seams of the calibration core.
//!
//! The accumulator and combiner only see these traits; the concrete ntuple
//! reader, weight table, and map file live in other crates.

use crate::{Event, Observation, PartialMap, Result};

/// Per-candidate weight as a function of the seed ieta and E/p.
pub trait WeightModel: Send + Sync {
    /// Weight for a candidate seeded at `ieta_seed` with ratio `eop = E/p`.
    fn weight(&self, ieta_seed: i32, eop: f64) -> f64;

    /// Model name, used in logs.
    fn name(&self) -> &str;
}

/// Caller-supplied candidate selection.
pub trait Selection: Sync {
    /// Whether `obs` enters the accumulation.
    fn accept(&self, obs: &Observation) -> bool;
}

impl<F> Selection for F
where
    F: Fn(&Observation) -> bool + Sync,
{
    fn accept(&self, obs: &Observation) -> bool {
        self(obs)
    }
}

/// Selection that keeps every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Selection for AcceptAll {
    fn accept(&self, _obs: &Observation) -> bool {
        true
    }
}

/// Boxed stream of ntuple entries.
pub type EventIter<'a> = Box<dyn Iterator<Item = Result<Event>> + Send + 'a>;

/// Finite, restartable sequence of ntuple entries.
pub trait ObservationSource {
    /// Start a new scan from the first entry.
    fn events(&self) -> Result<EventIter<'_>>;
}

/// How a store treats an existing object of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if the name is taken.
    Create,
    /// Replace any existing object.
    Overwrite,
}

/// Durable named channel maps.
pub trait MapStore {
    /// Names of all stored objects, sorted.
    fn keys(&self) -> Vec<String>;

    /// Load a channel map by name.
    fn load_map(&self, name: &str) -> Result<PartialMap>;

    /// Store a channel map under `name`.
    fn save_map(&mut self, name: &str, map: &PartialMap, mode: WriteMode) -> Result<()>;

    /// Remove an object. Returns whether it existed.
    fn remove(&mut self, name: &str) -> bool;

    /// Whether `name` is stored.
    fn contains(&self, name: &str) -> bool {
        self.keys().iter().any(|k| k == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatWeight(f64);

    impl WeightModel for FlatWeight {
        fn weight(&self, _ieta_seed: i32, _eop: f64) -> f64 {
            self.0
        }

        fn name(&self) -> &str {
            "Flat"
        }
    }

    fn candidate(energy: f64) -> Observation {
        Observation { energy, momentum: 10.0, ieta_seed: 0, regression: 1.0, hits: vec![] }
    }

    #[test]
    fn closures_are_selections() {
        let sel = |o: &Observation| o.energy > 5.0;
        assert!(sel.accept(&candidate(6.0)));
        assert!(!sel.accept(&candidate(4.0)));
        assert!(AcceptAll.accept(&candidate(0.0)));
    }

    #[test]
    fn weight_model_object_safe() {
        let w: Box<dyn WeightModel> = Box::new(FlatWeight(0.5));
        assert_eq!(w.weight(3, 1.0), 0.5);
        assert_eq!(w.name(), "Flat");
    }
}
