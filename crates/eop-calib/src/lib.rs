//! # eop-calib
//!
//! Iterative E/p intercalibration core.
//!
//! One pass scans the candidates and fills a per-channel numerator and
//! denominator ([`accumulate`], [`accumulate_par`]). The pull
//! `numerator / denominator` is then folded into the prior calibration
//! ([`combine`]). Passes over disjoint data merge by plain addition, so the
//! combine step can run on the sum of many partial passes.
//!
//! ## Example
//!
//! ```
//! use eop_calib::{PassContext, UniformWeight, accumulate, combine};
//! use eop_core::{AcceptAll, CalibrationMap, ChannelGrid, Event, Observation, RecHit};
//!
//! let grid = ChannelGrid::new(-1, 1, 1, 4).unwrap();
//! let ic = CalibrationMap::unit(grid);
//! let hit = RecHit { ieta: 0, iphi: 2, energy: 1.0, fraction: 1.0, flag: 0 };
//! let obs = Observation { energy: 10.0, momentum: 9.0, ieta_seed: 0, regression: 1.0, hits: vec![hit] };
//!
//! let ctx = PassContext::new(&ic, &UniformWeight, &AcceptAll);
//! let sums = accumulate([Event::new(vec![obs])], ctx).unwrap();
//! let out = combine(&sums.numerator, &sums.denominator, Some(&ic)).unwrap();
//! assert!((out.pull.at(0, 2).unwrap().unwrap() - 0.9).abs() < 1e-12);
//! assert_eq!(*out.pull.at(1, 1).unwrap(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulate;
pub mod combine;
pub mod selection;
pub mod weight;

pub use accumulate::{
    AccumulateOptions, Accumulator, DEFAULT_BAD_FLAG_THRESHOLD, EnergyEstimate,
    InvalidEnergyPolicy, PassContext, PassStats, PassSums, Split, accumulate, accumulate_par,
    log_pass, try_accumulate,
};
pub use combine::{Combined, combine};
pub use selection::SelectionCuts;
pub use weight::{EopWeightTable, FlowPolicy, UniformWeight};
