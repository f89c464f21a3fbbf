//! # eop-core
//!
//! Core types for E/p intercalibration of calorimeter channels: the channel
//! grid, channel-indexed maps, calibration maps, candidate records, and the
//! service traits the calibration core is written against.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod observation;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use observation::{Event, Observation, RecHit, valid_kinematics};
pub use traits::{AcceptAll, EventIter, MapStore, ObservationSource, Selection, WeightModel, WriteMode};
pub use types::{CalibrationMap, ChannelGrid, ChannelMap, GridBounds, PartialMap, SumMap};
