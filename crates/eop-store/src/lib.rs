//! # eop-store
//!
//! Persistence and data access for eopic:
//!
//! * [`MapFile`]: named channel maps and weight tables in one JSON document;
//! * [`JsonlSource`]: lazy JSON Lines ntuple chain;
//! * [`pass`]: write a pass, recombine stored sums, merge partial passes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod map_file;
pub mod ntuple;
pub mod pass;

pub use map_file::{KeyInfo, MAP_FILE_FORMAT, MapFile, StoredMap, StoredObject};
pub use ntuple::{JsonlSource, write_jsonl};
pub use pass::{
    DENOMINATOR, NUMERATOR, PULL, TEMPORARY_IC, load_sums, merge_stores, recombine, write_merged,
    write_pass,
};
