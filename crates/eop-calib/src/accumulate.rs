//! Weighted ratio accumulation over ntuple entries.
//!
//! For every accepted candidate and every good-quality hit at channel `i`:
//!
//! ```text
//! numerator[i]   += e * f * r * IC[i] / E * (p / E) * w
//! denominator[i] += e * f * r * IC[i] / E * w
//! ```
//!
//! Sums only ever grow, so partial passes merge by element-wise addition.

use std::borrow::Borrow;

use eop_core::{
    CalibrationMap, ChannelGrid, Error, Event, Observation, RecHit, Result, Selection, SumMap,
    WeightModel, valid_kinematics,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Hits with a quality flag at or above this value are dropped.
pub const DEFAULT_BAD_FLAG_THRESHOLD: i32 = 4;

const PROGRESS_EVERY: u64 = 100_000;

/// Entry-parity filter used to split a dataset into two independent halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Every entry.
    #[default]
    All,
    /// Entries with odd index.
    Odd,
    /// Entries with even index.
    Even,
}

impl Split {
    /// Whether entry `index` belongs to this half.
    pub fn keeps(self, index: u64) -> bool {
        match self {
            Split::All => true,
            Split::Odd => index % 2 == 1,
            Split::Even => index % 2 == 0,
        }
    }
}

/// What to do with a selected candidate whose `E` or `p` is zero, negative, or non-finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidEnergyPolicy {
    /// Abort the pass.
    #[default]
    Error,
    /// Drop the candidate, count it, and log a warning.
    Skip,
}

/// Source of the energy `E` used in the ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyEstimate {
    /// The candidate's stored energy.
    #[default]
    Stored,
    /// `r * sum(e * f * IC)` over good hits, using the current calibration.
    Recalibrated,
}

/// Knobs of one accumulation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulateOptions {
    /// Entry-parity filter.
    pub split: Split,
    /// Hits with `flag >= bad_flag_threshold` are skipped.
    pub bad_flag_threshold: i32,
    /// Invalid kinematics handling.
    pub invalid_energy: InvalidEnergyPolicy,
    /// Energy estimate.
    pub energy: EnergyEstimate,
}

impl Default for AccumulateOptions {
    fn default() -> Self {
        Self {
            split: Split::All,
            bad_flag_threshold: DEFAULT_BAD_FLAG_THRESHOLD,
            invalid_energy: InvalidEnergyPolicy::Error,
            energy: EnergyEstimate::Stored,
        }
    }
}

/// Everything a pass reads besides the entries themselves.
///
/// The pass runs on the grid of `ic`.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    /// Current calibration (the prior of this pass).
    pub ic: &'a CalibrationMap,
    /// Candidate weighting model.
    pub weights: &'a dyn WeightModel,
    /// Candidate selection.
    pub selection: &'a dyn Selection,
    /// Pass options.
    pub options: AccumulateOptions,
}

impl<'a> PassContext<'a> {
    /// Context with default options.
    pub fn new(
        ic: &'a CalibrationMap,
        weights: &'a dyn WeightModel,
        selection: &'a dyn Selection,
    ) -> Self {
        Self { ic, weights, selection, options: AccumulateOptions::default() }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: AccumulateOptions) -> Self {
        self.options = options;
        self
    }

    /// Grid of the pass.
    pub fn grid(&self) -> ChannelGrid {
        self.ic.grid()
    }
}

/// Bookkeeping counters of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    /// Entries that passed the split filter.
    pub entries_scanned: u64,
    /// Candidates accepted by the selection.
    pub observations_selected: u64,
    /// Selected candidates dropped for invalid `E`/`p`.
    pub observations_invalid: u64,
    /// Hits that contributed to the sums.
    pub hits_used: u64,
    /// Hits dropped for bad quality.
    pub hits_rejected: u64,
}

impl PassStats {
    /// Add another pass's counters.
    pub fn merge(&mut self, other: &Self) {
        self.entries_scanned += other.entries_scanned;
        self.observations_selected += other.observations_selected;
        self.observations_invalid += other.observations_invalid;
        self.hits_used += other.hits_used;
        self.hits_rejected += other.hits_rejected;
    }
}

/// Numerator and denominator of one (possibly merged) pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSums {
    /// Per-channel numerator.
    pub numerator: SumMap,
    /// Per-channel denominator.
    pub denominator: SumMap,
    /// Counters.
    pub stats: PassStats,
}

impl PassSums {
    /// Empty sums on `grid`.
    pub fn zeros(grid: ChannelGrid) -> Self {
        Self { numerator: SumMap::zeros(grid), denominator: SumMap::zeros(grid), stats: PassStats::default() }
    }

    /// Pair existing maps; their grids must match.
    pub fn from_maps(numerator: SumMap, denominator: SumMap) -> Result<Self> {
        denominator.ensure_grid(numerator.grid(), "denominator vs numerator")?;
        Ok(Self { numerator, denominator, stats: PassStats::default() })
    }

    /// Grid of the sums.
    pub fn grid(&self) -> ChannelGrid {
        self.numerator.grid()
    }

    /// Element-wise `self += other`.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        other.numerator.ensure_grid(self.grid(), "merge numerator")?;
        other.denominator.ensure_grid(self.grid(), "merge denominator")?;
        self.numerator.merge(&other.numerator)?;
        self.denominator.merge(&other.denominator)?;
        self.stats.merge(&other.stats);
        Ok(())
    }
}

/// Streaming accumulator: feed entries one at a time, then [`Accumulator::finish`].
pub struct Accumulator<'a> {
    ctx: PassContext<'a>,
    sums: PassSums,
}

impl<'a> Accumulator<'a> {
    /// Fresh accumulator with zeroed sums on the context's grid.
    pub fn new(ctx: PassContext<'a>) -> Self {
        Self { ctx, sums: PassSums::zeros(ctx.grid()) }
    }

    /// Add entry number `index`: applies the split filter, then the selection to each candidate.
    pub fn add_event(&mut self, index: u64, event: &Event) -> Result<()> {
        if !self.ctx.options.split.keeps(index) {
            return Ok(());
        }
        self.sums.stats.entries_scanned += 1;
        for obs in &event.observations {
            if self.ctx.selection.accept(obs) {
                self.fill(obs, Some(index))?;
            }
        }
        Ok(())
    }

    /// Add a candidate the caller has already selected. No split or selection is applied.
    pub fn add_observation(&mut self, obs: &Observation) -> Result<()> {
        self.fill(obs, None)
    }

    /// Hand over the sums.
    pub fn finish(self) -> PassSums {
        self.sums
    }

    fn fill(&mut self, obs: &Observation, entry: Option<u64>) -> Result<()> {
        let opts = self.ctx.options;
        let grid = self.sums.grid();
        self.sums.stats.observations_selected += 1;

        let energy = match opts.energy {
            EnergyEstimate::Stored => obs.energy,
            EnergyEstimate::Recalibrated => {
                let mut sum = 0.0;
                for hit in obs.hits.iter().filter(|h| h.flag < opts.bad_flag_threshold) {
                    let index = channel_index(grid, hit, entry)?;
                    sum += hit.energy * hit.fraction * self.ic_at(index)?;
                }
                obs.regression * sum
            }
        };
        let p = obs.momentum;

        if !valid_kinematics(energy, p) {
            match opts.invalid_energy {
                InvalidEnergyPolicy::Error => {
                    return Err(Error::InvalidObservation(format!(
                        "E={energy}, p={p}{}: E and p must be finite and > 0",
                        entry.map(|n| format!(" at entry {n}")).unwrap_or_default()
                    )));
                }
                InvalidEnergyPolicy::Skip => {
                    tracing::warn!(entry, energy, momentum = p, "skipping candidate with invalid E/p");
                    self.sums.stats.observations_invalid += 1;
                    return Ok(());
                }
            }
        }

        let w = self.ctx.weights.weight(obs.ieta_seed, energy / p);
        let p_over_e = p / energy;

        for hit in &obs.hits {
            if hit.flag >= opts.bad_flag_threshold {
                self.sums.stats.hits_rejected += 1;
                continue;
            }
            let index = channel_index(grid, hit, entry)?;
            let term = hit.energy * hit.fraction * obs.regression * self.ic_at(index)? / energy * w;
            self.sums.numerator.add(index, term * p_over_e)?;
            self.sums.denominator.add(index, term)?;
            self.sums.stats.hits_used += 1;
        }
        Ok(())
    }

    fn ic_at(&self, index: usize) -> Result<f64> {
        self.ctx
            .ic
            .get(index)
            .ok_or_else(|| Error::Geometry(format!("no calibration constant for channel index {index}")))
    }
}

fn channel_index(grid: ChannelGrid, hit: &RecHit, entry: Option<u64>) -> Result<usize> {
    grid.index(hit.ieta, hit.iphi).map_err(|e| match (e, entry) {
        (Error::Geometry(msg), Some(n)) => Error::Geometry(format!("{msg} (entry {n})")),
        (e, _) => e,
    })
}

/// Accumulate entries numbered from 0.
pub fn accumulate<I, E>(events: I, ctx: PassContext<'_>) -> Result<PassSums>
where
    I: IntoIterator<Item = E>,
    E: Borrow<Event>,
{
    try_accumulate(events.into_iter().map(Ok), ctx)
}

/// Accumulate a fallible entry stream (e.g. an ntuple reader), stopping at the first error.
pub fn try_accumulate<I, E>(events: I, ctx: PassContext<'_>) -> Result<PassSums>
where
    I: IntoIterator<Item = Result<E>>,
    E: Borrow<Event>,
{
    let mut acc = Accumulator::new(ctx);
    for (index, event) in events.into_iter().enumerate() {
        let index = index as u64;
        if index > 0 && index % PROGRESS_EVERY == 0 {
            tracing::info!(entry = index, "processing entry");
        }
        acc.add_event(index, event?.borrow())?;
    }
    let sums = acc.finish();
    log_pass(&sums.stats);
    Ok(sums)
}

/// Accumulate a batch of entries in parallel.
///
/// `first_entry` is the global index of `events[0]`, so the split filter stays
/// consistent when a long stream is processed batch by batch. Each rayon worker
/// fills private sums; the results are merged at the end.
pub fn accumulate_par(events: &[Event], first_entry: u64, ctx: PassContext<'_>) -> Result<PassSums> {
    let grid = ctx.grid();
    events
        .par_iter()
        .enumerate()
        .try_fold(
            || Accumulator::new(ctx),
            |mut acc, (i, event)| {
                acc.add_event(first_entry + i as u64, event)?;
                Ok::<_, Error>(acc)
            },
        )
        .map(|acc| acc.map(Accumulator::finish))
        .try_reduce(
            || PassSums::zeros(grid),
            |mut a, b| {
                a.merge(&b)?;
                Ok(a)
            },
        )
}

/// Log the counters of a finished pass.
pub fn log_pass(stats: &PassStats) {
    tracing::info!(
        entries = stats.entries_scanned,
        selected = stats.observations_selected,
        invalid = stats.observations_invalid,
        hits_used = stats.hits_used,
        hits_rejected = stats.hits_rejected,
        "accumulation pass complete"
    );
    if stats.observations_invalid > 0 {
        tracing::warn!(n = stats.observations_invalid, "candidates skipped for invalid E/p");
    }
}
