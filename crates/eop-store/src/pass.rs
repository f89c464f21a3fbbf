//! Store-level workflows: persist a pass, recombine, merge.
//!
//! Only `numerator` and `denominator` are additive across passes. `ICpull` and
//! `temporaryIC` are derived from them and are always recomputed from scratch;
//! a merged file never carries them over.

use eop_calib::{Combined, PassSums, combine};
use eop_core::{CalibrationMap, Error, MapStore, Result, WriteMode};

/// Per-channel numerator object name.
pub const NUMERATOR: &str = "numerator";
/// Per-channel denominator object name.
pub const DENOMINATOR: &str = "denominator";
/// Pull (`numerator / denominator`) object name.
pub const PULL: &str = "ICpull";
/// Updated calibration computed at accumulation time.
pub const TEMPORARY_IC: &str = "temporaryIC";

const RESERVED: [&str; 4] = [NUMERATOR, DENOMINATOR, PULL, TEMPORARY_IC];

/// Write the sums of a pass together with its derived pull and `temporaryIC`.
///
/// `ic` is the calibration the pass was accumulated with.
pub fn write_pass<S: MapStore + ?Sized>(store: &mut S, sums: &PassSums, ic: &CalibrationMap) -> Result<Combined> {
    let combined = combine(&sums.numerator, &sums.denominator, Some(ic))?;
    store.save_map(NUMERATOR, &sums.numerator.to_partial(), WriteMode::Overwrite)?;
    store.save_map(DENOMINATOR, &sums.denominator.to_partial(), WriteMode::Overwrite)?;
    store.save_map(PULL, &combined.pull, WriteMode::Overwrite)?;
    store.save_map(TEMPORARY_IC, &combined.updated, WriteMode::Overwrite)?;
    Ok(combined)
}

/// Load `numerator` and `denominator`.
pub fn load_sums<S: MapStore + ?Sized>(store: &S) -> Result<PassSums> {
    let numerator = store.load_map(NUMERATOR)?.require_dense(NUMERATOR)?;
    let denominator = store.load_map(DENOMINATOR)?.require_dense(DENOMINATOR)?;
    PassSums::from_maps(numerator, denominator)
}

/// Recompute pull and updated IC from the stored sums.
///
/// Stale derived objects are discarded first. The pull is written as `ICpull`
/// and the updated calibration under `new_name`.
pub fn recombine<S: MapStore + ?Sized>(
    store: &mut S,
    prior: Option<&CalibrationMap>,
    new_name: &str,
) -> Result<Combined> {
    if new_name.is_empty() || RESERVED.contains(&new_name) {
        return Err(Error::Config(format!("'{new_name}' cannot be used as the name of the new IC map")));
    }
    let sums = load_sums(store)?;

    for stale in [PULL, TEMPORARY_IC] {
        if store.remove(stale) {
            tracing::debug!(object = stale, "discarded stale derived map");
        }
    }

    let combined = combine(&sums.numerator, &sums.denominator, prior)?;
    store.save_map(PULL, &combined.pull, WriteMode::Overwrite)?;
    store.save_map(new_name, &combined.updated, WriteMode::Overwrite)?;
    tracing::info!(
        channels = combined.pull.len(),
        defined = combined.n_defined(),
        new_ic = new_name,
        "recombined IC"
    );
    Ok(combined)
}

/// Sum the numerator/denominator of several stores.
pub fn merge_stores<'a, S, I>(stores: I) -> Result<PassSums>
where
    S: MapStore + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let mut total: Option<PassSums> = None;
    for store in stores {
        let sums = load_sums(store)?;
        match total.as_mut() {
            Some(t) => t.merge(&sums)?,
            None => total = Some(sums),
        }
    }
    total.ok_or_else(|| Error::Config("nothing to merge: no input stores".into()))
}

/// Write merged sums, dropping any derived objects.
pub fn write_merged<S: MapStore + ?Sized>(store: &mut S, sums: &PassSums) -> Result<()> {
    store.remove(PULL);
    store.remove(TEMPORARY_IC);
    store.save_map(NUMERATOR, &sums.numerator.to_partial(), WriteMode::Overwrite)?;
    store.save_map(DENOMINATOR, &sums.denominator.to_partial(), WriteMode::Overwrite)?;
    Ok(())
}
