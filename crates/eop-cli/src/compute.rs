//! `eopic compute-ic`: one accumulation pass over the ntuples.

use anyhow::{Context, Result};
use eop_calib::{
    EopWeightTable, PassContext, PassSums, Split, UniformWeight, accumulate_par, log_pass,
    try_accumulate,
};
use eop_core::{CalibrationMap, ObservationSource, WeightModel};
use eop_store::{JsonlSource, MapFile, write_pass};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::{ObjectRef, RunConfig, read_run_config};

const DEFAULT_OUTPUT: &str = "IC.json";

/// Command-line overrides of the run config.
pub struct ComputeArgs {
    pub cfg: PathBuf,
    pub input_ic: Option<ObjectRef>,
    pub eop_weight: Option<ObjectRef>,
    pub output: Option<PathBuf>,
    pub split: Option<Split>,
    pub threads: Option<usize>,
}

pub fn cmd_compute_ic(args: ComputeArgs) -> Result<()> {
    let mut cfg = read_run_config(&args.cfg)?;
    apply_overrides(&mut cfg, &args);
    cfg.validate()?;

    let grid = cfg.geometry;
    let source = JsonlSource::new(cfg.input.ntuples.clone())?;

    let ic = match &cfg.input.ic {
        Some(r) => {
            tracing::info!(ic = %r, "reading input ICs");
            let ic = open_map_file(&r.file)?
                .get_calibration(&r.name)
                .with_context(|| format!("failed to load ICs {r}"))?;
            ic.as_map().ensure_grid(grid, "input IC vs geometry")?;
            ic
        }
        None => CalibrationMap::unit(grid),
    };

    let weights: Box<dyn WeightModel> = match &cfg.input.eop_weight {
        Some(r) => {
            let t: EopWeightTable = open_map_file(&r.file)?
                .get_weight_table(&r.name)
                .with_context(|| format!("failed to load E/p weights {r}"))?;
            Box::new(t)
        }
        None => Box::new(UniformWeight),
    };

    let acc = &cfg.accumulation;
    let ctx = PassContext::new(&ic, weights.as_ref(), &cfg.selection).with_options(acc.options());
    tracing::info!(
        channels = grid.n_channels(),
        ntuples = source.paths().len(),
        split = ?acc.split,
        weights = weights.name(),
        threads = acc.threads,
        "starting accumulation pass"
    );

    let sums = if acc.threads == 1 {
        try_accumulate(source.events()?, ctx)?
    } else {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(acc.threads).build_global() {
            tracing::debug!("rayon global pool already configured: {e}");
        }
        accumulate_batched(&source, ctx, acc.batch_size)?
    };

    let out_path = args
        .output
        .clone()
        .or_else(|| cfg.output.compute_ic.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    let mut out = MapFile::create(&out_path);
    let combined = write_pass(&mut out, &sums, &ic)?;

    out.set_meta("tool", format!("eopic compute-ic {}", env!("CARGO_PKG_VERSION")));
    out.set_meta("config_sha256", sha256_file(&args.cfg)?);
    out.set_meta(
        "ntuples",
        source.paths().iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(","),
    );
    out.set_meta("split", format!("{:?}", acc.split).to_ascii_lowercase());
    out.set_meta("input_ic", cfg.input.ic.as_ref().map_or("unit".to_string(), |r| r.to_string()));
    out.set_meta("eop_weight", weights.name());
    out.save().with_context(|| format!("failed to write {}", out_path.display()))?;

    eprintln!(
        "Accumulated {} entries ({} candidates, {} invalid) → {} channels with statistics of {} → {}",
        sums.stats.entries_scanned,
        sums.stats.observations_selected,
        sums.stats.observations_invalid,
        combined.n_defined(),
        grid.n_channels(),
        out_path.display(),
    );
    Ok(())
}

fn apply_overrides(cfg: &mut RunConfig, args: &ComputeArgs) {
    if let Some(r) = &args.input_ic {
        cfg.input.ic = Some(r.clone());
    }
    if let Some(r) = &args.eop_weight {
        cfg.input.eop_weight = Some(r.clone());
    }
    if let Some(split) = args.split {
        cfg.accumulation.split = split;
    }
    if let Some(threads) = args.threads {
        cfg.accumulation.threads = threads;
    }
}

/// Read the chain in bounded batches and accumulate each batch in parallel.
fn accumulate_batched(
    source: &JsonlSource,
    ctx: PassContext<'_>,
    batch_size: usize,
) -> Result<PassSums> {
    let mut total = PassSums::zeros(ctx.grid());
    let mut batch = Vec::with_capacity(batch_size);
    let mut first_entry = 0u64;
    for event in source.events()? {
        batch.push(event?);
        if batch.len() == batch_size {
            total.merge(&accumulate_par(&batch, first_entry, ctx)?)?;
            first_entry += batch.len() as u64;
            batch.clear();
            tracing::info!(entry = first_entry, "processing entry");
        }
    }
    if !batch.is_empty() {
        total.merge(&accumulate_par(&batch, first_entry, ctx)?)?;
    }
    log_pass(&total.stats);
    Ok(total)
}

pub(crate) fn open_map_file(path: &Path) -> Result<MapFile> {
    MapFile::open(path).with_context(|| format!("failed to open map file {}", path.display()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut s = String::with_capacity(64);
    for b in out {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn sha256_file(path: &Path) -> Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
