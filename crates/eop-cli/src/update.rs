//! `eopic update-ic` and `eopic merge`.

use anyhow::{Context, Result};
use eop_store::{MapFile, merge_stores, recombine, write_merged};
use std::path::{Path, PathBuf};

use crate::compute::open_map_file;
use crate::config::ObjectRef;

pub fn cmd_update_ic(new_ic: &ObjectRef, old_ic: Option<&ObjectRef>) -> Result<()> {
    let prior = match old_ic {
        Some(r) => {
            tracing::info!(ic = %r, "reading old ICs");
            let ic = open_map_file(&r.file)?
                .get_calibration(&r.name)
                .with_context(|| format!("failed to load old ICs {r}"))?;
            Some(ic)
        }
        None => {
            tracing::warn!("no old ICs provided, assuming IC = 1 everywhere");
            None
        }
    };

    tracing::info!(path = %new_ic.file.display(), "reading numerator and denominator");
    let mut file = open_map_file(&new_ic.file)?;
    let combined = recombine(&mut file, prior.as_ref(), &new_ic.name)
        .with_context(|| format!("failed to update ICs in {}", new_ic.file.display()))?;
    let (n_defined, n_channels) = (combined.n_defined(), combined.pull.len());
    // The new map must be loadable as the prior of the next compute-ic.
    combined
        .into_calibration(prior.as_ref())
        .with_context(|| format!("new ICs {new_ic} are not usable as a prior"))?;
    file.set_meta("updated_with", old_ic.map_or("unit".to_string(), |r| r.to_string()));
    file.save().with_context(|| format!("failed to write {}", new_ic.file.display()))?;

    eprintln!("Updated {n_defined} of {n_channels} channels → {new_ic}");
    Ok(())
}

pub fn cmd_merge(inputs: &[PathBuf], output: &Path) -> Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("merge needs at least one input file");
    }
    let files = inputs.iter().map(|p| open_map_file(p)).collect::<Result<Vec<_>>>()?;
    let merged = merge_stores(&files).context("failed to merge numerator/denominator")?;

    let mut out = MapFile::create(output);
    write_merged(&mut out, &merged)?;
    out.set_meta("tool", format!("eopic merge {}", env!("CARGO_PKG_VERSION")));
    out.set_meta(
        "merged_from",
        inputs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(","),
    );
    out.save().with_context(|| format!("failed to write {}", output.display()))?;

    eprintln!("Merged {} files → {}", inputs.len(), output.display());
    Ok(())
}
