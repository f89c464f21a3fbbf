//! Run configuration for `eopic compute-ic`.

use anyhow::{Context, Result};
use eop_calib::{
    AccumulateOptions, DEFAULT_BAD_FLAG_THRESHOLD, EnergyEstimate, InvalidEnergyPolicy,
    SelectionCuts, Split,
};
use eop_core::ChannelGrid;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub input: InputConfig,
    /// Channel grid bounds. Mandatory.
    pub geometry: ChannelGrid,
    #[serde(default)]
    pub selection: SelectionCuts,
    #[serde(default)]
    pub accumulation: AccumulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// JSONL ntuples, chained in order.
    #[serde(default)]
    pub ntuples: Vec<PathBuf>,
    /// Prior IC map. Unit prior when absent.
    #[serde(default)]
    pub ic: Option<ObjectRef>,
    /// E/p weight table. Uniform weights when absent.
    #[serde(default)]
    pub eop_weight: Option<ObjectRef>,
}

/// A named object inside a map file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectRef {
    pub name: String,
    pub file: PathBuf,
}

impl ObjectRef {
    /// Build from a CLI `<NAME> <FILE>` pair.
    pub fn from_pair(flag: &str, values: Vec<String>) -> Result<Self> {
        match <[String; 2]>::try_from(values) {
            Ok([name, file]) => Ok(Self { name, file: PathBuf::from(file) }),
            Err(v) => anyhow::bail!("{flag} expects exactly <NAME> <FILE>, got {} values", v.len()),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file.display(), self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccumulationConfig {
    #[serde(default)]
    pub split: Split,
    #[serde(default)]
    pub energy: EnergyEstimate,
    #[serde(default)]
    pub invalid_energy: InvalidEnergyPolicy,
    #[serde(default = "default_bad_flag_threshold")]
    pub bad_flag_threshold: i32,
    /// Threads (0 = auto). 1 runs the sequential streaming pass.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Entries per parallel batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for AccumulationConfig {
    fn default() -> Self {
        Self {
            split: Split::All,
            energy: EnergyEstimate::Stored,
            invalid_energy: InvalidEnergyPolicy::Error,
            bad_flag_threshold: default_bad_flag_threshold(),
            threads: default_threads(),
            batch_size: default_batch_size(),
        }
    }
}

impl AccumulationConfig {
    pub fn options(&self) -> AccumulateOptions {
        AccumulateOptions {
            split: self.split,
            bad_flag_threshold: self.bad_flag_threshold,
            invalid_energy: self.invalid_energy,
            energy: self.energy,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output map file of `compute-ic`.
    #[serde(default)]
    pub compute_ic: Option<PathBuf>,
}

fn default_bad_flag_threshold() -> i32 {
    DEFAULT_BAD_FLAG_THRESHOLD
}

fn default_threads() -> usize {
    1
}

fn default_batch_size() -> usize {
    65_536
}

/// Read a YAML (default) or JSON (`.json`) config. Relative paths are resolved
/// against the config file's directory.
pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read config {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg: RunConfig = if ext == "json" {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid config {}", path.display()))?
    } else {
        serde_yaml_ng::from_slice(&bytes)
            .with_context(|| format!("invalid config {}", path.display()))?
    };

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    cfg.resolve_paths(base);
    Ok(cfg)
}

impl RunConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for p in &mut self.input.ntuples {
            resolve(p);
        }
        if let Some(r) = self.input.ic.as_mut() {
            resolve(&mut r.file);
        }
        if let Some(r) = self.input.eop_weight.as_mut() {
            resolve(&mut r.file);
        }
        if let Some(p) = self.output.compute_ic.as_mut() {
            resolve(p);
        }
    }

    /// Checks that must pass before any entry is read.
    pub fn validate(&self) -> Result<()> {
        if self.input.ntuples.is_empty() {
            anyhow::bail!("config: input.ntuples must list at least one ntuple");
        }
        if self.accumulation.batch_size == 0 {
            anyhow::bail!("config: accumulation.batch_size must be > 0");
        }
        if let Some(r) = self.input.ic.as_ref().filter(|r| r.name.is_empty()) {
            anyhow::bail!("config: input.ic has an empty name (file {})", r.file.display());
        }
        Ok(())
    }
}
