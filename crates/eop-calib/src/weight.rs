//! E/p weighting models.

use eop_core::{Error, Result, WeightModel};
use serde::{Deserialize, Serialize};

/// Out-of-range handling for table lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPolicy {
    /// Points outside the table get weight 0.
    #[default]
    Drop,
    /// Points outside the table use the nearest edge bin.
    Fold,
}

/// Weight 1 for every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeight;

impl WeightModel for UniformWeight {
    fn weight(&self, _ieta_seed: i32, _eop: f64) -> f64 {
        1.0
    }

    fn name(&self) -> &str {
        "uniform"
    }
}

/// Binned weight table over (seed ieta, E/p).
///
/// `values` is row-major: `values[ieta_bin * n_eop_bins + eop_bin]`.
/// Bins are half-open `[lo, hi)`. A table is validated on construction and on
/// deserialization, so lookups never index out of range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightTableData", into = "WeightTableData")]
pub struct EopWeightTable {
    name: String,
    ieta_edges: Vec<f64>,
    eop_edges: Vec<f64>,
    values: Vec<f64>,
    flow: FlowPolicy,
}

/// Stored layout of [`EopWeightTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightTableData {
    #[serde(default)]
    name: String,
    ieta_edges: Vec<f64>,
    eop_edges: Vec<f64>,
    values: Vec<f64>,
    #[serde(default)]
    flow: FlowPolicy,
}

impl TryFrom<WeightTableData> for EopWeightTable {
    type Error = Error;

    fn try_from(d: WeightTableData) -> Result<Self> {
        Self::new(d.name, d.ieta_edges, d.eop_edges, d.values, d.flow)
    }
}

impl From<EopWeightTable> for WeightTableData {
    fn from(t: EopWeightTable) -> Self {
        Self { name: t.name, ieta_edges: t.ieta_edges, eop_edges: t.eop_edges, values: t.values, flow: t.flow }
    }
}

impl EopWeightTable {
    /// Build and validate a table.
    pub fn new(
        name: impl Into<String>,
        ieta_edges: Vec<f64>,
        eop_edges: Vec<f64>,
        values: Vec<f64>,
        flow: FlowPolicy,
    ) -> Result<Self> {
        let t = Self { name: name.into(), ieta_edges, eop_edges, values, flow };
        t.validate()?;
        Ok(t)
    }

    /// Same table under another name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bin edges along seed ieta.
    pub fn ieta_edges(&self) -> &[f64] {
        &self.ieta_edges
    }

    /// Bin edges along E/p.
    pub fn eop_edges(&self) -> &[f64] {
        &self.eop_edges
    }

    /// Weights, row-major over (ieta bin, E/p bin).
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Out-of-range policy.
    pub fn flow(&self) -> FlowPolicy {
        self.flow
    }

    /// Check edges are sorted, the value count matches, and weights are finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        check_edges(&self.name, "ieta_edges", &self.ieta_edges)?;
        check_edges(&self.name, "eop_edges", &self.eop_edges)?;
        let expected = (self.ieta_edges.len() - 1) * (self.eop_edges.len() - 1);
        if self.values.len() != expected {
            return Err(Error::Validation(format!(
                "weight table '{}': expected {expected} values, got {}",
                self.name,
                self.values.len()
            )));
        }
        if let Some(v) = self.values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(Error::Validation(format!(
                "weight table '{}': weights must be finite and >= 0, got {v}",
                self.name
            )));
        }
        Ok(())
    }

    fn n_eop_bins(&self) -> usize {
        self.eop_edges.len() - 1
    }

    fn locate(&self, edges: &[f64], val: f64) -> Option<usize> {
        match self.flow {
            FlowPolicy::Drop => find_bin(edges, val),
            FlowPolicy::Fold => {
                if val.is_nan() {
                    None
                } else if val < edges[0] {
                    Some(0)
                } else if val >= edges[edges.len() - 1] {
                    Some(edges.len() - 2)
                } else {
                    find_bin(edges, val)
                }
            }
        }
    }
}

impl WeightModel for EopWeightTable {
    fn weight(&self, ieta_seed: i32, eop: f64) -> f64 {
        let Some(ix) = self.locate(&self.ieta_edges, f64::from(ieta_seed)) else {
            return 0.0;
        };
        let Some(iy) = self.locate(&self.eop_edges, eop) else {
            return 0.0;
        };
        self.values.get(ix * self.n_eop_bins() + iy).copied().unwrap_or(0.0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn check_edges(table: &str, axis: &str, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Validation(format!(
            "weight table '{table}': {axis} needs at least 2 edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Validation(format!(
            "weight table '{table}': {axis} must be finite and strictly increasing"
        )));
    }
    Ok(())
}

/// Find the bin index for a value given sorted bin edges.
///
/// Returns `None` for underflow/overflow and NaN.
fn find_bin(edges: &[f64], val: f64) -> Option<usize> {
    if val.is_nan() || val < edges[0] || val >= edges[edges.len() - 1] {
        return None;
    }
    match edges.binary_search_by(|e| e.total_cmp(&val)) {
        Ok(i) => (i < edges.len() - 1).then_some(i),
        Err(i) => (i > 0 && i < edges.len()).then(|| i - 1),
    }
}
