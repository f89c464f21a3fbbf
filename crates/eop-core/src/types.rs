//! Channel grid and channel-indexed maps.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Inclusive `(ieta, iphi)` bounds as they appear in configuration and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridBounds {
    /// Lowest ieta index.
    pub ieta_min: i32,
    /// Highest ieta index (inclusive).
    pub ieta_max: i32,
    /// Lowest iphi index.
    pub iphi_min: i32,
    /// Highest iphi index (inclusive).
    pub iphi_max: i32,
}

/// Detector channel grid: a bijection between `(ieta, iphi)` and `0..n_channels`.
///
/// Channels are laid out ieta-major: `index = (ieta - ieta_min) * n_phi + (iphi - iphi_min)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridBounds", into = "GridBounds")]
pub struct ChannelGrid {
    ieta_min: i32,
    iphi_min: i32,
    n_eta: usize,
    n_phi: usize,
}

impl ChannelGrid {
    /// Build a grid from inclusive bounds.
    pub fn new(ieta_min: i32, ieta_max: i32, iphi_min: i32, iphi_max: i32) -> Result<Self> {
        Self::try_from(GridBounds { ieta_min, ieta_max, iphi_min, iphi_max })
    }

    /// Number of ieta rows.
    pub fn n_eta(&self) -> usize {
        self.n_eta
    }

    /// Number of iphi columns.
    pub fn n_phi(&self) -> usize {
        self.n_phi
    }

    /// Total number of channels (`n_eta * n_phi`).
    pub fn n_channels(&self) -> usize {
        self.n_eta * self.n_phi
    }

    /// Inclusive bounds of this grid.
    pub fn bounds(&self) -> GridBounds {
        GridBounds {
            ieta_min: self.ieta_min,
            ieta_max: self.ieta_min + self.n_eta as i32 - 1,
            iphi_min: self.iphi_min,
            iphi_max: self.iphi_min + self.n_phi as i32 - 1,
        }
    }

    /// Whether `(ieta, iphi)` lies on the grid.
    pub fn contains(&self, ieta: i32, iphi: i32) -> bool {
        self.offsets(ieta, iphi).is_some()
    }

    /// Linear index of `(ieta, iphi)`.
    ///
    /// Coordinates outside the grid are a geometry error; they are never wrapped or clamped.
    pub fn index(&self, ieta: i32, iphi: i32) -> Result<usize> {
        let (de, dp) = self.offsets(ieta, iphi).ok_or_else(|| {
            let b = self.bounds();
            Error::Geometry(format!(
                "channel (ieta={ieta}, iphi={iphi}) outside grid ieta=[{}, {}], iphi=[{}, {}]",
                b.ieta_min, b.ieta_max, b.iphi_min, b.iphi_max
            ))
        })?;
        Ok(de * self.n_phi + dp)
    }

    /// Inverse of [`ChannelGrid::index`].
    pub fn coords(&self, index: usize) -> Result<(i32, i32)> {
        if index >= self.n_channels() {
            return Err(Error::Geometry(format!(
                "channel index {index} outside [0, {})",
                self.n_channels()
            )));
        }
        let ieta = self.ieta_min + (index / self.n_phi) as i32;
        let iphi = self.iphi_min + (index % self.n_phi) as i32;
        Ok((ieta, iphi))
    }

    fn offsets(&self, ieta: i32, iphi: i32) -> Option<(usize, usize)> {
        let de = usize::try_from(i64::from(ieta) - i64::from(self.ieta_min)).ok()?;
        let dp = usize::try_from(i64::from(iphi) - i64::from(self.iphi_min)).ok()?;
        (de < self.n_eta && dp < self.n_phi).then_some((de, dp))
    }
}

impl TryFrom<GridBounds> for ChannelGrid {
    type Error = Error;

    fn try_from(b: GridBounds) -> Result<Self> {
        if b.ieta_max < b.ieta_min || b.iphi_max < b.iphi_min {
            return Err(Error::Config(format!(
                "empty channel grid: ieta=[{}, {}], iphi=[{}, {}]",
                b.ieta_min, b.ieta_max, b.iphi_min, b.iphi_max
            )));
        }
        let n_eta = (i64::from(b.ieta_max) - i64::from(b.ieta_min) + 1) as usize;
        let n_phi = (i64::from(b.iphi_max) - i64::from(b.iphi_min) + 1) as usize;
        if n_eta.checked_mul(n_phi).is_none_or(|n| n > i32::MAX as usize) {
            return Err(Error::Config(format!("channel grid too large: {n_eta} x {n_phi}")));
        }
        Ok(Self { ieta_min: b.ieta_min, iphi_min: b.iphi_min, n_eta, n_phi })
    }
}

impl From<ChannelGrid> for GridBounds {
    fn from(g: ChannelGrid) -> Self {
        g.bounds()
    }
}

/// Fixed-size channel-indexed array.
///
/// Always holds exactly `grid.n_channels()` values; every accessor is bounds-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMap<T> {
    grid: ChannelGrid,
    values: Vec<T>,
}

/// Running sums (numerator / denominator).
pub type SumMap = ChannelMap<f64>;

/// Map with undefined channels (`None` where no statistics were collected).
pub type PartialMap = ChannelMap<Option<f64>>;

impl<T: Clone> ChannelMap<T> {
    /// Map with every channel set to `value`.
    pub fn filled(grid: ChannelGrid, value: T) -> Self {
        Self { grid, values: vec![value; grid.n_channels()] }
    }
}

impl<T> ChannelMap<T> {
    /// Wrap existing values; the length must match the grid.
    pub fn from_values(grid: ChannelGrid, values: Vec<T>) -> Result<Self> {
        if values.len() != grid.n_channels() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} channel values ({} x {}), got {}",
                grid.n_channels(),
                grid.n_eta(),
                grid.n_phi(),
                values.len()
            )));
        }
        Ok(Self { grid, values })
    }

    /// Grid this map is addressed by.
    pub fn grid(&self) -> ChannelGrid {
        self.grid
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True only for a zero-channel map, which a valid grid never produces.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in linear index order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Value at a linear index.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    /// Mutable value at a linear index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.values.get_mut(index)
    }

    /// Value at `(ieta, iphi)`.
    pub fn at(&self, ieta: i32, iphi: i32) -> Result<&T> {
        let index = self.grid.index(ieta, iphi)?;
        Ok(&self.values[index])
    }

    /// `(index, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.values.iter().enumerate()
    }

    /// Apply `f` to every value, keeping the grid.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> ChannelMap<U> {
        ChannelMap { grid: self.grid, values: self.values.iter().map(f).collect() }
    }

    /// Fail unless `grid` equals this map's grid.
    pub fn ensure_grid(&self, grid: ChannelGrid, what: &str) -> Result<()> {
        if self.grid != grid {
            let (a, b) = (self.grid.bounds(), grid.bounds());
            return Err(Error::ShapeMismatch(format!(
                "{what}: grid ieta=[{}, {}] iphi=[{}, {}] does not match ieta=[{}, {}] iphi=[{}, {}]",
                a.ieta_min,
                a.ieta_max,
                a.iphi_min,
                a.iphi_max,
                b.ieta_min,
                b.ieta_max,
                b.iphi_min,
                b.iphi_max
            )));
        }
        Ok(())
    }
}

impl ChannelMap<f64> {
    /// All-zero sum map.
    pub fn zeros(grid: ChannelGrid) -> Self {
        Self::filled(grid, 0.0)
    }

    /// Add `value` to channel `index`.
    pub fn add(&mut self, index: usize, value: f64) -> Result<()> {
        let n = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| Error::Geometry(format!("channel index {index} outside [0, {n})")))?;
        *slot += value;
        Ok(())
    }

    /// Element-wise `self += other`. Grids must match exactly.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        other.ensure_grid(self.grid, "merge")?;
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += *b;
        }
        Ok(())
    }

    /// Lift into a partial map with every channel defined.
    pub fn to_partial(&self) -> PartialMap {
        self.map(|&v| Some(v))
    }
}

impl ChannelMap<Option<f64>> {
    /// Number of defined channels.
    pub fn n_defined(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Convert to a dense map, failing on the first undefined channel.
    pub fn require_dense(&self, what: &str) -> Result<SumMap> {
        let mut out = Vec::with_capacity(self.values.len());
        for (index, v) in self.iter() {
            match v {
                Some(x) => out.push(*x),
                None => {
                    let (ieta, iphi) = self.grid.coords(index)?;
                    return Err(Error::Validation(format!(
                        "{what}: channel (ieta={ieta}, iphi={iphi}) is undefined"
                    )));
                }
            }
        }
        ChannelMap::from_values(self.grid, out)
    }
}

/// Per-channel intercalibration constants. Every value is finite and strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMap(ChannelMap<f64>);

impl CalibrationMap {
    /// Uniform prior: 1.0 everywhere.
    pub fn unit(grid: ChannelGrid) -> Self {
        Self(ChannelMap::filled(grid, 1.0))
    }

    /// Validate and wrap a dense map.
    pub fn new(map: ChannelMap<f64>) -> Result<Self> {
        for (index, &v) in map.iter() {
            if !(v.is_finite() && v > 0.0) {
                let (ieta, iphi) = map.grid.coords(index)?;
                return Err(Error::Validation(format!(
                    "calibration constant at (ieta={ieta}, iphi={iphi}) must be finite and > 0, got {v}"
                )));
            }
        }
        Ok(Self(map))
    }

    /// Grid of the map.
    pub fn grid(&self) -> ChannelGrid {
        self.0.grid
    }

    /// Constant for channel `index`.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Borrow as a plain channel map.
    pub fn as_map(&self) -> &ChannelMap<f64> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barrel() -> ChannelGrid {
        ChannelGrid::new(-85, 85, 1, 360).unwrap()
    }

    #[test]
    fn grid_dimensions() {
        let g = barrel();
        assert_eq!(g.n_eta(), 171);
        assert_eq!(g.n_phi(), 360);
        assert_eq!(g.n_channels(), 171 * 360);
        assert_eq!(g.bounds(), GridBounds { ieta_min: -85, ieta_max: 85, iphi_min: 1, iphi_max: 360 });
    }

    #[test]
    fn index_roundtrips_at_corners() {
        let g = barrel();
        assert_eq!(g.index(-85, 1).unwrap(), 0);
        assert_eq!(g.index(-85, 360).unwrap(), 359);
        assert_eq!(g.index(-84, 1).unwrap(), 360);
        let last = g.n_channels() - 1;
        assert_eq!(g.index(85, 360).unwrap(), last);
        for &(ieta, iphi) in &[(-85, 1), (0, 180), (17, 33), (85, 360)] {
            let i = g.index(ieta, iphi).unwrap();
            assert_eq!(g.coords(i).unwrap(), (ieta, iphi));
        }
    }

    #[test]
    fn out_of_grid_is_geometry_error() {
        let g = barrel();
        assert!(matches!(g.index(86, 1), Err(Error::Geometry(_))));
        assert!(matches!(g.index(0, 0), Err(Error::Geometry(_))));
        assert!(matches!(g.index(0, 361), Err(Error::Geometry(_))));
        assert!(matches!(g.coords(g.n_channels()), Err(Error::Geometry(_))));
        assert!(!g.contains(-86, 10));
    }

    #[test]
    fn empty_grid_rejected() {
        assert!(matches!(ChannelGrid::new(5, 4, 1, 10), Err(Error::Config(_))));
        assert!(matches!(ChannelGrid::new(1, 1, 3, 2), Err(Error::Config(_))));
    }

    #[test]
    fn grid_deserialization_validates() {
        let g: ChannelGrid =
            serde_json::from_str(r#"{"ieta_min":1,"ieta_max":2,"iphi_min":1,"iphi_max":3}"#).unwrap();
        assert_eq!(g.n_channels(), 6);
        let bad = serde_json::from_str::<ChannelGrid>(
            r#"{"ieta_min":2,"ieta_max":1,"iphi_min":1,"iphi_max":3}"#,
        );
        assert!(bad.is_err());
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.contains("\"ieta_max\":2"));
    }

    #[test]
    fn map_length_must_match_grid() {
        let g = ChannelGrid::new(0, 1, 0, 1).unwrap();
        assert!(ChannelMap::from_values(g, vec![1.0; 4]).is_ok());
        assert!(matches!(ChannelMap::from_values(g, vec![1.0; 3]), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn merge_adds_and_checks_shape() {
        let g = ChannelGrid::new(0, 1, 0, 1).unwrap();
        let mut a = ChannelMap::from_values(g, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = ChannelMap::from_values(g, vec![0.5, 0.0, 1.0, 0.0]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.values(), &[1.5, 2.0, 4.0, 4.0]);

        let other = ChannelMap::zeros(ChannelGrid::new(0, 1, 0, 2).unwrap());
        assert!(matches!(a.merge(&other), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn add_is_bounds_checked() {
        let g = ChannelGrid::new(0, 0, 0, 1).unwrap();
        let mut m = ChannelMap::zeros(g);
        m.add(1, 2.5).unwrap();
        assert_eq!(*m.at(0, 1).unwrap(), 2.5);
        assert!(matches!(m.add(2, 1.0), Err(Error::Geometry(_))));
    }

    #[test]
    fn require_dense_reports_first_hole() {
        let g = ChannelGrid::new(0, 0, 0, 2).unwrap();
        let m = ChannelMap::from_values(g, vec![Some(1.0), None, Some(2.0)]).unwrap();
        assert_eq!(m.n_defined(), 2);
        let err = m.require_dense("numerator").unwrap_err();
        assert!(err.to_string().contains("iphi=1"), "{err}");
    }

    #[test]
    fn calibration_must_be_positive() {
        let g = ChannelGrid::new(0, 0, 0, 2).unwrap();
        assert!(CalibrationMap::new(ChannelMap::from_values(g, vec![1.0, 0.9, 1.1]).unwrap()).is_ok());
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let m = ChannelMap::from_values(g, vec![1.0, bad, 1.0]).unwrap();
            assert!(matches!(CalibrationMap::new(m), Err(Error::Validation(_))), "{bad}");
        }
        let unit = CalibrationMap::unit(g);
        assert_eq!(unit.get(2), Some(1.0));
        assert_eq!(unit.get(3), None);
    }
}
