//! Pull computation and multiplicative IC update.

use eop_core::{CalibrationMap, Error, PartialMap, Result, SumMap};

/// Output of [`combine`]. Channels with a zero denominator are `None` in both maps.
#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    /// `numerator / denominator`.
    pub pull: PartialMap,
    /// `prior * pull` (or `pull` without a prior).
    pub updated: PartialMap,
}

impl Combined {
    /// Number of channels with statistics.
    pub fn n_defined(&self) -> usize {
        self.pull.n_defined()
    }

    /// Turn the updated map into the prior of the next pass.
    ///
    /// Undefined channels keep their `fallback` value, or 1.0 without a fallback.
    pub fn into_calibration(self, fallback: Option<&CalibrationMap>) -> Result<CalibrationMap> {
        let grid = self.updated.grid();
        if let Some(f) = fallback {
            f.as_map().ensure_grid(grid, "calibration fallback")?;
        }
        let values = self
            .updated
            .iter()
            .map(|(index, v)| match v {
                Some(x) => *x,
                None => fallback.and_then(|f| f.get(index)).unwrap_or(1.0),
            })
            .collect();
        CalibrationMap::new(SumMap::from_values(grid, values)?)
    }
}

/// Derive the per-channel pull and the updated calibration.
///
/// Pure function of its inputs: nothing is carried over from earlier runs. The
/// numerator and denominator may be sums of several independent passes.
pub fn combine(
    numerator: &SumMap,
    denominator: &SumMap,
    prior: Option<&CalibrationMap>,
) -> Result<Combined> {
    let grid = numerator.grid();
    denominator.ensure_grid(grid, "denominator vs numerator")?;
    if let Some(p) = prior {
        p.as_map().ensure_grid(grid, "prior IC vs numerator")?;
    }

    let mut pull = Vec::with_capacity(grid.n_channels());
    let mut updated = Vec::with_capacity(grid.n_channels());
    for (index, (&num, &den)) in numerator.values().iter().zip(denominator.values()).enumerate() {
        if den == 0.0 {
            pull.push(None);
            updated.push(None);
            continue;
        }
        let r = num / den;
        let ic = match prior {
            Some(p) => p.get(index).ok_or_else(|| {
                Error::Geometry(format!("no prior constant for channel index {index}"))
            })?,
            None => 1.0,
        };
        pull.push(Some(r));
        updated.push(Some(ic * r));
    }

    let combined = Combined {
        pull: PartialMap::from_values(grid, pull)?,
        updated: PartialMap::from_values(grid, updated)?,
    };
    tracing::debug!(
        channels = grid.n_channels(),
        defined = combined.n_defined(),
        prior = prior.is_some(),
        "combined pull"
    );
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use eop_core::{ChannelGrid, ChannelMap};

    fn grid() -> ChannelGrid {
        ChannelGrid::new(1, 2, 1, 2).unwrap()
    }

    fn sums() -> (SumMap, SumMap) {
        let g = grid();
        let num = ChannelMap::from_values(g, vec![0.18, 0.0, 3.0, 0.0]).unwrap();
        let den = ChannelMap::from_values(g, vec![0.2, 0.0, 2.5, 1.0]).unwrap();
        (num, den)
    }

    #[test]
    fn pull_and_update_with_prior() {
        let (num, den) = sums();
        let prior =
            CalibrationMap::new(ChannelMap::from_values(grid(), vec![2.0, 1.0, 0.5, 1.5]).unwrap()).unwrap();
        let c = combine(&num, &den, Some(&prior)).unwrap();

        assert_relative_eq!(c.pull.values()[0].unwrap(), 0.9, epsilon = 1e-15);
        assert_relative_eq!(c.updated.values()[0].unwrap(), 1.8, epsilon = 1e-15);
        assert_relative_eq!(c.pull.values()[2].unwrap(), 1.2, epsilon = 1e-15);
        assert_relative_eq!(c.updated.values()[2].unwrap(), 0.6, epsilon = 1e-15);
        assert_eq!(c.pull.values()[3], Some(0.0));
    }

    #[test]
    fn zero_denominator_is_undefined() {
        let (num, den) = sums();
        let c = combine(&num, &den, None).unwrap();
        assert_eq!(c.pull.values()[1], None);
        assert_eq!(c.updated.values()[1], None);
        assert_eq!(c.n_defined(), 3);
    }

    #[test]
    fn no_prior_equals_unit_prior() {
        let (num, den) = sums();
        let unit = CalibrationMap::unit(grid());
        assert_eq!(combine(&num, &den, None).unwrap(), combine(&num, &den, Some(&unit)).unwrap());
    }

    #[test]
    fn recombine_is_idempotent() {
        let (num, den) = sums();
        let prior = CalibrationMap::unit(grid());
        let a = combine(&num, &den, Some(&prior)).unwrap();
        let b = combine(&num, &den, Some(&prior)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let (num, _) = sums();
        let other = SumMap::zeros(ChannelGrid::new(1, 3, 1, 2).unwrap());
        assert!(matches!(combine(&num, &other, None), Err(Error::ShapeMismatch(_))));
        let prior = CalibrationMap::unit(ChannelGrid::new(1, 3, 1, 2).unwrap());
        let (num, den) = sums();
        assert!(matches!(combine(&num, &den, Some(&prior)), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn into_calibration_fills_holes_from_fallback() {
        let g = ChannelGrid::new(0, 0, 0, 2).unwrap();
        let num = ChannelMap::from_values(g, vec![1.1, 0.0, 0.9]).unwrap();
        let den = ChannelMap::from_values(g, vec![1.0, 0.0, 1.0]).unwrap();
        let prior = CalibrationMap::new(ChannelMap::from_values(g, vec![1.0, 0.7, 2.0]).unwrap()).unwrap();

        let next = combine(&num, &den, Some(&prior)).unwrap().into_calibration(Some(&prior)).unwrap();
        assert_relative_eq!(next.get(0).unwrap(), 1.1, epsilon = 1e-15);
        assert_eq!(next.get(1), Some(0.7));
        assert_relative_eq!(next.get(2).unwrap(), 1.8, epsilon = 1e-15);

        let bare = combine(&num, &den, None).unwrap().into_calibration(None).unwrap();
        assert_eq!(bare.get(1), Some(1.0));
    }

    #[test]
    fn into_calibration_rejects_non_positive_update() {
        let g = ChannelGrid::new(0, 0, 0, 0).unwrap();
        let num = ChannelMap::from_values(g, vec![0.0]).unwrap();
        let den = ChannelMap::from_values(g, vec![1.0]).unwrap();
        let err = combine(&num, &den, None).unwrap().into_calibration(None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
