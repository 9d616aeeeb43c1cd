//! Joint CDF of two independent normals on a rectangular grid, searched by product.

use crate::core::{DistributionPair, EngineError};
use crate::math::normal_cdf;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GridPoint {
    pub x1: f64,
    pub x2: f64,
    /// `x1 * x2`.
    pub product: f64,
    /// `P(X1 <= x1, X2 <= x2)`.
    pub cdf: f64,
}

/// `n x n` grid over `x1_range x x2_range`, `x1` varying fastest.
///
/// # Examples
/// ```rust
/// use normprod::analysis::JointCdfGrid;
/// use normprod::core::DistributionPair;
///
/// let pair = DistributionPair::new(15.0, 494.624_f64.sqrt(), 13.856, 0.591_f64.sqrt()).unwrap();
/// let grid = JointCdfGrid::new(&pair, (27.1208, 97.288), (14.2751, 16.7013), 25).unwrap();
/// let hits = grid.closest_below(956.2, 5);
/// assert_eq!(hits.len(), 5);
/// assert!(hits.iter().all(|p| p.product <= 956.2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JointCdfGrid {
    n: usize,
    points: Vec<GridPoint>,
}

fn axis((lo, hi): (f64, f64), n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![lo];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| if i == n - 1 { hi } else { lo + step * i as f64 }).collect()
}

impl JointCdfGrid {
    /// Uses `(mu_x, sigma_x)` for `X1` and `(mu_y, sigma_y)` for `X2`.
    ///
    /// # Errors
    /// [`EngineError::InvalidParameter`] for `n == 0` or a non-finite range.
    pub fn new(
        pair: &DistributionPair,
        x1_range: (f64, f64),
        x2_range: (f64, f64),
        n: usize,
    ) -> Result<Self, EngineError> {
        if n == 0 {
            return Err(EngineError::InvalidParameter("grid needs at least one point".to_string()));
        }
        let finite = [x1_range.0, x1_range.1, x2_range.0, x2_range.1]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(EngineError::InvalidParameter("grid ranges must be finite".to_string()));
        }

        let xs1 = axis(x1_range, n);
        let xs2 = axis(x2_range, n);
        let cdf1: Vec<f64> = xs1.iter().map(|&x| normal_cdf(x, pair.mu_x(), pair.sigma_x())).collect();
        let cdf2: Vec<f64> = xs2.iter().map(|&x| normal_cdf(x, pair.mu_y(), pair.sigma_y())).collect();

        let mut points = Vec::with_capacity(n * n);
        for (&x2, &p2) in xs2.iter().zip(&cdf2) {
            for (&x1, &p1) in xs1.iter().zip(&cdf1) {
                points.push(GridPoint {
                    x1,
                    x2,
                    product: x1 * x2,
                    cdf: p1 * p2,
                });
            }
        }
        Ok(Self { n, points })
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    /// `(i1, i2)` lookup.
    pub fn get(&self, i1: usize, i2: usize) -> Option<&GridPoint> {
        (i1 < self.n && i2 < self.n).then(|| &self.points[i2 * self.n + i1])
    }

    /// Up to `count` points with `product <= value`, nearest first. Ties keep grid order.
    pub fn closest_below(&self, value: f64, count: usize) -> Vec<GridPoint> {
        let mut hits: Vec<GridPoint> = self.points.iter().filter(|p| p.product <= value).copied().collect();
        hits.sort_by(|a, b| (value - a.product).total_cmp(&(value - b.product)));
        hits.truncate(count);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pair() -> DistributionPair {
        DistributionPair::new(0.0, 1.0, 10.0, 2.0).unwrap()
    }

    #[test]
    fn cdf_is_product_of_marginals() {
        let grid = JointCdfGrid::new(&pair(), (-2.0, 2.0), (6.0, 14.0), 5).unwrap();
        assert_eq!(grid.points().len(), 25);
        let p = grid.get(2, 2).unwrap();
        assert_eq!((p.x1, p.x2), (0.0, 10.0));
        assert_relative_eq!(p.cdf, 0.25, epsilon = 1e-15);
        let corner = grid.get(4, 4).unwrap();
        assert_relative_eq!(corner.cdf, normal_cdf(2.0, 0.0, 1.0) * normal_cdf(14.0, 10.0, 2.0));
        assert!(grid.get(5, 0).is_none());
    }

    #[test]
    fn closest_below_orders_by_gap() {
        let grid = JointCdfGrid::new(&pair(), (-2.0, 2.0), (6.0, 14.0), 5).unwrap();
        let hits = grid.closest_below(10.0, 3);
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|p| p.product <= 10.0));
        assert!(hits.windows(2).all(|w| w[0].product >= w[1].product));
        assert_eq!(hits[0].product, 10.0);

        assert!(grid.closest_below(-1_000.0, 3).is_empty());
    }

    #[test]
    fn rejects_empty_or_unbounded_grid() {
        assert!(JointCdfGrid::new(&pair(), (0.0, 1.0), (0.0, 1.0), 0).is_err());
        assert!(JointCdfGrid::new(&pair(), (0.0, f64::INFINITY), (0.0, 1.0), 3).is_err());
    }
}
