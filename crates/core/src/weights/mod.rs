//! Spatial weights for flow statistics
//!
//! Statistics only see the [`SpatialWeights`] capability: a weight for every
//! ordered pair plus the aggregate moments s0, s1 and s2. [`DenseWeights`] is
//! the in-memory provider backed by an `n x n` matrix.
//!
//! ```text
//! s0 = Σi Σj wij
//! s1 = ½ Σi Σj (wij + wji)²
//! s2 = Σi (Σj wij + Σj wji)²
//! ```

use std::fmt;
use std::str::FromStr;

use geo_types::Coord;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vector::check_permutation;

/// Aggregate moments of a weights matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightMoments {
    pub s0: f64,
    pub s1: f64,
    pub s2: f64,
}

impl WeightMoments {
    /// Compute s0, s1 and s2 from a square matrix
    pub fn from_matrix(w: &Array2<f64>) -> Self {
        let s0 = w.sum();
        let s1 = 0.5 * (w + &w.t()).mapv(|x| x * x).sum();
        let totals: Array1<f64> = w.sum_axis(Axis(1)) + w.sum_axis(Axis(0));
        let s2 = totals.mapv(|x| x * x).sum();
        Self { s0, s1, s2 }
    }
}

/// Capability consumed by the statistics.
///
/// Row and column `i` refer to element `i` of the sample the weights are used
/// with.
pub trait SpatialWeights {
    /// Number of elements
    fn n(&self) -> usize;

    /// Weight of the ordered pair `(i, j)`
    fn weight(&self, i: usize, j: usize) -> f64;

    /// Aggregate moments s0, s1, s2
    fn moments(&self) -> WeightMoments;

    fn s0(&self) -> f64 {
        self.moments().s0
    }

    fn s1(&self) -> f64 {
        self.moments().s1
    }

    fn s2(&self) -> f64 {
        self.moments().s2
    }

    /// Check dimension against `n`, a zero diagonal and non-negative finite weights
    fn validate(&self, n: usize) -> Result<()> {
        if self.n() != n {
            return Err(Error::InvalidWeights(format!(
                "weights cover {} elements, sample has {}",
                self.n(),
                n
            )));
        }
        for i in 0..n {
            for j in 0..n {
                let w = self.weight(i, j);
                if !w.is_finite() || w < 0.0 {
                    return Err(Error::InvalidWeights(format!(
                        "weight ({}, {}) = {} is not a non-negative finite number",
                        i, j, w
                    )));
                }
                if i == j && w != 0.0 {
                    return Err(Error::InvalidWeights(format!(
                        "diagonal weight ({}, {}) = {} must be zero",
                        i, i, w
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Weights transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightTransform {
    /// `B`: every positive weight becomes 1
    Binary,
    /// `R`: each row sums to 1
    #[default]
    Row,
    /// `D`: all weights sum to 1
    Doubly,
    /// `U`: weights as supplied
    Untransformed,
    /// `V`: variance-stabilizing
    VarianceStabilizing,
}

impl WeightTransform {
    /// Single-letter code
    pub fn code(&self) -> &'static str {
        match self {
            WeightTransform::Binary => "B",
            WeightTransform::Row => "R",
            WeightTransform::Doubly => "D",
            WeightTransform::Untransformed => "U",
            WeightTransform::VarianceStabilizing => "V",
        }
    }

    /// Apply the transform to an untransformed matrix
    pub fn apply(&self, w: &Array2<f64>) -> Array2<f64> {
        match self {
            WeightTransform::Untransformed => w.clone(),
            WeightTransform::Binary => w.mapv(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            WeightTransform::Row => {
                let mut out = w.clone();
                for mut row in out.rows_mut() {
                    let sum = row.sum();
                    // Islands keep an all-zero row
                    if sum > 0.0 {
                        row /= sum;
                    }
                }
                out
            }
            WeightTransform::Doubly => {
                let s0 = w.sum();
                if s0 > 0.0 { w / s0 } else { w.clone() }
            }
            WeightTransform::VarianceStabilizing => {
                let n = w.nrows() as f64;
                let mut out = w.clone();
                for mut row in out.rows_mut() {
                    let q = row.mapv(|x| x * x).sum().sqrt();
                    if q > 0.0 {
                        row /= q;
                    }
                }
                let total = out.sum();
                if total > 0.0 {
                    out *= n / total;
                }
                out
            }
        }
    }
}

impl fmt::Display for WeightTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for WeightTransform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "B" => Ok(WeightTransform::Binary),
            "R" => Ok(WeightTransform::Row),
            "D" => Ok(WeightTransform::Doubly),
            "U" => Ok(WeightTransform::Untransformed),
            "V" => Ok(WeightTransform::VarianceStabilizing),
            _ => Err(Error::InvalidParameter {
                name: "transform",
                value: s.to_string(),
                reason: "expected one of B, R, D, U, V".into(),
            }),
        }
    }
}

/// Parameters for inverse-distance weights
#[derive(Debug, Clone)]
pub struct InverseDistanceParams {
    /// Distance exponent (default: -1.5)
    pub exponent: f64,
    /// Pairs farther apart than this get zero weight.
    /// `None` connects every pair.
    pub threshold: Option<f64>,
    /// Transform applied after construction
    pub transform: WeightTransform,
}

impl Default for InverseDistanceParams {
    fn default() -> Self {
        Self {
            exponent: -1.5,
            threshold: None,
            transform: WeightTransform::Row,
        }
    }
}

/// Dense `n x n` spatial weights.
///
/// Keeps the untransformed matrix so that [`DenseWeights::transformed`] always
/// starts from the original weights. Values are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseWeights {
    original: Array2<f64>,
    matrix: Array2<f64>,
    moments: WeightMoments,
    transform: WeightTransform,
}

impl DenseWeights {
    /// Wrap a square matrix as untransformed weights.
    ///
    /// Only the shape is checked here; entries are checked by
    /// [`SpatialWeights::validate`] when a statistic consumes them.
    pub fn from_matrix(matrix: Array2<f64>) -> Result<Self> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(Error::InvalidWeights(format!(
                "weight matrix must be square, got {}x{}",
                rows, cols
            )));
        }
        let moments = WeightMoments::from_matrix(&matrix);
        Ok(Self {
            original: matrix.clone(),
            matrix,
            moments,
            transform: WeightTransform::Untransformed,
        })
    }

    /// Inverse-distance weights `wij = dij^exponent` between points
    pub fn inverse_distance(points: &[Coord<f64>], params: &InverseDistanceParams) -> Result<Self> {
        if !params.exponent.is_finite() {
            return Err(Error::InvalidParameter {
                name: "exponent",
                value: params.exponent.to_string(),
                reason: "must be finite".into(),
            });
        }
        if let Some(t) = params.threshold
            && !(t > 0.0)
        {
            return Err(Error::InvalidParameter {
                name: "threshold",
                value: t.to_string(),
                reason: "must be > 0".into(),
            });
        }

        let n = points.len();
        let mut w = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let delta = points[i] - points[j];
                let d = delta.x.hypot(delta.y);
                if d == 0.0 {
                    return Err(Error::InvalidWeights(format!(
                        "points {} and {} coincide; inverse-distance weight undefined",
                        i, j
                    )));
                }
                if params.threshold.is_some_and(|t| d > t) {
                    continue;
                }
                let wij = d.powf(params.exponent);
                w[(i, j)] = wij;
                w[(j, i)] = wij;
            }
        }

        Ok(Self::from_matrix(w)?.transformed(params.transform))
    }

    /// New weights with `transform` applied to the original matrix
    pub fn transformed(&self, transform: WeightTransform) -> Self {
        let matrix = transform.apply(&self.original);
        let moments = WeightMoments::from_matrix(&matrix);
        Self {
            original: self.original.clone(),
            matrix,
            moments,
            transform,
        }
    }

    /// Relabel rows and columns jointly: new `(k, l)` is old `(order[k], order[l])`
    pub fn permuted(&self, order: &[usize]) -> Result<Self> {
        check_permutation(order, self.n())?;
        let permute = |m: &Array2<f64>| {
            let n = order.len();
            Array2::from_shape_fn((n, n), |(k, l)| m[(order[k], order[l])])
        };
        let matrix = permute(&self.matrix);
        let moments = WeightMoments::from_matrix(&matrix);
        Ok(Self {
            original: permute(&self.original),
            matrix,
            moments,
            transform: self.transform,
        })
    }

    /// Current (transformed) matrix
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn transform(&self) -> WeightTransform {
        self.transform
    }
}

impl SpatialWeights for DenseWeights {
    fn n(&self) -> usize {
        self.matrix.nrows()
    }

    #[inline]
    fn weight(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    fn moments(&self) -> WeightMoments {
        self.moments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn square() -> Vec<Coord<f64>> {
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 1.0, y: 1.0 },
        ]
    }

    #[test]
    fn test_moments_asymmetric() {
        let w = array![[0.0, 1.0, 0.0], [0.0, 0.0, 2.0], [0.0, 0.0, 0.0]];
        let m = WeightMoments::from_matrix(&w);
        assert_relative_eq!(m.s0, 3.0);
        // (w01 + w10)² counted twice: 0.5 * (1 + 1 + 4 + 4)
        assert_relative_eq!(m.s1, 5.0);
        // totals: row + col = [1, 3, 2]
        assert_relative_eq!(m.s2, 14.0);
    }

    #[test]
    fn test_row_standardized() {
        let w = DenseWeights::inverse_distance(&square(), &InverseDistanceParams::default()).unwrap();
        assert_eq!(w.transform(), WeightTransform::Row);
        for row in w.matrix().rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(w.s0(), 4.0, epsilon = 1e-12);
        assert_eq!(w.weight(2, 2), 0.0);
    }

    #[test]
    fn test_inverse_distance_exponent() {
        let params = InverseDistanceParams {
            exponent: -2.0,
            threshold: None,
            transform: WeightTransform::Untransformed,
        };
        let w = DenseWeights::inverse_distance(&square(), &params).unwrap();
        assert_relative_eq!(w.weight(0, 1), 1.0);
        assert_relative_eq!(w.weight(0, 3), 0.5, epsilon = 1e-12);
        assert_relative_eq!(w.weight(3, 0), w.weight(0, 3));
    }

    #[test]
    fn test_threshold_drops_pairs() {
        let params = InverseDistanceParams {
            exponent: -1.0,
            threshold: Some(1.0),
            transform: WeightTransform::Binary,
        };
        let w = DenseWeights::inverse_distance(&square(), &params).unwrap();
        assert_eq!(w.weight(0, 3), 0.0);
        assert_eq!(w.weight(0, 1), 1.0);
        assert_relative_eq!(w.s0(), 8.0);
    }

    #[test]
    fn test_coincident_points() {
        let pts = vec![Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 1.0 }];
        let result = DenseWeights::inverse_distance(&pts, &InverseDistanceParams::default());
        assert!(matches!(result, Err(Error::InvalidWeights(_))));
    }

    #[test]
    fn test_doubly_and_variance_stabilizing() {
        let base = DenseWeights::inverse_distance(
            &square(),
            &InverseDistanceParams {
                transform: WeightTransform::Untransformed,
                ..Default::default()
            },
        )
        .unwrap();

        let d = base.transformed(WeightTransform::Doubly);
        assert_relative_eq!(d.s0(), 1.0, epsilon = 1e-12);

        let v = base.transformed(WeightTransform::VarianceStabilizing);
        assert_relative_eq!(v.s0(), 4.0, epsilon = 1e-12);

        // Transforms always start from the original matrix
        let back = d.transformed(WeightTransform::Untransformed);
        assert_eq!(back.matrix(), base.matrix());
    }

    #[test]
    fn test_transform_codes() {
        for code in ["B", "r", "D", "u", "V"] {
            let t: WeightTransform = code.parse().unwrap();
            assert_eq!(t.code(), code.to_uppercase());
        }
        assert!("X".parse::<WeightTransform>().is_err());
    }

    #[test]
    fn test_validate() {
        let ok = DenseWeights::from_matrix(array![[0.0, 1.0], [1.0, 0.0]]).unwrap();
        assert!(ok.validate(2).is_ok());
        assert!(matches!(ok.validate(3), Err(Error::InvalidWeights(_))));

        let diag = DenseWeights::from_matrix(array![[1.0, 1.0], [1.0, 0.0]]).unwrap();
        assert!(matches!(diag.validate(2), Err(Error::InvalidWeights(_))));

        let neg = DenseWeights::from_matrix(array![[0.0, -1.0], [1.0, 0.0]]).unwrap();
        assert!(matches!(neg.validate(2), Err(Error::InvalidWeights(_))));

        assert!(DenseWeights::from_matrix(Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_permuted_weights() {
        let w = DenseWeights::from_matrix(array![
            [0.0, 1.0, 2.0],
            [3.0, 0.0, 4.0],
            [5.0, 6.0, 0.0]
        ])
        .unwrap();
        let p = w.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(p.weight(0, 1), 5.0);
        assert_eq!(p.weight(1, 2), 1.0);
        assert_relative_eq!(p.s0(), w.s0());
        assert_relative_eq!(p.s1(), w.s1());
        assert_relative_eq!(p.s2(), w.s2());
    }
}
