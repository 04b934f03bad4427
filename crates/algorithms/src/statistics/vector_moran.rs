//! Global Moran's I for origin-destination flow vectors
//!
//! Generalizes Moran's I from a scalar variable to the displacement of each
//! flow. Displacements are detrended by the mean displacement and split into
//! orthogonal components:
//!
//! ```text
//! ui  = (dxi - oxi) - (mean(dx) - mean(ox))
//! vi  = (dyi - oyi) - (mean(dy) - mean(oy))
//! zij = ui·uj + vi·vj
//! I   = (n / s0) · Σi Σj wij·zij / Σi (ui² + vi²)
//! ```
//!
//! Inference is analytical (normality and randomization assumptions) and,
//! optionally, by permutation: the vectors are shuffled over fixed weights and
//! I is recomputed to build an empirical null distribution.
//!
//! Reference:
//! Cliff, A.D. & Ord, J.K. (1981). Spatial Processes: Models and Applications. Pion.

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, warn};

use odflow_core::{Algorithm, DenseWeights, Error, Result, SpatialWeights, VectorSample};
use odflow_parallel::{CancelToken, ParallelStrategy, ProcessingMode};

/// Smallest sample for which the randomization variance is defined
pub const MIN_SAMPLE_SIZE: usize = 4;

/// Trials per batch; cancellation and progress are checked between batches
const PERMUTATION_BATCH: usize = 256;

/// Parameters for vector Moran's I
#[derive(Debug, Clone)]
pub struct MoranParams {
    /// Number of random permutations (default: 999). 0 disables permutation inference.
    pub permutations: usize,
    /// Double the analytical p-values (default: true)
    pub two_tailed: bool,
    /// Base seed for the permutation draws. `None` seeds from the thread RNG.
    pub seed: Option<u64>,
    /// How permutation batches are executed
    pub mode: ProcessingMode,
}

impl Default for MoranParams {
    fn default() -> Self {
        Self {
            permutations: 999,
            two_tailed: true,
            seed: None,
            mode: ProcessingMode::Parallel,
        }
    }
}

/// Quantities derived once from the sample and the weights
#[derive(Debug, Clone)]
pub struct Moments {
    pub n: usize,
    /// Detrended x displacement per vector
    pub u: Vec<f64>,
    /// Detrended y displacement per vector
    pub v: Vec<f64>,
    /// Pairwise similarity `zij = ui·uj + vi·vj`
    pub z: Array2<f64>,
    /// `Σ (ui² + vi²)`
    pub uv2ss: f64,
    /// `(mean(u⁴) + mean(v⁴)) / (mean(u²) + mean(v²))²`
    pub kurtosis: f64,
    pub s0: f64,
    pub s1: f64,
    pub s2: f64,
    /// Expected I, `-1 / (n - 1)`
    pub ei: f64,
    pub vi_norm: f64,
    pub se_i_norm: f64,
    pub vi_rand: f64,
    pub se_i_rand: f64,
}

/// Outcome of a permutation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PermutationStatus {
    /// Every requested trial ran
    Complete,
    /// Aborted early; statistics cover the completed trials only
    Cancelled { completed: usize },
}

/// Empirical null distribution and simulation-based inference
#[derive(Debug, Clone, Serialize)]
pub struct PermutationInference {
    /// Requested number of trials
    pub permutations: usize,
    /// I for each completed trial, in trial order
    pub sim: Vec<f64>,
    pub ei_sim: f64,
    pub vi_sim: f64,
    pub se_i_sim: f64,
    pub z_sim: f64,
    /// Pseudo p-value `(larger + 1) / (trials + 1)`
    pub p_sim: f64,
    /// One-tailed normal p-value of `z_sim`
    pub p_z_sim: f64,
    pub status: PermutationStatus,
}

/// Result of vector Moran's I
#[derive(Debug, Clone, Serialize)]
pub struct VectorMoranResult {
    pub n: usize,
    /// Observed statistic
    pub i: f64,
    /// Expected I under the null
    pub ei: f64,
    pub vi_norm: f64,
    pub se_i_norm: f64,
    pub z_norm: f64,
    pub p_norm: f64,
    pub vi_rand: f64,
    pub se_i_rand: f64,
    pub z_rand: f64,
    pub p_rand: f64,
    pub two_tailed: bool,
    /// Present when `permutations > 0`
    pub simulation: Option<PermutationInference>,
}

/// Vector Moran's I algorithm
#[derive(Debug, Clone, Default)]
pub struct VectorMoran;

impl Algorithm for VectorMoran {
    type Input = (VectorSample, DenseWeights);
    type Output = VectorMoranResult;
    type Params = MoranParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "VectorMoran"
    }

    fn description(&self) -> &'static str {
        "Global Moran's I spatial autocorrelation of origin-destination flow vectors"
    }

    fn execute(&self, (sample, weights): Self::Input, params: Self::Params) -> Result<Self::Output> {
        vector_morans_i(&sample, &weights, params)
    }
}

/// Compute vector Moran's I with analytical and permutation inference.
///
/// # Arguments
/// * `sample` - Observed flow vectors (n ≥ 4)
/// * `weights` - Spatial weights over the same n vectors, in the same order
/// * `params` - Permutation count, tails, seed and execution mode
///
/// # Errors
/// * `InsufficientSampleSize` for n ≤ 3
/// * `InvalidWeights` if the weights do not match the sample
/// * `DegenerateStatistic` if all displacements are equal, s0 is zero, or
///   every permutation yields the same I
/// * `NumericError` if a variance is zero or not finite
pub fn vector_morans_i<W>(sample: &VectorSample, weights: &W, params: MoranParams) -> Result<VectorMoranResult>
where
    W: SpatialWeights + Sync + ?Sized,
{
    vector_morans_i_with_control(sample, weights, params, &CancelToken::new(), |_| {})
}

/// Like [`vector_morans_i`], with cooperative cancellation and progress.
///
/// `cancel` is checked before each batch of trials; `on_progress` receives the
/// number of completed trials after each batch. A cancelled run returns the
/// partial null distribution with [`PermutationStatus::Cancelled`], or
/// `Error::Cancelled` if no trial completed.
pub fn vector_morans_i_with_control<W, F>(
    sample: &VectorSample,
    weights: &W,
    params: MoranParams,
    cancel: &CancelToken,
    mut on_progress: F,
) -> Result<VectorMoranResult>
where
    W: SpatialWeights + Sync + ?Sized,
    F: FnMut(usize),
{
    let m = moments(sample, weights)?;
    let i = observed_statistic(&m, weights)?;

    let z_norm = (i - m.ei) / m.se_i_norm;
    let z_rand = (i - m.ei) / m.se_i_rand;

    let simulation = if params.permutations > 0 {
        Some(permutation_inference(i, &m, weights, &params, cancel, &mut on_progress)?)
    } else {
        None
    };

    Ok(VectorMoranResult {
        n: m.n,
        i,
        ei: m.ei,
        vi_norm: m.vi_norm,
        se_i_norm: m.se_i_norm,
        z_norm,
        p_norm: normal_p_value(z_norm, params.two_tailed),
        vi_rand: m.vi_rand,
        se_i_rand: m.se_i_rand,
        z_rand,
        p_rand: normal_p_value(z_rand, params.two_tailed),
        two_tailed: params.two_tailed,
        simulation,
    })
}

/// Detrended displacements, similarity matrix, expected value and variances.
///
/// Fails with `NumericError` when either analytical variance is zero or not
/// finite, so the returned standard errors are always usable.
pub fn moments<W>(sample: &VectorSample, weights: &W) -> Result<Moments>
where
    W: SpatialWeights + ?Sized,
{
    let n = sample.len();
    if n < MIN_SAMPLE_SIZE {
        return Err(Error::InsufficientSampleSize { n, min: MIN_SAMPLE_SIZE });
    }
    weights.validate(n)?;

    let insufficient = || Error::InsufficientSampleSize { n, min: MIN_SAMPLE_SIZE };
    let mean_shift = sample.mean_destination().ok_or_else(insufficient)?
        - sample.mean_origin().ok_or_else(insufficient)?;

    let (u, v): (Vec<f64>, Vec<f64>) = sample
        .iter()
        .map(|f| {
            let d = f.displacement();
            (d.x - mean_shift.x, d.y - mean_shift.y)
        })
        .unzip();

    let z = Array2::from_shape_fn((n, n), |(i, j)| u[i] * u[j] + v[i] * v[j]);
    let uv2ss: f64 = u.iter().zip(&v).map(|(a, b)| a * a + b * b).sum();

    // Rounding in the detrending leaves at most a few ulps per component
    let raw_ss: f64 = sample
        .iter()
        .map(|f| {
            let d = f.displacement();
            d.x * d.x + d.y * d.y
        })
        .sum();
    if uv2ss <= (8.0 * f64::EPSILON).powi(2) * raw_ss {
        return Err(Error::DegenerateStatistic(
            "all vectors have the same displacement".into(),
        ));
    }

    let wm = weights.moments();
    let (s0, s1, s2) = (wm.s0, wm.s1, wm.s2);
    if s0 <= 0.0 {
        return Err(Error::DegenerateStatistic("weights sum to zero (s0 = 0)".into()));
    }

    let nf = n as f64;
    let a2 = u.iter().map(|x| x * x).sum::<f64>() / nf;
    let b2 = v.iter().map(|x| x * x).sum::<f64>() / nf;
    let a4 = u.iter().map(|x| x.powi(4)).sum::<f64>() / nf;
    let b4 = v.iter().map(|x| x.powi(4)).sum::<f64>() / nf;
    let m2 = a2 + b2;
    let kurtosis = (a4 + b4) / (m2 * m2);

    let ei = -1.0 / (nf - 1.0);
    let s02 = s0 * s0;

    let vi_norm = (nf * nf * s1 - nf * s2 + 3.0 * s02) / ((nf - 1.0) * (nf + 1.0) * s02) - ei * ei;

    let n1 = nf * ((nf * nf - 3.0 * nf + 3.0) * s1 - nf * s2 + 3.0 * s02);
    let n2 = kurtosis * ((nf * nf - nf) * s1 - 2.0 * nf * s2 + 6.0 * s02);
    let d = (nf - 1.0) * (nf - 2.0) * (nf - 3.0);
    let vi_rand = (n1 - n2) / (d * s02) - ei * ei;

    debug!(n, s0, s1, s2, uv2ss, kurtosis, vi_norm, vi_rand, "vector moran moments");
    let se_i_norm = checked_se("normality", vi_norm, ei)?;
    let se_i_rand = checked_se("randomization", vi_rand, ei)?;

    Ok(Moments {
        n,
        u,
        v,
        z,
        uv2ss,
        kurtosis,
        s0,
        s1,
        s2,
        ei,
        vi_norm,
        se_i_norm,
        vi_rand,
        se_i_rand,
    })
}

/// Observed I from precomputed moments.
pub fn observed_statistic<W>(m: &Moments, weights: &W) -> Result<f64>
where
    W: SpatialWeights + ?Sized,
{
    if m.uv2ss <= 0.0 || m.s0 <= 0.0 {
        return Err(Error::DegenerateStatistic(format!(
            "zero denominator (uv2ss = {}, s0 = {})",
            m.uv2ss, m.s0
        )));
    }
    let identity: Vec<usize> = (0..m.n).collect();
    let i = statistic_for_order(m, weights, &identity);
    if !i.is_finite() {
        return Err(Error::NumericError(format!("observed I is {}", i)));
    }
    Ok(i)
}

/// p-value of a standard normal score.
///
/// Upper tail for positive `z`, lower tail otherwise; doubled when
/// `two_tailed`.
pub fn normal_p_value(z: f64, two_tailed: bool) -> f64 {
    let p = if z > 0.0 { 1.0 - normal_cdf(z) } else { normal_cdf(z) };
    if two_tailed { 2.0 * p } else { p }
}

/// I with vector `order[i]` placed at index `i`
fn statistic_for_order<W>(m: &Moments, weights: &W, order: &[usize]) -> f64
where
    W: SpatialWeights + ?Sized,
{
    let mut lag_sum = 0.0;
    for (i, &oi) in order.iter().enumerate() {
        for (j, &oj) in order.iter().enumerate() {
            let w = weights.weight(i, j);
            if w != 0.0 {
                lag_sum += w * m.z[(oi, oj)];
            }
        }
    }
    (m.n as f64 / m.s0) * lag_sum / m.uv2ss
}

/// Standard error from a variance, rejecting values lost to cancellation
fn checked_se(kind: &str, vi: f64, ei: f64) -> Result<f64> {
    // vi is a difference of two terms of magnitude ~ei²
    if !vi.is_finite() || vi <= 16.0 * f64::EPSILON * ei * ei {
        return Err(Error::NumericError(format!(
            "{} variance of I is {}; standard error undefined",
            kind, vi
        )));
    }
    Ok(vi.sqrt())
}

fn permutation_inference<W, F>(
    i: f64,
    m: &Moments,
    weights: &W,
    params: &MoranParams,
    cancel: &CancelToken,
    on_progress: &mut F,
) -> Result<PermutationInference>
where
    W: SpatialWeights + Sync + ?Sized,
    F: FnMut(usize),
{
    let total = params.permutations;
    let base_seed = params.seed.unwrap_or_else(rand::random);
    let executor = params.mode.executor()?;
    let mut sim = Vec::with_capacity(total);

    let mut start = 0;
    while start < total {
        if cancel.is_cancelled() {
            break;
        }
        let end = (start + PERMUTATION_BATCH).min(total);
        let batch = executor.par_map(start..end, |k| {
            let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(k as u64));
            let mut order: Vec<usize> = (0..m.n).collect();
            order.shuffle(&mut rng);
            statistic_for_order(m, weights, &order)
        })?;
        sim.extend(batch);
        start = end;
        debug!(completed = start, total, "permutation batch done");
        on_progress(start);
    }

    let completed = sim.len();
    if completed == 0 {
        return Err(Error::Cancelled);
    }
    let status = if completed < total {
        warn!(completed, total, "permutation run cancelled, using partial null distribution");
        PermutationStatus::Cancelled { completed }
    } else {
        PermutationStatus::Complete
    };

    summarize_null(i, sim, total, null_tolerance(m), status)
}

/// Spread below which the permuted statistics are considered identical.
///
/// Bounds the summation error of `statistic_for_order`, which reorders the
/// same n² products for every trial.
fn null_tolerance(m: &Moments) -> f64 {
    let nf = m.n as f64;
    let max_z = m.z.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    4.0 * nf * nf * f64::EPSILON * nf * max_z / m.uv2ss
}

fn summarize_null(
    i: f64,
    sim: Vec<f64>,
    permutations: usize,
    tolerance: f64,
    status: PermutationStatus,
) -> Result<PermutationInference> {
    let count = sim.len();
    let (lo, hi) = sim
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    if hi - lo <= tolerance {
        return Err(Error::DegenerateStatistic(
            "every permutation produced the same statistic".into(),
        ));
    }

    // Ties within summation error count as larger
    let mut larger = sim.iter().filter(|&&x| x >= i - tolerance).count();
    if count - larger < larger {
        larger = count - larger;
    }
    let p_sim = (larger + 1) as f64 / (count + 1) as f64;

    let cf = count as f64;
    let ei_sim = sim.iter().sum::<f64>() / cf;
    let vi_sim = sim.iter().map(|x| (x - ei_sim).powi(2)).sum::<f64>() / cf;
    let se_i_sim = vi_sim.sqrt();
    if !(se_i_sim > 0.0) || !se_i_sim.is_finite() {
        return Err(Error::DegenerateStatistic(format!(
            "standard deviation of the null distribution is {}",
            se_i_sim
        )));
    }
    let z_sim = (i - ei_sim) / se_i_sim;

    Ok(PermutationInference {
        permutations,
        sim,
        ei_sim,
        vi_sim,
        se_i_sim,
        z_sim,
        p_sim,
        p_z_sim: normal_p_value(z_sim, false),
        status,
    })
}

/// Approximate CDF of standard normal distribution
/// Uses Abramowitz & Stegun approximation (error < 7.5e-8)
fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 { return 0.0; }
    if x > 8.0 { return 1.0; }

    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d * (-x * x / 2.0).exp()
        * (t * (0.3193815
            + t * (-0.3565638
                + t * (1.781478
                    + t * (-1.821256
                        + t * 1.330274)))));

    if x > 0.0 { 1.0 - p } else { p }
}
