//! Component mass balances across the cascade.
//!
//! Stage 0 is the top of the cascade. The top phase of stage `i` flows to
//! stage `i - 1` and the bottom phase to stage `i + 1`, less any side draw.
//! Flow matrices hold stages by row and chemicals by column.

use nalgebra::DMatrix;

use crate::tridiagonal::{scale, solve_tdma_2d, solve_tdma_2d_careful};

/// Phase ratios at or above this are treated as infinite.
pub const PHASE_RATIO_MAX: f64 = 1e32;

/// Side-draw fractions per stage and the pass-through coefficients derived
/// from them.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSplits {
    /// Fraction of the top phase drawn off at each stage.
    pub top: Vec<f64>,
    /// Fraction of the bottom phase drawn off at each stage.
    pub bottom: Vec<f64>,
    /// Fraction of the top phase passed to the stage above.
    pub asplit_left: Vec<f64>,
    /// Fraction of the bottom phase passed to the stage below.
    pub bsplit_left: Vec<f64>,
    /// `top - 1`
    pub asplit_1: Vec<f64>,
    /// `bottom - 1`
    pub bsplit_1: Vec<f64>,
}

impl StageSplits {
    pub fn new(top: Vec<f64>, bottom: Vec<f64>) -> Self {
        debug_assert_eq!(top.len(), bottom.len());
        let asplit_left = top.iter().map(|s| 1.0 - s).collect();
        let bsplit_left = bottom.iter().map(|s| 1.0 - s).collect();
        let asplit_1 = top.iter().map(|s| s - 1.0).collect();
        let bsplit_1 = bottom.iter().map(|s| s - 1.0).collect();
        Self {
            top,
            bottom,
            asplit_left,
            bsplit_left,
            asplit_1,
            bsplit_1,
        }
    }

    /// No side draws on any of `n` stages.
    pub fn none(n: usize) -> Self {
        Self::new(vec![0.0; n], vec![0.0; n])
    }

    pub fn len(&self) -> usize {
        self.top.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty()
    }
}

/// Row-major flattening of a stage-by-chemical field.
pub fn flatten(m: &DMatrix<f64>) -> Vec<f64> {
    m.transpose().as_slice().to_vec()
}

/// Inverse of [`flatten`].
pub fn unflatten(n_stages: usize, n_chemicals: usize, v: &[f64]) -> DMatrix<f64> {
    DMatrix::from_row_slice(n_stages, n_chemicals, v)
}

/// Ratio of bottoms to top flow per stage and chemical, `1 / (B K)`.
///
/// A non-positive phase ratio sends everything to the bottoms (infinite
/// factor) and a huge one sends everything to the top (zero factor). The
/// flag is false when any factor is infinite, in which case the careful
/// cascade solve must be used.
pub fn bottoms_stripping_factors(phase_ratios: &[f64], k: &DMatrix<f64>) -> (DMatrix<f64>, bool) {
    let (n, m) = k.shape();
    let mut safe = true;
    let mut s = DMatrix::zeros(n, m);
    for i in 0..n {
        let b = phase_ratios[i];
        if b <= 0.0 {
            safe = false;
            s.row_mut(i).fill(f64::INFINITY);
        } else if b >= PHASE_RATIO_MAX {
            s.row_mut(i).fill(0.0);
        } else {
            for j in 0..m {
                let v = 1.0 / (b * k[(i, j)]);
                safe &= v.is_finite();
                s[(i, j)] = v;
            }
        }
    }
    (s, safe)
}

/// Solve the tridiagonal component balances for top-phase flows.
///
/// Row `i`: `(1 + S_i) t_i - asplit_left[i+1] t_{i+1} - bsplit_left[i-1] S_{i-1} t_{i-1} = f_i`.
pub fn top_flow_rates(
    stripping: &DMatrix<f64>,
    feed: &DMatrix<f64>,
    splits: &StageSplits,
    safe: bool,
) -> DMatrix<f64> {
    let (n, m) = stripping.shape();
    if n == 0 {
        return DMatrix::zeros(0, m);
    }
    let b = stripping.map(|s| 1.0 + s);
    let a = DMatrix::from_fn(n - 1, m, |i, j| scale(splits.bsplit_1[i], stripping[(i, j)]));
    let c = &splits.asplit_1[1..n];
    if safe {
        solve_tdma_2d(&a, &b, c, feed)
    } else {
        solve_tdma_2d_careful(&a, &b, c, feed, &splits.bsplit_1[..n - 1])
    }
}

/// Bottom-phase flows implied by `top` without any correction.
pub fn bottom_flow_rates(top: &DMatrix<f64>, feed: &DMatrix<f64>, splits: &StageSplits) -> DMatrix<f64> {
    let (n, m) = top.shape();
    let mut bottom = DMatrix::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            bottom[(i, j)] = stage_bottom(top, &bottom, feed, splits, i, j);
        }
    }
    bottom
}

fn stage_bottom(
    top: &DMatrix<f64>,
    bottom: &DMatrix<f64>,
    feed: &DMatrix<f64>,
    splits: &StageSplits,
    i: usize,
    j: usize,
) -> f64 {
    let n = top.nrows();
    let mut v = feed[(i, j)] - top[(i, j)];
    if i > 0 {
        v += splits.bsplit_left[i - 1] * bottom[(i - 1, j)];
    }
    if i + 1 < n {
        v += splits.asplit_left[i + 1] * top[(i + 1, j)];
    }
    v
}

/// Bottom-phase flows by forward substitution, keeping every flow
/// non-negative.
///
/// A negative bottom flow is clipped to zero. On stages still flagged in
/// `correct` the deficit is also taken out of the top flow so the stage
/// stays balanced; the flag is then cleared and the sweep restarts from
/// stage 0, so each stage is corrected at most once.
pub fn mass_balance(
    top: &mut DMatrix<f64>,
    feed: &DMatrix<f64>,
    splits: &StageSplits,
    correct: &mut [bool],
) -> DMatrix<f64> {
    let (n, m) = top.shape();
    let mut bottom = DMatrix::zeros(n, m);
    'sweep: loop {
        for i in 0..n {
            let mut corrected = false;
            for j in 0..m {
                let mut v = stage_bottom(top, &bottom, feed, splits, i, j);
                if v < 0.0 {
                    if correct[i] {
                        top[(i, j)] += v;
                        corrected = true;
                    }
                    v = 0.0;
                }
                bottom[(i, j)] = v;
            }
            if corrected {
                correct[i] = false;
                continue 'sweep;
            }
        }
        return bottom;
    }
}

/// Per-stage component balance residuals, `in - out`.
pub fn material_errors(
    top: &DMatrix<f64>,
    bottom: &DMatrix<f64>,
    feed: &DMatrix<f64>,
    splits: &StageSplits,
) -> DMatrix<f64> {
    let (n, m) = top.shape();
    DMatrix::from_fn(n, m, |i, j| stage_bottom(top, bottom, feed, splits, i, j) - bottom[(i, j)])
}

/// Flows leaving the cascade: top product, bottom product and side draws,
/// summed per chemical.
pub fn outlet_totals(top: &DMatrix<f64>, bottom: &DMatrix<f64>, splits: &StageSplits) -> Vec<f64> {
    let (n, m) = top.shape();
    (0..m)
        .map(|j| {
            let mut total = top[(0, j)] + bottom[(n - 1, j)];
            for i in 1..n {
                total += splits.top[i] * top[(i, j)];
            }
            for i in 0..n - 1 {
                total += splits.bottom[i] * bottom[(i, j)];
            }
            total
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn uniform(n: usize, m: usize, b: f64, k: f64) -> (Vec<f64>, DMatrix<f64>) {
        (vec![b; n], DMatrix::from_element(n, m, k))
    }

    #[test]
    fn single_stage_flash() {
        let (b, k) = uniform(1, 1, 1.0, 2.0);
        let (s, safe) = bottoms_stripping_factors(&b, &k);
        assert!(safe);
        let feed = DMatrix::from_element(1, 1, 10.0);
        let splits = StageSplits::none(1);
        let mut top = top_flow_rates(&s, &feed, &splits, safe);
        assert!((top[(0, 0)] - 10.0 * 2.0 / 3.0).abs() < 1e-12);
        let bottom = mass_balance(&mut top, &feed, &splits, &mut [true]);
        assert!((bottom[(0, 0)] - 10.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_separation_splits_middle_feed_evenly() {
        let (b, k) = uniform(3, 2, 1.0, 1.0);
        let (s, safe) = bottoms_stripping_factors(&b, &k);
        let mut feed = DMatrix::zeros(3, 2);
        feed[(1, 0)] = 8.0;
        feed[(1, 1)] = 2.0;
        let splits = StageSplits::none(3);
        let top = top_flow_rates(&s, &feed, &splits, safe);
        assert!((top[(0, 0)] - 4.0).abs() < 1e-12);
        assert!((top[(0, 1)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_phase_ratios() {
        let k = DMatrix::from_element(2, 1, 2.0);
        let (s, safe) = bottoms_stripping_factors(&[0.0, 1e40], &k);
        assert!(!safe);
        assert!(s[(0, 0)].is_infinite());
        assert_eq!(s[(1, 0)], 0.0);
    }

    #[test]
    fn all_top_stage_passes_everything_up() {
        let k = DMatrix::from_element(1, 1, 1.0);
        let (s, safe) = bottoms_stripping_factors(&[1e40], &k);
        let feed = DMatrix::from_element(1, 1, 5.0);
        let top = top_flow_rates(&s, &feed, &StageSplits::none(1), safe);
        assert_eq!(top[(0, 0)], 5.0);
    }

    #[test]
    fn correction_keeps_stage_balanced() {
        // stage 0 claims more top flow than it receives
        let feed = DMatrix::from_row_slice(2, 1, &[1.0, 0.0]);
        let mut top = DMatrix::from_row_slice(2, 1, &[3.0, 0.0]);
        let splits = StageSplits::none(2);
        let bottom = mass_balance(&mut top, &feed, &splits, &mut [true, true]);
        assert_eq!(top[(0, 0)], 1.0);
        assert_eq!(bottom[(0, 0)], 0.0);
        let errors = material_errors(&top, &bottom, &feed, &splits);
        assert!(errors.abs().max() < 1e-12);
    }

    #[test]
    fn uncorrected_stage_only_clips() {
        let feed = DMatrix::from_row_slice(2, 1, &[1.0, 0.0]);
        let mut top = DMatrix::from_row_slice(2, 1, &[3.0, 1.0]);
        let bottom = mass_balance(&mut top, &feed, &StageSplits::none(2), &mut [false, false]);
        assert_eq!(top[(0, 0)], 3.0);
        assert_eq!(bottom[(0, 0)], 0.0);
    }

    #[test]
    fn flattening_is_row_major() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let flat = flatten(&m);
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(unflatten(2, 3, &flat), m);
    }

    #[test]
    fn side_draw_coefficients() {
        let splits = StageSplits::new(vec![0.0, 0.25], vec![0.5, 0.0]);
        assert_eq!(splits.asplit_left, vec![1.0, 0.75]);
        assert_eq!(splits.bsplit_1, vec![-0.5, -1.0]);
        assert_eq!(splits.len(), 2);
    }

    proptest! {
        #[test]
        fn cascade_conserves_every_chemical(
            stages in proptest::collection::vec(
                (0.05..20.0f64, 0.1..10.0f64, 0.0..100.0f64, 0.0..0.5f64, 0.0..0.5f64),
                1..8,
            )
        ) {
            let n = stages.len();
            let b: Vec<f64> = stages.iter().map(|s| s.0).collect();
            let k = DMatrix::from_fn(n, 1, |i, _| stages[i].1);
            let feed = DMatrix::from_fn(n, 1, |i, _| stages[i].2);
            let mut top_split: Vec<f64> = stages.iter().map(|s| s.3).collect();
            let mut bottom_split: Vec<f64> = stages.iter().map(|s| s.4).collect();
            top_split[0] = 0.0;
            bottom_split[n - 1] = 0.0;
            let splits = StageSplits::new(top_split, bottom_split);
            let (s, safe) = bottoms_stripping_factors(&b, &k);
            let mut top = top_flow_rates(&s, &feed, &splits, safe);
            let bottom = mass_balance(&mut top, &feed, &splits, &mut vec![true; n]);
            let fed: f64 = feed.iter().sum();
            let out = outlet_totals(&top, &bottom, &splits)[0];
            prop_assert!((fed - out).abs() <= 1e-8 * (1.0 + fed));
            prop_assert!(top.iter().chain(bottom.iter()).all(|v| *v >= 0.0));
        }
    }
}
