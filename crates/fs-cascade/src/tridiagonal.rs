//! Banded linear solvers along the stage index.
//!
//! For a system of `n` rows:
//! - `b` is the diagonal (length `n`)
//! - `a` is the sub-diagonal, `a[i]` multiplies `x[i]` in row `i + 1` (length `n - 1`)
//! - `c` is the super-diagonal, `c[i]` multiplies `x[i + 1]` in row `i` (length `n - 1`)
//!
//! The `careful` variants accept zero and infinite diagonal entries, which
//! show up when a stage sends everything to one phase. They treat `0 * inf`
//! as zero and clip results to be non-negative.

use nalgebra::DMatrix;

/// Product with `0 * inf = 0`.
#[inline]
pub(crate) fn scale(m: f64, v: f64) -> f64 {
    if m == 0.0 || v == 0.0 { 0.0 } else { m * v }
}

/// Quotient with `0 / 0 = 0`, `x / 0 = inf` and `x / inf = 0`.
#[inline]
fn divide(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        if num == 0.0 { 0.0 } else { f64::INFINITY }
    } else if den.is_infinite() && num.is_finite() {
        0.0
    } else {
        num / den
    }
}

/// Thomas algorithm.
pub fn solve_tdma(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> Vec<f64> {
    let n = d.len();
    debug_assert_eq!(b.len(), n);
    if n == 0 {
        return Vec::new();
    }
    let mut b = b.to_vec();
    let mut d = d.to_vec();
    for i in 0..n - 1 {
        let m = a[i] / b[i];
        b[i + 1] -= m * c[i];
        d[i + 1] -= m * d[i];
    }
    let mut x = vec![0.0; n];
    x[n - 1] = d[n - 1] / b[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = (d[i] - c[i] * x[i + 1]) / b[i];
    }
    x
}

/// Thomas algorithm tolerating zero and infinite diagonals.
///
/// When row `i` has an infinite diagonal and an infinite negative
/// sub-diagonal, the elimination multiplier is their limiting ratio,
/// taken from `fallback[i]`.
pub fn solve_tdma_careful(a: &[f64], b: &[f64], c: &[f64], d: &[f64], fallback: &[f64]) -> Vec<f64> {
    let n = d.len();
    debug_assert_eq!(b.len(), n);
    if n == 0 {
        return Vec::new();
    }
    let mut b = b.to_vec();
    let mut d = d.to_vec();
    for i in 0..n - 1 {
        let bi = b[i];
        let m = if bi.is_infinite() {
            if a[i] == f64::NEG_INFINITY { fallback[i] } else { 0.0 }
        } else if bi == 0.0 {
            f64::INFINITY
        } else {
            a[i] / bi
        };
        b[i + 1] -= scale(m, c[i]);
        d[i + 1] -= scale(m, d[i]);
    }
    let mut x = vec![0.0; n];
    x[n - 1] = divide(d[n - 1], b[n - 1]).max(0.0);
    for i in (0..n - 1).rev() {
        x[i] = divide(d[i] - scale(c[i], x[i + 1]), b[i]).max(0.0);
    }
    x
}

/// Lower bidiagonal solve: `b[i] x[i] + a[i - 1] x[i - 1] = d[i]`.
pub fn solve_lbdma(a: &[f64], b: &[f64], d: &[f64]) -> Vec<f64> {
    let n = d.len();
    let mut x = vec![0.0; n];
    for i in 0..n {
        let inflow = if i == 0 { 0.0 } else { scale(a[i - 1], x[i - 1]) };
        x[i] = (d[i] - inflow) / b[i];
    }
    x
}

/// Upper bidiagonal solve: `b[i] x[i] + c[i] x[i + 1] = d[i]`.
pub fn solve_rbdma(b: &[f64], c: &[f64], d: &[f64]) -> Vec<f64> {
    let n = d.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let inflow = if i + 1 == n { 0.0 } else { scale(c[i], x[i + 1]) };
        x[i] = (d[i] - inflow) / b[i];
    }
    x
}

/// Upper bidiagonal solve where a zero diagonal yields zero for a zero
/// right-hand side and infinity otherwise.
pub fn solve_rbdma_careful(b: &[f64], c: &[f64], d: &[f64]) -> Vec<f64> {
    let n = d.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let num = if i + 1 == n {
            d[i]
        } else {
            d[i] - scale(c[i], x[i + 1])
        };
        x[i] = if b[i] == 0.0 {
            if num == 0.0 { 0.0 } else { f64::INFINITY }
        } else {
            num / b[i]
        };
    }
    x
}

fn column(m: &DMatrix<f64>, j: usize) -> Vec<f64> {
    m.column(j).iter().copied().collect()
}

fn assemble(n: usize, columns: Vec<Vec<f64>>) -> DMatrix<f64> {
    let m = columns.len();
    DMatrix::from_fn(n, m, |i, j| columns[j][i])
}

/// Column-wise [`solve_tdma`]; rows are stages, columns are chemicals.
///
/// `a` has `n - 1` rows and `c` is shared by every column.
pub fn solve_tdma_2d(a: &DMatrix<f64>, b: &DMatrix<f64>, c: &[f64], d: &DMatrix<f64>) -> DMatrix<f64> {
    let columns = (0..d.ncols())
        .map(|j| solve_tdma(&column(a, j), &column(b, j), c, &column(d, j)))
        .collect();
    assemble(d.nrows(), columns)
}

/// Column-wise [`solve_tdma_careful`].
pub fn solve_tdma_2d_careful(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    c: &[f64],
    d: &DMatrix<f64>,
    fallback: &[f64],
) -> DMatrix<f64> {
    let columns = (0..d.ncols())
        .map(|j| solve_tdma_careful(&column(a, j), &column(b, j), c, &column(d, j), fallback))
        .collect();
    assemble(d.nrows(), columns)
}

/// Column-wise [`solve_lbdma`] with coefficients shared by every column.
pub fn solve_lbdma_2d(a: &[f64], b: &[f64], d: &DMatrix<f64>) -> DMatrix<f64> {
    let columns = (0..d.ncols())
        .map(|j| solve_lbdma(a, b, &column(d, j)))
        .collect();
    assemble(d.nrows(), columns)
}

/// Column-wise [`solve_rbdma_careful`] with coefficients shared by every column.
pub fn solve_rbdma_2d_careful(b: &[f64], c: &[f64], d: &DMatrix<f64>) -> DMatrix<f64> {
    let columns = (0..d.ncols())
        .map(|j| solve_rbdma_careful(b, c, &column(d, j)))
        .collect();
    assemble(d.nrows(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use proptest::prelude::*;

    fn dense(a: &[f64], b: &[f64], c: &[f64]) -> DMatrix<f64> {
        let n = b.len();
        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                b[i]
            } else if i == j + 1 {
                a[j]
            } else if j == i + 1 {
                c[i]
            } else {
                0.0
            }
        })
    }

    #[test]
    fn tdma_known_solution() {
        // x = [1, 2, 3]
        let a = [1.0, 1.0];
        let b = [4.0, 4.0, 4.0];
        let c = [1.0, 1.0];
        let d = [6.0, 12.0, 14.0];
        let x = solve_tdma(&a, &b, &c, &d);
        for (xi, ei) in x.iter().zip([1.0, 2.0, 3.0]) {
            assert!((xi - ei).abs() < 1e-12);
        }
    }

    #[test]
    fn single_row() {
        assert_eq!(solve_tdma(&[], &[2.0], &[], &[3.0]), vec![1.5]);
        assert_eq!(solve_tdma_careful(&[], &[f64::INFINITY], &[], &[3.0], &[]), vec![0.0]);
    }

    #[test]
    fn careful_routes_everything_down_an_all_bottoms_stage() {
        // stage 0 has S = inf (B = 0): nothing leaves at the top.
        let s = [f64::INFINITY, 1.0];
        let bsplit_1 = [-1.0, -1.0];
        let a = [bsplit_1[0] * s[0]];
        let b = [1.0 + s[0], 1.0 + s[1]];
        let c = [-1.0];
        let d = [10.0, 0.0];
        let x = solve_tdma_careful(&a, &b, &c, &d, &bsplit_1);
        assert_eq!(x[0], 0.0);
        // stage 1 vapor is sent straight back down, so it leaves as bottoms
        assert!((x[1] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn careful_clips_negative_results() {
        let x = solve_tdma_careful(&[0.0], &[1.0, 1.0], &[2.0], &[1.0, 1.0], &[0.0]);
        assert_eq!(x, vec![0.0, 1.0]);
    }

    #[test]
    fn bidiagonal_solves() {
        // x0 = 2, x1 = (5 + 2) / 1
        assert_eq!(solve_lbdma(&[-1.0], &[1.0, 1.0], &[2.0, 5.0]), vec![2.0, 7.0]);
        assert_eq!(solve_rbdma(&[1.0, 2.0], &[-1.0], &[1.0, 4.0]), vec![3.0, 2.0]);
    }

    #[test]
    fn rbdma_careful_zero_diagonal() {
        let x = solve_rbdma_careful(&[0.0, 0.0, 2.0], &[0.0, 0.0], &[0.0, 1.0, 4.0]);
        assert_eq!(x, vec![0.0, f64::INFINITY, 2.0]);
    }

    #[test]
    fn two_dimensional_matches_columns() {
        let a = DMatrix::from_row_slice(1, 2, &[-0.5, -1.0]);
        let b = DMatrix::from_row_slice(2, 2, &[2.0, 3.0, 2.0, 3.0]);
        let c = [-1.0];
        let d = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let x = solve_tdma_2d(&a, &b, &c, &d);
        let col1 = solve_tdma(&[-1.0], &[3.0, 3.0], &c, &[2.0, 4.0]);
        assert_eq!(x[(0, 1)], col1[0]);
        assert_eq!(x[(1, 1)], col1[1]);
        let careful = solve_tdma_2d_careful(&a, &b, &c, &d, &[-1.0]);
        assert!((careful - x).abs().max() < 1e-12);
    }

    proptest! {
        #[test]
        fn tdma_matches_dense_solve(
            rows in proptest::collection::vec((-1.0..1.0f64, 0.5..2.0f64, -1.0..1.0f64, -10.0..10.0f64), 1..12)
        ) {
            let n = rows.len();
            let a: Vec<f64> = rows.iter().take(n - 1).map(|r| r.0).collect();
            // diagonally dominant
            let b: Vec<f64> = rows.iter().map(|r| r.1 + 2.0).collect();
            let c: Vec<f64> = rows.iter().take(n - 1).map(|r| r.2).collect();
            let d: Vec<f64> = rows.iter().map(|r| r.3).collect();
            let x = solve_tdma(&a, &b, &c, &d);
            let expected = dense(&a, &b, &c).lu().solve(&DVector::from_vec(d.clone())).unwrap();
            for i in 0..n {
                prop_assert!((x[i] - expected[i]).abs() < 1e-9);
            }
        }

        #[test]
        fn careful_agrees_when_nothing_degenerates(
            stages in proptest::collection::vec((0.1..10.0f64, 0.0..0.5f64, 0.0..100.0f64), 1..10)
        ) {
            // cascade-shaped rows: b = 1 + S, a = bsplit_1 * S, c = asplit_1
            let n = stages.len();
            let bsplit_1: Vec<f64> = stages.iter().map(|s| s.1 - 1.0).collect();
            let a: Vec<f64> = stages.iter().take(n - 1).map(|s| (s.1 - 1.0) * s.0).collect();
            let b: Vec<f64> = stages.iter().map(|s| 1.0 + s.0).collect();
            let c: Vec<f64> = stages.iter().skip(1).map(|s| s.1 - 1.0).collect();
            let d: Vec<f64> = stages.iter().map(|s| s.2).collect();
            let plain = solve_tdma(&a, &b, &c, &d);
            let careful = solve_tdma_careful(&a, &b, &c, &d, &bsplit_1);
            for i in 0..n {
                prop_assert!(plain[i] >= -1e-9);
                prop_assert!((plain[i].max(0.0) - careful[i]).abs() < 1e-9 * (1.0 + plain[i].abs()));
            }
        }
    }
}
