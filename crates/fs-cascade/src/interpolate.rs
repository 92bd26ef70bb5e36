//! Fill stage variables that could not be evaluated (empty stages) from
//! their nearest evaluated neighbours.

/// Nearest defined stages around a missing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbors {
    /// Only a stage above is defined.
    Above(usize),
    /// Only a stage below is defined.
    Below(usize),
    Between(usize, usize),
}

/// Neighbours of every missing index in `defined`, in index order.
///
/// Returns an empty list when nothing is defined.
pub fn get_neighbors(defined: &[bool]) -> Vec<(usize, Neighbors)> {
    let n = defined.len();
    (0..n)
        .filter(|i| !defined[*i])
        .filter_map(|i| {
            let above = (0..i).rev().find(|j| defined[*j]);
            let below = (i + 1..n).find(|j| defined[*j]);
            let neighbors = match (above, below) {
                (Some(lb), Some(ub)) => Neighbors::Between(lb, ub),
                (Some(lb), None) => Neighbors::Above(lb),
                (None, Some(ub)) => Neighbors::Below(ub),
                (None, None) => return None,
            };
            Some((i, neighbors))
        })
        .collect()
}

fn weights(i: usize, lb: usize, ub: usize) -> (f64, f64) {
    let span = (ub - lb) as f64;
    ((ub - i) as f64 / span, (i - lb) as f64 / span)
}

fn blend(wl: f64, lo: f64, wu: f64, hi: f64) -> f64 {
    if lo.is_finite() && hi.is_finite() {
        wl * lo + wu * hi
    } else if wl >= wu {
        lo
    } else {
        hi
    }
}

/// Linear interpolation of scalar stage values at missing indices.
pub fn fill_missing(neighbors: &[(usize, Neighbors)], values: &mut [f64]) {
    for &(i, nb) in neighbors {
        values[i] = match nb {
            Neighbors::Above(j) | Neighbors::Below(j) => values[j],
            Neighbors::Between(lb, ub) => {
                let (wl, wu) = weights(i, lb, ub);
                blend(wl, values[lb], wu, values[ub])
            }
        };
    }
}

/// Elementwise [`fill_missing`] for per-chemical vectors.
pub fn fill_missing_vectors(neighbors: &[(usize, Neighbors)], values: &mut [Vec<f64>]) {
    for &(i, nb) in neighbors {
        values[i] = match nb {
            Neighbors::Above(j) | Neighbors::Below(j) => values[j].clone(),
            Neighbors::Between(lb, ub) => {
                let (wl, wu) = weights(i, lb, ub);
                values[lb]
                    .iter()
                    .zip(&values[ub])
                    .map(|(lo, hi)| blend(wl, *lo, wu, *hi))
                    .collect()
            }
        };
    }
}
