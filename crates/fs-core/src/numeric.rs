use crate::FsError;

/// Floating point type used throughout system
pub type Real = f64;

/// Differences at or below this are treated as exact agreement.
pub const NOISE_FLOOR: Real = 1e-16;

/// Relative errors are only computed once the absolute error exceeds this.
pub const RELATIVE_ERROR_FLOOR: Real = 1e-12;

/// Negative flows down to `-INFEASIBLE_FLOW_TOL` [kmol/hr] are numerical noise.
pub const INFEASIBLE_FLOW_TOL: Real = 1e-6;

/// Largest absolute and relative change between two iterates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorMeasure {
    pub abs: Real,
    pub rel: Real,
}

impl ErrorMeasure {
    /// Either criterion satisfied.
    pub fn within(&self, abs_tol: Real, rel_tol: Real) -> bool {
        self.abs < abs_tol || self.rel < rel_tol
    }

    /// Both criteria satisfied (limits inclusive).
    pub fn all_within(&self, abs_tol: Real, rel_tol: Real) -> bool {
        self.abs <= abs_tol && self.rel <= rel_tol
    }
}

/// Measure the change from `old` to `new`.
///
/// Entries that moved by no more than [`NOISE_FLOOR`] are ignored. The
/// relative error is left at zero unless the absolute error exceeds
/// [`RELATIVE_ERROR_FLOOR`], so near-empty entries cannot blow it up.
pub fn measure_error(old: &[Real], new: &[Real]) -> ErrorMeasure {
    debug_assert_eq!(old.len(), new.len());
    let mut abs: Real = 0.0;
    for (a, b) in old.iter().zip(new) {
        let e = (a - b).abs();
        if e > NOISE_FLOOR && e > abs {
            abs = e;
        }
    }
    if abs <= RELATIVE_ERROR_FLOOR {
        return ErrorMeasure { abs, rel: 0.0 };
    }
    let mut rel: Real = 0.0;
    for (a, b) in old.iter().zip(new) {
        let e = (a - b).abs();
        if e > NOISE_FLOOR {
            let r = e / a.abs().max(b.abs());
            if r > rel {
                rel = r;
            }
        }
    }
    ErrorMeasure { abs, rel }
}

/// Zero out negatives within [`INFEASIBLE_FLOW_TOL`]; reject anything larger.
pub fn clip_infeasible(values: &mut [Real], what: &'static str) -> Result<(), FsError> {
    if let Some(worst) = values
        .iter()
        .copied()
        .filter(|v| *v < -INFEASIBLE_FLOW_TOL)
        .reduce(Real::min)
    {
        return Err(FsError::Infeasible { what, value: worst });
    }
    for v in values.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_ignores_noise() {
        let e = measure_error(&[1.0, 0.0], &[1.0, 1e-17]);
        assert_eq!(e, ErrorMeasure { abs: 0.0, rel: 0.0 });
    }

    #[test]
    fn relative_error_skipped_below_floor() {
        let e = measure_error(&[0.0], &[1e-13]);
        assert!(e.abs > 0.0);
        assert_eq!(e.rel, 0.0);
    }

    #[test]
    fn relative_error_uses_larger_magnitude() {
        let e = measure_error(&[100.0, 10.0], &[99.0, 10.0]);
        assert_eq!(e.abs, 1.0);
        assert!((e.rel - 0.01).abs() < 1e-15);
        assert!(e.within(1.5, 0.0));
        assert!(e.within(0.5, 0.02));
        assert!(!e.within(0.5, 0.005));
    }

    #[test]
    fn clip_small_negatives() {
        let mut v = [1.0, -1e-14, 0.0];
        clip_infeasible(&mut v, "flows").unwrap();
        assert_eq!(v, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn reject_large_negatives() {
        let mut v = [1.0, -1.0, -0.5];
        let err = clip_infeasible(&mut v, "flows").unwrap_err();
        assert_eq!(
            err,
            FsError::Infeasible {
                what: "flows",
                value: -1.0
            }
        );
        // untouched on failure
        assert_eq!(v[1], -1.0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_is_symmetric(
                pairs in proptest::collection::vec((0.0..1e3f64, 0.0..1e3f64), 1..20)
            ) {
                let (a, b): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
                prop_assert_eq!(measure_error(&a, &b), measure_error(&b, &a));
            }

            #[test]
            fn relative_error_bounded(
                pairs in proptest::collection::vec((0.0..1e3f64, 0.0..1e3f64), 1..20)
            ) {
                let (a, b): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
                let e = measure_error(&a, &b);
                prop_assert!(e.rel <= 1.0 + 1e-12);
            }
        }
    }
}
