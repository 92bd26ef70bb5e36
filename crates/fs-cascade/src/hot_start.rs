//! Initial K, B and T estimates for every stage.
//!
//! Stages without a phase-ratio specification are first treated as
//! pass-through (top phase rises, bottom phase falls) so that specified
//! stages alone decide the bulk flows; the resulting top/bottom ratios seed
//! the phase ratios of the full model.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;

use fs_core::accelerate::wegstein;
use fs_thermo::{FlashSpec, PhasePair, phase_ratio_from_fraction, rachford_rice};
use nalgebra::DMatrix;
use tracing::debug;

use crate::cascade::{CascadeFeed, MultiStageEquilibrium};
use crate::error::CascadeResult;
use crate::interpolate::{fill_missing, fill_missing_vectors, get_neighbors};
use crate::mass::{StageSplits, flatten, unflatten};
use crate::partition::fractions;
use crate::tridiagonal::{solve_lbdma, solve_lbdma_2d, solve_rbdma_2d_careful};

/// Phase ratios at or below this send a specified stage's inlet to the bottoms.
const MIN_HOT_START_RATIO: f64 = 1e-32;

/// Top flows of the pass-through model given bottom flows.
pub fn hot_start_top_flow_rates(
    bottom: &DMatrix<f64>,
    phase_ratios: &[Option<f64>],
    top_feed: &DMatrix<f64>,
    bottom_feed: &DMatrix<f64>,
    splits: &StageSplits,
) -> DMatrix<f64> {
    let n = top_feed.nrows();
    let mut b = vec![1.0; n];
    let mut d = top_feed.clone();
    for (i, ratio) in phase_ratios.iter().enumerate() {
        let Some(ratio) = ratio else { continue };
        b[i] = if *ratio <= MIN_HOT_START_RATIO {
            f64::INFINITY
        } else {
            1.0 + 1.0 / ratio
        };
        let mut inflow = bottom_feed.row(i).clone_owned();
        if i > 0 {
            inflow += bottom.row(i - 1) * splits.bsplit_left[i - 1];
        }
        let mut row = d.row_mut(i);
        row += inflow;
    }
    solve_rbdma_2d_careful(&b, &splits.asplit_1[1..], &d)
}

/// Bottom flows of the pass-through model given top flows.
pub fn hot_start_bottom_flow_rates(
    top: &DMatrix<f64>,
    phase_ratios: &[Option<f64>],
    top_feed: &DMatrix<f64>,
    bottom_feed: &DMatrix<f64>,
    splits: &StageSplits,
) -> DMatrix<f64> {
    let n = top_feed.nrows();
    let mut b = vec![1.0; n];
    let mut d = bottom_feed.clone();
    for (i, ratio) in phase_ratios.iter().enumerate() {
        let Some(ratio) = ratio else { continue };
        b[i] += ratio;
        let mut inflow = top_feed.row(i).clone_owned();
        if i + 1 < n {
            inflow += top.row(i + 1) * splits.asplit_left[i + 1];
        }
        let mut row = d.row_mut(i);
        row += inflow;
    }
    solve_lbdma_2d(&splits.bsplit_1[..n.saturating_sub(1)], &b, &d)
}

/// Stage phase ratios of the pass-through model, converged by Wegstein
/// iteration on the top flows.
pub fn hot_start_phase_ratios(
    phase_ratios: &[Option<f64>],
    top_feed: &DMatrix<f64>,
    bottom_feed: &DMatrix<f64>,
    splits: &StageSplits,
    xtol: f64,
) -> Vec<f64> {
    let (n, m) = top_feed.shape();
    let solve = |top: &[f64]| -> Result<Vec<f64>, Infallible> {
        let top = unflatten(n, m, top);
        let bottom = hot_start_bottom_flow_rates(&top, phase_ratios, top_feed, bottom_feed, splits);
        Ok(flatten(&hot_start_top_flow_rates(
            &bottom,
            phase_ratios,
            top_feed,
            bottom_feed,
            splits,
        )))
    };
    let top = match wegstein(solve, vec![0.0; n * m], xtol, 200) {
        Ok(top) => unflatten(n, m, &top),
        Err(never) => match never {},
    };
    let bottom = hot_start_bottom_flow_rates(&top, phase_ratios, top_feed, bottom_feed, splits);
    (0..n)
        .map(|i| {
            let l = bottom.row(i).sum();
            top.row(i).sum() / if l == 0.0 { MIN_HOT_START_RATIO } else { l }
        })
        .collect()
}

impl MultiStageEquilibrium {
    /// Estimate K, B and T of every stage and the flows they imply.
    pub(crate) fn hot_start(&mut self) -> CascadeResult<()> {
        self.iter = 0;
        self.top.fill(0.0);
        self.bottom.fill(0.0);
        self.route_inert_feeds();
        if self.active_feed().sum() <= 0.0 {
            return Ok(());
        }
        let keys = self.key_stages();
        if self.config.partition_data.is_some() {
            self.hot_start_partition_data()?;
        } else if self.config.collapsed_init && keys.len() < self.n_stages() {
            self.hot_start_collapsed(&keys)?;
        } else {
            match self.config.phases {
                PhasePair::Vle => self.hot_start_vle()?,
                PhasePair::Lle => self.hot_start_lle()?,
            }
        }
        self.run_mass_balance();
        debug!(cascade = %self.name, stages = self.n_stages(), "hot start complete");
        Ok(())
    }

    /// Light chemicals only rise and heavy chemicals only fall, so their
    /// flows follow from one bidiagonal solve each.
    fn route_inert_feeds(&mut self) {
        let n = self.n_stages();
        let ones = vec![1.0; n];
        for &j in &self.routing.light {
            let feed: Vec<f64> = self.feed.column(j).iter().copied().collect();
            let d = DMatrix::from_column_slice(n, 1, &feed);
            let top = solve_rbdma_2d_careful(&ones, &self.splits.asplit_1[1..], &d);
            for i in 0..n {
                self.top[(i, j)] = top[(i, 0)];
                self.bottom[(i, j)] = 0.0;
            }
        }
        for &j in &self.routing.heavy {
            let feed: Vec<f64> = self.feed.column(j).iter().copied().collect();
            let bottom = solve_lbdma(&self.splits.bsplit_1[..n - 1], &ones, &feed);
            for i in 0..n {
                self.bottom[(i, j)] = bottom[i];
                self.top[(i, j)] = 0.0;
            }
        }
    }

    /// Stages that carry a feed, a specification or a side draw, plus the
    /// two end stages.
    pub(crate) fn key_stages(&self) -> Vec<usize> {
        let n = self.n_stages();
        let mut keys: BTreeSet<usize> = [0, n - 1].into_iter().collect();
        keys.extend(self.feeds.iter().map(|f| f.stage));
        keys.extend(self.config.specifications.keys().copied());
        keys.extend(self.config.top_side_draws.keys().copied());
        keys.extend(self.config.bottom_side_draws.keys().copied());
        keys.into_iter().collect()
    }

    fn hot_start_vle(&mut self) -> CascadeResult<()> {
        let p = self.config.pressure;
        if !self.config.specifications.is_empty() {
            let z = self.routing.active_only(&self.total_feed());
            let bp = self.thermo.bubble_point(&z, p)?;
            let dp = self.thermo.dew_point(&z, p)?;
            let dt = (dp.t - bp.t) / self.n_stages() as f64;
            let k = self.routing.select(&bp.k);
            let ratios = self.pass_through_phase_ratios();
            for (i, stage) in self.stages.iter_mut().enumerate() {
                stage.k = k.clone();
                stage.t = stage.t_spec.unwrap_or(bp.t + i as f64 * dt);
                if stage.b_spec.is_none() {
                    stage.b = ratios[i];
                }
            }
            return Ok(());
        }
        let z = self.total_feed();
        let duty: f64 = self.stages.iter().map(|s| s.duty).sum();
        let h = self.feed_enthalpy.iter().sum::<f64>() + duty;
        let split = self
            .thermo
            .equilibrium(PhasePair::Vle, &z, p, FlashSpec::Enthalpy(h))?;
        self.broadcast_split(split.k, split.t, split.phi, &split.top, &split.bottom)
    }

    fn hot_start_lle(&mut self) -> CascadeResult<()> {
        let z = self.total_feed();
        let t = self.feed_temperature;
        let split = self.thermo.equilibrium(
            PhasePair::Lle,
            &z,
            self.config.pressure,
            FlashSpec::Temperature(t),
        )?;
        self.broadcast_split(split.k, split.t, split.phi, &split.top, &split.bottom)
    }

    /// Give every stage the K, T and B of one split of the combined feed.
    fn broadcast_split(
        &mut self,
        k: Vec<f64>,
        t: f64,
        phi: f64,
        top: &[f64],
        bottom: &[f64],
    ) -> CascadeResult<()> {
        let k = if k.is_empty() {
            let z = self.total_feed();
            let zf = fractions(&z).unwrap_or(z);
            let x = fractions(bottom).unwrap_or_else(|| zf.clone());
            let y = fractions(top).unwrap_or(zf);
            self.thermo
                .partition_coefficients(self.config.phases, &x, &y, t, self.config.pressure)?
        } else {
            k
        };
        let k = self.routing.select(&k);
        let b = phase_ratio_from_fraction(phi);
        for stage in &mut self.stages {
            stage.k = k.clone();
            stage.t = stage.t_spec.unwrap_or(t);
            if stage.b_spec.is_none() {
                stage.b = b;
            }
        }
        Ok(())
    }

    fn hot_start_partition_data(&mut self) -> CascadeResult<()> {
        let z = self.routing.select(&self.total_feed());
        let b = phase_ratio_from_fraction(rachford_rice(&z, &self.stages[0].k)?);
        let t = self.feed_temperature;
        for stage in &mut self.stages {
            if let Some(k) = &stage.fixed_k {
                stage.k = k.clone();
            }
            stage.t = stage.t_spec.unwrap_or(t);
            if stage.b_spec.is_none() {
                stage.b = b;
            }
        }
        Ok(())
    }

    /// Phase ratios from the pass-through model; all ones when no stage has
    /// a phase-ratio specification.
    fn pass_through_phase_ratios(&self) -> Vec<f64> {
        let specs: Vec<Option<f64>> = self.stages.iter().map(|s| s.b_spec).collect();
        if specs.iter().all(Option::is_none) {
            return vec![1.0; self.n_stages()];
        }
        let top_feed = self.top_feed.select_columns(&self.routing.active);
        let bottom_feed = self.active_feed() - &top_feed;
        hot_start_phase_ratios(
            &specs,
            &top_feed,
            &bottom_feed,
            &self.splits,
            self.config.relative_molar_tolerance,
        )
    }

    /// Solve a cascade made of the key stages only and interpolate the
    /// stages in between.
    fn hot_start_collapsed(&mut self, keys: &[usize]) -> CascadeResult<()> {
        let index: BTreeMap<usize, usize> = keys.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let remap = |m: &BTreeMap<usize, f64>| -> BTreeMap<usize, f64> {
            m.iter().map(|(s, v)| (index[s], *v)).collect()
        };
        let mut config = self.config.clone();
        config.n_stages = keys.len();
        config.feed_stages = Vec::new();
        config.specifications = self
            .config
            .specifications
            .iter()
            .map(|(s, spec)| (index[s], *spec))
            .collect();
        config.top_side_draws = remap(&self.config.top_side_draws);
        config.bottom_side_draws = remap(&self.config.bottom_side_draws);
        config.collapsed_init = false;
        config.use_cache = false;
        config.strict = false;
        let feeds: Vec<CascadeFeed> = self
            .feeds
            .iter()
            .map(|f| CascadeFeed {
                stage: index[&f.stage],
                state: f.state.clone(),
            })
            .collect();
        let mut collapsed =
            MultiStageEquilibrium::new(format!("{}.collapsed", self.name), config, self.thermo.clone())?;
        let report = collapsed.solve(&feeds)?;
        debug!(
            cascade = %self.name,
            stages = keys.len(),
            converged = report.converged,
            "collapsed cascade solved"
        );

        let n = self.n_stages();
        let defined: Vec<bool> = (0..n).map(|i| index.contains_key(&i)).collect();
        let mut k = vec![Vec::new(); n];
        let mut t = vec![0.0; n];
        let mut b = vec![0.0; n];
        for (stage, j) in &index {
            let source = &collapsed.stages[*j];
            k[*stage] = source.k.clone();
            t[*stage] = source.t;
            b[*stage] = source.phase_ratio();
        }
        let neighbors = get_neighbors(&defined);
        fill_missing_vectors(&neighbors, &mut k);
        fill_missing(&neighbors, &mut t);
        fill_missing(&neighbors, &mut b);
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.k = std::mem::take(&mut k[i]);
            stage.t = stage.t_spec.unwrap_or(t[i]);
            if stage.b_spec.is_none() {
                stage.b = b[i];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reboiled_stage_sets_bulk_ratios() {
        // liquid enters the top, only the bottom stage boils up
        let splits = StageSplits::none(3);
        let mut bottom_feed = DMatrix::zeros(3, 1);
        bottom_feed[(0, 0)] = 10.0;
        let top_feed = DMatrix::zeros(3, 1);
        let ratios = hot_start_phase_ratios(
            &[None, None, Some(1.0)],
            &top_feed,
            &bottom_feed,
            &splits,
            1e-9,
        );
        assert!((ratios[0] - 0.5).abs() < 1e-9);
        assert!((ratios[1] - 0.5).abs() < 1e-9);
        assert!((ratios[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_ratio_sends_everything_down() {
        let splits = StageSplits::none(1);
        let bottom_feed = DMatrix::from_element(1, 1, 4.0);
        let top_feed = DMatrix::zeros(1, 1);
        let zero = DMatrix::zeros(1, 1);
        let top =
            hot_start_top_flow_rates(&zero, &[Some(0.0)], &top_feed, &bottom_feed, &splits);
        assert_eq!(top[(0, 0)], 0.0);
        let bottom =
            hot_start_bottom_flow_rates(&top, &[Some(0.0)], &top_feed, &bottom_feed, &splits);
        assert_eq!(bottom[(0, 0)], 4.0);
    }

    #[test]
    fn unspecified_stages_pass_flows_through() {
        let splits = StageSplits::none(2);
        let top_feed = DMatrix::from_row_slice(2, 1, &[0.0, 3.0]);
        let bottom_feed = DMatrix::from_row_slice(2, 1, &[2.0, 0.0]);
        let zero = DMatrix::zeros(2, 1);
        let top = hot_start_top_flow_rates(&zero, &[None, None], &top_feed, &bottom_feed, &splits);
        assert_eq!(top[(0, 0)], 3.0);
        let bottom =
            hot_start_bottom_flow_rates(&top, &[None, None], &top_feed, &bottom_feed, &splits);
        assert_eq!(bottom[(1, 0)], 2.0);
    }
}
