use serde::Serialize;
use tracing::{debug, info};

use crate::calibration::bisection::{bisect, BisectionSettings, Bracket, Probe};
use crate::calibration::pool::{mean, SeedPool};
use crate::config::{CalibrationConfig, OracleConfig, SimOpts};
use crate::error::{RankError, Result};
use crate::metrics::utility_integral_for;
use crate::oracle::{oracle_ranking, OracleFilter, OracleResult, OracleScheduler};
use crate::simulation::{ManagerFactory, SimulationManager};

/// Statistic the calibration drives towards its target. Each one is assumed
/// non-increasing in `s`; the event count and the utility integral are, but
/// time in the top K can rise with `s` on some walls, and calibrating it there
/// ends in `ConvergenceFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Statistic {
    /// Posts in the oracle's schedule against the wall.
    OracleEventCount,
    /// Oracle time spent at rank ≤ k-1.
    OracleTimeInTopK { k: usize },
    /// Utility integral averaged over the configured seeds.
    MeanUtilityIntegral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CalibrationDetail {
    Oracle(OracleResult),
    Capacities(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub s: f64,
    pub achieved: f64,
    pub bracket: Bracket,
    pub evaluations: u32,
    pub detail: CalibrationDetail,
}

impl CalibrationResult {
    pub fn oracle(&self) -> Option<&OracleResult> {
        match &self.detail {
            CalibrationDetail::Oracle(result) => Some(result),
            CalibrationDetail::Capacities(_) => None,
        }
    }
}

/// Tunes the cost coefficient `s` by repeatedly running simulations built by
/// `factory`.
pub struct Calibrator<'a, F: ManagerFactory> {
    factory: &'a F,
    config: CalibrationConfig,
    scheduler: OracleScheduler,
    pool: SeedPool,
}

impl<'a, F: ManagerFactory> Calibrator<'a, F> {
    pub fn new(factory: &'a F, config: CalibrationConfig, oracle: OracleConfig) -> Result<Self> {
        config.validate()?;
        let pool = SeedPool::new(config.seeds.len(), config.parallel)?;
        debug!(threads = pool.threads(), seeds = config.seeds.len(), "calibration pool ready");
        Ok(Self {
            factory,
            config,
            scheduler: OracleScheduler::new(oracle),
            pool,
        })
    }

    /// Solves for `s` such that `statistic` meets `target` within `tolerance`.
    /// Every probe uses a fresh snapshot `opts_gen()` with `s` overridden.
    pub fn calibrate<G>(
        &self,
        opts_gen: G,
        target: f64,
        tolerance: f64,
        statistic: Statistic,
    ) -> Result<CalibrationResult>
    where
        G: Fn() -> SimOpts + Sync,
    {
        let settings = BisectionSettings::from_config(&self.config)
            .tolerance(tolerance)
            .integer_target(matches!(statistic, Statistic::OracleEventCount));
        info!(?statistic, target, tolerance, "starting calibration");

        let outcome = bisect(target, &settings, |s| self.probe(&opts_gen, s, statistic))?;
        Ok(CalibrationResult {
            s: outcome.s,
            achieved: outcome.probe.value,
            bracket: outcome.bracket,
            evaluations: outcome.evaluations,
            detail: outcome.probe.detail,
        })
    }

    /// Oracle schedule whose post count matches `target_events`.
    pub fn find_opt_oracle(&self, base: &SimOpts, target_events: f64) -> Result<CalibrationResult> {
        self.calibrate(
            || base.clone(),
            target_events,
            self.config.tolerance,
            Statistic::OracleEventCount,
        )
    }

    pub fn find_opt_oracle_s(&self, base: &SimOpts, target_events: f64) -> Result<f64> {
        Ok(self.find_opt_oracle(base, target_events)?.s)
    }

    /// Time in the top `k` of the oracle calibrated to `target_events` posts.
    pub fn find_opt_oracle_time_top_k(
        &self,
        base: &SimOpts,
        target_events: f64,
        k: usize,
    ) -> Result<f64> {
        let result = self.find_opt_oracle(base, target_events)?;
        Ok(result
            .oracle()
            .map(|oracle| oracle.time_in_top_k(k))
            .unwrap_or(0.0))
    }

    /// Utility integral of every configured seed at `s`.
    pub fn capacities<G>(&self, opts_gen: &G, s: f64) -> Result<Vec<f64>>
    where
        G: Fn() -> SimOpts + Sync,
    {
        self.pool.run(&self.config.seeds, |seed| {
            let opts = opts_gen().with_s(s)?;
            let mut manager = self.factory.seeded_manager(&opts, seed);
            manager.run()?;
            utility_integral_for(&manager.event_log()?, &opts)
        })
    }

    /// `s` at which the mean utility integral meets `capacity`.
    pub fn sweep_s<G>(&self, opts_gen: G, capacity: f64) -> Result<f64>
    where
        G: Fn() -> SimOpts + Sync,
    {
        let result = self.calibrate(
            opts_gen,
            capacity,
            self.config.tolerance,
            Statistic::MeanUtilityIntegral,
        )?;
        Ok(result.s)
    }

    fn probe<G>(
        &self,
        opts_gen: &G,
        s: f64,
        statistic: Statistic,
    ) -> Result<Probe<CalibrationDetail>>
    where
        G: Fn() -> SimOpts + Sync,
    {
        match statistic {
            Statistic::OracleEventCount => {
                let oracle = self.run_oracle(&opts_gen().with_s(s)?)?;
                Ok(Probe::new(
                    oracle.num_events() as f64,
                    CalibrationDetail::Oracle(oracle),
                ))
            }
            Statistic::OracleTimeInTopK { k } => {
                let oracle = self.run_oracle(&opts_gen().with_s(s)?)?;
                Ok(Probe::new(
                    oracle.time_in_top_k(k),
                    CalibrationDetail::Oracle(oracle),
                ))
            }
            Statistic::MeanUtilityIntegral => {
                let capacities = self.capacities(opts_gen, s)?;
                let value = mean(&capacities).ok_or_else(|| {
                    RankError::Precondition("no seed runs to average".to_string())
                })?;
                Ok(Probe::new(value, CalibrationDetail::Capacities(capacities)))
            }
        }
    }

    fn run_oracle(&self, opts: &SimOpts) -> Result<OracleResult> {
        let mut wall = self.factory.wall_manager(opts);
        wall.run()?;
        oracle_ranking(
            &wall.event_log()?,
            opts,
            &OracleFilter::default(),
            &self.scheduler,
        )
    }
}
