use serde::Serialize;
use tracing::{debug, info};

use crate::config::CalibrationConfig;
use crate::error::{RankError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct BisectionSettings {
    pub s_init: f64,
    pub tolerance: f64,
    pub max_bracket_steps: u32,
    pub max_iterations: u32,
    /// Also accept the integer floor or ceiling of the target.
    pub integer_target: bool,
}

impl BisectionSettings {
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            s_init: config.s_init,
            tolerance: config.tolerance,
            max_bracket_steps: config.max_bracket_steps,
            max_iterations: config.max_iterations,
            integer_target: false,
        }
    }

    pub fn integer_target(mut self, integer_target: bool) -> Self {
        self.integer_target = integer_target;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// A statistic evaluated at one value of `s`, with whatever the evaluation
/// produced alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe<T> {
    pub value: f64,
    pub detail: T,
}

impl<T> Probe<T> {
    pub fn new(value: f64, detail: T) -> Self {
        Self { value, detail }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bracket {
    pub lo: f64,
    pub hi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BisectionOutcome<T> {
    pub s: f64,
    pub probe: Probe<T>,
    pub bracket: Bracket,
    pub evaluations: u32,
}

/// Finds `s` where a statistic that is non-increasing in `s` meets `target`.
///
/// Doubles or halves `s` from `s_init` until the target is bracketed, then
/// bisects until the relative error drops below the tolerance.
pub fn bisect<T, F>(
    target: f64,
    settings: &BisectionSettings,
    mut statistic: F,
) -> Result<BisectionOutcome<T>>
where
    F: FnMut(f64) -> Result<Probe<T>>,
{
    if !(target > 0.0) || !target.is_finite() {
        return Err(RankError::Precondition(format!(
            "calibration target must be positive, got {}",
            target
        )));
    }
    if !(settings.tolerance > 0.0) || !(settings.s_init > 0.0) {
        return Err(RankError::Precondition(format!(
            "tolerance and s_init must be positive, got {} and {}",
            settings.tolerance, settings.s_init
        )));
    }

    let mut evaluations = 1u32;
    let mut s = settings.s_init;
    let initial = statistic(s)?;
    debug!(s, value = initial.value, target, "initial probe");

    let bracket = if initial.value > target {
        let mut bracket = Bracket { lo: s, hi: s };
        let mut found = false;
        for _ in 0..settings.max_bracket_steps {
            bracket.lo = s;
            s *= 2.0;
            bracket.hi = s;
            let probe = statistic(s)?;
            evaluations += 1;
            debug!(s_lo = bracket.lo, s_hi = bracket.hi, value = probe.value, "widening up");
            if probe.value < target {
                found = true;
                break;
            }
        }
        if !found {
            return Err(RankError::ConvergenceFailure(format!(
                "statistic stayed above {} after {} doublings of s",
                target, settings.max_bracket_steps
            )));
        }
        bracket
    } else if initial.value < target {
        let mut bracket = Bracket { lo: s, hi: s };
        let mut found = false;
        for _ in 0..settings.max_bracket_steps {
            bracket.hi = s;
            s /= 2.0;
            bracket.lo = s;
            let probe = statistic(s)?;
            evaluations += 1;
            debug!(s_lo = bracket.lo, s_hi = bracket.hi, value = probe.value, "widening down");
            if probe.value > target {
                found = true;
                break;
            }
        }
        if !found {
            return Err(RankError::ConvergenceFailure(format!(
                "statistic stayed below {} after {} halvings of s",
                target, settings.max_bracket_steps
            )));
        }
        bracket
    } else {
        Bracket {
            lo: s / 2.0,
            hi: s * 2.0,
        }
    };
    info!(s_lo = bracket.lo, s_hi = bracket.hi, "bracketed target");

    let mut bracket = bracket;
    for _ in 0..settings.max_iterations {
        let s_try = (bracket.lo + bracket.hi) / 2.0;
        let probe = statistic(s_try)?;
        evaluations += 1;
        debug!(s = s_try, value = probe.value, target, "bisection probe");

        if converged(probe.value, target, settings) {
            info!(s = s_try, value = probe.value, evaluations, "calibration converged");
            return Ok(BisectionOutcome {
                s: s_try,
                probe,
                bracket,
                evaluations,
            });
        } else if probe.value < target {
            bracket.hi = s_try;
        } else {
            bracket.lo = s_try;
        }
    }

    Err(RankError::ConvergenceFailure(format!(
        "no s within tolerance {} after {} bisection steps (bracket [{}, {}])",
        settings.tolerance, settings.max_iterations, bracket.lo, bracket.hi
    )))
}

fn converged(value: f64, target: f64, settings: &BisectionSettings) -> bool {
    if (value - target).abs() / target < settings.tolerance {
        return true;
    }
    settings.integer_target && (value == target.ceil() || value == target.floor())
}
