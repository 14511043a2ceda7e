use serde::Serialize;

use crate::config::SimOpts;
use crate::{default_q_vec, is_sorted};
use crate::error::{RankError, Result};
use crate::event::EventLog;
use crate::rank::{compute_rank_trajectory, interval_widths as widths, RankTrajectory};

/// Per-row values of a cost rate, keyed by the trajectory's row times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl LossSeries {
    /// Riemann sum with each value held until the next row (`end_time` for
    /// the last one).
    pub fn integral(&self, end_time: f64) -> f64 {
        self.values
            .iter()
            .zip(widths(&self.times, end_time))
            .map(|(value, width)| value * width)
            .sum()
    }
}

/// `∫ Σ_i r_i(t) · sqrt(q_i / s) dt` over the listed followers.
pub fn utility_integral(
    trajectory: &RankTrajectory,
    follower_ids: &[u64],
    q_vec: &[f64],
    s: f64,
    end_time: f64,
) -> Result<f64> {
    check_followers(follower_ids, q_vec)?;
    if !(s > 0.0) {
        return Err(RankError::Precondition(format!("s must be positive, got {}", s)));
    }

    let weights: Vec<f64> = q_vec.iter().map(|q| (q / s).sqrt()).collect();
    let columns = columns_for(trajectory, follower_ids)?;
    let widths = checked_widths(trajectory, end_time)?;

    let total: f64 = trajectory
        .rows()
        .iter()
        .zip(widths)
        .map(|(cells, width)| weighted_sum(cells, &columns, &weights) * width)
        .sum();
    Ok(total)
}

/// Total time the follower-mean rank sits within the top `k` (rank ≤ k-1).
pub fn time_in_top_k(trajectory: &RankTrajectory, k: usize, end_time: f64) -> Result<f64> {
    let threshold = k as f64 - 1.0;
    Ok(checked_widths(trajectory, end_time)?
        .into_iter()
        .enumerate()
        .filter(|(row, _)| {
            trajectory
                .mean_rank(*row)
                .map(|rank| rank <= threshold)
                .unwrap_or(false)
        })
        .map(|(_, width)| width)
        .sum())
}

/// `∫ mean_rank(t) dt`.
pub fn rank_integral(trajectory: &RankTrajectory, end_time: f64) -> Result<f64> {
    Ok(checked_widths(trajectory, end_time)?
        .into_iter()
        .enumerate()
        .filter_map(|(row, width)| trajectory.mean_rank(row).map(|rank| rank * width))
        .sum())
}

/// Time-weighted mean of the follower-mean rank over the rows where at
/// least one follower has been observed.
pub fn average_rank(trajectory: &RankTrajectory, end_time: f64) -> Result<f64> {
    let observed: f64 = checked_widths(trajectory, end_time)?
        .into_iter()
        .enumerate()
        .filter(|(row, _)| trajectory.mean_rank(*row).is_some())
        .map(|(_, width)| width)
        .sum();
    if !(observed > 0.0) {
        return Err(RankError::Precondition(
            "trajectory covers no observed time before end_time".to_string(),
        ));
    }
    Ok(rank_integral(trajectory, end_time)? / observed)
}

/// Cost rate `0.5·Σ q_i r_i² + 0.5·s·u²` of a source posting at constant
/// rate `u_const`. `q_vec` defaults to [`default_q_vec`].
pub fn quadratic_loss_assuming_rate(
    trajectory: &RankTrajectory,
    u_const: f64,
    follower_ids: &[u64],
    q_vec: Option<&[f64]>,
    s: f64,
) -> Result<LossSeries> {
    let defaults;
    let q_vec = match q_vec {
        Some(weights) => weights,
        None => {
            defaults = default_q_vec(follower_ids.len());
            &defaults
        }
    };
    let visibility = visibility_rate(trajectory, follower_ids, q_vec)?;
    let posting = 0.5 * s * u_const * u_const;

    Ok(LossSeries {
        times: trajectory.times().to_vec(),
        values: visibility.into_iter().map(|q_t| q_t + posting).collect(),
    })
}

/// Cost rate of an optimal broadcaster: under the optimal policy the posting
/// term equals the visibility term, so the rate is `Σ q_i r_i²`.
pub fn quadratic_loss_optimal(
    trajectory: &RankTrajectory,
    sink_ids: &[u64],
    q_vec: &[f64],
) -> Result<LossSeries> {
    let visibility = visibility_rate(trajectory, sink_ids, q_vec)?;
    Ok(LossSeries {
        times: trajectory.times().to_vec(),
        values: visibility.into_iter().map(|q_t| 2.0 * q_t).collect(),
    })
}

pub fn utility_integral_for(log: &EventLog, opts: &SimOpts) -> Result<f64> {
    let trajectory = compute_rank_trajectory(log, opts.src_id())?;
    utility_integral(
        &trajectory,
        opts.sink_ids(),
        opts.q_vec(),
        opts.s(),
        opts.end_time(),
    )
}

pub fn time_in_top_k_for(log: &EventLog, k: usize, opts: &SimOpts) -> Result<f64> {
    let trajectory = compute_rank_trajectory(log, opts.src_id())?;
    time_in_top_k(&trajectory, k, opts.end_time())
}

pub fn average_rank_for(log: &EventLog, opts: &SimOpts) -> Result<f64> {
    let trajectory = compute_rank_trajectory(log, opts.src_id())?;
    average_rank(&trajectory, opts.end_time())
}

pub fn quadratic_loss_assuming_rate_for(
    log: &EventLog,
    u_const: f64,
    opts: &SimOpts,
) -> Result<LossSeries> {
    let trajectory = compute_rank_trajectory(log, opts.src_id())?;
    quadratic_loss_assuming_rate(
        &trajectory,
        u_const,
        opts.sink_ids(),
        Some(opts.q_vec()),
        opts.s(),
    )
}

pub fn quadratic_loss_optimal_for(log: &EventLog, opts: &SimOpts) -> Result<LossSeries> {
    let trajectory = compute_rank_trajectory(log, opts.src_id())?;
    quadratic_loss_optimal(&trajectory, opts.sink_ids(), opts.q_vec())
}

fn visibility_rate(
    trajectory: &RankTrajectory,
    follower_ids: &[u64],
    q_vec: &[f64],
) -> Result<Vec<f64>> {
    check_followers(follower_ids, q_vec)?;
    check_row_order(trajectory)?;
    let columns = columns_for(trajectory, follower_ids)?;
    Ok(trajectory
        .rows()
        .iter()
        .map(|cells| {
            0.5 * columns
                .iter()
                .zip(q_vec)
                .filter_map(|(column, q)| cells[*column].map(|rank| q * rank * rank))
                .sum::<f64>()
        })
        .collect())
}

fn check_followers(follower_ids: &[u64], q_vec: &[f64]) -> Result<()> {
    if follower_ids.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(RankError::Ordering("follower ids must be sorted".to_string()));
    }
    if q_vec.len() != follower_ids.len() {
        return Err(RankError::Precondition(format!(
            "q_vec has {} weights for {} followers",
            q_vec.len(),
            follower_ids.len()
        )));
    }
    Ok(())
}

/// Rows keyed by `event_id` need not be in time order; integrating over
/// them would produce negative widths.
fn check_row_order(trajectory: &RankTrajectory) -> Result<()> {
    if !is_sorted(trajectory.times(), true) {
        return Err(RankError::Ordering("trajectory rows are not in time order".to_string()));
    }
    Ok(())
}

fn checked_widths(trajectory: &RankTrajectory, end_time: f64) -> Result<Vec<f64>> {
    check_row_order(trajectory)?;
    Ok(trajectory.interval_widths(end_time))
}

fn columns_for(trajectory: &RankTrajectory, follower_ids: &[u64]) -> Result<Vec<usize>> {
    follower_ids
        .iter()
        .map(|sink| {
            trajectory.column_of(*sink).ok_or_else(|| {
                RankError::Precondition(format!("follower {} does not appear in the log", sink))
            })
        })
        .collect()
}

fn weighted_sum(cells: &[Option<f64>], columns: &[usize], weights: &[f64]) -> f64 {
    columns
        .iter()
        .zip(weights)
        .filter_map(|(column, weight)| cells[*column].map(|rank| rank * weight))
        .sum()
}
