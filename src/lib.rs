pub mod calibration;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod oracle;
pub mod rank;
pub mod simulation;

pub use calibration::{CalibrationDetail, CalibrationResult, Calibrator, Statistic};
pub use config::{CalibrationConfig, OracleConfig, RunConfig, SimOpts, SimOptsUpdate};
pub use error::{RankError, Result};
pub use event::{Event, EventLog};
pub use metrics::LossSeries;
pub use oracle::{oracle_ranking, solve_oracle, OracleFilter, OracleResult, OracleScheduler};
pub use rank::{
    compute_rank_trajectory, compute_rank_trajectory_with, RankIndex, RankOptions, RankTrajectory,
};
pub use simulation::{ManagerFactory, ReplayFactory, SimulationManager};

/// Whether `values` is ordered (non-strictly). NaN never compares as ordered.
pub fn is_sorted(values: &[f64], ascending: bool) -> bool {
    values.windows(2).all(|pair| {
        if ascending {
            pair[1] >= pair[0]
        } else {
            pair[1] <= pair[0]
        }
    })
}

/// Uniform follower weights `1 / n²`.
pub fn default_q_vec(num_followers: usize) -> Vec<f64> {
    let n = num_followers as f64;
    vec![1.0 / (n * n); num_followers]
}

pub fn format_float(value: f64, digits: usize) -> String {
    format!("{:.1$}", value, digits)
}

pub fn format_rank(value: Option<f64>) -> String {
    value
        .map(|rank| format_float(rank, 1))
        .unwrap_or_else(|| "-".to_string())
}
