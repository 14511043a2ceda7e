use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{OracleConfig, SimOpts};
use crate::error::{RankError, Result};
use crate::event::EventLog;
use crate::is_sorted;

/// Optimal posting schedule against a fixed timeline of competing events.
///
/// Stage `k` sits just before competing event `k`; stage `n` sits after the
/// last competing event and before the horizon ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleResult {
    /// Oracle's rank at each stage, before its decision there.
    pub ranks: Vec<u32>,
    /// Whether the oracle posts at each stage.
    pub events: Vec<bool>,
    /// Stage start times: the horizon start followed by the competing events.
    pub timestamps: Vec<f64>,
    /// Interval charged at each stage.
    pub durations: Vec<f64>,
    pub cost: f64,
}

impl OracleResult {
    pub fn num_events(&self) -> usize {
        self.events.iter().filter(|posted| **posted).count()
    }

    /// Total stage duration spent at rank ≤ k-1.
    pub fn time_in_top_k(&self, k: usize) -> f64 {
        self.ranks
            .iter()
            .zip(&self.durations)
            .filter(|(rank, _)| (**rank as usize) < k)
            .map(|(_, duration)| duration)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Restricts the log before the oracle runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleFilter {
    pub omit_src_ids: Vec<u64>,
    pub follower_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default)]
pub struct OracleScheduler {
    config: OracleConfig,
}

impl OracleScheduler {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    /// Solves the backward DP over `(rank, stage)`.
    ///
    /// `J[r][n+1] = r²/2` and, for `k = n..=0` and every reachable `r ≤ k`,
    /// `J[r][k] = min(s/2 + J[0][k+1], q/2 · w[k+1] · (r+1)² + J[r+1][k+1])`.
    /// The forward pass posts only when posting is strictly cheaper.
    pub fn solve(
        &self,
        event_times: &[f64],
        end_time: f64,
        q_vec: &[f64],
        s: f64,
    ) -> Result<OracleResult> {
        if q_vec.len() != 1 {
            return Err(RankError::UnsupportedConfiguration(format!(
                "oracle supports a single follower, got {}",
                q_vec.len()
            )));
        }
        let q = q_vec[0];
        let n = event_times.len();
        if n > self.config.max_events {
            warn!(
                events = n,
                limit = self.config.max_events,
                "not running oracle above the event limit"
            );
            return Err(RankError::ScaleLimit {
                events: n,
                limit: self.config.max_events,
            });
        }
        validate_inputs(event_times, end_time, q, s)?;

        let durations = stage_widths(event_times, end_time);
        let table = self.fill(&durations, q, s);

        let mut ranks = vec![0u32; n + 1];
        let mut events = vec![false; n + 1];
        let mut rank = 0usize;
        for k in 0..=n {
            ranks[k] = rank as u32;
            let next = &table[k + 1];
            let post = 0.5 * s + next[0];
            let wait = wait_cost(q, durations[k], rank) + next[rank + 1];
            if post < wait {
                events[k] = true;
                rank = 0;
            } else {
                rank += 1;
            }
        }

        let cost = table[0][0];
        debug!(events = n, posts = events.iter().filter(|p| **p).count(), cost, "oracle solved");

        let mut timestamps = Vec::with_capacity(n + 1);
        timestamps.push(0.0);
        timestamps.extend_from_slice(event_times);

        Ok(OracleResult {
            ranks,
            events,
            timestamps,
            durations,
            cost,
        })
    }

    /// Column `k` holds `J[0..=k][k]`; the terminal column holds
    /// `J[0..=n+1][n+1]`.
    fn fill(&self, durations: &[f64], q: f64, s: f64) -> Vec<Vec<f64>> {
        let n = durations.len() - 1;
        let mut table: Vec<Vec<f64>> = vec![Vec::new(); n + 2];
        table[n + 1] = (0..=n + 1).map(|r| (r * r) as f64 / 2.0).collect();

        for k in (0..=n).rev() {
            let next = &table[k + 1];
            let width = durations[k];
            let post = 0.5 * s + next[0];
            let cell = |r: usize| post.min(wait_cost(q, width, r) + next[r + 1]);
            let column: Vec<f64> = if k + 1 >= self.config.parallel_threshold {
                (0..=k).into_par_iter().map(cell).collect()
            } else {
                (0..=k).map(cell).collect()
            };
            table[k] = column;
        }
        table
    }
}

/// Solves with the default event limit.
pub fn solve_oracle(
    event_times: &[f64],
    end_time: f64,
    q_vec: &[f64],
    s: f64,
) -> Result<OracleResult> {
    OracleScheduler::default().solve(event_times, end_time, q_vec, s)
}

/// Optimal schedule for `opts.src_id()` against the rest of `log`, which
/// must reach exactly one follower once the filter is applied.
pub fn oracle_ranking(
    log: &EventLog,
    opts: &SimOpts,
    filter: &OracleFilter,
    scheduler: &OracleScheduler,
) -> Result<OracleResult> {
    let mut wall = if filter.omit_src_ids.is_empty() {
        log.clone()
    } else {
        log.without_sources(&filter.omit_src_ids)
    };
    let follower_ids = match filter.follower_ids.as_ref() {
        Some(ids) => {
            wall = wall.restricted_to_sinks(ids);
            ids.clone()
        }
        None => wall.sink_ids(),
    };
    if follower_ids.len() != 1 {
        return Err(RankError::UnsupportedConfiguration(format!(
            "oracle supports a single follower, got {}",
            follower_ids.len()
        )));
    }

    scheduler.solve(&wall.event_times(), opts.end_time(), opts.q_vec(), opts.s())
}

fn wait_cost(q: f64, width: f64, rank: usize) -> f64 {
    let next_rank = (rank + 1) as f64;
    0.5 * q * width * next_rank * next_rank
}

/// `w[k]` for stages `0..=n`: the start of the horizon to the first event,
/// gaps between events, then the last event to `end_time`.
fn stage_widths(event_times: &[f64], end_time: f64) -> Vec<f64> {
    let mut widths = Vec::with_capacity(event_times.len() + 1);
    let mut previous = 0.0;
    for time in event_times.iter().copied().chain(std::iter::once(end_time)) {
        widths.push(time - previous);
        previous = time;
    }
    widths
}

fn validate_inputs(event_times: &[f64], end_time: f64, q: f64, s: f64) -> Result<()> {
    if !is_sorted(event_times, true) {
        return Err(RankError::Ordering("competing event times are not sorted".to_string()));
    }
    if event_times.first().map(|first| *first < 0.0).unwrap_or(false) {
        return Err(RankError::Precondition(
            "competing events must not precede the horizon start".to_string(),
        ));
    }
    let last = event_times.last().copied().unwrap_or(0.0);
    if !(end_time >= last) || !end_time.is_finite() {
        return Err(RankError::Precondition(format!(
            "end_time {} precedes the last competing event {}",
            end_time, last
        )));
    }
    if !(q >= 0.0) || !(s > 0.0) {
        return Err(RankError::Precondition(format!(
            "weights must satisfy q >= 0 and s > 0, got q = {}, s = {}",
            q, s
        )));
    }
    Ok(())
}
