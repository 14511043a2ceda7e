use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{RankError, Result};
use crate::event::EventLog;
use crate::is_sorted;

/// Row key of a rank trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RankIndex {
    /// One row per distinct timestamp.
    Time,
    /// One row per `event_id`, in id order. Rows are only in time order
    /// when ids are; the metrics reject trajectories whose rows are not.
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOptions {
    pub index: RankIndex,
    pub fill: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            index: RankIndex::Time,
            fill: true,
        }
    }
}

/// Rank of one source at every follower over time. Rows follow the log's
/// order, columns are the log's sorted followers. A cell is `None` until the
/// follower's first observation (and between observations in the sparse form).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankTrajectory {
    index: RankIndex,
    filled: bool,
    times: Vec<f64>,
    event_ids: Vec<u64>,
    sink_ids: Vec<u64>,
    rows: Vec<Vec<Option<f64>>>,
}

impl RankTrajectory {
    pub fn index(&self) -> RankIndex {
        self.index
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Row event ids; empty unless indexed by [`RankIndex::Event`].
    pub fn event_ids(&self) -> &[u64] {
        &self.event_ids
    }

    pub fn sink_ids(&self) -> &[u64] {
        &self.sink_ids
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_of(&self, sink_id: u64) -> Option<usize> {
        self.sink_ids.binary_search(&sink_id).ok()
    }

    pub fn rank(&self, row: usize, sink_id: u64) -> Option<f64> {
        let column = self.column_of(sink_id)?;
        self.rows.get(row).and_then(|cells| cells[column])
    }

    pub fn column(&self, sink_id: u64) -> Option<Vec<Option<f64>>> {
        let column = self.column_of(sink_id)?;
        Some(self.rows.iter().map(|cells| cells[column]).collect())
    }

    /// Mean over the followers observed in `row`.
    pub fn mean_rank(&self, row: usize) -> Option<f64> {
        let cells = self.rows.get(row)?;
        let (sum, count) = cells
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(sum, count), rank| (sum + rank, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Width of each row's interval: time to the next row, and
    /// `end_time - last` for the final row.
    pub fn interval_widths(&self, end_time: f64) -> Vec<f64> {
        interval_widths(&self.times, end_time)
    }

    /// Holds each follower's last observed rank across later rows.
    pub fn forward_filled(&self) -> Self {
        let mut rows = self.rows.clone();
        let mut carried: Vec<Option<f64>> = vec![None; self.sink_ids.len()];
        for cells in rows.iter_mut() {
            for (column, cell) in cells.iter_mut().enumerate() {
                match *cell {
                    Some(rank) => carried[column] = Some(rank),
                    None => *cell = carried[column],
                }
            }
        }
        Self {
            filled: true,
            rows,
            ..self.clone()
        }
    }
}

pub(crate) fn interval_widths(times: &[f64], end_time: f64) -> Vec<f64> {
    times
        .iter()
        .enumerate()
        .map(|(idx, time)| times.get(idx + 1).copied().unwrap_or(end_time) - time)
        .collect()
}

/// Rank of `src_id` at every follower, forward-filled and indexed by time.
pub fn compute_rank_trajectory(log: &EventLog, src_id: u64) -> Result<RankTrajectory> {
    compute_rank_trajectory_with(log, src_id, RankOptions::default())
}

pub fn compute_rank_trajectory_with(
    log: &EventLog,
    src_id: u64,
    options: RankOptions,
) -> Result<RankTrajectory> {
    let events = log.events();
    let stamps: Vec<f64> = events.iter().map(|event| event.t).collect();
    if !is_sorted(&stamps, true) {
        return Err(RankError::Ordering("event log is not sorted by time".to_string()));
    }

    let sink_ids = log.sink_ids();
    let columns: HashMap<u64, usize> = sink_ids
        .iter()
        .enumerate()
        .map(|(column, sink)| (*sink, column))
        .collect();

    // Per follower: events seen so far, and the position of the source's
    // latest post (0 before its first one).
    let mut streams = vec![(0u64, 0u64); sink_ids.len()];
    let mut observed = Vec::with_capacity(events.len());
    for event in events {
        let column = columns[&event.sink_id];
        let (position, last_own) = &mut streams[column];
        *position += 1;
        if event.src_id == src_id {
            *last_own = *position;
        }
        observed.push((column, (*position - *last_own) as f64));
    }

    let width = sink_ids.len();
    let mut times = Vec::new();
    let mut event_ids = Vec::new();
    let mut accumulators: Vec<Vec<(f64, u32)>> = Vec::new();

    match options.index {
        RankIndex::Time => {
            for (event, (column, rank)) in events.iter().zip(observed) {
                if times.last() != Some(&event.t) {
                    times.push(event.t);
                    accumulators.push(vec![(0.0, 0); width]);
                }
                if let Some(row) = accumulators.last_mut() {
                    row[column].0 += rank;
                    row[column].1 += 1;
                }
            }
        }
        RankIndex::Event => {
            let mut grouped: BTreeMap<u64, (f64, Vec<(f64, u32)>)> = BTreeMap::new();
            for (event, (column, rank)) in events.iter().zip(observed) {
                let entry = grouped
                    .entry(event.event_id)
                    .or_insert_with(|| (event.t, vec![(0.0, 0); width]));
                entry.1[column].0 += rank;
                entry.1[column].1 += 1;
            }
            for (event_id, (time, row)) in grouped {
                event_ids.push(event_id);
                times.push(time);
                accumulators.push(row);
            }
        }
    }

    let rows = accumulators
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(sum, count)| {
                    if count == 0 {
                        None
                    } else {
                        Some(sum / count as f64)
                    }
                })
                .collect()
        })
        .collect();

    let sparse = RankTrajectory {
        index: options.index,
        filled: false,
        times,
        event_ids,
        sink_ids,
        rows,
    };

    if options.fill {
        Ok(sparse.forward_filled())
    } else {
        Ok(sparse)
    }
}
