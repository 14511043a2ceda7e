use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{RankError, Result};
use crate::is_sorted;

/// One post by `src_id` landing in follower `sink_id`'s feed at time `t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub t: f64,
    pub src_id: u64,
    pub sink_id: u64,
}

impl Event {
    pub fn new(event_id: u64, t: f64, src_id: u64, sink_id: u64) -> Self {
        Self {
            event_id,
            t,
            src_id,
            sink_id,
        }
    }
}

/// Events ordered ascending by time. Construction rejects unsorted input;
/// the log is never re-sorted.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(events: Vec<Event>) -> Result<Self> {
        let times: Vec<f64> = events.iter().map(|event| event.t).collect();
        if !is_sorted(&times, true) {
            return Err(RankError::Ordering("event log is not sorted by time".to_string()));
        }
        Ok(Self { events })
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        let events: Vec<Event> = serde_json::from_str(payload)
            .map_err(|err| RankError::Precondition(format!("failed to parse event log: {}", err)))?;
        Self::new(events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.events.last().map(|event| event.t)
    }

    /// Sorted, de-duplicated followers appearing anywhere in the log.
    pub fn sink_ids(&self) -> Vec<u64> {
        let sinks: BTreeSet<u64> = self.events.iter().map(|event| event.sink_id).collect();
        sinks.into_iter().collect()
    }

    /// Sorted followers that received at least one post from `src_id`.
    pub fn followers_of(&self, src_id: u64) -> Vec<u64> {
        let sinks: BTreeSet<u64> = self
            .events
            .iter()
            .filter(|event| event.src_id == src_id)
            .map(|event| event.sink_id)
            .collect();
        sinks.into_iter().collect()
    }

    pub fn without_sources(&self, src_ids: &[u64]) -> Self {
        let omitted: HashSet<u64> = src_ids.iter().copied().collect();
        Self {
            events: self
                .events
                .iter()
                .filter(|event| !omitted.contains(&event.src_id))
                .copied()
                .collect(),
        }
    }

    pub fn restricted_to_sinks(&self, sink_ids: &[u64]) -> Self {
        let kept: HashSet<u64> = sink_ids.iter().copied().collect();
        Self {
            events: self
                .events
                .iter()
                .filter(|event| kept.contains(&event.sink_id))
                .copied()
                .collect(),
        }
    }

    /// Mean time of each distinct event, ordered by `event_id`. A post fanned
    /// out to several followers counts once.
    pub fn event_times(&self) -> Vec<f64> {
        let mut grouped: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
        for event in &self.events {
            let entry = grouped.entry(event.event_id).or_insert((0.0, 0));
            entry.0 += event.t;
            entry.1 += 1;
        }
        grouped
            .values()
            .map(|(sum, count)| sum / *count as f64)
            .collect()
    }
}
