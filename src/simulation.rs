use crate::config::SimOpts;
use crate::error::{RankError, Result};
use crate::event::EventLog;

/// A simulation run that produces an event log once completed.
pub trait SimulationManager {
    /// Runs the simulation to completion.
    fn run(&mut self) -> Result<()>;

    /// Event log of the finished run.
    fn event_log(&self) -> Result<EventLog>;
}

/// Builds simulation runs for a given configuration snapshot.
pub trait ManagerFactory: Sync {
    type Manager: SimulationManager;

    /// Competing sources only: the designated source never posts.
    fn wall_manager(&self, opts: &SimOpts) -> Self::Manager;

    /// Full feed for one seed, with the designated source following the
    /// optimal policy implied by `opts`.
    fn seeded_manager(&self, opts: &SimOpts, seed: u64) -> Self::Manager;
}

/// Replays a recorded log. The wall is the log without the designated
/// source; seeded runs return the full log whatever the seed.
#[derive(Debug, Clone)]
pub struct ReplayFactory {
    log: EventLog,
}

impl ReplayFactory {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayManager {
    log: EventLog,
    finished: bool,
}

impl SimulationManager for ReplayManager {
    fn run(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn event_log(&self) -> Result<EventLog> {
        if !self.finished {
            return Err(RankError::Simulation("replay has not been run".to_string()));
        }
        Ok(self.log.clone())
    }
}

impl ManagerFactory for ReplayFactory {
    type Manager = ReplayManager;

    fn wall_manager(&self, opts: &SimOpts) -> ReplayManager {
        ReplayManager {
            log: self.log.without_sources(&[opts.src_id()]),
            finished: false,
        }
    }

    fn seeded_manager(&self, _opts: &SimOpts, _seed: u64) -> ReplayManager {
        ReplayManager {
            log: self.log.clone(),
            finished: false,
        }
    }
}
