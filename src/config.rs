use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{RankError, Result};
use crate::default_q_vec;

/// Run description for one designated source. Values are never mutated in
/// place; [`SimOpts::update`] returns a new copy with the overrides applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimOpts {
    src_id: u64,
    end_time: f64,
    q_vec: Vec<f64>,
    s: f64,
    sink_ids: Vec<u64>,
}

/// Field overrides for [`SimOpts::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimOptsUpdate {
    pub src_id: Option<u64>,
    pub end_time: Option<f64>,
    pub q_vec: Option<Vec<f64>>,
    pub s: Option<f64>,
    pub sink_ids: Option<Vec<u64>>,
}

impl SimOptsUpdate {
    pub fn s(mut self, s: f64) -> Self {
        self.s = Some(s);
        self
    }

    pub fn end_time(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn q_vec(mut self, q_vec: Vec<f64>) -> Self {
        self.q_vec = Some(q_vec);
        self
    }

    pub fn src_id(mut self, src_id: u64) -> Self {
        self.src_id = Some(src_id);
        self
    }

    /// Replacing the followers without a new `q_vec` resets the weights to
    /// [`default_q_vec`] for the new follower count.
    pub fn sink_ids(mut self, sink_ids: Vec<u64>) -> Self {
        self.sink_ids = Some(sink_ids);
        self
    }
}

impl SimOpts {
    pub fn new(src_id: u64, sink_ids: Vec<u64>, end_time: f64) -> Result<Self> {
        let opts = Self {
            src_id,
            end_time,
            q_vec: default_q_vec(sink_ids.len()),
            s: 1.0,
            sink_ids,
        };
        opts.validate()?;
        Ok(opts)
    }

    pub fn src_id(&self) -> u64 {
        self.src_id
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn q_vec(&self) -> &[f64] {
        &self.q_vec
    }

    pub fn s(&self) -> f64 {
        self.s
    }

    pub fn sink_ids(&self) -> &[u64] {
        &self.sink_ids
    }

    pub fn update(&self, update: SimOptsUpdate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(src_id) = update.src_id {
            next.src_id = src_id;
        }
        if let Some(end_time) = update.end_time {
            next.end_time = end_time;
        }
        if let Some(s) = update.s {
            next.s = s;
        }
        if let Some(sink_ids) = update.sink_ids {
            if update.q_vec.is_none() {
                next.q_vec = default_q_vec(sink_ids.len());
            }
            next.sink_ids = sink_ids;
        }
        if let Some(q_vec) = update.q_vec {
            next.q_vec = q_vec;
        }
        next.validate()?;
        Ok(next)
    }

    pub fn with_s(&self, s: f64) -> Result<Self> {
        self.update(SimOptsUpdate::default().s(s))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.end_time.is_finite() {
            return Err(RankError::Precondition(format!(
                "end_time must be finite, got {}",
                self.end_time
            )));
        }
        if !(self.s > 0.0) || !self.s.is_finite() {
            return Err(RankError::Precondition(format!(
                "s must be positive, got {}",
                self.s
            )));
        }
        if self.sink_ids.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(RankError::Ordering("sink_ids must be sorted and unique".to_string()));
        }
        if self.q_vec.len() != self.sink_ids.len() {
            return Err(RankError::Precondition(format!(
                "q_vec has {} weights for {} followers",
                self.q_vec.len(),
                self.sink_ids.len()
            )));
        }
        if self.q_vec.iter().any(|q| !(*q >= 0.0)) {
            return Err(RankError::Precondition("q_vec weights must be non-negative".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub s_init: f64,
    pub tolerance: f64,
    pub max_bracket_steps: u32,
    pub max_iterations: u32,
    pub seeds: Vec<u64>,
    pub parallel: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            s_init: 1.0,
            tolerance: 1e-2,
            max_bracket_steps: 64,
            max_iterations: 200,
            seeds: (0..10).collect(),
            parallel: true,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(RankError::Precondition("calibration needs at least one seed".to_string()));
        }
        if !(self.tolerance > 0.0) || !(self.s_init > 0.0) {
            return Err(RankError::Precondition(format!(
                "tolerance and s_init must be positive, got {} and {}",
                self.tolerance, self.s_init
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub max_events: usize,
    pub parallel_threshold: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            parallel_threshold: 8192,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sim: Option<SimOpts>,
    pub calibration: CalibrationConfig,
    pub oracle: OracleConfig,
}

impl RunConfig {
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = path.or_else(default_config_path);
        let mut config = if let Some(path) = config_path.as_ref() {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .map_err(|err| RankError::Config(format!("failed to read config: {}", err)))?;
                Self::from_toml(&contents)?
            } else {
                RunConfig::default()
            }
        } else {
            RunConfig::default()
        };

        config.apply_env_overrides();
        config.calibration.validate()?;
        if let Some(sim) = config.sim.as_ref() {
            sim.validate()?;
        }
        Ok((config, config_path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|err| RankError::Config(format!("failed to parse config: {}", err)))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| RankError::Config(format!("failed to create config dir: {}", err)))?;
        }
        let payload = toml::to_string_pretty(self)
            .map_err(|err| RankError::Config(format!("failed to serialize config: {}", err)))?;
        std::fs::write(path, payload)
            .map_err(|err| RankError::Config(format!("failed to write config: {}", err)))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(tolerance) = env::var("FEED_RANK_TOLERANCE") {
            if let Ok(value) = tolerance.parse::<f64>() {
                self.calibration.tolerance = value;
            }
        }
        if let Ok(seeds) = env::var("FEED_RANK_SEEDS") {
            if let Ok(count) = seeds.parse::<u64>() {
                self.calibration.seeds = (0..count).collect();
            }
        }
        if let Ok(parallel) = env::var("FEED_RANK_PARALLEL") {
            if let Ok(value) = parallel.parse::<bool>() {
                self.calibration.parallel = value;
            }
        }
        if let Ok(max_events) = env::var("FEED_RANK_ORACLE_MAX_EVENTS") {
            if let Ok(value) = max_events.parse::<usize>() {
                self.oracle.max_events = value;
            }
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var("FEED_RANK_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config/feed-rank.toml")))
}
