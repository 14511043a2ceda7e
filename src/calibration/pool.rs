use rayon::prelude::*;
use std::thread;

use crate::error::{RankError, Result};

/// Runs one independent task per seed and hands back results in seed order.
///
/// Parallel pools hold `min(seeds, available cores)` threads; a batch blocks
/// until every task has finished.
pub struct SeedPool {
    pool: Option<rayon::ThreadPool>,
}

impl SeedPool {
    pub fn new(seed_count: usize, parallel: bool) -> Result<Self> {
        if !parallel || seed_count <= 1 {
            return Ok(Self { pool: None });
        }
        let cores = thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        let threads = seed_count.min(cores).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("calib-{}", i))
            .build()
            .map_err(|err| RankError::WorkerPool(err.to_string()))?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }

    pub fn run<F>(&self, seeds: &[u64], task: F) -> Result<Vec<f64>>
    where
        F: Fn(u64) -> Result<f64> + Sync + Send,
    {
        match self.pool.as_ref() {
            Some(pool) => pool.install(|| seeds.par_iter().map(|seed| task(*seed)).collect()),
            None => seeds.iter().map(|seed| task(*seed)).collect(),
        }
    }
}

/// Arithmetic mean, `None` for an empty batch.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
