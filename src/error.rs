use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RankError {
    #[error("ordering error: {0}")]
    Ordering(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("scale limit exceeded: {events} events (limit {limit})")]
    ScaleLimit { events: usize, limit: usize },
    #[error("calibration did not converge: {0}")]
    ConvergenceFailure(String),
    #[error("simulation failed: {0}")]
    Simulation(String),
    #[error("worker pool error: {0}")]
    WorkerPool(String),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RankError>;
