pub mod bisection;
pub mod pool;
pub mod runner;

pub use bisection::{bisect, BisectionOutcome, BisectionSettings, Bracket, Probe};
pub use pool::SeedPool;
pub use runner::{CalibrationDetail, CalibrationResult, Calibrator, Statistic};
