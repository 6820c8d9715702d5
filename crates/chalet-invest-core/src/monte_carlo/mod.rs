pub mod correlation;
pub mod distributions;
pub mod paths;
pub mod sampling;
pub mod simulation;
pub mod statistics;

pub use correlation::CorrelationMatrix;
pub use distributions::{Bounds, McDistribution, McVariable};
pub use paths::PathModel;
pub use sampling::SamplingMethod;
pub use simulation::{
    default_variables, run_monte_carlo, McSummary, MonteCarloInput, MonteCarloOutput, TrialResult,
};
pub use statistics::MetricSummary;
