pub mod engine;
pub mod events;

pub use engine::{compute_projection, ProjectionParams, ProjectionRow};
pub use events::{MaintenanceEvent, MarketShock, ProjectionEvents, RefinancingEvent, SaronCycle};
