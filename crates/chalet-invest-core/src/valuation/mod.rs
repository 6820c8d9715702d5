pub mod irr;
pub mod returns;

pub use irr::{calculate_irr, IrrMethod, IrrSolution};
pub use returns::{calculate_irrs_from_projection, IrrResult, ReturnsInput};
