pub mod analyze;
pub mod monte_carlo;
pub mod scenarios;
pub mod sensitivity;
