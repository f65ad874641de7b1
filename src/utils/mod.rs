//! Shared utilities.

pub mod decimal;

pub use decimal::{as_percent, pct_distance, percent_of, safe_div};
