//! Numeric helpers shared by the filter, aggregator and calculator.

pub mod stats;

pub use stats::*;
