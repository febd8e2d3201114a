//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - observations and per-day admission outcomes (`Observation`, `DailySummary`)
//! - the audit record (`CalculationResult`) and published rows (`PublishedRecord`)
//! - market configuration (`MarketConfig`, `MarketRegistry`)
//! - the versioned methodology (`Methodology`)

pub mod market;
pub mod methodology;
pub mod types;

pub use market::*;
pub use methodology::*;
pub use types::*;
