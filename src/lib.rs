//! `cri-index` library crate.
//!
//! The binary (`cri`) is a thin wrapper around this library so that:
//!
//! - the index engine is testable without spawning processes
//! - verification can be embedded by third parties holding the same data
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod index;
pub mod io;
pub mod math;
pub mod report;
