//! Index engine: outlier filtering, window aggregation, calculation and
//! verification.
//!
//! The submodules are layered bottom-up:
//! `outlier` -> `window` -> `calculator` -> `verify`.

pub mod calculator;
pub mod outlier;
pub mod verify;
pub mod window;

pub use calculator::*;
pub use outlier::*;
pub use verify::*;
pub use window::*;
