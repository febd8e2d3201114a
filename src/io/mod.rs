//! Input/output helpers.
//!
//! - daily snapshot reading (`store`) and writing + hashing (`snapshot`)
//! - append-only published series (`published`)
//! - JSON audit documents (`audit`)

pub mod audit;
pub mod published;
pub mod snapshot;
pub mod store;

pub use audit::*;
pub use published::*;
pub use snapshot::*;
pub use store::*;
