//! Input/output helpers.
//!
//! - CSV normalization into typed records (`normalize`)
//! - keyed JSON document storage (`store`)

pub mod normalize;
pub mod store;

pub use normalize::*;
pub use store::*;
