//! Reporting utilities: formatted terminal output for fetch/build runs and stored series.

pub mod format;

pub use format::*;
