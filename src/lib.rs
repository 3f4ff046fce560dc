//! `epi-series` library crate.
//!
//! The binary (`epi`) is a thin wrapper around this library so that:
//!
//! - the merge/backfill engine is testable without touching disk or network
//! - fetch and build can be driven from tests with in-memory stores and fixed clocks
//! - code stays easy to navigate as datasets are added

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod report;
