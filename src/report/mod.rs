//! Report generation.
//!
//! Point-in-time metric exports written on demand.

pub mod generator;

pub use generator::*;
