//! Program analyses.
//!
//! Analyses read a [`Program`](lanelegal_mir::Program) and never modify it.
//! Their results are only meaningful until the next pass invalidates the
//! program.

pub mod liveness;

pub use liveness::{LiveRange, Liveness, compute_live_ranges, ranges_interfere};
