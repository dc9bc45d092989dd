//! lanelegal-platform - target capability descriptions
//!
//! This crate describes the execution units the width legalizer targets. It is
//! kept apart from the program model so that capability presets can be loaded
//! and compared without pulling in the passes.
//!
//! ## Modules
//!
//! - [`target`] - Named hardware generations
//! - [`caps`] - Capability records, presets and errata

pub mod caps;
pub mod target;

pub use caps::{Erratum, TargetCaps};
pub use target::Generation;
