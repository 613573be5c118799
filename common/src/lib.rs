//! Shared plumbing for the workspace: cached CPU capability detection and
//! logging setup.

pub mod cpu_features;
pub mod log_setup;

pub use cpu_features::{CpuFeatures, Extension};
