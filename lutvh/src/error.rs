//! Error types for the remap and accumulation engines.

use thiserror::Error;

use crate::lut::LutMethod;

/// Errors reported to the caller. Programming errors (running an explicitly
/// requested strategy on a CPU without its instruction-set tier, or passing a
/// destination shorter than the source) panic instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Invalid window [{min}, {max}]: requires min < max")]
    InvalidWindow { min: i32, max: i32 },

    #[error("{0} is a convert-only strategy and cannot build a remap table")]
    CreateNotSupported(LutMethod),

    #[error("No window has been created yet")]
    NotCreated,

    #[error("Invalid window extent {horizontal}x{vertical}: both must be in 1..={max}")]
    InvalidGeometry {
        horizontal: usize,
        vertical: usize,
        max: usize,
    },

    #[error("Source has {actual} samples, image needs {expected}")]
    SourceTooShort { expected: usize, actual: usize },

    #[error("Unknown SIMD cap '{0}' (expected detected, scalar, avx2, avx512f or avx512vbmi)")]
    UnknownSimdCap(String),
}

pub type Result<T> = std::result::Result<T, Error>;
