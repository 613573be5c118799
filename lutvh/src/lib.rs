//! Windowed 16-bit to 8-bit sample remapping ([`Lut`]) and vertical/horizontal
//! sliding-window accumulation ([`VhAdd`]).
//!
//! Every operation exists as a scalar reference and as AVX2 / AVX-512
//! variants. Callers either name a variant explicitly (`*_with`) or let the
//! engine pick the best one the CPU supports, resolved once per instance.
//! All variants produce bit-identical output.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lut;
pub mod vhadd;

#[cfg(test)]
pub(crate) mod test_utils;

pub use common::cpu_features::{CpuFeatures, Extension};
pub use config::{Config, SimdCap};
pub use dispatch::Strategy;
pub use error::{Error, Result};
pub use lut::{LUT_SIZE, Lut, LutMethod, Window, mean_squared_error, reference_value};
pub use vhadd::{Geometry, MAX_EXTENT, VhAdd, VhAddMethod, VhResult};
