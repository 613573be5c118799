//! Engine configuration.

use std::fmt;
use std::str::FromStr;

use common::cpu_features::{self, CpuFeatures, Extension};

use crate::error::Error;

/// Upper bound on the instruction-set tier the auto-dispatcher may pick.
///
/// Explicitly requested strategies are not affected by the cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SimdCap {
    /// Use whatever the CPU reports.
    #[default]
    Detected,
    /// Force the scalar reference paths.
    Scalar,
    /// Allow tiers up to and including the given one.
    UpTo(Extension),
}

impl fmt::Display for SimdCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimdCap::Detected => write!(f, "detected"),
            SimdCap::Scalar => write!(f, "scalar"),
            SimdCap::UpTo(ext) => write!(f, "{ext}"),
        }
    }
}

impl FromStr for SimdCap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "detected" | "native" => Ok(SimdCap::Detected),
            "scalar" | "none" => Ok(SimdCap::Scalar),
            _ => Extension::from_str(trimmed)
                .map(SimdCap::UpTo)
                .map_err(|_| Error::UnknownSimdCap(trimmed.to_string())),
        }
    }
}

/// Configuration shared by [`Lut`](crate::Lut) and [`VhAdd`](crate::VhAdd).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub simd: SimdCap,
}

impl Config {
    /// Environment variable read by [`Config::from_env`].
    pub const ENV_VAR: &'static str = "LUTVH_SIMD";

    /// Auto-dispatch always picks the scalar reference.
    pub fn scalar() -> Self {
        Self {
            simd: SimdCap::Scalar,
        }
    }

    /// Auto-dispatch may use tiers up to `extension`.
    pub fn up_to(extension: Extension) -> Self {
        Self {
            simd: SimdCap::UpTo(extension),
        }
    }

    /// Reads the cap from `LUTVH_SIMD`. Missing or unparsable values fall
    /// back to [`SimdCap::Detected`]; the latter is logged.
    pub fn from_env() -> Self {
        let Ok(value) = std::env::var(Self::ENV_VAR) else {
            return Self::default();
        };
        match value.parse::<SimdCap>() {
            Ok(simd) => Self { simd },
            Err(err) => {
                tracing::warn!("{}: {err}, using detected features", Self::ENV_VAR);
                Self::default()
            }
        }
    }

    /// Detected CPU features with the cap applied.
    pub fn features(&self) -> CpuFeatures {
        let detected = cpu_features::get();
        match self.simd {
            SimdCap::Detected => detected,
            SimdCap::Scalar => CpuFeatures::NONE,
            SimdCap::UpTo(max) => detected.capped(Some(max)),
        }
    }
}
