//! CPU feature detection for runtime SIMD dispatch.
//!
//! Detection is performed once, on first use, and cached for the lifetime of
//! the process. Use these functions instead of `is_x86_feature_detected!`
//! directly to avoid repeated CPUID calls.

use std::sync::OnceLock;

use strum_macros::{Display, EnumIter, EnumString};

/// Vector instruction-set tiers that kernels are gated on, lowest first.
///
/// The tiers are nested: a CPU reporting a tier also reports every tier
/// below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Extension {
    /// AVX2 (256-bit integer vectors, 32-bit gathers).
    Avx2,
    /// AVX-512 Foundation (512-bit vectors, 16-lane gathers, narrowing stores).
    Avx512f,
    /// AVX-512 VBMI (byte-granular two-source permutes).
    Avx512Vbmi,
}

/// CPU feature flags detected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    pub avx2: bool,
    pub avx512f: bool,
    pub avx512vbmi: bool,
}

impl CpuFeatures {
    /// No vector extension at all; only scalar code may run.
    pub const NONE: CpuFeatures = CpuFeatures {
        avx2: false,
        avx512f: false,
        avx512vbmi: false,
    };

    pub fn supports(&self, extension: Extension) -> bool {
        match extension {
            Extension::Avx2 => self.avx2,
            Extension::Avx512f => self.avx512f,
            Extension::Avx512Vbmi => self.avx512vbmi,
        }
    }

    /// Highest supported tier, if any.
    pub fn best(&self) -> Option<Extension> {
        if self.avx512vbmi {
            Some(Extension::Avx512Vbmi)
        } else if self.avx512f {
            Some(Extension::Avx512f)
        } else if self.avx2 {
            Some(Extension::Avx2)
        } else {
            None
        }
    }

    /// Masks out every tier above `max`. `None` keeps all detected tiers.
    #[must_use]
    pub fn capped(self, max: Option<Extension>) -> CpuFeatures {
        let Some(max) = max else {
            return self;
        };
        CpuFeatures {
            avx2: self.avx2 && Extension::Avx2 <= max,
            avx512f: self.avx512f && Extension::Avx512f <= max,
            avx512vbmi: self.avx512vbmi && Extension::Avx512Vbmi <= max,
        }
    }
}

static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// Get cached CPU features (detected once on first call).
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn get() -> CpuFeatures {
    *FEATURES.get_or_init(|| {
        let avx2 = is_x86_feature_detected!("avx2");
        let avx512f = avx2 && is_x86_feature_detected!("avx512f");
        let avx512vbmi = avx512f
            && is_x86_feature_detected!("avx512bw")
            && is_x86_feature_detected!("avx512vbmi");

        let features = CpuFeatures {
            avx2,
            avx512f,
            avx512vbmi,
        };
        tracing::debug!(?features, "detected CPU features");
        features
    })
}

/// Get cached CPU features - stub for non-x86 platforms.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn get() -> CpuFeatures {
    *FEATURES.get_or_init(|| CpuFeatures::NONE)
}

/// Check whether the running CPU supports `extension`.
#[inline]
pub fn is_supported(extension: Extension) -> bool {
    get().supports(extension)
}

/// Check if AVX2 is available.
#[inline]
pub fn has_avx2() -> bool {
    get().avx2
}

/// Check if AVX-512F is available.
#[inline]
pub fn has_avx512f() -> bool {
    get().avx512f
}

/// Check if AVX-512 VBMI is available.
#[inline]
pub fn has_avx512vbmi() -> bool {
    get().avx512vbmi
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_detection_is_cached() {
        assert_eq!(get(), get());
    }

    #[test]
    fn test_tiers_are_nested() {
        let features = get();
        if features.avx512vbmi {
            assert!(features.avx512f);
        }
        if features.avx512f {
            assert!(features.avx2);
        }
    }

    #[test]
    fn test_best_matches_supports() {
        let features = get();
        match features.best() {
            Some(best) => {
                assert!(features.supports(best));
                for ext in Extension::iter().filter(|&e| e > best) {
                    assert!(!features.supports(ext));
                }
            }
            None => assert_eq!(features, CpuFeatures::NONE),
        }
    }

    #[test]
    fn test_capped() {
        let all = CpuFeatures {
            avx2: true,
            avx512f: true,
            avx512vbmi: true,
        };

        assert_eq!(all.capped(None), all);
        assert_eq!(all.capped(Some(Extension::Avx2)).best(), Some(Extension::Avx2));
        assert_eq!(
            all.capped(Some(Extension::Avx512f)).best(),
            Some(Extension::Avx512f)
        );
        assert_eq!(CpuFeatures::NONE.capped(Some(Extension::Avx512Vbmi)), CpuFeatures::NONE);
    }

    #[test]
    fn test_extension_names() {
        assert_eq!(Extension::Avx512Vbmi.to_string(), "avx512vbmi");
        assert_eq!(Extension::from_str("AVX2").unwrap(), Extension::Avx2);
        assert_eq!(Extension::from_str("avx512f").unwrap(), Extension::Avx512f);
        assert!(Extension::from_str("sse2").is_err());
    }
}
