//! Strategy capability checks and auto-dispatch selection.

use std::fmt;

use common::cpu_features::{self, CpuFeatures, Extension};

/// A computation variant gated on an instruction-set tier.
pub trait Strategy: Copy + fmt::Display {
    /// Tier the variant needs, `None` for portable scalar code.
    fn required_extension(self) -> Option<Extension>;

    fn is_supported_by(self, features: CpuFeatures) -> bool {
        self.required_extension()
            .is_none_or(|extension| features.supports(extension))
    }

    /// Whether the running CPU can execute this variant.
    fn is_supported(self) -> bool {
        self.is_supported_by(cpu_features::get())
    }
}

/// Panics when the running CPU lacks the tier `strategy` needs.
///
/// Explicitly requested strategies never fall back silently; only the
/// auto-dispatch entry points choose a substitute.
#[inline]
pub(crate) fn ensure_supported<S: Strategy>(strategy: S) {
    if let Some(extension) = strategy.required_extension() {
        assert!(
            cpu_features::is_supported(extension),
            "{strategy} requires {extension}, which this CPU does not support"
        );
    }
}

/// First strategy of `ranking` (best first) that `features` can run.
pub(crate) fn select<S: Strategy>(ranking: &[S], features: CpuFeatures) -> Option<S> {
    ranking
        .iter()
        .copied()
        .find(|strategy| strategy.is_supported_by(features))
}
