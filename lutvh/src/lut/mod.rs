//! Windowed 16-bit to 8-bit sample remapping.
//!
//! A window `(min, max)` maps every 16-bit sample `x` to
//! `clamp(round_half_up(255 * (x - min) / (max - min)), 0, 255)`. The mapping
//! is either precomputed into a 65536-entry table and looked up, or evaluated
//! directly per sample. Every strategy is bit-exact with the scalar reference:
//!
//! - the float strategies divide `255 * n` by the span in single precision;
//!   with `n <= span <= 65535` the numerator is exact and a non-tie quotient
//!   is always more than half an ulp away from the rounding boundary.
//! - the integer-weighted strategies estimate with a 16.16 fixed-point
//!   weight and apply one residual correction step.
//! - windows wider than 65535 make both of the above inexact, so every
//!   evaluating strategy switches to double precision for them, where the
//!   same half-ulp argument holds for any span of two `i32` bounds.

mod scalar;

#[cfg(target_arch = "x86_64")]
mod avx2;

#[cfg(target_arch = "x86_64")]
mod avx512;


use common::cpu_features::{CpuFeatures, Extension};
use strum_macros::{Display, EnumIter};

use crate::config::Config;
use crate::dispatch::{self, Strategy};
use crate::error::{Error, Result};

/// Number of table entries, one per 16-bit sample value.
pub const LUT_SIZE: usize = 1 << 16;

/// Zeroed tail so 32-bit gathers at index 65535 stay inside the allocation.
const TABLE_PADDING: usize = 64;

/// Widest span the single-precision and fixed-point kernels evaluate exactly.
const NARROW_SPAN: i64 = u16::MAX as i64;

/// Linear mapping domain, any `min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    min: i32,
    max: i32,
}

impl Window {
    pub fn new(min: i32, max: i32) -> Result<Self> {
        if min >= max {
            return Err(Error::InvalidWindow { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    /// `max - min`, up to `2^32 - 1`.
    pub fn span(&self) -> i64 {
        self.max as i64 - self.min as i64
    }

    pub(crate) fn weights(&self) -> WindowWeights {
        let exact_min = self.min as i64;
        let exact_span = self.span();
        if exact_span > NARROW_SPAN {
            // Lane constants are unused by the wide path.
            return WindowWeights {
                min: 0,
                span: 1,
                int_weight: 255 << 16,
                exact_min,
                exact_span,
            };
        }

        let span = exact_span as i32;
        // Outputs only depend on min through clamp(x - min, 0, span) with x in
        // [0, 65535]; pinning min to +-65536 keeps x - min inside i32 lanes
        // without changing any result.
        let min = self.min.clamp(-(LUT_SIZE as i32), LUT_SIZE as i32);
        WindowWeights {
            min,
            span,
            int_weight: (255 << 16) / span,
            exact_min,
            exact_span,
        }
    }
}

/// Per-window constants shared by all kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowWeights {
    /// 32-bit lane constants, meaningful for narrow windows only.
    pub min: i32,
    pub span: i32,
    /// `floor(255 * 2^16 / span)`.
    pub int_weight: i32,
    /// The window as given.
    pub exact_min: i64,
    pub exact_span: i64,
}

impl WindowWeights {
    /// Spans past 16 bits are evaluated in double precision.
    #[inline]
    pub fn is_wide(&self) -> bool {
        self.exact_span > NARROW_SPAN
    }
}

/// Evaluates the window formula for a single sample.
pub fn reference_value(window: Window, x: u16) -> u8 {
    scalar::reference(&window.weights(), x as i32)
}

/// Mean squared difference between two conversion outputs, `0.0` when they
/// are identical or empty.
///
/// # Panics
/// If the buffers differ in length.
pub fn mean_squared_error(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len(), "buffers differ in length");
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    sum / a.len() as f64
}

/// Computation variants of [`Lut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum LutMethod {
    /// Scalar table build and per-element lookup.
    NaiveLut,
    /// Segmented vector table build, 8-lane gather lookup.
    Avx2Lut,
    /// 16-lane gather lookup.
    Avx512fLut,
    /// 64 lookups per step compacted with a byte permute.
    Avx512VbmiLut,
    /// Scalar direct evaluation in single precision.
    NaiveCalc,
    /// 8-lane direct evaluation in single precision.
    Avx2Calc,
    /// 8-lane fixed-point direct evaluation.
    Avx2CalcIntWeight,
    /// 16-lane direct evaluation in single precision.
    Avx512fCalc,
    /// 16-lane fixed-point direct evaluation.
    Avx512fCalcIntWeight,
    /// 16-lane single precision, 64 outputs compacted with a byte permute.
    Avx512VbmiCalc,
    /// 16-lane fixed-point, 64 outputs compacted with a byte permute.
    Avx512VbmiCalcIntWeight,
}

impl LutMethod {
    /// Auto-dispatch ranking for [`Lut::convert`], best first.
    const CONVERT_RANKING: [LutMethod; 4] = [
        LutMethod::Avx512VbmiLut,
        LutMethod::Avx512fLut,
        LutMethod::Avx2Lut,
        LutMethod::NaiveLut,
    ];

    /// Auto-dispatch ranking for [`Lut::create`], best first. Table builds
    /// only exist at the scalar and AVX2 tiers; above that the direct
    /// evaluation builds the table.
    const CREATE_RANKING: [LutMethod; 4] = [
        LutMethod::Avx512VbmiCalc,
        LutMethod::Avx512fCalc,
        LutMethod::Avx2Lut,
        LutMethod::NaiveLut,
    ];

    /// Whether the variant can build a table in [`Lut::create_with`].
    pub fn supports_create(self) -> bool {
        matches!(
            self,
            LutMethod::NaiveLut
                | LutMethod::Avx2Lut
                | LutMethod::NaiveCalc
                | LutMethod::Avx2Calc
                | LutMethod::Avx512fCalc
                | LutMethod::Avx512VbmiCalc
        )
    }

    /// Whether conversion reads the table (`true`) or evaluates the formula.
    pub fn uses_table(self) -> bool {
        matches!(
            self,
            LutMethod::NaiveLut
                | LutMethod::Avx2Lut
                | LutMethod::Avx512fLut
                | LutMethod::Avx512VbmiLut
        )
    }

    pub fn select_convert(features: CpuFeatures) -> LutMethod {
        dispatch::select(&Self::CONVERT_RANKING, features).unwrap_or(LutMethod::NaiveLut)
    }

    pub fn select_create(features: CpuFeatures) -> LutMethod {
        dispatch::select(&Self::CREATE_RANKING, features).unwrap_or(LutMethod::NaiveLut)
    }
}

impl Strategy for LutMethod {
    fn required_extension(self) -> Option<Extension> {
        match self {
            LutMethod::NaiveLut | LutMethod::NaiveCalc => None,
            LutMethod::Avx2Lut | LutMethod::Avx2Calc | LutMethod::Avx2CalcIntWeight => {
                Some(Extension::Avx2)
            }
            LutMethod::Avx512fLut | LutMethod::Avx512fCalc | LutMethod::Avx512fCalcIntWeight => {
                Some(Extension::Avx512f)
            }
            LutMethod::Avx512VbmiLut
            | LutMethod::Avx512VbmiCalc
            | LutMethod::Avx512VbmiCalcIntWeight => Some(Extension::Avx512Vbmi),
        }
    }
}

/// Remap engine owning the 65536-entry table.
///
/// Mutating operations take `&mut self`; give each thread its own instance.
#[derive(Debug, Clone)]
pub struct Lut {
    /// `LUT_SIZE` entries followed by `TABLE_PADDING` zero bytes.
    table: Vec<u8>,
    window: Option<Window>,
    weights: Option<WindowWeights>,
    create_method: LutMethod,
    convert_method: LutMethod,
}

impl Default for Lut {
    fn default() -> Self {
        Self::new()
    }
}

impl Lut {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let features = config.features();
        let create_method = LutMethod::select_create(features);
        let convert_method = LutMethod::select_convert(features);
        tracing::debug!(
            cap = %config.simd,
            %create_method,
            %convert_method,
            "lut dispatch resolved"
        );

        Self {
            table: vec![0; LUT_SIZE + TABLE_PADDING],
            window: None,
            weights: None,
            create_method,
            convert_method,
        }
    }

    /// The remap table, one entry per sample value.
    pub fn table(&self) -> &[u8] {
        &self.table[..LUT_SIZE]
    }

    /// Window of the last successful create.
    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Strategy [`Lut::create`] uses.
    pub fn create_method(&self) -> LutMethod {
        self.create_method
    }

    /// Strategy [`Lut::convert`] uses.
    pub fn convert_method(&self) -> LutMethod {
        self.convert_method
    }

    /// Rebuilds the table for `(min, max)` with the auto-selected strategy.
    pub fn create(&mut self, min: i32, max: i32) -> Result<()> {
        self.create_with(self.create_method, min, max)
    }

    /// Rebuilds the table for `(min, max)` with an explicit strategy.
    ///
    /// On error the table and window are left untouched.
    ///
    /// # Panics
    /// If the CPU lacks the instruction-set tier `method` needs.
    pub fn create_with(&mut self, method: LutMethod, min: i32, max: i32) -> Result<()> {
        if !method.supports_create() {
            return Err(Error::CreateNotSupported(method));
        }
        dispatch::ensure_supported(method);
        let window = Window::new(min, max)?;
        let weights = window.weights();
        tracing::trace!(%method, min, max, "building remap table");

        let table = &mut self.table[..LUT_SIZE];
        match method {
            LutMethod::NaiveLut => scalar::build_table(table, &weights),
            LutMethod::NaiveCalc => scalar::build_table_calc(table, &weights),
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx2Lut => unsafe { avx2::build_table_segmented(table, &weights) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx2Calc => unsafe { avx2::build_table_calc(table, &weights) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512fCalc => unsafe { avx512::build_table_calc(table, &weights) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512VbmiCalc => unsafe {
                avx512::build_table_calc_vbmi(table, &weights)
            },
            _ => unreachable!("{method} passed the create and capability checks"),
        }

        self.window = Some(window);
        self.weights = Some(weights);
        Ok(())
    }

    /// Converts `src` into the first `src.len()` entries of `dst` with the
    /// auto-selected strategy.
    pub fn convert(&self, src: &[u16], dst: &mut [u8]) -> Result<()> {
        self.convert_with(self.convert_method, src, dst)
    }

    /// Converts `src` into the first `src.len()` entries of `dst`.
    ///
    /// # Panics
    /// If `dst` is shorter than `src`, or the CPU lacks the instruction-set
    /// tier `method` needs.
    pub fn convert_with(&self, method: LutMethod, src: &[u16], dst: &mut [u8]) -> Result<()> {
        let weights = self.weights.ok_or(Error::NotCreated)?;
        assert!(
            dst.len() >= src.len(),
            "destination holds {} samples, source has {}",
            dst.len(),
            src.len()
        );
        dispatch::ensure_supported(method);

        let dst = &mut dst[..src.len()];
        match method {
            LutMethod::NaiveLut => scalar::convert_lut(self.table(), src, dst),
            LutMethod::NaiveCalc => scalar::convert_calc(&weights, src, dst),
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx2Lut => unsafe { avx2::convert_lut(&self.table, src, dst) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx2Calc => unsafe { avx2::convert_calc(&weights, src, dst) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx2CalcIntWeight => unsafe {
                avx2::convert_calc_int_weight(&weights, src, dst)
            },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512fLut => unsafe { avx512::convert_lut(&self.table, src, dst) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512fCalc => unsafe { avx512::convert_calc(&weights, src, dst) },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512fCalcIntWeight => unsafe {
                avx512::convert_calc_int_weight(&weights, src, dst)
            },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512VbmiLut => unsafe {
                avx512::convert_lut_vbmi(&self.table, src, dst)
            },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512VbmiCalc => unsafe {
                avx512::convert_calc_vbmi(&weights, src, dst)
            },
            #[cfg(target_arch = "x86_64")]
            LutMethod::Avx512VbmiCalcIntWeight => unsafe {
                avx512::convert_calc_int_weight_vbmi(&weights, src, dst)
            },
            #[cfg(not(target_arch = "x86_64"))]
            _ => unreachable!("{method} passed the capability check"),
        }
        Ok(())
    }
}
