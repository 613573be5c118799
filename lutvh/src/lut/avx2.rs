//! AVX2 table build and conversion kernels (x86_64).
//!
//! All kernels work on 16 samples per step: one 256-bit load of `u16`,
//! widened into two 8-lane `i32` vectors, narrowed back to 16 bytes.
//! Tails shorter than a step go through the scalar code. Windows wider than
//! 16 bits are evaluated in double precision, four lanes at a time.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::{LUT_SIZE, WindowWeights, scalar};

const STEP: usize = 16;

/// Broadcast window constants.
#[derive(Clone, Copy)]
struct Consts {
    min: __m256i,
    span: __m256i,
    span_f: __m256,
    span2_minus_one: __m256i,
    weight: __m256i,
    wide: bool,
    min_d: __m256d,
    span_d: __m256d,
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn consts(w: &WindowWeights) -> Consts {
    Consts {
        min: _mm256_set1_epi32(w.min),
        span: _mm256_set1_epi32(w.span),
        span_f: _mm256_set1_ps(w.span as f32),
        span2_minus_one: _mm256_set1_epi32(2 * w.span - 1),
        weight: _mm256_set1_epi32(w.int_weight),
        wide: w.is_wide(),
        min_d: _mm256_set1_pd(w.exact_min as f64),
        span_d: _mm256_set1_pd(w.exact_span as f64),
    }
}

/// `clamp(x - min, 0, span)` per lane.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn window_offset(x: __m256i, c: &Consts) -> __m256i {
    let n = _mm256_sub_epi32(x, c.min);
    _mm256_min_epi32(_mm256_max_epi32(n, _mm256_setzero_si256()), c.span)
}

/// `trunc(255 * n / span + 0.5)` in double precision for four lanes.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn calc_wide_4(x: __m128i, c: &Consts) -> __m128i {
    let n = _mm256_sub_pd(_mm256_cvtepi32_pd(x), c.min_d);
    let n = _mm256_min_pd(_mm256_max_pd(n, _mm256_setzero_pd()), c.span_d);
    let q = _mm256_div_pd(_mm256_mul_pd(n, _mm256_set1_pd(255.0)), c.span_d);
    _mm256_cvttpd_epi32(_mm256_add_pd(q, _mm256_set1_pd(0.5)))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn calc_wide(x: __m256i, c: &Consts) -> __m256i {
    let lo = calc_wide_4(_mm256_castsi256_si128(x), c);
    let hi = calc_wide_4(_mm256_extracti128_si256::<1>(x), c);
    _mm256_set_m128i(hi, lo)
}

/// `trunc(255 * n / span + 0.5)` in single precision.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn calc(x: __m256i, c: &Consts) -> __m256i {
    if c.wide {
        return calc_wide(x, c);
    }
    let n = window_offset(x, c);
    let num = _mm256_cvtepi32_ps(_mm256_mullo_epi32(n, _mm256_set1_epi32(255)));
    let q = _mm256_div_ps(num, c.span_f);
    _mm256_cvttps_epi32(_mm256_add_ps(q, _mm256_set1_ps(0.5)))
}

/// Fixed-point estimate, bumped by one where the residual shows it fell short.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn calc_int_weight(x: __m256i, c: &Consts) -> __m256i {
    if c.wide {
        return calc_wide(x, c);
    }
    let n = window_offset(x, c);
    let estimate = _mm256_srli_epi32::<16>(_mm256_add_epi32(
        _mm256_mullo_epi32(n, c.weight),
        _mm256_set1_epi32(1 << 15),
    ));
    let residual = _mm256_sub_epi32(
        _mm256_add_epi32(_mm256_mullo_epi32(n, _mm256_set1_epi32(510)), c.span),
        _mm256_mullo_epi32(estimate, _mm256_slli_epi32::<1>(c.span)),
    );
    // cmpgt yields -1 in lanes that need the bump
    let short = _mm256_cmpgt_epi32(residual, c.span2_minus_one);
    _mm256_sub_epi32(estimate, short)
}

/// Widens 16 `u16` samples at `ptr` into two `i32` vectors.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_16(ptr: *const u16) -> (__m256i, __m256i) {
    let s = _mm256_loadu_si256(ptr as *const __m256i);
    (
        _mm256_cvtepu16_epi32(_mm256_castsi256_si128(s)),
        _mm256_cvtepu16_epi32(_mm256_extracti128_si256::<1>(s)),
    )
}

/// Narrows two vectors of values in [0, 255] to 16 bytes, order preserved.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn pack_16(lo: __m256i, hi: __m256i) -> __m128i {
    // packus interleaves 128-bit lanes: qwords come out lo0 hi0 lo1 hi1
    let words = _mm256_permute4x64_epi64::<0b11_01_10_00>(_mm256_packus_epi32(lo, hi));
    _mm_packus_epi16(
        _mm256_castsi256_si128(words),
        _mm256_extracti128_si256::<1>(words),
    )
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn iota(base: i32) -> (__m256i, __m256i) {
    let lo = _mm256_add_epi32(
        _mm256_set1_epi32(base),
        _mm256_setr_epi32(0, 1, 2, 3, 4, 5, 6, 7),
    );
    (lo, _mm256_add_epi32(lo, _mm256_set1_epi32(8)))
}

/// Builds the table in three segments: zeros up to `min`, 255 from `max`
/// on, and the ramp in between through the exact fixed-point formula
/// (double precision for wide windows).
///
/// # Safety
/// Caller must ensure AVX2 is available. `table.len() == LUT_SIZE`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn build_table_segmented(table: &mut [u8], w: &WindowWeights) {
    debug_assert_eq!(table.len(), LUT_SIZE);
    let ramp_start = (w.exact_min + 1).clamp(0, LUT_SIZE as i64) as usize;
    let ramp_end = (w.exact_min + w.exact_span).clamp(0, LUT_SIZE as i64) as usize;
    let ramp_end = ramp_end.max(ramp_start);

    table[..ramp_start].fill(0);
    table[ramp_end..].fill(u8::MAX);

    let c = consts(w);
    let ramp = &mut table[ramp_start..ramp_end];
    let simd_len = ramp.len() / STEP * STEP;
    let dst_ptr = ramp.as_mut_ptr();

    for i in (0..simd_len).step_by(STEP) {
        let (lo, hi) = iota((ramp_start + i) as i32);
        let out = pack_16(calc_int_weight(lo, &c), calc_int_weight(hi, &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }

    for (i, entry) in ramp.iter_mut().enumerate().skip(simd_len) {
        *entry = scalar::reference(w, (ramp_start + i) as i32);
    }
}

/// Builds the table by evaluating the float formula at every index.
///
/// # Safety
/// Caller must ensure AVX2 is available. `table.len() == LUT_SIZE`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn build_table_calc(table: &mut [u8], w: &WindowWeights) {
    debug_assert_eq!(table.len(), LUT_SIZE);
    let c = consts(w);
    let dst_ptr = table.as_mut_ptr();

    // LUT_SIZE is a multiple of STEP, no tail
    for i in (0..LUT_SIZE).step_by(STEP) {
        let (lo, hi) = iota(i as i32);
        let out = pack_16(calc(lo, &c), calc(hi, &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }
}

/// Table lookup through 32-bit gathers, keeping the low byte of each.
///
/// # Safety
/// Caller must ensure AVX2 is available. `table` must hold at least
/// `LUT_SIZE + 3` bytes; `dst.len() == src.len()`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn convert_lut(table: &[u8], src: &[u16], dst: &mut [u8]) {
    debug_assert!(table.len() >= LUT_SIZE + 3);
    debug_assert_eq!(src.len(), dst.len());

    let table_ptr = table.as_ptr() as *const i32;
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / STEP * STEP;
    let low_byte = _mm256_set1_epi32(0xFF);

    for i in (0..simd_len).step_by(STEP) {
        let (lo, hi) = load_16(src_ptr.add(i));
        let lo = _mm256_and_si256(_mm256_i32gather_epi32::<1>(table_ptr, lo), low_byte);
        let hi = _mm256_and_si256(_mm256_i32gather_epi32::<1>(table_ptr, hi), low_byte);
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, pack_16(lo, hi));
    }

    scalar::convert_lut(&table[..LUT_SIZE], &src[simd_len..], &mut dst[simd_len..]);
}

/// Direct single-precision evaluation.
///
/// # Safety
/// Caller must ensure AVX2 is available. `dst.len() == src.len()`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn convert_calc(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    let c = consts(w);
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / STEP * STEP;

    for i in (0..simd_len).step_by(STEP) {
        let (lo, hi) = load_16(src_ptr.add(i));
        let out = pack_16(calc(lo, &c), calc(hi, &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }

    scalar::convert_calc(w, &src[simd_len..], &mut dst[simd_len..]);
}

/// Direct fixed-point evaluation.
///
/// # Safety
/// Caller must ensure AVX2 is available. `dst.len() == src.len()`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn convert_calc_int_weight(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    let c = consts(w);
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / STEP * STEP;

    for i in (0..simd_len).step_by(STEP) {
        let (lo, hi) = load_16(src_ptr.add(i));
        let out = pack_16(calc_int_weight(lo, &c), calc_int_weight(hi, &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }

    scalar::convert_calc_int_weight(w, &src[simd_len..], &mut dst[simd_len..]);
}
