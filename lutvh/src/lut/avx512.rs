//! AVX-512 table build and conversion kernels (x86_64).
//!
//! AVX-512F kernels handle 16 samples per step and narrow with `vpmovdb`.
//! The VBMI kernels handle 64 samples per step: four 16-lane results are
//! compacted into one 64-byte store with two-source byte permutes.
//! Wide windows take a double-precision path inside `calc`.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::{LUT_SIZE, WindowWeights, scalar};

const STEP: usize = 16;
const VBMI_STEP: usize = 64;

/// Byte indices selecting the low byte of every dword of a two-register
/// concatenation, written to 32 consecutive output bytes starting at `at`.
const fn low_byte_index(at: usize) -> [u8; 64] {
    let mut idx = [0u8; 64];
    let mut j = 0;
    while j < 32 {
        idx[at + j] = (4 * j) as u8;
        j += 1;
    }
    idx
}

static LOW_BYTES_FIRST_HALF: [u8; 64] = low_byte_index(0);
static LOW_BYTES_SECOND_HALF: [u8; 64] = low_byte_index(32);

#[derive(Clone, Copy)]
struct Consts {
    min: __m512i,
    span: __m512i,
    span_f: __m512,
    span2_minus_one: __m512i,
    weight: __m512i,
    wide: bool,
    min_d: __m512d,
    span_d: __m512d,
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn consts(w: &WindowWeights) -> Consts {
    Consts {
        min: _mm512_set1_epi32(w.min),
        span: _mm512_set1_epi32(w.span),
        span_f: _mm512_set1_ps(w.span as f32),
        span2_minus_one: _mm512_set1_epi32(2 * w.span - 1),
        weight: _mm512_set1_epi32(w.int_weight),
        wide: w.is_wide(),
        min_d: _mm512_set1_pd(w.exact_min as f64),
        span_d: _mm512_set1_pd(w.exact_span as f64),
    }
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn window_offset(x: __m512i, c: &Consts) -> __m512i {
    let n = _mm512_sub_epi32(x, c.min);
    _mm512_min_epi32(_mm512_max_epi32(n, _mm512_setzero_si512()), c.span)
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn calc_wide_8(x: __m256i, c: &Consts) -> __m256i {
    let n = _mm512_sub_pd(_mm512_cvtepi32_pd(x), c.min_d);
    let n = _mm512_min_pd(_mm512_max_pd(n, _mm512_setzero_pd()), c.span_d);
    let q = _mm512_div_pd(_mm512_mul_pd(n, _mm512_set1_pd(255.0)), c.span_d);
    _mm512_cvttpd_epi32(_mm512_add_pd(q, _mm512_set1_pd(0.5)))
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn calc_wide(x: __m512i, c: &Consts) -> __m512i {
    let lo = calc_wide_8(_mm512_castsi512_si256(x), c);
    let hi = calc_wide_8(_mm512_extracti64x4_epi64::<1>(x), c);
    _mm512_inserti64x4::<1>(_mm512_castsi256_si512(lo), hi)
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn calc(x: __m512i, c: &Consts) -> __m512i {
    if c.wide {
        return calc_wide(x, c);
    }
    let n = window_offset(x, c);
    let num = _mm512_cvtepi32_ps(_mm512_mullo_epi32(n, _mm512_set1_epi32(255)));
    let q = _mm512_div_ps(num, c.span_f);
    _mm512_cvttps_epi32(_mm512_add_ps(q, _mm512_set1_ps(0.5)))
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn calc_int_weight(x: __m512i, c: &Consts) -> __m512i {
    if c.wide {
        return calc_wide(x, c);
    }
    let n = window_offset(x, c);
    let estimate = _mm512_srli_epi32::<16>(_mm512_add_epi32(
        _mm512_mullo_epi32(n, c.weight),
        _mm512_set1_epi32(1 << 15),
    ));
    let residual = _mm512_sub_epi32(
        _mm512_add_epi32(_mm512_mullo_epi32(n, _mm512_set1_epi32(510)), c.span),
        _mm512_mullo_epi32(estimate, _mm512_slli_epi32::<1>(c.span)),
    );
    let short = _mm512_cmpgt_epi32_mask(residual, c.span2_minus_one);
    _mm512_mask_add_epi32(estimate, short, estimate, _mm512_set1_epi32(1))
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn load_16(ptr: *const u16) -> __m512i {
    _mm512_cvtepu16_epi32(_mm256_loadu_si256(ptr as *const __m256i))
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn iota(base: i32) -> __m512i {
    _mm512_add_epi32(
        _mm512_set1_epi32(base),
        _mm512_setr_epi32(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15),
    )
}

/// Gathers the table entries for 16 sample values; entry in the low byte.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn gather(table: *const u8, x: __m512i) -> __m512i {
    _mm512_i32gather_epi32::<1>(x, table.cast())
}

/// Low bytes of the 64 dwords in `v0..v3`, in order.
#[inline]
#[target_feature(enable = "avx512f,avx512vbmi")]
unsafe fn compact_64(v0: __m512i, v1: __m512i, v2: __m512i, v3: __m512i) -> __m512i {
    let first = _mm512_loadu_si512(LOW_BYTES_FIRST_HALF.as_ptr().cast());
    let second = _mm512_loadu_si512(LOW_BYTES_SECOND_HALF.as_ptr().cast());
    let lo = _mm512_permutex2var_epi8(v0, first, v1);
    let hi = _mm512_permutex2var_epi8(v2, second, v3);
    _mm512_mask_blend_epi64(0xF0, lo, hi)
}

/// # Safety
/// Caller must ensure AVX-512F is available. `table.len() == LUT_SIZE`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn build_table_calc(table: &mut [u8], w: &WindowWeights) {
    debug_assert_eq!(table.len(), LUT_SIZE);
    let c = consts(w);
    let dst_ptr = table.as_mut_ptr();

    for i in (0..LUT_SIZE).step_by(STEP) {
        let out = _mm512_cvtepi32_epi8(calc(iota(i as i32), &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }
}

/// # Safety
/// Caller must ensure AVX-512 VBMI is available. `table.len() == LUT_SIZE`.
#[target_feature(enable = "avx512f,avx512vbmi")]
pub(super) unsafe fn build_table_calc_vbmi(table: &mut [u8], w: &WindowWeights) {
    debug_assert_eq!(table.len(), LUT_SIZE);
    let c = consts(w);
    let dst_ptr = table.as_mut_ptr();

    for i in (0..LUT_SIZE).step_by(VBMI_STEP) {
        let base = i as i32;
        let out = compact_64(
            calc(iota(base), &c),
            calc(iota(base + 16), &c),
            calc(iota(base + 32), &c),
            calc(iota(base + 48), &c),
        );
        _mm512_storeu_si512(dst_ptr.add(i).cast(), out);
    }
}

/// # Safety
/// Caller must ensure AVX-512F is available. `table` must hold at least
/// `LUT_SIZE + 3` bytes; `dst.len() == src.len()`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn convert_lut(table: &[u8], src: &[u16], dst: &mut [u8]) {
    debug_assert!(table.len() >= LUT_SIZE + 3);
    debug_assert_eq!(src.len(), dst.len());
    let table_ptr = table.as_ptr();
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / STEP * STEP;

    for i in (0..simd_len).step_by(STEP) {
        // vpmovdb truncates, so the neighbouring table bytes drop out
        let out = _mm512_cvtepi32_epi8(gather(table_ptr, load_16(src_ptr.add(i))));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }

    scalar::convert_lut(&table[..LUT_SIZE], &src[simd_len..], &mut dst[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512F is available. `dst.len() == src.len()`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn convert_calc(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    let c = consts(w);
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / STEP * STEP;

    for i in (0..simd_len).step_by(STEP) {
        let out = _mm512_cvtepi32_epi8(calc(load_16(src_ptr.add(i)), &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }

    scalar::convert_calc(w, &src[simd_len..], &mut dst[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512F is available. `dst.len() == src.len()`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn convert_calc_int_weight(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    let c = consts(w);
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / STEP * STEP;

    for i in (0..simd_len).step_by(STEP) {
        let out = _mm512_cvtepi32_epi8(calc_int_weight(load_16(src_ptr.add(i)), &c));
        _mm_storeu_si128(dst_ptr.add(i) as *mut __m128i, out);
    }

    scalar::convert_calc_int_weight(w, &src[simd_len..], &mut dst[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512 VBMI is available. `table` must hold at least
/// `LUT_SIZE + 3` bytes; `dst.len() == src.len()`.
#[target_feature(enable = "avx512f,avx512vbmi")]
pub(super) unsafe fn convert_lut_vbmi(table: &[u8], src: &[u16], dst: &mut [u8]) {
    debug_assert!(table.len() >= LUT_SIZE + 3);
    debug_assert_eq!(src.len(), dst.len());
    let table_ptr = table.as_ptr();
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / VBMI_STEP * VBMI_STEP;

    for i in (0..simd_len).step_by(VBMI_STEP) {
        let s = src_ptr.add(i);
        let out = compact_64(
            gather(table_ptr, load_16(s)),
            gather(table_ptr, load_16(s.add(16))),
            gather(table_ptr, load_16(s.add(32))),
            gather(table_ptr, load_16(s.add(48))),
        );
        _mm512_storeu_si512(dst_ptr.add(i).cast(), out);
    }

    convert_lut(table, &src[simd_len..], &mut dst[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512 VBMI is available. `dst.len() == src.len()`.
#[target_feature(enable = "avx512f,avx512vbmi")]
pub(super) unsafe fn convert_calc_vbmi(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    let c = consts(w);
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / VBMI_STEP * VBMI_STEP;

    for i in (0..simd_len).step_by(VBMI_STEP) {
        let s = src_ptr.add(i);
        let out = compact_64(
            calc(load_16(s), &c),
            calc(load_16(s.add(16)), &c),
            calc(load_16(s.add(32)), &c),
            calc(load_16(s.add(48)), &c),
        );
        _mm512_storeu_si512(dst_ptr.add(i).cast(), out);
    }

    convert_calc(w, &src[simd_len..], &mut dst[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512 VBMI is available. `dst.len() == src.len()`.
#[target_feature(enable = "avx512f,avx512vbmi")]
pub(super) unsafe fn convert_calc_int_weight_vbmi(
    w: &WindowWeights,
    src: &[u16],
    dst: &mut [u8],
) {
    debug_assert_eq!(src.len(), dst.len());
    let c = consts(w);
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let simd_len = src.len() / VBMI_STEP * VBMI_STEP;

    for i in (0..simd_len).step_by(VBMI_STEP) {
        let s = src_ptr.add(i);
        let out = compact_64(
            calc_int_weight(load_16(s), &c),
            calc_int_weight(load_16(s.add(16)), &c),
            calc_int_weight(load_16(s.add(32)), &c),
            calc_int_weight(load_16(s.add(48)), &c),
        );
        _mm512_storeu_si512(dst_ptr.add(i).cast(), out);
    }

    convert_calc_int_weight(w, &src[simd_len..], &mut dst[simd_len..]);
}
