//! AVX2 sliding-sum kernels (x86_64).
//!
//! Accumulators are 8 `i32` lanes; samples are widened from `u16` on load and
//! narrowed with unsigned saturation on store.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::{Plan, scalar};

const LANES: usize = 8;
const STRIP: usize = 16;

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_8(ptr: *const u16) -> __m256i {
    _mm256_cvtepu16_epi32(_mm_loadu_si128(ptr as *const __m128i))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_16(ptr: *const u16) -> (__m256i, __m256i) {
    let s = _mm256_loadu_si256(ptr as *const __m256i);
    (
        _mm256_cvtepu16_epi32(_mm256_castsi256_si128(s)),
        _mm256_cvtepu16_epi32(_mm256_extracti128_si256::<1>(s)),
    )
}

/// Saturating store of 8 sums.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn store_8(ptr: *mut u16, v: __m256i) {
    let packed = _mm_packus_epi32(_mm256_castsi256_si128(v), _mm256_extracti128_si256::<1>(v));
    _mm_storeu_si128(ptr as *mut __m128i, packed);
}

/// Saturating store of 16 sums, order preserved.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn store_16(ptr: *mut u16, lo: __m256i, hi: __m256i) {
    let packed = _mm256_permute4x64_epi64::<0b11_01_10_00>(_mm256_packus_epi32(lo, hi));
    _mm256_storeu_si256(ptr as *mut __m256i, packed);
}

/// Inclusive prefix sum across all 8 lanes.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn prefix_sum(mut x: __m256i) -> __m256i {
    // byte shifts stay inside each 128-bit half
    x = _mm256_add_epi32(x, _mm256_slli_si256::<4>(x));
    x = _mm256_add_epi32(x, _mm256_slli_si256::<8>(x));
    let low_total = _mm256_permutevar8x32_epi32(x, _mm256_set1_epi32(3));
    let carry = _mm256_blend_epi32::<0x0F>(low_total, _mm256_setzero_si256());
    _mm256_add_epi32(x, carry)
}

/// # Safety
/// Caller must ensure AVX2 is available. `row.len() >= acc.len()`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn add_row(acc: &mut [i32], row: &[u16]) {
    debug_assert!(row.len() >= acc.len());
    let simd_len = acc.len() / LANES * LANES;
    let acc_ptr = acc.as_mut_ptr();
    let row_ptr = row.as_ptr();

    for i in (0..simd_len).step_by(LANES) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let a = _mm256_add_epi32(a, load_8(row_ptr.add(i)));
        _mm256_storeu_si256(acc_ptr.add(i) as *mut __m256i, a);
    }

    scalar::add_row(&mut acc[simd_len..], &row[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX2 is available. Both rows hold at least
/// `acc.len()` samples.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]) {
    debug_assert!(entering.len() >= acc.len() && leaving.len() >= acc.len());
    let simd_len = acc.len() / LANES * LANES;
    let acc_ptr = acc.as_mut_ptr();

    for i in (0..simd_len).step_by(LANES) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let delta = _mm256_sub_epi32(
            load_8(entering.as_ptr().add(i)),
            load_8(leaving.as_ptr().add(i)),
        );
        _mm256_storeu_si256(acc_ptr.add(i) as *mut __m256i, _mm256_add_epi32(a, delta));
    }

    scalar::slide_row(
        &mut acc[simd_len..],
        &entering[simd_len..],
        &leaving[simd_len..],
    );
}

/// # Safety
/// Caller must ensure AVX2 is available. `dst.len() >= acc.len()`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn store_row(acc: &[i32], dst: &mut [u16]) {
    debug_assert!(dst.len() >= acc.len());
    let simd_len = acc.len() / STRIP * STRIP;
    let acc_ptr = acc.as_ptr();

    for i in (0..simd_len).step_by(STRIP) {
        let lo = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let hi = _mm256_loadu_si256(acc_ptr.add(i + LANES) as *const __m256i);
        store_16(dst.as_mut_ptr().add(i), lo, hi);
    }

    scalar::store_row(&acc[simd_len..], &mut dst[simd_len..]);
}

/// Sliding row sums: the per-output change `row[i + h - 1] - row[i - 1]` is
/// prefix-summed 8 outputs at a time and added to the running sum.
///
/// # Safety
/// Caller must ensure AVX2 is available.
/// `row.len() >= dst.len() + horizontal - 1`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]) {
    if dst.is_empty() {
        return;
    }
    debug_assert!(row.len() >= dst.len() + horizontal - 1);

    let first = scalar::first_window(row, horizontal);
    dst[0] = scalar::saturate(first);

    let row_ptr = row.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let last_lane = _mm256_set1_epi32(LANES as i32 - 1);
    let mut running = _mm256_set1_epi32(first);
    let mut i = 1;

    while i + LANES <= dst.len() {
        let delta = _mm256_sub_epi32(
            load_8(row_ptr.add(i + horizontal - 1)),
            load_8(row_ptr.add(i - 1)),
        );
        let sums = _mm256_add_epi32(prefix_sum(delta), running);
        store_8(dst_ptr.add(i), sums);
        running = _mm256_permutevar8x32_epi32(sums, last_lane);
        i += LANES;
    }

    let sum = _mm256_cvtsi256_si32(running);
    scalar::slide_row_sums(row, horizontal, dst, i, sum);
}

/// Vertical sums in strips of 16 output columns. Each strip keeps its two
/// accumulators in registers for the whole walk down the image, so nothing
/// is spilled to a column buffer. Leftover columns slide one at a time.
///
/// # Safety
/// Caller must ensure AVX2 is available. `plan` must be non-empty and
/// resolved against `src`; `dst.len() >= plan.len()`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn vertical_strips(src: &[u16], plan: &Plan, dst: &mut [u16]) {
    debug_assert!(dst.len() >= plan.len());
    let w = plan.out_width;
    let stride = plan.stride;
    let strips_end = w / STRIP * STRIP;
    let base = src[plan.src_y * stride + plan.src_x..].as_ptr();
    let dst_ptr = dst.as_mut_ptr();

    for x in (0..strips_end).step_by(STRIP) {
        let column = base.add(x);
        let mut lo = _mm256_setzero_si256();
        let mut hi = _mm256_setzero_si256();

        for k in 0..plan.vertical {
            let (l, h) = load_16(column.add(k * stride));
            lo = _mm256_add_epi32(lo, l);
            hi = _mm256_add_epi32(hi, h);
        }
        store_16(dst_ptr.add(x), lo, hi);

        for y in 1..plan.out_height {
            let (el, eh) = load_16(column.add((y + plan.vertical - 1) * stride));
            let (ll, lh) = load_16(column.add((y - 1) * stride));
            lo = _mm256_add_epi32(lo, _mm256_sub_epi32(el, ll));
            hi = _mm256_add_epi32(hi, _mm256_sub_epi32(eh, lh));
            store_16(dst_ptr.add(y * w + x), lo, hi);
        }
    }

    scalar::vertical_columns(src, plan, dst, strips_end);
}
