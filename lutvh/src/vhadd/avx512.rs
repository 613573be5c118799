//! AVX-512F sliding-sum kernels (x86_64), the AVX2 algorithms at 16 lanes.

#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::scalar;

const LANES: usize = 16;

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn load_16(ptr: *const u16) -> __m512i {
    _mm512_cvtepu16_epi32(_mm256_loadu_si256(ptr as *const __m256i))
}

/// Saturating store of 16 non-negative sums.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn store_16(ptr: *mut u16, v: __m512i) {
    _mm256_storeu_si256(ptr as *mut __m256i, _mm512_cvtusepi32_epi16(v));
}

/// Inclusive prefix sum across all 16 lanes.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn prefix_sum(mut x: __m512i) -> __m512i {
    let zero = _mm512_setzero_si512();
    x = _mm512_add_epi32(x, _mm512_alignr_epi32::<15>(x, zero));
    x = _mm512_add_epi32(x, _mm512_alignr_epi32::<14>(x, zero));
    x = _mm512_add_epi32(x, _mm512_alignr_epi32::<12>(x, zero));
    _mm512_add_epi32(x, _mm512_alignr_epi32::<8>(x, zero))
}

/// # Safety
/// Caller must ensure AVX-512F is available. `row.len() >= acc.len()`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn add_row(acc: &mut [i32], row: &[u16]) {
    debug_assert!(row.len() >= acc.len());
    let simd_len = acc.len() / LANES * LANES;
    let acc_ptr = acc.as_mut_ptr();
    let row_ptr = row.as_ptr();

    for i in (0..simd_len).step_by(LANES) {
        let a = _mm512_loadu_si512(acc_ptr.add(i).cast());
        _mm512_storeu_si512(
            acc_ptr.add(i).cast(),
            _mm512_add_epi32(a, load_16(row_ptr.add(i))),
        );
    }

    scalar::add_row(&mut acc[simd_len..], &row[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512F is available. Both rows hold at least
/// `acc.len()` samples.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]) {
    debug_assert!(entering.len() >= acc.len() && leaving.len() >= acc.len());
    let simd_len = acc.len() / LANES * LANES;
    let acc_ptr = acc.as_mut_ptr();

    for i in (0..simd_len).step_by(LANES) {
        let a = _mm512_loadu_si512(acc_ptr.add(i).cast());
        let delta = _mm512_sub_epi32(
            load_16(entering.as_ptr().add(i)),
            load_16(leaving.as_ptr().add(i)),
        );
        _mm512_storeu_si512(acc_ptr.add(i).cast(), _mm512_add_epi32(a, delta));
    }

    scalar::slide_row(
        &mut acc[simd_len..],
        &entering[simd_len..],
        &leaving[simd_len..],
    );
}

/// # Safety
/// Caller must ensure AVX-512F is available. `dst.len() >= acc.len()`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn store_row(acc: &[i32], dst: &mut [u16]) {
    debug_assert!(dst.len() >= acc.len());
    let simd_len = acc.len() / LANES * LANES;
    let acc_ptr = acc.as_ptr();

    for i in (0..simd_len).step_by(LANES) {
        store_16(
            dst.as_mut_ptr().add(i),
            _mm512_loadu_si512(acc_ptr.add(i).cast()),
        );
    }

    scalar::store_row(&acc[simd_len..], &mut dst[simd_len..]);
}

/// # Safety
/// Caller must ensure AVX-512F is available.
/// `row.len() >= dst.len() + horizontal - 1`.
#[target_feature(enable = "avx512f")]
pub(super) unsafe fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]) {
    if dst.is_empty() {
        return;
    }
    debug_assert!(row.len() >= dst.len() + horizontal - 1);

    let first = scalar::first_window(row, horizontal);
    dst[0] = scalar::saturate(first);

    let row_ptr = row.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    let last_lane = _mm512_set1_epi32(LANES as i32 - 1);
    let mut running = _mm512_set1_epi32(first);
    let mut i = 1;

    while i + LANES <= dst.len() {
        let delta = _mm512_sub_epi32(
            load_16(row_ptr.add(i + horizontal - 1)),
            load_16(row_ptr.add(i - 1)),
        );
        let sums = _mm512_add_epi32(prefix_sum(delta), running);
        store_16(dst_ptr.add(i), sums);
        running = _mm512_permutexvar_epi32(last_lane, sums);
        i += LANES;
    }

    let sum = _mm_cvtsi128_si32(_mm512_castsi512_si128(running));
    scalar::slide_row_sums(row, horizontal, dst, i, sum);
}
