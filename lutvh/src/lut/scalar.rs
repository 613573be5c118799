//! Scalar (non-SIMD) implementations of table build and conversion.

use super::WindowWeights;

/// `clamp(x - min, 0, span)`.
#[inline]
pub(super) fn window_offset(w: &WindowWeights, x: i32) -> i32 {
    (x - w.min).clamp(0, w.span)
}

/// Exact integer evaluation: `floor((510 * n + span) / (2 * span))`.
#[inline]
pub(super) fn reference(w: &WindowWeights, x: i32) -> u8 {
    let n = (x as i64 - w.exact_min).clamp(0, w.exact_span);
    ((510 * n + w.exact_span) / (2 * w.exact_span)) as u8
}

/// Double-precision evaluation for wide windows. Every operand is an integer
/// below 2^41, so only the division rounds.
#[inline]
pub(super) fn calc_wide(w: &WindowWeights, x: i32) -> u8 {
    let span = w.exact_span as f64;
    let n = (x as f64 - w.exact_min as f64).clamp(0.0, span);
    (255.0 * n / span + 0.5) as u8
}

/// Single-precision evaluation, mirroring the vector float kernels lane for lane.
#[inline]
pub(super) fn calc(w: &WindowWeights, x: i32) -> u8 {
    if w.is_wide() {
        return calc_wide(w, x);
    }
    let n = window_offset(w, x);
    ((255 * n) as f32 / w.span as f32 + 0.5) as u8
}

/// Fixed-point evaluation with residual correction, mirroring the vector
/// integer-weighted kernels.
#[inline]
pub(super) fn calc_int_weight(w: &WindowWeights, x: i32) -> u8 {
    if w.is_wide() {
        return calc_wide(w, x);
    }
    let n = window_offset(w, x);
    let estimate = (n * w.int_weight + (1 << 15)) >> 16;
    let residual = 510 * n + w.span - 2 * w.span * estimate;
    (estimate + (residual >= 2 * w.span) as i32) as u8
}

pub(super) fn build_table(table: &mut [u8], w: &WindowWeights) {
    for (x, entry) in table.iter_mut().enumerate() {
        *entry = reference(w, x as i32);
    }
}

pub(super) fn build_table_calc(table: &mut [u8], w: &WindowWeights) {
    for (x, entry) in table.iter_mut().enumerate() {
        *entry = calc(w, x as i32);
    }
}

pub(super) fn convert_lut(table: &[u8], src: &[u16], dst: &mut [u8]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = table[s as usize];
    }
}

pub(super) fn convert_calc(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = calc(w, s as i32);
    }
}

pub(super) fn convert_calc_int_weight(w: &WindowWeights, src: &[u16], dst: &mut [u8]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = calc_int_weight(w, s as i32);
    }
}
