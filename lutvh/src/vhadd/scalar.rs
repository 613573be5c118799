//! Scalar sliding-sum kernels.

use super::Plan;

#[inline]
pub(super) fn saturate(sum: i32) -> u16 {
    sum.clamp(0, u16::MAX as i32) as u16
}

pub(super) fn add_row(acc: &mut [i32], row: &[u16]) {
    for (a, &s) in acc.iter_mut().zip(row) {
        *a += s as i32;
    }
}

pub(super) fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]) {
    for ((a, &e), &l) in acc.iter_mut().zip(entering).zip(leaving) {
        *a += e as i32 - l as i32;
    }
}

pub(super) fn store_row(acc: &[i32], dst: &mut [u16]) {
    for (d, &a) in dst.iter_mut().zip(acc) {
        *d = saturate(a);
    }
}

/// Exact sum of the first window of `row`.
#[inline]
pub(super) fn first_window(row: &[u16], horizontal: usize) -> i32 {
    row[..horizontal].iter().map(|&s| s as i32).sum()
}

/// `dst[i] = sum(row[i..i + horizontal])`, one window per `dst` entry.
pub(super) fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]) {
    if dst.is_empty() {
        return;
    }
    debug_assert!(row.len() >= dst.len() + horizontal - 1);

    let sum = first_window(row, horizontal);
    dst[0] = saturate(sum);
    slide_row_sums(row, horizontal, dst, 1, sum);
}

/// Continues [`row_sums`] at output `start`, given the exact sum of the
/// window at `start - 1`. Also finishes the tails of the vector kernels.
pub(super) fn slide_row_sums(
    row: &[u16],
    horizontal: usize,
    dst: &mut [u16],
    start: usize,
    mut sum: i32,
) {
    for i in start..dst.len() {
        sum += row[i + horizontal - 1] as i32 - row[i - 1] as i32;
        dst[i] = saturate(sum);
    }
}

/// Per-column sliding sums for columns `[start, width)` of the plan, used for
/// the leftover columns of strip-based vertical kernels.
pub(super) fn vertical_columns(src: &[u16], plan: &Plan, dst: &mut [u16], start: usize) {
    let w = plan.out_width;
    let stride = plan.stride;
    let base = plan.src_y * stride + plan.src_x;
    for x in start..w {
        let column = |row: usize| src[base + row * stride + x] as i32;
        let mut sum: i32 = (0..plan.vertical).map(column).sum();
        dst[x] = saturate(sum);
        for y in 1..plan.out_height {
            sum += column(y + plan.vertical - 1) - column(y - 1);
            dst[y * w + x] = saturate(sum);
        }
    }
}
