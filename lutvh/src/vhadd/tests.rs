//! Tests for the sliding-window accumulation engine.

use common::cpu_features;
use strum::IntoEnumIterator;

use super::*;
use crate::test_utils::{init_logging, random_samples, random_samples_up_to};

/// Brute-force sums straight from the window definition:
/// `(width, height, vertical, horizontal)`.
fn brute_force(
    src: &[u16],
    width: usize,
    height: usize,
    g: &Geometry,
) -> (usize, usize, Vec<u16>, Vec<u16>) {
    let fits = |x: i64, y: i64| {
        let left = x + g.offset_x as i64;
        let top = y + g.offset_y as i64;
        left >= 0
            && top >= 0
            && left + g.horizontal as i64 <= width as i64
            && top + g.vertical as i64 <= height as i64
    };

    let xs: Vec<i64> = (0..width as i64)
        .filter(|&x| (0..height as i64).any(|y| fits(x, y)))
        .collect();
    let ys: Vec<i64> = (0..height as i64)
        .filter(|&y| (0..width as i64).any(|x| fits(x, y)))
        .collect();

    let sample = |x: i64, y: i64| src[y as usize * width + x as usize] as u64;
    let mut v = Vec::new();
    let mut h = Vec::new();
    for &y in &ys {
        for &x in &xs {
            let left = x + g.offset_x as i64;
            let top = y + g.offset_y as i64;
            let vs: u64 = (0..g.vertical as i64).map(|k| sample(left, top + k)).sum();
            let hs: u64 = (0..g.horizontal as i64).map(|k| sample(left + k, top)).sum();
            v.push(vs.min(u16::MAX as u64) as u16);
            h.push(hs.min(u16::MAX as u64) as u16);
        }
    }
    (xs.len(), ys.len(), v, h)
}

fn supported_methods() -> impl Iterator<Item = VhAddMethod> {
    VhAddMethod::iter().filter(|m| m.is_supported())
}

fn check_all_methods(src: &[u16], width: usize, height: usize, geometry: Geometry) {
    let (out_w, out_h, expected_v, expected_h) = brute_force(src, width, height, &geometry);
    let mut engine = VhAdd::new(width, height);
    assert_eq!(
        engine.output_size(&geometry).unwrap(),
        (out_w, out_h),
        "{geometry:?} on {width}x{height}"
    );

    for method in supported_methods() {
        let v = engine.calc_v_with(method, src, &geometry).unwrap();
        assert_eq!((v.width, v.height), (out_w, out_h), "{method} {geometry:?}");
        assert_eq!(v.data, &expected_v[..], "{method} vertical {geometry:?}");

        let h = engine.calc_h_with(method, src, &geometry).unwrap();
        assert_eq!((h.width, h.height), (out_w, out_h), "{method} {geometry:?}");
        assert_eq!(h.data, &expected_h[..], "{method} horizontal {geometry:?}");

        let (v, h) = engine.calc_vh_with(method, src, &geometry).unwrap();
        assert_eq!(v.data, &expected_v[..], "{method} combined vertical {geometry:?}");
        assert_eq!(h.data, &expected_h[..], "{method} combined horizontal {geometry:?}");
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[test]
fn test_axis_range() {
    // window fully inside, origin anchored
    assert_eq!(axis_range(10, 0, 3), (0, 8));
    // negative offset pushes the first output right
    assert_eq!(axis_range(10, -2, 5), (0, 6));
    // positive offset shortens the output
    assert_eq!(axis_range(10, 3, 2), (3, 6));
    assert_eq!(axis_range(10, 0, 10), (0, 1));
    assert_eq!(axis_range(10, 0, 11), (0, 0));
    assert_eq!(axis_range(10, 10, 1), (0, 0));
    assert_eq!(axis_range(10, -10, 1), (0, 0));
}

#[test]
fn test_centered_geometry() {
    let g = Geometry::centered(5, 3).unwrap();
    assert_eq!(g, Geometry::new(-2, -1, 5, 3));

    let engine = VhAdd::new(20, 10);
    assert_eq!(engine.output_size(&g).unwrap(), (16, 8));

    let g = Geometry::centered(MAX_EXTENT, MAX_EXTENT).unwrap();
    assert_eq!((g.offset_x, g.offset_y), (-16384, -16384));
}

#[test]
fn test_centered_rejects_invalid_extents() {
    for (h, v) in [(0, 1), (1, 0), (MAX_EXTENT + 1, 1), (usize::MAX, usize::MAX)] {
        assert_eq!(
            Geometry::centered(h, v),
            Err(Error::InvalidGeometry {
                horizontal: h,
                vertical: v,
                max: MAX_EXTENT,
            })
        );
    }
}

#[test]
fn test_invalid_extents() {
    let src = vec![0u16; 16 * 16];
    let mut engine = VhAdd::new(16, 16);
    for (h, v) in [(0, 3), (3, 0), (MAX_EXTENT + 1, 1), (1, MAX_EXTENT + 1)] {
        let geometry = Geometry::new(0, 0, h, v);
        let expected = Error::InvalidGeometry {
            horizontal: h,
            vertical: v,
            max: MAX_EXTENT,
        };
        assert_eq!(engine.output_size(&geometry), Err(expected.clone()));
        assert_eq!(engine.calc_v(&src, &geometry).unwrap_err(), expected);
        assert_eq!(engine.calc_h(&src, &geometry).unwrap_err(), expected);
        assert_eq!(engine.calc_vh(&src, &geometry).unwrap_err(), expected);
    }
}

#[test]
fn test_source_too_short() {
    let src = vec![0u16; 16 * 16 - 1];
    let mut engine = VhAdd::new(16, 16);
    let geometry = Geometry::new(0, 0, 3, 3);
    let expected = Error::SourceTooShort {
        expected: 256,
        actual: 255,
    };
    assert_eq!(engine.calc_v(&src, &geometry).unwrap_err(), expected);
    assert_eq!(engine.calc_h(&src, &geometry).unwrap_err(), expected);
    assert_eq!(engine.calc_vh(&src, &geometry).unwrap_err(), expected);
}

#[test]
fn test_window_that_never_fits_is_empty() {
    let src = random_samples(8 * 6, 3);
    let mut engine = VhAdd::new(8, 6);

    for geometry in [
        Geometry::new(0, 0, 9, 1),
        Geometry::new(0, 0, 1, 7),
        Geometry::new(8, 0, 1, 1),
        Geometry::new(0, -6, 1, 1),
    ] {
        assert_eq!(engine.output_size(&geometry).unwrap(), (0, 0));
        for method in supported_methods() {
            let v = engine.calc_v_with(method, &src, &geometry).unwrap();
            assert!(v.is_empty());
            assert_eq!(v.rows().count(), 0);
            let (v, h) = engine.calc_vh_with(method, &src, &geometry).unwrap();
            assert!(v.is_empty() && h.is_empty());
        }
    }
}

// ---------------------------------------------------------------------------
// Sums
// ---------------------------------------------------------------------------

#[test]
fn test_small_known_sums() {
    #[rustfmt::skip]
    let src: Vec<u16> = vec![
        1, 2, 3, 4,
        5, 6, 7, 8,
        9, 10, 11, 12,
    ];
    let mut engine = VhAdd::with_config(4, 3, Config::scalar());
    let geometry = Geometry::new(0, 0, 2, 2);

    let v = engine.calc_v(&src, &geometry).unwrap();
    assert_eq!((v.width, v.height), (3, 2));
    assert_eq!(v.data, &[6, 8, 10, 14, 16, 18]);

    let h = engine.calc_h(&src, &geometry).unwrap();
    assert_eq!(h.data, &[3, 5, 7, 11, 13, 15]);
    assert_eq!(h.get(2, 1), Some(15));
    assert_eq!(h.get(0, 1), Some(11));
    let rows: Vec<&[u16]> = h.rows().collect();
    assert_eq!(rows, vec![&[3u16, 5, 7][..], &[11, 13, 15][..]]);
}

#[test]
fn test_get_outside_result_is_none() {
    let src: Vec<u16> = (1..=12).collect();
    let mut engine = VhAdd::new(4, 3);
    let v = engine.calc_v(&src, &Geometry::new(0, 0, 2, 2)).unwrap();
    assert_eq!((v.width, v.height), (3, 2));

    assert_eq!(v.get(2, 0), Some(3 + 7));
    // x past the row end must not wrap into the next row
    assert_eq!(v.get(3, 0), None);
    assert_eq!(v.get(0, 2), None);
    assert_eq!(v.get(usize::MAX, usize::MAX), None);
}

#[test]
fn test_negative_offsets() {
    #[rustfmt::skip]
    let src: Vec<u16> = vec![
        1, 2, 3,
        4, 5, 6,
        7, 8, 9,
    ];
    let mut engine = VhAdd::new(3, 3);

    for method in supported_methods() {
        let geometry = Geometry::centered(3, 3).unwrap();
        assert_eq!(engine.output_size(&geometry).unwrap(), (1, 1));

        // the centred rectangle's left column and top row
        let (v, h) = engine.calc_vh_with(method, &src, &geometry).unwrap();
        assert_eq!(v.data, &[1 + 4 + 7], "{method}");
        assert_eq!(h.data, &[1 + 2 + 3], "{method}");

        // window above and left of the output: only (1, 1)..(2, 2) fit
        let geometry = Geometry::new(-1, -1, 2, 2);
        assert_eq!(engine.output_size(&geometry).unwrap(), (2, 2));
        let (v, h) = engine.calc_vh_with(method, &src, &geometry).unwrap();
        assert_eq!(v.data, &[5, 7, 11, 13], "{method}");
        assert_eq!(h.data, &[3, 5, 9, 11], "{method}");
    }
}

#[test]
fn test_offset_sums_follow_closed_form() {
    // sample = column + 100 * row, so every sum has a closed form
    let (width, height) = (40, 5);
    let src: Vec<u16> = (0..width * height)
        .map(|i| (i % width + 100 * (i / width)) as u16)
        .collect();
    let geometry = Geometry::new(3, -2, 5, 3);
    let mut engine = VhAdd::new(width, height);

    // columns 0..33 and rows 2..5 have their window inside the image
    let (out_w, out_h) = (33, 3);
    let vertical = |x: usize, y: usize| (3 * (x + 3) + 300 * (y - 1)) as u16;
    let horizontal = |x: usize, y: usize| (5 * x + 25 + 500 * (y - 2)) as u16;
    let expected_v: Vec<u16> = (2..5)
        .flat_map(|y| (0..out_w).map(move |x| vertical(x, y)))
        .collect();
    let expected_h: Vec<u16> = (2..5)
        .flat_map(|y| (0..out_w).map(move |x| horizontal(x, y)))
        .collect();
    // spot values: V(0, 2) = 3 + 103 + 203, H(0, 2) = 3 + 4 + 5 + 6 + 7
    assert_eq!(expected_v[0], 309);
    assert_eq!(expected_h[0], 25);

    for method in supported_methods() {
        assert_eq!(engine.output_size(&geometry).unwrap(), (out_w, out_h));

        let v = engine.calc_v_with(method, &src, &geometry).unwrap();
        assert_eq!((v.width, v.height), (out_w, out_h), "{method}");
        assert_eq!(v.data, &expected_v[..], "{method} vertical");

        let h = engine.calc_h_with(method, &src, &geometry).unwrap();
        assert_eq!(h.data, &expected_h[..], "{method} horizontal");

        let (v, h) = engine.calc_vh_with(method, &src, &geometry).unwrap();
        assert_eq!(v.data, &expected_v[..], "{method} combined vertical");
        assert_eq!(h.data, &expected_h[..], "{method} combined horizontal");
    }
}

#[test]
fn test_all_methods_match_brute_force() {
    init_logging();
    let geometries = [
        Geometry::new(0, 0, 1, 1),
        Geometry::new(0, 0, 3, 5),
        Geometry::centered(5, 5).unwrap(),
        Geometry::centered(16, 2).unwrap(),
        Geometry::new(-7, -3, 9, 4),
        Geometry::new(2, 1, 17, 33),
        Geometry::new(-20, 0, 40, 1),
        Geometry::new(0, -2, 1, 9),
    ];

    // widths around the 8- and 16-lane boundaries
    for (width, height) in [(1, 1), (7, 5), (16, 9), (17, 12), (33, 40), (70, 37)] {
        let src = random_samples_up_to(width * height, 4000, (width * 31 + height) as u64);
        for geometry in geometries {
            check_all_methods(&src, width, height, geometry);
        }
    }
}

#[test]
fn test_sums_saturate() {
    let (width, height) = (48, 24);
    let src = random_samples(width * height, 11);
    for geometry in [
        Geometry::new(0, 0, 3, 3),
        Geometry::centered(9, 7).unwrap(),
        Geometry::new(-4, -4, 24, 20),
    ] {
        check_all_methods(&src, width, height, geometry);
    }

    let full = vec![u16::MAX; width * height];
    let mut engine = VhAdd::new(width, height);
    let (v, h) = engine.calc_vh(&full, &Geometry::new(0, 0, 2, 2)).unwrap();
    assert!(v.data.iter().all(|&s| s == u16::MAX));
    assert!(h.data.iter().all(|&s| s == u16::MAX));
}

#[test]
fn test_long_rows_and_columns() {
    // sums of up to several thousand samples stay exact before saturation
    let (width, height) = (1031, 300);
    let src = random_samples_up_to(width * height, 20, 5);
    for geometry in [
        Geometry::new(0, 0, 1000, 250),
        Geometry::new(-3, -3, 513, 129),
    ] {
        check_all_methods(&src, width, height, geometry);
    }
}

#[test]
fn test_combined_matches_separate_calls() {
    let (width, height) = (64, 48);
    let src = random_samples_up_to(width * height, 1000, 99);
    let geometry = Geometry::new(-3, -2, 7, 5);
    let mut engine = VhAdd::new(width, height);

    let v = engine.calc_v(&src, &geometry).unwrap().data.to_vec();
    let h = engine.calc_h(&src, &geometry).unwrap().data.to_vec();
    let (cv, ch) = engine.calc_vh(&src, &geometry).unwrap();
    assert_eq!(cv.data, &v[..]);
    assert_eq!(ch.data, &h[..]);
}

#[test]
fn test_repeated_calls_are_idempotent() {
    let (width, height) = (40, 30);
    let src = random_samples_up_to(width * height, 500, 8);
    let geometry = Geometry::centered(5, 5).unwrap();
    let mut engine = VhAdd::new(width, height);

    let first = engine.calc_v(&src, &geometry).unwrap().data.to_vec();
    // a different geometry in between must not leak into the next result
    engine.calc_v(&src, &Geometry::new(0, 0, 1, 30)).unwrap();
    let second = engine.calc_v(&src, &geometry).unwrap().data.to_vec();
    assert_eq!(first, second);
}

#[test]
fn test_longer_source_is_accepted() {
    let src = random_samples_up_to(10 * 10 + 17, 100, 4);
    let mut engine = VhAdd::new(10, 10);
    let geometry = Geometry::new(0, 0, 3, 3);
    let (_, _, expected_v, _) = brute_force(&src[..100], 10, 10, &geometry);
    let v = engine.calc_v(&src, &geometry).unwrap();
    assert_eq!(v.data, &expected_v[..]);
}

#[test]
fn test_end_to_end_512x512() {
    let width = 512;
    let src: Vec<u16> = (0..width * width).map(|i| (i & 0xFF) as u16).collect();
    let geometry = Geometry::centered(7, 7).unwrap();
    let (out_w, out_h, expected_v, expected_h) = brute_force(&src, width, width, &geometry);
    assert_eq!((out_w, out_h), (506, 506));

    let mut engine = VhAdd::new(width, width);
    let (v, h) = engine.calc_vh(&src, &geometry).unwrap();
    assert_eq!(v.data, &expected_v[..]);
    assert_eq!(h.data, &expected_h[..]);
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[test]
fn test_scalar_config_selects_naive() {
    let engine = VhAdd::with_config(8, 8, Config::scalar());
    assert_eq!(engine.vertical_method(), VhAddMethod::Naive);
    assert_eq!(engine.method(), VhAddMethod::Naive);
}

#[test]
fn test_dispatch_ranking() {
    let avx2_only = CpuFeatures {
        avx2: true,
        avx512f: false,
        avx512vbmi: false,
    };
    assert_eq!(VhAddMethod::select_vertical(avx2_only), VhAddMethod::Avx2Vertical);
    assert_eq!(VhAddMethod::select(avx2_only), VhAddMethod::Avx2);

    let avx512 = CpuFeatures {
        avx512f: true,
        ..avx2_only
    };
    assert_eq!(VhAddMethod::select_vertical(avx512), VhAddMethod::Avx512);
    assert_eq!(VhAddMethod::select(avx512), VhAddMethod::Avx512);

    assert_eq!(VhAddMethod::select_vertical(CpuFeatures::NONE), VhAddMethod::Naive);
    assert_eq!(VhAddMethod::select(CpuFeatures::NONE), VhAddMethod::Naive);
}

#[test]
fn test_detected_methods_are_supported() {
    let engine = VhAdd::new(8, 8);
    assert!(engine.vertical_method().is_supported());
    assert!(engine.method().is_supported());
    if cpu_features::has_avx512f() {
        assert_eq!(engine.method(), VhAddMethod::Avx512);
    } else if cpu_features::has_avx2() {
        assert_eq!(engine.vertical_method(), VhAddMethod::Avx2Vertical);
    }
}

#[test]
fn test_unsupported_method_panics() {
    let Some(method) = VhAddMethod::iter().find(|m| !m.is_supported()) else {
        return;
    };
    let src = vec![0u16; 64];
    let mut engine = VhAdd::new(8, 8);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = engine.calc_h_with(method, &src, &Geometry::new(0, 0, 2, 2));
    }));
    assert!(result.is_err(), "{method} ran on a CPU without its tier");
}
