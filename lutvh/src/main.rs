//! Timing driver: runs every supported strategy of both engines over a
//! 512x512 sample buffer and reports the mean time per call and the
//! difference from the scalar reference.
//!
//! `LUTVH_SIMD` caps the auto-selected strategies, `RUST_LOG` the log level.
//! An optional first argument names a file that receives a copy of the report.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use lutvh::{
    Config, Geometry, Lut, LutMethod, Result, Strategy, VhAdd, VhAddMethod, mean_squared_error,
};
use strum::IntoEnumIterator;

const WIDTH: usize = 512;
const LOOPS: u32 = 100;
const WINDOW: (i32, i32) = (0, 255);

fn time<T>(mut f: impl FnMut() -> T) -> Duration {
    let start = Instant::now();
    for _ in 0..LOOPS {
        std::hint::black_box(f());
    }
    start.elapsed() / LOOPS
}

fn run_lut(config: Config, src: &[u16]) -> Result<()> {
    let mut lut = Lut::with_config(config);
    let mut dst = vec![0u8; src.len()];

    lut.create_with(LutMethod::NaiveLut, WINDOW.0, WINDOW.1)?;
    let mut reference = vec![0u8; src.len()];
    lut.convert_with(LutMethod::NaiveLut, src, &mut reference)?;

    for method in LutMethod::iter().filter(|m| m.is_supported()) {
        if method.supports_create() {
            let elapsed = time(|| lut.create_with(method, WINDOW.0, WINDOW.1));
            tracing::info!(%method, ?elapsed, "create");
        }

        lut.create_with(LutMethod::NaiveLut, WINDOW.0, WINDOW.1)?;
        let elapsed = time(|| lut.convert_with(method, src, &mut dst));
        lut.convert_with(method, src, &mut dst)?;
        let diff = mean_squared_error(&dst, &reference);
        tracing::info!(%method, ?elapsed, diff, "convert");
    }

    lut.create(WINDOW.0, WINDOW.1)?;
    let elapsed = time(|| lut.convert(src, &mut dst));
    tracing::info!(
        create = %lut.create_method(),
        convert = %lut.convert_method(),
        ?elapsed,
        "auto convert"
    );
    Ok(())
}

fn run_vhadd(config: Config, src: &[u16]) -> Result<()> {
    let mut engine = VhAdd::with_config(WIDTH, WIDTH, config);
    let geometry = Geometry::centered(7, 7)?;

    let (reference_v, reference_h) = {
        let (v, h) = engine.calc_vh_with(VhAddMethod::Naive, src, &geometry)?;
        (v.data.to_vec(), h.data.to_vec())
    };

    for method in VhAddMethod::iter().filter(|m| m.is_supported()) {
        let elapsed_v = time(|| engine.calc_v_with(method, src, &geometry).is_ok());
        let elapsed_h = time(|| engine.calc_h_with(method, src, &geometry).is_ok());
        let elapsed_vh = time(|| engine.calc_vh_with(method, src, &geometry).is_ok());

        let (v, h) = engine.calc_vh_with(method, src, &geometry)?;
        let matches = v.data == &reference_v[..] && h.data == &reference_h[..];
        tracing::info!(%method, ?elapsed_v, ?elapsed_h, ?elapsed_vh, matches, "vhadd");
    }
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let log_file = std::env::args_os().nth(1).map(PathBuf::from);
    let _guard = common::log_setup::setup_logging("info", log_file.as_deref())?;

    let config = Config::from_env();
    let features = common::cpu_features::get();
    tracing::info!(?features, cap = %config.simd, "starting");

    let src: Vec<u16> = (0..WIDTH * WIDTH).map(|i| (i & 0xFFFF) as u16).collect();
    run_lut(config, &src)?;
    run_vhadd(config, &src)?;
    Ok(())
}
