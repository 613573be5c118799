//! Vertical and horizontal sliding-window sums over a 16-bit image.
//!
//! For a window of `horizontal x vertical` samples placed at
//! `(x + offset_x, y + offset_y)` the engine produces, for every output
//! position `(x, y)` whose whole window lies inside the image:
//!
//! - the vertical sum of `vertical` samples down column `x + offset_x`,
//!   starting at row `y + offset_y`,
//! - the horizontal sum of `horizontal` samples along row `y + offset_y`,
//!   starting at column `x + offset_x`.
//!
//! The offset therefore names the window's top-left sample; V sums the
//! window's left column and H its top row.
//!
//! Sums are exact in 32-bit accumulators and stored saturated to `u16`.
//! Every strategy updates sums incrementally (entering sample minus leaving
//! sample) rather than re-summing each window.

mod scalar;

#[cfg(target_arch = "x86_64")]
mod avx2;

#[cfg(target_arch = "x86_64")]
mod avx512;

#[cfg(test)]
mod tests;

use common::cpu_features::{CpuFeatures, Extension};
use strum_macros::{Display, EnumIter};

use crate::config::Config;
use crate::dispatch::{self, Strategy};
use crate::error::{Error, Result};

/// Largest window extent; keeps every exact sum inside `i32`.
pub const MAX_EXTENT: usize = 1 << 15;

/// Window shape and placement relative to each output position: the window
/// spans columns `x + offset_x ..` and rows `y + offset_y ..`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub offset_x: i32,
    pub offset_y: i32,
    pub horizontal: usize,
    pub vertical: usize,
}

impl Geometry {
    pub fn new(offset_x: i32, offset_y: i32, horizontal: usize, vertical: usize) -> Self {
        Self {
            offset_x,
            offset_y,
            horizontal,
            vertical,
        }
    }

    /// Window whose rectangle is centred on the output position (odd extents
    /// are exactly centred). The sums still read the rectangle's left column
    /// and top row, so a centred 3x3 window at `(x, y)` sums column `x - 1`
    /// and row `y - 1`.
    ///
    /// Extents outside `1..=MAX_EXTENT` fail with [`Error::InvalidGeometry`].
    pub fn centered(horizontal: usize, vertical: usize) -> Result<Self> {
        check_extents(horizontal, vertical)?;
        Ok(Self::new(
            -((horizontal / 2) as i32),
            -((vertical / 2) as i32),
            horizontal,
            vertical,
        ))
    }
}

fn check_extents(horizontal: usize, vertical: usize) -> Result<()> {
    if !(1..=MAX_EXTENT).contains(&horizontal) || !(1..=MAX_EXTENT).contains(&vertical) {
        return Err(Error::InvalidGeometry {
            horizontal,
            vertical,
            max: MAX_EXTENT,
        });
    }
    Ok(())
}

/// Computation variants of [`VhAdd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum VhAddMethod {
    /// Scalar sliding sums.
    Naive,
    /// 8-lane column accumulators over full rows, 8-lane prefix sums along rows.
    Avx2,
    /// Vertical pass in 16-column strips with register-resident accumulators;
    /// other passes as [`VhAddMethod::Avx2`].
    Avx2Vertical,
    /// [`VhAddMethod::Avx2`] algorithms at 16 lanes.
    Avx512,
}

impl VhAddMethod {
    const VERTICAL_RANKING: [VhAddMethod; 3] = [
        VhAddMethod::Avx512,
        VhAddMethod::Avx2Vertical,
        VhAddMethod::Naive,
    ];

    const RANKING: [VhAddMethod; 3] = [VhAddMethod::Avx512, VhAddMethod::Avx2, VhAddMethod::Naive];

    /// Best strategy for [`VhAdd::calc_v`].
    pub fn select_vertical(features: CpuFeatures) -> VhAddMethod {
        dispatch::select(&Self::VERTICAL_RANKING, features).unwrap_or(VhAddMethod::Naive)
    }

    /// Best strategy for [`VhAdd::calc_h`] and [`VhAdd::calc_vh`].
    pub fn select(features: CpuFeatures) -> VhAddMethod {
        dispatch::select(&Self::RANKING, features).unwrap_or(VhAddMethod::Naive)
    }
}

impl Strategy for VhAddMethod {
    fn required_extension(self) -> Option<Extension> {
        match self {
            VhAddMethod::Naive => None,
            VhAddMethod::Avx2 | VhAddMethod::Avx2Vertical => Some(Extension::Avx2),
            VhAddMethod::Avx512 => Some(Extension::Avx512f),
        }
    }
}

/// Row-major block of sums borrowed from the engine's scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VhResult<'a> {
    pub data: &'a [u16],
    pub width: usize,
    pub height: usize,
}

impl<'a> VhResult<'a> {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sum at output position `(x, y)`, `None` outside `width x height`.
    pub fn get(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [u16]> + 'a {
        // chunks_exact panics on 0
        self.data.chunks_exact(self.width.max(1))
    }
}

/// A validated geometry resolved against the image: where the first window
/// starts in the source and how many outputs there are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    /// Image width, the source row stride.
    pub stride: usize,
    /// Source column of the first window.
    pub src_x: usize,
    /// Source row of the first window.
    pub src_y: usize,
    pub out_width: usize,
    pub out_height: usize,
    pub horizontal: usize,
    pub vertical: usize,
}

impl Plan {
    fn new(width: usize, height: usize, geometry: &Geometry) -> Result<Self> {
        let Geometry {
            offset_x,
            offset_y,
            horizontal,
            vertical,
        } = *geometry;
        check_extents(horizontal, vertical)?;

        let (src_x, out_width) = axis_range(width, offset_x, horizontal);
        let (src_y, out_height) = axis_range(height, offset_y, vertical);
        let (out_width, out_height) = if out_width == 0 || out_height == 0 {
            (0, 0)
        } else {
            (out_width, out_height)
        };

        Ok(Self {
            stride: width,
            src_x,
            src_y,
            out_width,
            out_height,
            horizontal,
            vertical,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.out_width == 0
    }

    pub fn len(&self) -> usize {
        self.out_width * self.out_height
    }

    /// `out_width` samples of source row `src_y + row`, starting at `src_x`.
    #[inline]
    pub fn column_row<'s>(&self, src: &'s [u16], row: usize) -> &'s [u16] {
        &src[(self.src_y + row) * self.stride + self.src_x..][..self.out_width]
    }

    /// Everything the horizontal windows of output row `row` cover.
    #[inline]
    pub fn window_row<'s>(&self, src: &'s [u16], row: usize) -> &'s [u16] {
        &src[(self.src_y + row) * self.stride + self.src_x..][..self.out_width + self.horizontal - 1]
    }
}

/// First source index and output count along one axis of length `len` for a
/// window of `extent` samples at `offset` from the output position.
fn axis_range(len: usize, offset: i32, extent: usize) -> (usize, usize) {
    let len = len as i64;
    let offset = offset as i64;
    let first = (-offset).max(0);
    let end = len.min(len - offset - extent as i64 + 1);
    if end <= first {
        return (0, 0);
    }
    ((first + offset) as usize, (end - first) as usize)
}

/// Row-level primitives of a sliding-sum strategy. The drivers below walk the
/// output rows and call these.
trait RowKernels {
    /// `acc[i] += row[i]`.
    fn add_row(acc: &mut [i32], row: &[u16]);
    /// `acc[i] += entering[i] - leaving[i]`.
    fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]);
    /// `dst[i] = min(acc[i], 65535)`.
    fn store_row(acc: &[i32], dst: &mut [u16]);
    /// Sliding sums of `horizontal` samples along `row`; one per `dst` entry.
    fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]);
}

struct ScalarKernels;

impl RowKernels for ScalarKernels {
    fn add_row(acc: &mut [i32], row: &[u16]) {
        scalar::add_row(acc, row)
    }

    fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]) {
        scalar::slide_row(acc, entering, leaving)
    }

    fn store_row(acc: &[i32], dst: &mut [u16]) {
        scalar::store_row(acc, dst)
    }

    fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]) {
        scalar::row_sums(row, horizontal, dst)
    }
}

// The SIMD kernel sets are only instantiated after `ensure_supported`.

#[cfg(target_arch = "x86_64")]
struct Avx2Kernels;

#[cfg(target_arch = "x86_64")]
impl RowKernels for Avx2Kernels {
    fn add_row(acc: &mut [i32], row: &[u16]) {
        unsafe { avx2::add_row(acc, row) }
    }

    fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]) {
        unsafe { avx2::slide_row(acc, entering, leaving) }
    }

    fn store_row(acc: &[i32], dst: &mut [u16]) {
        unsafe { avx2::store_row(acc, dst) }
    }

    fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]) {
        unsafe { avx2::row_sums(row, horizontal, dst) }
    }
}

#[cfg(target_arch = "x86_64")]
struct Avx512Kernels;

#[cfg(target_arch = "x86_64")]
impl RowKernels for Avx512Kernels {
    fn add_row(acc: &mut [i32], row: &[u16]) {
        unsafe { avx512::add_row(acc, row) }
    }

    fn slide_row(acc: &mut [i32], entering: &[u16], leaving: &[u16]) {
        unsafe { avx512::slide_row(acc, entering, leaving) }
    }

    fn store_row(acc: &[i32], dst: &mut [u16]) {
        unsafe { avx512::store_row(acc, dst) }
    }

    fn row_sums(row: &[u16], horizontal: usize, dst: &mut [u16]) {
        unsafe { avx512::row_sums(row, horizontal, dst) }
    }
}

/// Column sums: accumulate the first window, then slide it down one row per
/// output row.
fn vertical_pass<K: RowKernels>(src: &[u16], plan: &Plan, acc: &mut [i32], dst: &mut [u16]) {
    let w = plan.out_width;
    let acc = &mut acc[..w];
    acc.fill(0);
    for k in 0..plan.vertical {
        K::add_row(acc, plan.column_row(src, k));
    }
    K::store_row(acc, &mut dst[..w]);

    for y in 1..plan.out_height {
        K::slide_row(
            acc,
            plan.column_row(src, y + plan.vertical - 1),
            plan.column_row(src, y - 1),
        );
        K::store_row(acc, &mut dst[y * w..][..w]);
    }
}

fn horizontal_pass<K: RowKernels>(src: &[u16], plan: &Plan, dst: &mut [u16]) {
    let w = plan.out_width;
    for y in 0..plan.out_height {
        K::row_sums(plan.window_row(src, y), plan.horizontal, &mut dst[y * w..][..w]);
    }
}

/// Both passes in a single walk down the image, each source row visited once
/// per role.
fn combined_pass<K: RowKernels>(
    src: &[u16],
    plan: &Plan,
    acc: &mut [i32],
    v_dst: &mut [u16],
    h_dst: &mut [u16],
) {
    let w = plan.out_width;
    let acc = &mut acc[..w];
    acc.fill(0);
    for k in 0..plan.vertical {
        K::add_row(acc, plan.column_row(src, k));
    }

    for y in 0..plan.out_height {
        if y > 0 {
            K::slide_row(
                acc,
                plan.column_row(src, y + plan.vertical - 1),
                plan.column_row(src, y - 1),
            );
        }
        K::store_row(acc, &mut v_dst[y * w..][..w]);
        K::row_sums(plan.window_row(src, y), plan.horizontal, &mut h_dst[y * w..][..w]);
    }
}

/// Sliding-window accumulation engine owning its scratch buffers.
///
/// Results borrow the engine and stay valid until the next `calc_*` call.
#[derive(Debug, Clone)]
pub struct VhAdd {
    width: usize,
    height: usize,
    /// One exact column sum per output column.
    col_acc: Vec<i32>,
    v_dst: Vec<u16>,
    h_dst: Vec<u16>,
    vertical_method: VhAddMethod,
    method: VhAddMethod,
}

impl VhAdd {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_config(width, height, Config::default())
    }

    pub fn with_config(width: usize, height: usize, config: Config) -> Self {
        let features = config.features();
        let vertical_method = VhAddMethod::select_vertical(features);
        let method = VhAddMethod::select(features);
        tracing::debug!(
            width,
            height,
            cap = %config.simd,
            %vertical_method,
            %method,
            "vhadd dispatch resolved"
        );

        let len = width * height;
        Self {
            width,
            height,
            col_acc: vec![0; width],
            v_dst: vec![0; len],
            h_dst: vec![0; len],
            vertical_method,
            method,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Strategy [`VhAdd::calc_v`] uses.
    pub fn vertical_method(&self) -> VhAddMethod {
        self.vertical_method
    }

    /// Strategy [`VhAdd::calc_h`] and [`VhAdd::calc_vh`] use.
    pub fn method(&self) -> VhAddMethod {
        self.method
    }

    /// `(width, height)` of the results `geometry` yields on this image.
    pub fn output_size(&self, geometry: &Geometry) -> Result<(usize, usize)> {
        let plan = Plan::new(self.width, self.height, geometry)?;
        Ok((plan.out_width, plan.out_height))
    }

    fn plan(&self, src: &[u16], geometry: &Geometry) -> Result<Plan> {
        let expected = self.width * self.height;
        if src.len() < expected {
            return Err(Error::SourceTooShort {
                expected,
                actual: src.len(),
            });
        }
        Plan::new(self.width, self.height, geometry)
    }

    pub fn calc_v(&mut self, src: &[u16], geometry: &Geometry) -> Result<VhResult<'_>> {
        self.calc_v_with(self.vertical_method, src, geometry)
    }

    pub fn calc_h(&mut self, src: &[u16], geometry: &Geometry) -> Result<VhResult<'_>> {
        self.calc_h_with(self.method, src, geometry)
    }

    pub fn calc_vh(
        &mut self,
        src: &[u16],
        geometry: &Geometry,
    ) -> Result<(VhResult<'_>, VhResult<'_>)> {
        self.calc_vh_with(self.method, src, geometry)
    }

    /// Vertical sums with an explicit strategy.
    ///
    /// # Panics
    /// If the CPU lacks the instruction-set tier `method` needs.
    pub fn calc_v_with(
        &mut self,
        method: VhAddMethod,
        src: &[u16],
        geometry: &Geometry,
    ) -> Result<VhResult<'_>> {
        dispatch::ensure_supported(method);
        let plan = self.plan(src, geometry)?;
        tracing::trace!(%method, ?plan, "vertical pass");

        if !plan.is_empty() {
            let dst = &mut self.v_dst[..plan.len()];
            match method {
                VhAddMethod::Naive => {
                    vertical_pass::<ScalarKernels>(src, &plan, &mut self.col_acc, dst)
                }
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx2 => vertical_pass::<Avx2Kernels>(src, &plan, &mut self.col_acc, dst),
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx2Vertical => unsafe { avx2::vertical_strips(src, &plan, dst) },
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx512 => {
                    vertical_pass::<Avx512Kernels>(src, &plan, &mut self.col_acc, dst)
                }
                #[cfg(not(target_arch = "x86_64"))]
                _ => unreachable!("{method} passed the capability check"),
            }
        }

        Ok(result(&self.v_dst, &plan))
    }

    /// Horizontal sums with an explicit strategy.
    ///
    /// # Panics
    /// If the CPU lacks the instruction-set tier `method` needs.
    pub fn calc_h_with(
        &mut self,
        method: VhAddMethod,
        src: &[u16],
        geometry: &Geometry,
    ) -> Result<VhResult<'_>> {
        dispatch::ensure_supported(method);
        let plan = self.plan(src, geometry)?;
        tracing::trace!(%method, ?plan, "horizontal pass");

        if !plan.is_empty() {
            let dst = &mut self.h_dst[..plan.len()];
            match method {
                VhAddMethod::Naive => horizontal_pass::<ScalarKernels>(src, &plan, dst),
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx2 | VhAddMethod::Avx2Vertical => {
                    horizontal_pass::<Avx2Kernels>(src, &plan, dst)
                }
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx512 => horizontal_pass::<Avx512Kernels>(src, &plan, dst),
                #[cfg(not(target_arch = "x86_64"))]
                _ => unreachable!("{method} passed the capability check"),
            }
        }

        Ok(result(&self.h_dst, &plan))
    }

    /// Vertical and horizontal sums in one pass, `(vertical, horizontal)`.
    ///
    /// # Panics
    /// If the CPU lacks the instruction-set tier `method` needs.
    pub fn calc_vh_with(
        &mut self,
        method: VhAddMethod,
        src: &[u16],
        geometry: &Geometry,
    ) -> Result<(VhResult<'_>, VhResult<'_>)> {
        dispatch::ensure_supported(method);
        let plan = self.plan(src, geometry)?;
        tracing::trace!(%method, ?plan, "combined pass");

        let Self {
            col_acc,
            v_dst,
            h_dst,
            ..
        } = self;

        if !plan.is_empty() {
            let v = &mut v_dst[..plan.len()];
            let h = &mut h_dst[..plan.len()];
            match method {
                VhAddMethod::Naive => combined_pass::<ScalarKernels>(src, &plan, col_acc, v, h),
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx2 | VhAddMethod::Avx2Vertical => {
                    combined_pass::<Avx2Kernels>(src, &plan, col_acc, v, h)
                }
                #[cfg(target_arch = "x86_64")]
                VhAddMethod::Avx512 => combined_pass::<Avx512Kernels>(src, &plan, col_acc, v, h),
                #[cfg(not(target_arch = "x86_64"))]
                _ => unreachable!("{method} passed the capability check"),
            }
        }

        Ok((result(v_dst, &plan), result(h_dst, &plan)))
    }
}

fn result<'a>(buffer: &'a [u16], plan: &Plan) -> VhResult<'a> {
    VhResult {
        data: &buffer[..plan.len()],
        width: plan.out_width,
        height: plan.out_height,
    }
}
