//! Kernel layer: per-element operations and the loops that drive them over runs.
//!
//! An [`AccessTag`] decides how a run is walked: [`Scalar`] applies the kernel one
//! element at a time, [`Simd<W>`] applies it to groups of `W` lanes and finishes the
//! `len % W` trailing elements with the scalar path. Both paths call the same
//! per-element arithmetic, so they produce identical results.

use std::fmt;
use std::ops::{AddAssign, Mul};

use crate::cost::{KernelCategory, TraversalCategory};
use crate::operand::{OperandMut, RunMut};
use crate::shape::MatrixShape;
use crate::simd;
use crate::sources::{RunGroup, Sources};
use crate::{EvalError, Result};

// ============================================================================
// Kernels
// ============================================================================

/// An element-wise operation writing into the destination.
///
/// `Args` is the tuple of source values at one position.
pub trait EwiseKernel<T, Args> {
    fn apply(&self, dst: &mut T, args: Args);

    /// Apply to `W` consecutive positions.
    #[inline(always)]
    fn apply_lanes<const W: usize>(&self, dst: &mut [T; W], args: [Args; W]) {
        for (d, a) in dst.iter_mut().zip(args) {
            self.apply(d, a);
        }
    }
}

/// An n-ary element functor, `n` in `1..=4`.
///
/// Implemented for every `Fn` taking `n` values of `T` and returning `T`.
pub trait MapFn<T, Args> {
    fn call(&self, args: Args) -> T;
}

impl<T, F: Fn(T) -> T> MapFn<T, (T,)> for F {
    #[inline(always)]
    fn call(&self, (a,): (T,)) -> T {
        self(a)
    }
}

impl<T, F: Fn(T, T) -> T> MapFn<T, (T, T)> for F {
    #[inline(always)]
    fn call(&self, (a, b): (T, T)) -> T {
        self(a, b)
    }
}

impl<T, F: Fn(T, T, T) -> T> MapFn<T, (T, T, T)> for F {
    #[inline(always)]
    fn call(&self, (a, b, c): (T, T, T)) -> T {
        self(a, b, c)
    }
}

impl<T, F: Fn(T, T, T, T) -> T> MapFn<T, (T, T, T, T)> for F {
    #[inline(always)]
    fn call(&self, (a, b, c, d): (T, T, T, T)) -> T {
        self(a, b, c, d)
    }
}

/// `dst = src`
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyKernel;

impl<T: Copy> EwiseKernel<T, (T,)> for CopyKernel {
    #[inline(always)]
    fn apply(&self, dst: &mut T, (s,): (T,)) {
        *dst = s;
    }

    #[inline(always)]
    fn apply_lanes<const W: usize>(&self, dst: &mut [T; W], args: [(T,); W]) {
        *dst = args.map(|(s,)| s);
    }
}

/// `dst += src`
#[derive(Clone, Copy, Debug, Default)]
pub struct AccumKernel;

impl<T: Copy + AddAssign> EwiseKernel<T, (T,)> for AccumKernel {
    #[inline(always)]
    fn apply(&self, dst: &mut T, (s,): (T,)) {
        *dst += s;
    }
}

/// `dst += scale * src`, sources ordered `(scale, src)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScaledAccumKernel;

impl<T: Copy + AddAssign + Mul<Output = T>> EwiseKernel<T, (T, T)> for ScaledAccumKernel {
    #[inline(always)]
    fn apply(&self, dst: &mut T, (c, s): (T, T)) {
        *dst += c * s;
    }
}

/// `dst = f(src1, ..., srcN)`
#[derive(Clone, Copy)]
pub struct MapKernel<F>(pub F);

impl<T, Args, F: MapFn<T, Args>> EwiseKernel<T, Args> for MapKernel<F> {
    #[inline(always)]
    fn apply(&self, dst: &mut T, args: Args) {
        *dst = self.0.call(args);
    }
}

/// `dst += f(src1, ..., srcN)`
#[derive(Clone, Copy)]
pub struct AccumMapKernel<F>(pub F);

impl<T: AddAssign, Args, F: MapFn<T, Args>> EwiseKernel<T, Args> for AccumMapKernel<F> {
    #[inline(always)]
    fn apply(&self, dst: &mut T, args: Args) {
        *dst += self.0.call(args);
    }
}

/// `dst += scale * f(src)`, sources ordered `(scale, src)`.
#[derive(Clone, Copy)]
pub struct ScaledAccumMapKernel<F>(pub F);

impl<T, F> EwiseKernel<T, (T, T)> for ScaledAccumMapKernel<F>
where
    T: Copy + AddAssign + Mul<Output = T>,
    F: MapFn<T, (T,)>,
{
    #[inline(always)]
    fn apply(&self, dst: &mut T, (c, s): (T, T)) {
        *dst += c * self.0.call((s,));
    }
}

impl<F> fmt::Debug for MapKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MapKernel")
    }
}

impl<F> fmt::Debug for AccumMapKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccumMapKernel")
    }
}

impl<F> fmt::Debug for ScaledAccumMapKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScaledAccumMapKernel")
    }
}

// ============================================================================
// Access tags
// ============================================================================

/// Selects the kernel category used to walk each run.
pub trait AccessTag: Copy + Default + fmt::Debug {
    const CATEGORY: KernelCategory;

    /// Apply `kernel` at positions `0..len` of `dst` and `srcs`.
    fn run<T, R, K>(kernel: &K, dst: RunMut<'_, T>, srcs: &R, len: usize)
    where
        T: Copy,
        R: RunGroup<T>,
        K: EwiseKernel<T, R::Args>;
}

/// One element per step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scalar;

impl AccessTag for Scalar {
    const CATEGORY: KernelCategory = KernelCategory::Scalar;

    #[inline]
    fn run<T, R, K>(kernel: &K, mut dst: RunMut<'_, T>, srcs: &R, len: usize)
    where
        T: Copy,
        R: RunGroup<T>,
        K: EwiseKernel<T, R::Args>,
    {
        scalar_loop(kernel, &mut dst, srcs, 0, len);
    }
}

/// `W` lanes per step, scalar cleanup for the remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Simd<const W: usize>;

/// Two f64 lanes.
pub type Sse = Simd<2>;

/// Four f64 lanes.
pub type Avx = Simd<4>;

impl<const W: usize> Simd<W> {
    const LANES: usize = {
        assert!(W > 0, "SIMD lane width must be non-zero");
        W
    };
}

impl<const W: usize> AccessTag for Simd<W> {
    const CATEGORY: KernelCategory = KernelCategory::Simd { width: W };

    #[inline]
    fn run<T, R, K>(kernel: &K, mut dst: RunMut<'_, T>, srcs: &R, len: usize)
    where
        T: Copy,
        R: RunGroup<T>,
        K: EwiseKernel<T, R::Args>,
    {
        let body = len - len % Self::LANES;
        simd::dispatch_if_large(len, move || {
            let mut k = 0;
            while k < body {
                let mut lanes = dst.load::<W>(k);
                kernel.apply_lanes(&mut lanes, srcs.lanes::<W>(k));
                dst.store(k, lanes);
                k += W;
            }
            scalar_loop(kernel, &mut dst, srcs, body, len);
        });
    }
}

#[inline(always)]
fn scalar_loop<T, R, K>(kernel: &K, dst: &mut RunMut<'_, T>, srcs: &R, start: usize, end: usize)
where
    T: Copy,
    R: RunGroup<T>,
    K: EwiseKernel<T, R::Args>,
{
    for k in start..end {
        kernel.apply(dst.get_mut(k), srcs.args(k));
    }
}

// ============================================================================
// Traversal driver
// ============================================================================

/// Walk `shape` with `traversal`, applying `kernel` under `Tag`.
///
/// Linear traversal acquires every flat run before the first write, so a
/// [`EvalError::LinearContractViolated`] leaves the destination untouched.
pub(crate) fn drive<T, Tag, K, S, D>(
    kernel: &K,
    traversal: TraversalCategory,
    shape: &MatrixShape,
    sources: &S,
    dst: &mut D,
) -> Result<()>
where
    T: Copy,
    Tag: AccessTag,
    S: Sources<T>,
    D: OperandMut<T>,
    K: EwiseKernel<T, S::Args>,
{
    if shape.is_empty() {
        return Ok(());
    }
    match traversal {
        TraversalCategory::Linear => {
            let srcs = sources
                .linear_runs()
                .ok_or(EvalError::LinearContractViolated)?;
            let out = dst
                .linear_run_mut()
                .ok_or(EvalError::LinearContractViolated)?;
            Tag::run(kernel, out, &srcs, shape.nelems());
        }
        TraversalCategory::PerColumn => {
            let rows = shape.nrows();
            for j in 0..shape.ncols() {
                let srcs = sources.column_runs(j);
                Tag::run(kernel, dst.column_run_mut(j), &srcs, rows);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{DenseMatrix, MatrixView, MatrixViewMut};
    use crate::operand::{Operand, Run, Single};

    fn run_tag<Tag: AccessTag, K: EwiseKernel<f64, (f64,)>>(
        kernel: &K,
        dst: &mut [f64],
        src: &[f64],
    ) {
        let len = dst.len();
        Tag::run(kernel, RunMut::contiguous(dst), &(Run::contiguous(src),), len);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Scalar::CATEGORY, KernelCategory::Scalar);
        assert_eq!(Sse::CATEGORY, KernelCategory::Simd { width: 2 });
        assert_eq!(Avx::CATEGORY.width(), 4);
    }

    #[test]
    fn test_copy_and_accum_scalar() {
        let src: Vec<f64> = (0..7).map(|i| i as f64).collect();
        let mut dst = vec![0.0; 7];
        run_tag::<Scalar, _>(&CopyKernel, &mut dst, &src);
        run_tag::<Scalar, _>(&AccumKernel, &mut dst, &src);
        assert_eq!(dst, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn test_simd_remainder_matches_scalar() {
        for len in 0..20 {
            let src: Vec<f64> = (0..len).map(|i| 1.5 * i as f64 - 3.0).collect();
            let mut a = vec![1.0; len];
            let mut b = vec![1.0; len];
            let mut c = vec![1.0; len];
            run_tag::<Scalar, _>(&AccumKernel, &mut a, &src);
            run_tag::<Sse, _>(&AccumKernel, &mut b, &src);
            run_tag::<Simd<8>, _>(&AccumKernel, &mut c, &src);
            assert_eq!(a, b, "len={len}");
            assert_eq!(a, c, "len={len}");
        }
    }

    #[test]
    fn test_simd_long_run_dispatches() {
        let src: Vec<f64> = (0..203).map(|i| i as f64).collect();
        let mut dst = vec![0.0; 203];
        run_tag::<Avx, _>(&CopyKernel, &mut dst, &src);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_map_kernels() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        let scale = 2.0;
        let mut dst = [1.0; 3];

        let srcs = (Run::contiguous(&a[..]), Run::contiguous(&b[..]));
        Scalar::run(
            &MapKernel(|x: f64, y: f64| x + y),
            RunMut::contiguous(&mut dst),
            &srcs,
            3,
        );
        assert_eq!(dst, [11.0, 22.0, 33.0]);

        Sse::run(
            &AccumMapKernel(|x: f64, y: f64| x * y),
            RunMut::contiguous(&mut dst),
            &srcs,
            3,
        );
        assert_eq!(dst, [21.0, 62.0, 123.0]);

        let scaled = (Run::broadcast(&scale), Run::contiguous(&a[..]));
        Scalar::run(
            &ScaledAccumMapKernel(|x: f64| x * x),
            RunMut::contiguous(&mut dst),
            &scaled,
            3,
        );
        assert_eq!(dst, [23.0, 70.0, 141.0]);

        Scalar::run(&ScaledAccumKernel, RunMut::contiguous(&mut dst), &scaled, 3);
        assert_eq!(dst, [25.0, 74.0, 147.0]);
    }

    #[test]
    fn test_drive_per_column_strided() {
        // 3x2 view into a 4-row buffer
        let buf: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let src = MatrixView::block(&buf, 3, 2, 4).unwrap();
        let mut out = vec![-1.0; 8];
        let mut dst = MatrixViewMut::block(&mut out, 3, 2, 4).unwrap();
        let shape = MatrixShape::new(3, 2);
        drive::<f64, Scalar, _, _, _>(
            &CopyKernel,
            TraversalCategory::PerColumn,
            &shape,
            &(&src,),
            &mut dst,
        )
        .unwrap();
        assert_eq!(out, vec![0.0, 1.0, 2.0, -1.0, 4.0, 5.0, 6.0, -1.0]);
    }

    #[test]
    fn test_drive_linear_contract_checked() {
        let buf = vec![1.0; 4];
        let src = MatrixView::block(&buf, 2, 2, 2).unwrap();
        let mut dst = DenseMatrix::<f64>::zeros(2, 2);
        let err = drive::<f64, Scalar, _, _, _>(
            &CopyKernel,
            TraversalCategory::Linear,
            &MatrixShape::new(2, 2),
            &(&src,),
            &mut dst,
        )
        .unwrap_err();
        assert_eq!(err, EvalError::LinearContractViolated);
        assert_eq!(dst.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_drive_empty_shape_is_noop() {
        let src = DenseMatrix::<f64>::zeros(0, 5);
        let mut dst = DenseMatrix::<f64>::zeros(0, 5);
        drive::<f64, Avx, _, _, _>(
            &CopyKernel,
            TraversalCategory::PerColumn,
            &MatrixShape::new(0, 5),
            &(&src,),
            &mut dst,
        )
        .unwrap();
        assert!(dst.is_empty());
    }

    #[test]
    fn test_drive_broadcast_single() {
        let mut dst = DenseMatrix::<f64>::zeros(3, 3);
        let shape = dst.shape();
        drive::<f64, Sse, _, _, _>(
            &CopyKernel,
            TraversalCategory::Linear,
            &shape,
            &(Single(4.0),),
            &mut dst,
        )
        .unwrap();
        assert!(dst.iter().all(|&v| v == 4.0));
        assert_eq!(Operand::<f64>::get(&dst, 2, 2), 4.0);
    }
}
