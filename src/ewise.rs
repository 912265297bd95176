//! Evaluation entry points.
//!
//! [`ewise`] and [`map`] take an explicit access tag; the destination-first forms
//! ([`map_to`], [`accum_to`], [`accumf_to`] and their scaled variants) infer the
//! shape from the destination and run scalar kernels under the default scheme.

use std::ops::{AddAssign, Mul};

use log::trace;

use crate::cost::{CostModel, KernelCategory, TraversalCategory};
use crate::kernel::{
    drive, AccessTag, AccumKernel, AccumMapKernel, CopyKernel, EwiseKernel, MapFn, MapKernel,
    Scalar, ScaledAccumKernel, ScaledAccumMapKernel,
};
use crate::operand::{Operand, OperandMut};
use crate::scheme::{MaccPolicy, Scheme};
use crate::shape::MatrixShape;
use crate::sources::Sources;
use crate::{EvalError, Result};

/// The index space of one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extent {
    /// `n` elements walked by flat index. Forces Linear traversal.
    Linear(usize),
    /// A (rows, columns) shape. Traversal is chosen by the scheme selector.
    Shape(MatrixShape),
}

impl From<usize> for Extent {
    fn from(n: usize) -> Self {
        Extent::Linear(n)
    }
}

impl From<MatrixShape> for Extent {
    fn from(shape: MatrixShape) -> Self {
        Extent::Shape(shape)
    }
}

impl From<(usize, usize)> for Extent {
    fn from((rows, cols): (usize, usize)) -> Self {
        Extent::Shape(MatrixShape::new(rows, cols))
    }
}

/// Resolve the scheme for `extent` and drive `kernel` under `Tag`.
///
/// Every check happens before the first kernel call.
fn run<T, Tag, K, S, D>(
    kernel: &K,
    model: &CostModel,
    extent: Extent,
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
    let scheme = match extent {
        Extent::Linear(n) => {
            if !(S::LINEAR_INDEX && D::LINEAR_INDEX) {
                return Err(EvalError::LinearAccessUnsupported);
            }
            let found = dst.nrows() * dst.ncols();
            if found != n {
                return Err(EvalError::LengthMismatch { expected: n, found });
            }
            sources.check_len(n)?;
            Scheme::new(dst.shape(), TraversalCategory::Linear, Tag::CATEGORY)
        }
        Extent::Shape(shape) => {
            let scheme = Scheme::get_default_with::<T, S, D>(sources, dst, Tag::CATEGORY, model)?;
            if scheme.shape().dims() != shape.dims() {
                return Err(EvalError::ShapeMismatch {
                    expected: shape.dims(),
                    found: scheme.shape().dims(),
                });
            }
            scheme
        }
    };
    trace!(
        "ewise {}x{} arity {}: {:?} traversal, {:?} kernel",
        scheme.shape().nrows(),
        scheme.shape().ncols(),
        S::ARITY,
        scheme.traversal(),
        scheme.kernel()
    );
    drive::<T, Tag, K, S, D>(kernel, scheme.traversal(), scheme.shape(), sources, dst)
}

// ============================================================================
// Tagged entry points
// ============================================================================

/// A kernel bound to an access tag. Built by [`ewise`].
#[derive(Clone, Copy, Debug)]
pub struct Ewise<K, Tag> {
    kernel: K,
    model: CostModel,
    _tag: Tag,
}

/// Bind `kernel` to `tag` for later application.
pub fn ewise<K, Tag: AccessTag>(kernel: K, tag: Tag) -> Ewise<K, Tag> {
    Ewise {
        kernel,
        model: CostModel::default(),
        _tag: tag,
    }
}

impl<K, Tag: AccessTag> Ewise<K, Tag> {
    /// Replace the cost model used when the traversal is cost-selected.
    pub fn with_cost_model(mut self, model: CostModel) -> Self {
        self.model = model;
        self
    }

    /// Evaluate over `extent`, reading `sources` and writing `dst`.
    ///
    /// A plain element count forces Linear traversal over that many elements;
    /// a shape must equal the common shape of the operands.
    pub fn apply<T, S, D>(&self, extent: impl Into<Extent>, sources: S, dst: &mut D) -> Result<()>
    where
        T: Copy,
        S: Sources<T>,
        D: OperandMut<T>,
        K: EwiseKernel<T, S::Args>,
    {
        run::<T, Tag, K, S, D>(&self.kernel, &self.model, extent.into(), &sources, dst)
    }
}

/// An n-ary functor bound to an access tag. Built by [`map`].
#[derive(Clone, Copy)]
pub struct Map<F, Tag> {
    kernel: MapKernel<F>,
    model: CostModel,
    _tag: Tag,
}

/// Bind the functor `f` to `tag` for later application.
pub fn map<F, Tag: AccessTag>(f: F, tag: Tag) -> Map<F, Tag> {
    Map {
        kernel: MapKernel(f),
        model: CostModel::default(),
        _tag: tag,
    }
}

impl<F, Tag: AccessTag> Map<F, Tag> {
    pub fn with_cost_model(mut self, model: CostModel) -> Self {
        self.model = model;
        self
    }

    /// `dst[i] = f(sources[i]...)` over `extent`.
    pub fn apply<T, S, D>(&self, extent: impl Into<Extent>, dst: &mut D, sources: S) -> Result<()>
    where
        T: Copy,
        S: Sources<T>,
        D: OperandMut<T>,
        F: MapFn<T, S::Args>,
    {
        run::<T, Tag, MapKernel<F>, S, D>(&self.kernel, &self.model, extent.into(), &sources, dst)
    }
}

// ============================================================================
// Destination-first forms
// ============================================================================

fn run_default<T, K, S, D>(kernel: &K, sources: &S, dst: &mut D) -> Result<()>
where
    T: Copy,
    S: Sources<T>,
    D: OperandMut<T>,
    K: EwiseKernel<T, S::Args>,
{
    let extent = Extent::Shape(dst.shape());
    run::<T, Scalar, K, S, D>(kernel, &CostModel::default(), extent, sources, dst)
}

/// `dst[i] = f(sources[i]...)`
pub fn map_to<T, F, S, D>(dst: &mut D, f: F, sources: S) -> Result<()>
where
    T: Copy,
    S: Sources<T>,
    D: OperandMut<T>,
    F: MapFn<T, S::Args>,
{
    run_default::<T, _, S, D>(&MapKernel(f), &sources, dst)
}

/// `dst[i] += src[i]`
pub fn accum_to<T, A, D>(dst: &mut D, src: A) -> Result<()>
where
    T: Copy + AddAssign,
    A: Operand<T>,
    D: OperandMut<T>,
{
    run_default::<T, _, (A,), D>(&AccumKernel, &(src,), dst)
}

/// `dst[i] += scale[i] * src[i]`
///
/// `scale` is a [`crate::Single`] for a scalar factor or any matrix operand for a
/// per-element one.
pub fn accum_scaled_to<T, C, A, D>(dst: &mut D, scale: C, src: A) -> Result<()>
where
    T: Copy + AddAssign + Mul<Output = T>,
    C: Operand<T>,
    A: Operand<T>,
    D: OperandMut<T>,
{
    run_default::<T, _, (C, A), D>(&ScaledAccumKernel, &(scale, src), dst)
}

/// `dst[i] += f(sources[i]...)`
pub fn accumf_to<T, F, S, D>(dst: &mut D, f: F, sources: S) -> Result<()>
where
    T: Copy + AddAssign,
    S: Sources<T>,
    D: OperandMut<T>,
    F: MapFn<T, S::Args>,
{
    run_default::<T, _, S, D>(&AccumMapKernel(f), &sources, dst)
}

/// `dst[i] += scale[i] * f(src[i])`
pub fn accumf_scaled_to<T, C, F, A, D>(dst: &mut D, scale: C, f: F, src: A) -> Result<()>
where
    T: Copy + AddAssign + Mul<Output = T>,
    C: Operand<T>,
    A: Operand<T>,
    D: OperandMut<T>,
    F: MapFn<T, (T,)>,
{
    run_default::<T, _, (C, A), D>(&ScaledAccumMapKernel(f), &(scale, src), dst)
}

/// Copy `src` into `dst` under an explicit policy.
pub fn evaluate<T, Tag, A, D>(src: A, dst: &mut D, policy: MaccPolicy<Tag>) -> Result<()>
where
    T: Copy,
    Tag: AccessTag,
    A: Operand<T>,
    D: OperandMut<T>,
{
    let sources = (src,);
    let scheme = Scheme::with_policy::<T, (A,), D>(
        &sources,
        dst,
        policy.access,
        Tag::CATEGORY,
        &CostModel::default(),
    )?;
    scheme.evaluate(&CopyKernel, policy.tag, &sources, dst)
}

/// The scheme the destination-first forms would use for these operands.
pub fn get_default_macc_scheme<T, S, D>(sources: S, dst: &D) -> Result<Scheme>
where
    T: Copy,
    S: Sources<T>,
    D: OperandMut<T>,
{
    Scheme::get_default::<T, S, D>(&sources, dst)
}

/// [`get_default_macc_scheme`] for a given kernel category and cost model.
pub fn get_default_macc_scheme_with<T, S, D>(
    sources: S,
    dst: &D,
    kernel: KernelCategory,
    model: &CostModel,
) -> Result<Scheme>
where
    T: Copy,
    S: Sources<T>,
    D: OperandMut<T>,
{
    Scheme::get_default_with::<T, S, D>(&sources, dst, kernel, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Avx, Sse};
    use crate::matrix::{DenseMatrix, MatrixView, StepVector, StepVectorMut};
    use crate::operand::Single;

    #[test]
    fn test_copy_then_accum() {
        let src = DenseMatrix::<f64>::from_fn_linear(13, 9, |i| i as f64);
        let mut dst = DenseMatrix::<f64>::zeros(13, 9);
        ewise(CopyKernel, Scalar)
            .apply(src.shape(), (&src,), &mut dst)
            .unwrap();
        ewise(AccumKernel, Scalar)
            .apply(src.shape(), (&src,), &mut dst)
            .unwrap();
        for i in 0..117 {
            assert_eq!(dst[i], 2.0 * i as f64);
        }
    }

    #[test]
    fn test_shape_mismatch_leaves_destination() {
        let src = DenseMatrix::<f64>::filled(5, 4, 1.0);
        let mut dst = DenseMatrix::<f64>::filled(7, 4, -1.0);
        let err = ewise(CopyKernel, Sse::default())
            .apply((7, 4), (&src,), &mut dst)
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::ShapeMismatch {
                expected: (7, 4),
                found: (5, 4)
            }
        );
        assert!(dst.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_extent_disagrees_with_operands() {
        let src = DenseMatrix::<f64>::zeros(3, 3);
        let mut dst = DenseMatrix::<f64>::zeros(3, 3);
        assert!(matches!(
            ewise(CopyKernel, Scalar).apply((3, 4), (&src,), &mut dst),
            Err(EvalError::ShapeMismatch { .. })
        ));
        assert_eq!(
            ewise(CopyKernel, Scalar).apply(8usize, (&src,), &mut dst),
            Err(EvalError::LengthMismatch {
                expected: 8,
                found: 9
            })
        );
    }

    #[test]
    fn test_linear_extent_strided_row_into_contiguous() {
        let n = 11;
        let backing: Vec<f64> = (0..3 * n).map(|i| i as f64).collect();
        let src = StepVector::row(&backing, n, 3).unwrap();
        let mut dst = DenseMatrix::<f64>::zeros(1, n);
        ewise(CopyKernel, Avx::default())
            .apply(n, (&src,), &mut dst)
            .unwrap();
        for j in 0..n {
            assert_eq!(dst[j], (3 * j) as f64);
        }
    }

    #[test]
    fn test_linear_extent_column_into_row() {
        let col: Vec<f64> = (0..5).map(|i| i as f64 + 0.5).collect();
        let src = StepVector::column(&col, 5, 1).unwrap();
        let mut out = vec![0.0; 10];
        let mut dst = StepVectorMut::row(&mut out, 5, 2).unwrap();
        ewise(CopyKernel, Scalar)
            .apply(5usize, (&src,), &mut dst)
            .unwrap();
        assert_eq!(out, vec![0.5, 0.0, 1.5, 0.0, 2.5, 0.0, 3.5, 0.0, 4.5, 0.0]);
    }

    #[test]
    fn test_linear_extent_requires_capability() {
        let buf = vec![1.0; 6];
        let view = MatrixView::block(&buf, 2, 3, 2).unwrap();
        let mut dst = DenseMatrix::<f64>::zeros(2, 3);
        assert_eq!(
            ewise(CopyKernel, Scalar).apply(6usize, (&view,), &mut dst),
            Err(EvalError::LinearAccessUnsupported)
        );
    }

    #[test]
    fn test_map_with_tag() {
        let a = DenseMatrix::<f64>::from_fn_linear(6, 5, |i| i as f64);
        let b = DenseMatrix::<f64>::filled(6, 5, 2.0);
        let mut dst = DenseMatrix::<f64>::zeros(6, 5);
        map(|x: f64, y: f64| x + y, Sse::default())
            .apply(a.shape(), &mut dst, (&a, &b))
            .unwrap();
        assert_eq!(dst[29], 31.0);

        map(|x: f64| x * x, Scalar)
            .apply(a.shape(), &mut dst, (&a,))
            .unwrap();
        assert_eq!(dst[7], 49.0);
    }

    #[test]
    fn test_destination_first_forms() {
        let a = DenseMatrix::<f64>::from_fn_linear(4, 4, |i| i as f64);
        let w = DenseMatrix::<f64>::filled(4, 4, 3.0);
        let mut dst = DenseMatrix::<f64>::zeros(4, 4);

        map_to(&mut dst, |x: f64| x + 1.0, (&a,)).unwrap();
        assert_eq!(dst[5], 6.0);

        accum_to(&mut dst, &a).unwrap();
        assert_eq!(dst[5], 11.0);

        accum_scaled_to(&mut dst, Single(2.0), &a).unwrap();
        assert_eq!(dst[5], 21.0);

        accum_scaled_to(&mut dst, &w, &a).unwrap();
        assert_eq!(dst[5], 36.0);

        accumf_to(&mut dst, |x: f64, y: f64| x - y, (&w, &a)).unwrap();
        assert_eq!(dst[5], 34.0);

        accumf_scaled_to(&mut dst, Single(0.5), |x: f64| x * x, &a).unwrap();
        assert_eq!(dst[5], 46.5);
    }

    #[test]
    fn test_evaluate_policies() {
        let a = DenseMatrix::<f64>::from_fn_linear(10, 3, |i| i as f64);
        for policy in [
            MaccPolicy::<Scalar>::linear(),
            MaccPolicy::per_column(),
            MaccPolicy::custom(),
        ] {
            let mut dst = DenseMatrix::<f64>::zeros(10, 3);
            evaluate(&a, &mut dst, policy).unwrap();
            assert_eq!(dst, a);
        }

        let mut dst = DenseMatrix::<f64>::zeros(10, 3);
        evaluate(&a, &mut dst, MaccPolicy::<Avx>::linear()).unwrap();
        assert_eq!(dst, a);
    }

    #[test]
    fn test_get_default_macc_scheme() {
        let a = DenseMatrix::<f64>::zeros(2, 50);
        let dst = DenseMatrix::<f64>::zeros(2, 50);
        let scheme = get_default_macc_scheme((&a,), &dst).unwrap();
        assert!(scheme.use_linear());

        let scheme = get_default_macc_scheme_with(
            (&a,),
            &dst,
            KernelCategory::Simd { width: 4 },
            &CostModel::default(),
        )
        .unwrap();
        assert!(scheme.use_simd());
        assert_eq!(scheme.kernel().width(), 4);
    }

    #[test]
    fn test_with_cost_model_keeps_results() {
        let a = DenseMatrix::<f64>::from_fn_linear(3, 40, |i| (i as f64).sin());
        let mut lin = DenseMatrix::<f64>::zeros(3, 40);
        let mut col = DenseMatrix::<f64>::zeros(3, 40);
        let favour_percol = CostModel {
            cache_cost: 0,
            short_percol_cost: -1_000_000,
            ..CostModel::default()
        };
        ewise(CopyKernel, Scalar)
            .apply(a.shape(), (&a,), &mut lin)
            .unwrap();
        ewise(CopyKernel, Scalar)
            .with_cost_model(favour_percol)
            .apply(a.shape(), (&a,), &mut col)
            .unwrap();
        assert_eq!(lin, col);
    }
}
