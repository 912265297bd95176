//! Traversal scheme selection.
//!
//! A [`Scheme`] binds the common shape of a source set and destination to a
//! traversal category and a kernel category. It is built at the start of one
//! evaluation call and dropped when the call returns.

use std::marker::PhantomData;

use log::debug;

use crate::cost::{CostModel, ExprProfile, KernelCategory, TraversalCategory};
use crate::kernel::{drive, AccessTag, EwiseKernel, Scalar};
use crate::operand::OperandMut;
use crate::shape::{check_fixed, common_fixed, MatrixShape, ShapeFold};
use crate::sources::Sources;
use crate::{EvalError, Result};

/// Which traversals a destination admits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessPolicy {
    /// Always walk the flat index.
    Linear,
    /// Always walk column by column.
    PerColumn,
    /// Decide per call from shape facts and the cost model.
    Custom,
}

/// An explicit (access, kernel) policy for [`crate::evaluate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaccPolicy<Tag: AccessTag = Scalar> {
    pub access: AccessPolicy,
    pub tag: Tag,
}

impl<Tag: AccessTag> MaccPolicy<Tag> {
    pub fn new(access: AccessPolicy, tag: Tag) -> Self {
        Self { access, tag }
    }

    pub fn linear() -> Self {
        Self::new(AccessPolicy::Linear, Tag::default())
    }

    pub fn per_column() -> Self {
        Self::new(AccessPolicy::PerColumn, Tag::default())
    }

    pub fn custom() -> Self {
        Self::new(AccessPolicy::Custom, Tag::default())
    }

    pub fn kernel(&self) -> KernelCategory {
        Tag::CATEGORY
    }
}

/// Compile-time dimensions shared by a source set and a destination.
///
/// Referencing these consts for conflicting operand types fails the build.
struct FixedDims<T, S, D>(PhantomData<(fn() -> T, S, D)>);

impl<T: Copy, S: Sources<T>, D: OperandMut<T>> FixedDims<T, S, D> {
    const ROWS: usize = common_fixed(S::ROWS, D::ROWS);
    const COLS: usize = common_fixed(S::COLS, D::COLS);
}

/// Common shape of `sources` and `dst`.
///
/// The destination is the reference: a disagreeing source is reported as
/// `found` against the destination's `expected` dimensions.
pub(crate) fn common_operand_shape<T, S, D>(sources: &S, dst: &D) -> Result<MatrixShape>
where
    T: Copy,
    S: Sources<T>,
    D: OperandMut<T>,
{
    let (rows, cols) = (dst.nrows(), dst.ncols());
    sources.fold_shape(ShapeFold::new().push(rows, cols)?)?;
    let fixed_rows = FixedDims::<T, S, D>::ROWS;
    let fixed_cols = FixedDims::<T, S, D>::COLS;
    check_fixed(fixed_rows, fixed_cols, rows, cols)?;
    Ok(MatrixShape::with_consts(fixed_rows, fixed_cols, rows, cols))
}

/// Pick the cheaper traversal. Ties go to Linear.
#[inline]
pub fn choose_by_cost(linear: i64, per_column: i64) -> TraversalCategory {
    if linear <= per_column {
        TraversalCategory::Linear
    } else {
        TraversalCategory::PerColumn
    }
}

/// A resolved traversal for one evaluation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scheme {
    shape: MatrixShape,
    traversal: TraversalCategory,
    kernel: KernelCategory,
}

impl Scheme {
    pub fn new(shape: MatrixShape, traversal: TraversalCategory, kernel: KernelCategory) -> Self {
        Self {
            shape,
            traversal,
            kernel,
        }
    }

    /// Default scheme for scalar kernels under the default cost model.
    pub fn get_default<T, S, D>(sources: &S, dst: &D) -> Result<Self>
    where
        T: Copy,
        S: Sources<T>,
        D: OperandMut<T>,
    {
        let model = CostModel::default();
        Self::get_default_with::<T, S, D>(sources, dst, KernelCategory::Scalar, &model)
    }

    /// Default scheme, following the destination's [`OperandMut::ACCESS`].
    pub fn get_default_with<T, S, D>(
        sources: &S,
        dst: &D,
        kernel: KernelCategory,
        model: &CostModel,
    ) -> Result<Self>
    where
        T: Copy,
        S: Sources<T>,
        D: OperandMut<T>,
    {
        Self::with_policy::<T, S, D>(sources, dst, D::ACCESS, kernel, model)
    }

    /// Scheme under an explicit access policy.
    ///
    /// An explicit [`AccessPolicy::Linear`] with an operand that cannot be
    /// walked linearly is an error rather than a silent fallback.
    pub fn with_policy<T, S, D>(
        sources: &S,
        dst: &D,
        access: AccessPolicy,
        kernel: KernelCategory,
        model: &CostModel,
    ) -> Result<Self>
    where
        T: Copy,
        S: Sources<T>,
        D: OperandMut<T>,
    {
        let shape = common_operand_shape::<T, S, D>(sources, dst)?;
        let linear_capable = S::LINEAR_INDEX && D::LINEAR_INDEX;

        let traversal = match access {
            AccessPolicy::Linear if !linear_capable => {
                return Err(EvalError::LinearAccessUnsupported)
            }
            _ if !linear_capable => TraversalCategory::PerColumn,
            AccessPolicy::PerColumn => TraversalCategory::PerColumn,
            AccessPolicy::Linear => TraversalCategory::Linear,
            AccessPolicy::Custom if shape.is_fixed() => TraversalCategory::Linear,
            AccessPolicy::Custom => {
                let expr = ExprProfile::of::<T, S>(sources);
                let linear = model.cost(&expr, &shape, TraversalCategory::Linear, kernel);
                let per_column = model.cost(&expr, &shape, TraversalCategory::PerColumn, kernel);
                let chosen = choose_by_cost(linear, per_column);
                debug!(
                    "scheme {}x{}: linear cost {}, per-column cost {} -> {:?}",
                    shape.nrows(),
                    shape.ncols(),
                    linear,
                    per_column,
                    chosen
                );
                chosen
            }
        };

        Ok(Self::new(shape, traversal, kernel))
    }

    #[inline]
    pub fn shape(&self) -> &MatrixShape {
        &self.shape
    }

    #[inline]
    pub fn traversal(&self) -> TraversalCategory {
        self.traversal
    }

    #[inline]
    pub fn kernel(&self) -> KernelCategory {
        self.kernel
    }

    #[inline]
    pub fn use_linear(&self) -> bool {
        self.traversal == TraversalCategory::Linear
    }

    #[inline]
    pub fn use_simd(&self) -> bool {
        matches!(self.kernel, KernelCategory::Simd { .. })
    }

    /// Run `kernel` under this scheme.
    ///
    /// The operands are re-checked against the scheme's shape and capabilities,
    /// and `Tag` must match the kernel category the scheme was built for.
    pub fn evaluate<T, K, Tag, S, D>(
        &self,
        kernel: &K,
        _tag: Tag,
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
        if Tag::CATEGORY != self.kernel {
            return Err(EvalError::KernelMismatch {
                scheme: self.kernel,
                requested: Tag::CATEGORY,
            });
        }
        let found = common_operand_shape::<T, S, D>(sources, dst)?;
        if found.dims() != self.shape.dims() {
            return Err(EvalError::ShapeMismatch {
                expected: self.shape.dims(),
                found: found.dims(),
            });
        }
        if self.use_linear() && !(S::LINEAR_INDEX && D::LINEAR_INDEX) {
            return Err(EvalError::LinearAccessUnsupported);
        }
        drive::<T, Tag, K, S, D>(kernel, self.traversal, &self.shape, sources, dst)
    }
}
