//! Traversal-scheme selection and element-wise kernels for dense matrix expressions.
//!
//! Given a set of source operands (matrices, strided views, broadcast scalars) and a
//! destination matrix, this crate decides how to walk the index space and which kernel
//! to run over it, then writes the result into the destination.
//!
//! # Core Types
//!
//! - [`Operand`] / [`OperandMut`]: shape, capability and element-run access for sources
//!   and destinations
//! - [`Sources`]: tuples of one to four operands feeding an n-ary kernel
//! - [`Scheme`]: a resolved (shape, traversal, kernel category) binding for one call
//! - [`CostModel`]: tunable policy used to compare Linear and PerColumn traversal
//! - [`DenseMatrix`], [`MatrixView`], [`StepVector`]: storage collaborators
//!
//! # Primary API
//!
//! - [`ewise`]: run a kernel under an explicit access tag ([`Scalar`] or [`Simd`])
//! - [`map`]: apply an n-ary functor under an explicit access tag
//! - [`map_to`], [`accum_to`], [`accum_scaled_to`], [`accumf_to`], [`accumf_scaled_to`]:
//!   destination-first forms using the default scheme
//! - [`evaluate`]: copy under an explicit [`MaccPolicy`]
//! - [`get_default_macc_scheme`]: inspect the selector's decision
//!
//! # Example
//!
//! ```rust
//! use dense_ewise::{ewise, AccumKernel, CopyKernel, DenseMatrix, Scalar};
//!
//! let src = DenseMatrix::<f64>::from_fn_linear(13, 9, |i| i as f64);
//! let mut dst = DenseMatrix::<f64>::zeros(13, 9);
//!
//! ewise(CopyKernel, Scalar).apply(src.shape(), (&src,), &mut dst).unwrap();
//! ewise(AccumKernel, Scalar).apply(src.shape(), (&src,), &mut dst).unwrap();
//!
//! assert_eq!(dst[100], 200.0);
//! ```
//!
//! # Functors
//!
//! Map kernels accept closures of matching arity. The arity is resolved from the source
//! tuple, so closure arguments need explicit types:
//!
//! ```rust
//! use dense_ewise::{map_to, DenseMatrix};
//!
//! let a = DenseMatrix::<f64>::from_fn_linear(4, 3, |i| i as f64);
//! let b = DenseMatrix::<f64>::filled(4, 3, 0.5);
//! let mut out = DenseMatrix::<f64>::zeros(4, 3);
//!
//! map_to(&mut out, |x: f64, y: f64| x * y, (&a, &b)).unwrap();
//! assert_eq!(out[6], 3.0);
//! ```

mod cost;
mod ewise;
mod kernel;
pub mod matrix;
mod operand;
mod scheme;
mod shape;
mod simd;
mod sources;

// ============================================================================
// Shape and capability facts
// ============================================================================
pub use operand::{Operand, OperandMut, Run, RunMut, Single, single};
pub use shape::{common_fixed, Dim, MatrixShape, ShapeFold, DYNAMIC};
pub use sources::{RunGroup, Sources};

// ============================================================================
// Cost model and scheme selection
// ============================================================================
pub use cost::{CostModel, ExprProfile, KernelCategory, TraversalCategory};
pub use scheme::{choose_by_cost, AccessPolicy, MaccPolicy, Scheme};

// ============================================================================
// Kernels
// ============================================================================
pub use kernel::{
    AccessTag, AccumKernel, AccumMapKernel, Avx, CopyKernel, EwiseKernel, MapFn, MapKernel,
    Scalar, ScaledAccumKernel, ScaledAccumMapKernel, Simd, Sse,
};

// ============================================================================
// Evaluation entry points
// ============================================================================
pub use ewise::{
    accum_scaled_to, accum_to, accumf_scaled_to, accumf_to, evaluate, ewise,
    get_default_macc_scheme, get_default_macc_scheme_with, map, map_to, Ewise, Extent, Map,
};

// ============================================================================
// Storage
// ============================================================================
pub use matrix::{DenseMatrix, MatrixView, MatrixViewMut, StepVector, StepVectorMut};

// ============================================================================
// Policy constants
// ============================================================================

/// Cost charged when a traversal cannot stream its operands through cache in order.
///
/// Added to Linear when some source's flat run is not unit-stride, and to PerColumn
/// when columns are too short to amortize per-column setup.
pub const MACC_CACHE_COST: i64 = 1200;

/// Fixed cost added to PerColumn traversal for small problems.
pub const MACC_SHORT_PERCOL_COST: i64 = 100;

/// Row count below which a column is considered too short for PerColumn traversal.
pub const MACC_SHORTCOL_UBOUND: usize = 4;

/// Row count at or below which [`MACC_SHORT_PERCOL_COST`] applies.
pub const MACC_SHORT_PERCOL_ROWS: usize = 100;

/// Per-column loop setup cost.
pub const MACC_COLUMN_SETUP_COST: i64 = 2;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while composing or evaluating an element-wise operation.
///
/// Every check runs before the first kernel invocation, so an error leaves the
/// destination untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Two operands disagree on their (rows, columns).
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// An operand's element count disagrees with an explicit linear extent.
    #[error("length mismatch: expected {expected} elements, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// Linear traversal was requested for an operand without linear indexing.
    #[error("linear traversal requested for an operand without linear indexing")]
    LinearAccessUnsupported,

    /// An operand declared linear indexing but could not produce a flat run.
    #[error("operand declares linear indexing but has no flat layout")]
    LinearContractViolated,

    /// A scheme was evaluated with a different kernel category than it was built for.
    #[error("scheme was built for {scheme:?} kernels, evaluated with {requested:?}")]
    KernelMismatch {
        scheme: KernelCategory,
        requested: KernelCategory,
    },

    /// Zero stride is not allowed for a dimension longer than one.
    #[error("invalid stride 0 for dim {dim}")]
    ZeroStride { dim: usize },

    /// A view reaches past the end of its buffer.
    #[error("view needs {needed} elements, buffer has {len}")]
    OutOfBounds { needed: usize, len: usize },

    /// Integer overflow while computing a view extent.
    #[error("offset overflow while computing view extent")]
    OffsetOverflow,

    /// A buffer's length does not match the requested shape.
    #[error("buffer holds {found} elements, shape needs {expected}")]
    DataLength { expected: usize, found: usize },
}

/// Result type for element-wise evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;
