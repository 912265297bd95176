//! Shape facts for matrix operands.
//!
//! A dimension is either fixed by the operand's type (a non-zero const parameter)
//! or known only at run time. Fixed dimensions of different operand types are
//! reconciled during const evaluation; run-time dimensions are reconciled by
//! [`ShapeFold`] before any kernel runs.

use crate::{EvalError, Result};

/// Const-parameter value meaning "determined at run time".
pub const DYNAMIC: usize = 0;

/// One matrix dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Fixed by the operand type.
    Fixed(usize),
    /// Known only at run time.
    Dynamic(usize),
}

impl Dim {
    /// Build a dimension from a const parameter and the run-time value.
    ///
    /// A non-zero const parameter takes precedence over the run-time value.
    /// Callers that accept run-time dimensions check agreement first.
    #[inline]
    pub fn from_const(fixed: usize, runtime: usize) -> Self {
        if fixed == DYNAMIC {
            Dim::Dynamic(runtime)
        } else {
            Dim::Fixed(fixed)
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        match self {
            Dim::Fixed(n) | Dim::Dynamic(n) => n,
        }
    }

    #[inline]
    pub fn is_fixed(self) -> bool {
        matches!(self, Dim::Fixed(_))
    }
}

/// Rows and columns of a matrix operand or index space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatrixShape {
    rows: Dim,
    cols: Dim,
}

impl MatrixShape {
    /// A shape whose dimensions are both run-time values.
    #[inline]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows: Dim::Dynamic(rows),
            cols: Dim::Dynamic(cols),
        }
    }

    /// A shape whose dimensions are both fixed.
    #[inline]
    pub fn fixed(rows: usize, cols: usize) -> Self {
        Self {
            rows: Dim::Fixed(rows),
            cols: Dim::Fixed(cols),
        }
    }

    /// Combine const parameters (`0` = run time) with run-time dimensions.
    #[inline]
    pub fn with_consts(fixed_rows: usize, fixed_cols: usize, rows: usize, cols: usize) -> Self {
        Self {
            rows: Dim::from_const(fixed_rows, rows),
            cols: Dim::from_const(fixed_cols, cols),
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows.get()
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols.get()
    }

    #[inline]
    pub fn rows_dim(&self) -> Dim {
        self.rows
    }

    #[inline]
    pub fn cols_dim(&self) -> Dim {
        self.cols
    }

    #[inline]
    pub fn nelems(&self) -> usize {
        self.nrows() * self.ncols()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nrows() == 0 || self.ncols() == 0
    }

    /// True when both dimensions are fixed by the operand types.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.rows.is_fixed() && self.cols.is_fixed()
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }
}

/// Resolve the common fixed dimension of two operand types.
///
/// Used from associated consts, so a conflict fails the build instead of a call:
///
/// ```compile_fail
/// use dense_ewise::{map_to, DenseMatrix};
///
/// let a = DenseMatrix::<f64, 3, 2>::zeros(3, 2);
/// let mut out = DenseMatrix::<f64, 4, 2>::zeros(4, 2);
/// map_to(&mut out, |x: f64| x, (&a,)).unwrap();
/// ```
///
/// Two sources with conflicting fixed rows fail the same way:
///
/// ```compile_fail
/// use dense_ewise::{get_default_macc_scheme, DenseMatrix};
///
/// let a = DenseMatrix::<f64, 3, 2>::zeros(3, 2);
/// let b = DenseMatrix::<f64, 4, 2>::zeros(4, 2);
/// let out = DenseMatrix::<f64>::zeros(3, 2);
/// get_default_macc_scheme((&a, &b), &out).unwrap();
/// ```
///
/// Agreeing fixed dimensions build and run:
///
/// ```
/// use dense_ewise::{map_to, DenseMatrix};
///
/// let a = DenseMatrix::<f64, 3, 2>::filled(3, 2, 1.5);
/// let mut out = DenseMatrix::<f64, 3, 2>::zeros(3, 2);
/// map_to(&mut out, |x: f64| x, (&a,)).unwrap();
/// assert_eq!(out[5], 1.5);
/// ```
pub const fn common_fixed(a: usize, b: usize) -> usize {
    if a == DYNAMIC {
        b
    } else if b == DYNAMIC || a == b {
        a
    } else {
        panic!("operands have conflicting compile-time dimensions")
    }
}

/// Check run-time dimensions against const parameters (`0` = run time).
///
/// A disagreement is a [`EvalError::ShapeMismatch`] whose `expected` side
/// carries the fixed dimensions.
pub(crate) fn check_fixed(
    fixed_rows: usize,
    fixed_cols: usize,
    rows: usize,
    cols: usize,
) -> Result<()> {
    let agrees = |fixed: usize, given: usize| fixed == DYNAMIC || fixed == given;
    if agrees(fixed_rows, rows) && agrees(fixed_cols, cols) {
        return Ok(());
    }
    let pick = |fixed: usize, given: usize| if fixed == DYNAMIC { given } else { fixed };
    Err(EvalError::ShapeMismatch {
        expected: (pick(fixed_rows, rows), pick(fixed_cols, cols)),
        found: (rows, cols),
    })
}

/// Running fold of the common (rows, columns) of a set of operands.
///
/// The first pushed shape is the reference; every later one must match it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShapeFold {
    dims: Option<(usize, usize)>,
}

impl ShapeFold {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(self, rows: usize, cols: usize) -> Result<Self> {
        match self.dims {
            None => Ok(Self {
                dims: Some((rows, cols)),
            }),
            Some(expected) if expected == (rows, cols) => Ok(self),
            Some(expected) => Err(EvalError::ShapeMismatch {
                expected,
                found: (rows, cols),
            }),
        }
    }

    /// The common dimensions, or `None` if nothing shaped was pushed.
    #[inline]
    pub fn finish(self) -> Option<(usize, usize)> {
        self.dims
    }
}
