//! Storage collaborators.
//!
//! - [`DenseMatrix`]: owned column-major contiguous storage, optionally with
//!   compile-time dimensions
//! - [`MatrixView`] / [`MatrixViewMut`]: borrowed 2-D views with row and column
//!   strides (sub-blocks and grids of a larger buffer)
//! - [`StepVector`] / [`StepVectorMut`]: borrowed row or column vectors whose
//!   elements are `step` apart

use std::ops::{Index, IndexMut};

use num_traits::Zero;

use crate::operand::{Operand, OperandMut, Run, RunMut};
use crate::scheme::AccessPolicy;
use crate::shape::{check_fixed, MatrixShape};
use crate::{EvalError, Result};

// ============================================================================
// Validation helpers
// ============================================================================

/// Run-time dimensions of a `DenseMatrix<_, M, N>`, checked against `M` and `N`.
#[inline]
fn checked_dims<const M: usize, const N: usize>(
    rows: usize,
    cols: usize,
) -> Result<(usize, usize)> {
    check_fixed(M, N, rows, cols).map(|()| (rows, cols))
}

/// Panicking form of [`checked_dims`] for the infallible constructors.
#[inline]
fn fixed_dims<const M: usize, const N: usize>(rows: usize, cols: usize) -> (usize, usize) {
    match checked_dims::<M, N>(rows, cols) {
        Ok(dims) => dims,
        Err(err) => panic!("{err}"),
    }
}

/// Validate that every element of a `rows x cols` view stays within `[0, len)`.
fn validate_bounds(
    len: usize,
    rows: usize,
    cols: usize,
    row_stride: usize,
    col_stride: usize,
    offset: usize,
) -> Result<()> {
    if rows > 1 && row_stride == 0 {
        return Err(EvalError::ZeroStride { dim: 0 });
    }
    if cols > 1 && col_stride == 0 {
        return Err(EvalError::ZeroStride { dim: 1 });
    }
    // Empty view - no access needed
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let row_end = row_stride
        .checked_mul(rows - 1)
        .ok_or(EvalError::OffsetOverflow)?;
    let col_end = col_stride
        .checked_mul(cols - 1)
        .ok_or(EvalError::OffsetOverflow)?;
    let last = offset
        .checked_add(row_end)
        .and_then(|v| v.checked_add(col_end))
        .ok_or(EvalError::OffsetOverflow)?;
    if last >= len {
        return Err(EvalError::OutOfBounds {
            needed: last + 1,
            len,
        });
    }
    Ok(())
}

// ============================================================================
// DenseMatrix
// ============================================================================

/// Owned column-major matrix.
///
/// `M` and `N` fix the row and column counts at compile time; `0` leaves them
/// to run time. When a dimension is fixed, the run-time argument of the
/// constructors must agree with it: [`DenseMatrix::from_vec`] returns
/// [`EvalError::ShapeMismatch`], the other constructors panic.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix<T, const M: usize = 0, const N: usize = 0> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T, const M: usize, const N: usize> DenseMatrix<T, M, N> {
    /// Build a matrix from a column-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        let (rows, cols) = checked_dims::<M, N>(rows, cols)?;
        if data.len() != rows * cols {
            return Err(EvalError::DataLength {
                expected: rows * cols,
                found: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// # Panics
    ///
    /// If `rows` or `cols` disagrees with a fixed `M` or `N`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let (rows, cols) = fixed_dims::<M, N>(rows, cols);
        let mut data = Vec::with_capacity(rows * cols);
        for j in 0..cols {
            for i in 0..rows {
                data.push(f(i, j));
            }
        }
        Self { data, rows, cols }
    }

    /// Build a matrix from a function of the column-major linear index.
    ///
    /// Panics like [`DenseMatrix::from_fn`].
    pub fn from_fn_linear(rows: usize, cols: usize, f: impl FnMut(usize) -> T) -> Self {
        let (rows, cols) = fixed_dims::<M, N>(rows, cols);
        Self {
            data: (0..rows * cols).map(f).collect(),
            rows,
            cols,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> MatrixShape {
        MatrixShape::with_consts(M, N, self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Borrow as a strided view (row stride 1, column stride `nrows`).
    pub fn view(&self) -> MatrixView<'_, T> {
        MatrixView {
            data: &self.data,
            rows: self.rows,
            cols: self.cols,
            row_stride: 1,
            col_stride: self.rows,
            offset: 0,
        }
    }

    pub fn view_mut(&mut self) -> MatrixViewMut<'_, T> {
        MatrixViewMut {
            rows: self.rows,
            cols: self.cols,
            row_stride: 1,
            col_stride: self.rows,
            offset: 0,
            data: &mut self.data,
        }
    }
}

impl<T: Clone, const M: usize, const N: usize> DenseMatrix<T, M, N> {
    /// Panics like [`DenseMatrix::from_fn`].
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        let (rows, cols) = fixed_dims::<M, N>(rows, cols);
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T: Clone + Zero, const M: usize, const N: usize> DenseMatrix<T, M, N> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, T::zero())
    }
}

impl<T, const M: usize, const N: usize> Index<usize> for DenseMatrix<T, M, N> {
    type Output = T;

    #[inline]
    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T, const M: usize, const N: usize> IndexMut<usize> for DenseMatrix<T, M, N> {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

impl<T, const M: usize, const N: usize> Index<(usize, usize)> for DenseMatrix<T, M, N> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(i < self.rows, "row {i} out of range for {} rows", self.rows);
        &self.data[j * self.rows + i]
    }
}

impl<T, const M: usize, const N: usize> IndexMut<(usize, usize)> for DenseMatrix<T, M, N> {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(i < self.rows, "row {i} out of range for {} rows", self.rows);
        &mut self.data[j * self.rows + i]
    }
}

impl<T: Copy, const M: usize, const N: usize> Operand<T> for DenseMatrix<T, M, N> {
    const ROWS: usize = M;
    const COLS: usize = N;
    const LINEAR_INDEX: bool = true;

    #[inline]
    fn nrows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        Some(Run::contiguous(&self.data))
    }

    #[inline]
    fn column_run(&self, j: usize) -> Run<'_, T> {
        let start = j * self.rows;
        Run::contiguous(&self.data[start..start + self.rows])
    }
}

impl<T: Copy, const M: usize, const N: usize> OperandMut<T> for DenseMatrix<T, M, N> {
    #[inline]
    fn linear_run_mut(&mut self) -> Option<RunMut<'_, T>> {
        Some(RunMut::contiguous(&mut self.data))
    }

    #[inline]
    fn column_run_mut(&mut self, j: usize) -> RunMut<'_, T> {
        let start = j * self.rows;
        RunMut::contiguous(&mut self.data[start..start + self.rows])
    }
}

// ============================================================================
// Strided matrix views
// ============================================================================

/// Immutable 2-D view with independent row and column strides.
///
/// Element `(i, j)` lives at `offset + i * row_stride + j * col_stride`. Views
/// do not support linear indexing; they are always traversed column by column.
#[derive(Clone, Copy, Debug)]
pub struct MatrixView<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    row_stride: usize,
    col_stride: usize,
    offset: usize,
}

impl<'a, T> MatrixView<'a, T> {
    pub fn new(
        data: &'a [T],
        rows: usize,
        cols: usize,
        row_stride: usize,
        col_stride: usize,
        offset: usize,
    ) -> Result<Self> {
        validate_bounds(data.len(), rows, cols, row_stride, col_stride, offset)?;
        Ok(Self {
            data,
            rows,
            cols,
            row_stride,
            col_stride,
            offset,
        })
    }

    /// A column-major block with leading dimension `ld`.
    pub fn block(data: &'a [T], rows: usize, cols: usize, ld: usize) -> Result<Self> {
        Self::new(data, rows, cols, 1, ld, 0)
    }
}

impl<T: Copy> Operand<T> for MatrixView<'_, T> {
    const LINEAR_INDEX: bool = false;

    #[inline]
    fn nrows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        None
    }

    #[inline]
    fn column_run(&self, j: usize) -> Run<'_, T> {
        let start = self.offset + j * self.col_stride;
        Run::strided(&self.data[start..], self.row_stride)
    }
}

/// Mutable counterpart of [`MatrixView`].
#[derive(Debug)]
pub struct MatrixViewMut<'a, T> {
    data: &'a mut [T],
    rows: usize,
    cols: usize,
    row_stride: usize,
    col_stride: usize,
    offset: usize,
}

impl<'a, T> MatrixViewMut<'a, T> {
    pub fn new(
        data: &'a mut [T],
        rows: usize,
        cols: usize,
        row_stride: usize,
        col_stride: usize,
        offset: usize,
    ) -> Result<Self> {
        validate_bounds(data.len(), rows, cols, row_stride, col_stride, offset)?;
        Ok(Self {
            data,
            rows,
            cols,
            row_stride,
            col_stride,
            offset,
        })
    }

    pub fn block(data: &'a mut [T], rows: usize, cols: usize, ld: usize) -> Result<Self> {
        Self::new(data, rows, cols, 1, ld, 0)
    }
}

impl<T: Copy> Operand<T> for MatrixViewMut<'_, T> {
    const LINEAR_INDEX: bool = false;

    #[inline]
    fn nrows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        None
    }

    #[inline]
    fn column_run(&self, j: usize) -> Run<'_, T> {
        let start = self.offset + j * self.col_stride;
        Run::strided(&self.data[start..], self.row_stride)
    }
}

impl<T: Copy> OperandMut<T> for MatrixViewMut<'_, T> {
    #[inline]
    fn linear_run_mut(&mut self) -> Option<RunMut<'_, T>> {
        None
    }

    #[inline]
    fn column_run_mut(&mut self, j: usize) -> RunMut<'_, T> {
        let start = self.offset + j * self.col_stride;
        // A single-row view may carry a zero row stride.
        RunMut::strided(&mut self.data[start..], self.row_stride.max(1))
    }
}

// ============================================================================
// Stepped vectors
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Orientation {
    Row,
    Column,
}

fn validate_vector(len_data: usize, len: usize, step: usize) -> Result<()> {
    if len > 1 && step == 0 {
        return Err(EvalError::ZeroStride { dim: 0 });
    }
    if len == 0 {
        return Ok(());
    }
    let last = step.checked_mul(len - 1).ok_or(EvalError::OffsetOverflow)?;
    if last >= len_data {
        return Err(EvalError::OutOfBounds {
            needed: last + 1,
            len: len_data,
        });
    }
    Ok(())
}

/// Immutable row (1 x len) or column (len x 1) vector with element step.
///
/// A vector is one-dimensional, so it always supports linear indexing.
#[derive(Clone, Copy, Debug)]
pub struct StepVector<'a, T> {
    data: &'a [T],
    len: usize,
    step: usize,
    orientation: Orientation,
}

impl<'a, T> StepVector<'a, T> {
    pub fn row(data: &'a [T], len: usize, step: usize) -> Result<Self> {
        validate_vector(data.len(), len, step)?;
        Ok(Self {
            data,
            len,
            step,
            orientation: Orientation::Row,
        })
    }

    pub fn column(data: &'a [T], len: usize, step: usize) -> Result<Self> {
        validate_vector(data.len(), len, step)?;
        Ok(Self {
            data,
            len,
            step,
            orientation: Orientation::Column,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn vector_dims(len: usize, orientation: Orientation) -> (usize, usize) {
    match orientation {
        Orientation::Row => (1, len),
        Orientation::Column => (len, 1),
    }
}

impl<T: Copy> Operand<T> for StepVector<'_, T> {
    const LINEAR_INDEX: bool = true;

    #[inline]
    fn nrows(&self) -> usize {
        vector_dims(self.len, self.orientation).0
    }

    #[inline]
    fn ncols(&self) -> usize {
        vector_dims(self.len, self.orientation).1
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        Some(Run::strided(self.data, self.step.max(1)))
    }

    #[inline]
    fn column_run(&self, j: usize) -> Run<'_, T> {
        match self.orientation {
            Orientation::Column => Run::strided(self.data, self.step.max(1)),
            Orientation::Row => {
                let at = j * self.step;
                Run::contiguous(&self.data[at..at + 1])
            }
        }
    }
}

/// Mutable counterpart of [`StepVector`]. Always traversed linearly.
#[derive(Debug)]
pub struct StepVectorMut<'a, T> {
    data: &'a mut [T],
    len: usize,
    step: usize,
    orientation: Orientation,
}

impl<'a, T> StepVectorMut<'a, T> {
    pub fn row(data: &'a mut [T], len: usize, step: usize) -> Result<Self> {
        validate_vector(data.len(), len, step)?;
        Ok(Self {
            data,
            len,
            step,
            orientation: Orientation::Row,
        })
    }

    pub fn column(data: &'a mut [T], len: usize, step: usize) -> Result<Self> {
        validate_vector(data.len(), len, step)?;
        Ok(Self {
            data,
            len,
            step,
            orientation: Orientation::Column,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: Copy> Operand<T> for StepVectorMut<'_, T> {
    const LINEAR_INDEX: bool = true;

    #[inline]
    fn nrows(&self) -> usize {
        vector_dims(self.len, self.orientation).0
    }

    #[inline]
    fn ncols(&self) -> usize {
        vector_dims(self.len, self.orientation).1
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        Some(Run::strided(&*self.data, self.step.max(1)))
    }

    #[inline]
    fn column_run(&self, j: usize) -> Run<'_, T> {
        match self.orientation {
            Orientation::Column => Run::strided(&*self.data, self.step.max(1)),
            Orientation::Row => {
                let at = j * self.step;
                Run::contiguous(&self.data[at..at + 1])
            }
        }
    }
}

impl<T: Copy> OperandMut<T> for StepVectorMut<'_, T> {
    const ACCESS: AccessPolicy = AccessPolicy::Linear;

    #[inline]
    fn linear_run_mut(&mut self) -> Option<RunMut<'_, T>> {
        Some(RunMut::strided(&mut *self.data, self.step.max(1)))
    }

    #[inline]
    fn column_run_mut(&mut self, j: usize) -> RunMut<'_, T> {
        match self.orientation {
            Orientation::Column => RunMut::strided(&mut *self.data, self.step.max(1)),
            Orientation::Row => {
                let at = j * self.step;
                RunMut::contiguous(&mut self.data[at..at + 1])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_column_major() {
        let m = DenseMatrix::<i32>::from_fn(3, 2, |i, j| (10 * i + j) as i32);
        assert_eq!(m.as_slice(), &[0, 10, 20, 1, 11, 21]);
        assert_eq!(m[(2, 1)], 21);
        assert_eq!(m[4], 11);
        assert_eq!(m.get(1, 1), 11);
        assert_eq!(m.column_run(1).get(2), 21);
    }

    #[test]
    fn test_dense_fixed_shape() {
        let m = DenseMatrix::<f64, 2, 3>::zeros(2, 3);
        let s = Operand::<f64>::shape(&m);
        assert!(s.is_fixed());
        assert_eq!(s.dims(), (2, 3));
        assert!(!DenseMatrix::<f64>::zeros(2, 3).shape().is_fixed());
    }

    #[test]
    fn test_dense_from_vec_length() {
        assert!(DenseMatrix::<f64>::from_vec(2, 2, vec![1.0; 4]).is_ok());
        assert_eq!(
            DenseMatrix::<f64>::from_vec(2, 2, vec![1.0; 3]),
            Err(EvalError::DataLength {
                expected: 4,
                found: 3
            })
        );
    }

    #[test]
    fn test_dense_from_vec_fixed_disagreement() {
        assert_eq!(
            DenseMatrix::<f64, 3, 3>::from_vec(4, 4, vec![0.0; 16]),
            Err(EvalError::ShapeMismatch {
                expected: (3, 3),
                found: (4, 4)
            })
        );
        assert_eq!(
            DenseMatrix::<f64, 3>::from_vec(2, 5, vec![0.0; 10]),
            Err(EvalError::ShapeMismatch {
                expected: (3, 5),
                found: (2, 5)
            })
        );
        assert!(DenseMatrix::<f64, 3>::from_vec(3, 5, vec![0.0; 15]).is_ok());
    }

    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn test_dense_zeros_fixed_disagreement_panics() {
        let _ = DenseMatrix::<f64, 2, 2>::zeros(3, 2);
    }

    #[test]
    fn test_view_bounds() {
        let data = vec![0.0f64; 20];
        assert!(MatrixView::new(&data, 4, 5, 1, 4, 0).is_ok());
        assert!(matches!(
            MatrixView::new(&data, 4, 5, 1, 5, 0),
            Err(EvalError::OutOfBounds { needed: 24, len: 20 })
        ));
        assert_eq!(
            MatrixView::new(&data, 4, 2, 0, 4, 0).unwrap_err(),
            EvalError::ZeroStride { dim: 0 }
        );
        assert!(MatrixView::new(&data, 0, 5, 1, 100, 0).is_ok());
    }

    #[test]
    fn test_view_grid_access() {
        // 3x2 grid taking every other row of a 6x4 column-major buffer, columns 0 and 2.
        let data: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let v = MatrixView::new(&data, 3, 2, 2, 12, 0).unwrap();
        assert_eq!(v.get(0, 0), 0.0);
        assert_eq!(v.get(2, 0), 4.0);
        assert_eq!(v.get(1, 1), 14.0);
        assert!(Operand::<f64>::linear_run(&v).is_none());
    }

    #[test]
    fn test_view_mut_column_run() {
        let mut data = vec![0i64; 12];
        {
            let mut v = MatrixViewMut::block(&mut data, 2, 3, 4).unwrap();
            let mut col = v.column_run_mut(2);
            col.set(0, 7);
            col.set(1, 8);
        }
        assert_eq!(&data[8..10], &[7, 8]);
    }

    #[test]
    fn test_step_vector() {
        let data: Vec<f64> = (0..10).map(|v| v as f64).collect();
        let row = StepVector::row(&data, 4, 3).unwrap();
        assert_eq!((row.nrows(), row.ncols()), (1, 4));
        assert_eq!(row.get(0, 3), 9.0);
        assert_eq!(row.linear_run().map(|r| r.get(2)), Some(6.0));

        let col = StepVector::column(&data, 5, 2).unwrap();
        assert_eq!((col.nrows(), col.ncols()), (5, 1));
        assert_eq!(col.get(4, 0), 8.0);

        assert!(StepVector::row(&data, 4, 4).is_err());
    }

    #[test]
    fn test_step_vector_mut_is_linear() {
        assert_eq!(
            <StepVectorMut<'static, f64> as OperandMut<f64>>::ACCESS,
            AccessPolicy::Linear
        );
        assert_eq!(
            <MatrixViewMut<'static, f64> as OperandMut<f64>>::ACCESS,
            AccessPolicy::PerColumn
        );
        assert_eq!(
            <DenseMatrix<f64> as OperandMut<f64>>::ACCESS,
            AccessPolicy::Custom
        );
    }
}
